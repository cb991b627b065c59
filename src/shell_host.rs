use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tauri::{AppHandle, Manager};
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use url::Url;

use crate::{
    append_desktop_log, append_shutdown_log,
    logging::DesktopLogCategory,
    main_window::{
        window_title, FrameKind, LoadSignal, QuitHook, ACTIVE_PROJECT_DIR_SCRIPT,
        NOTIFY_CRASHED_SCRIPT, QUIT_HOOKS_PROBE_SCRIPT,
    },
    page_bridge::{PageBridge, PageReply},
    reachability::{probe_url, wait_for_url, ReachabilityPolicy},
    session_launcher::{SessionEvent, SessionEvents, ShellHost},
    window_actions,
    window_registry::SharedWindowRegistry,
    APP_NAME, CONNECT_ERROR_PAGE, EXIT_FAILURE, LOADING_PAGE, MAIN_WINDOW_LABEL,
    QUIT_HOOK_PROBE_TIMEOUT,
};

#[derive(Clone)]
pub struct TauriShellHost {
    app_handle: AppHandle,
    registry: SharedWindowRegistry,
    page_bridge: Arc<PageBridge>,
    events: SessionEvents,
    http: reqwest::Client,
    shared_secret: String,
    policy: ReachabilityPolicy,
    asset_base: Url,
}

impl TauriShellHost {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app_handle: AppHandle,
        registry: SharedWindowRegistry,
        page_bridge: Arc<PageBridge>,
        events: SessionEvents,
        http: reqwest::Client,
        shared_secret: String,
        policy: ReachabilityPolicy,
        asset_base: Url,
    ) -> Self {
        Self {
            app_handle,
            registry,
            page_bridge,
            events,
            http,
            shared_secret,
            policy,
            asset_base,
        }
    }

    async fn query_main_window(&self, expression: &str, timeout: Option<Duration>) -> PageReply {
        match self.app_handle.get_webview_window(MAIN_WINDOW_LABEL) {
            Some(window) => self.page_bridge.query(&window, expression, timeout).await,
            None => Err("main window is not available".to_string()),
        }
    }

    fn show_shell_page(&self, page: &str) {
        match window_actions::shell_page_url(&self.asset_base, page) {
            Some(url) => {
                window_actions::navigate_window(
                    &self.app_handle,
                    MAIN_WINDOW_LABEL,
                    &url,
                    append_desktop_log,
                );
            }
            None => append_desktop_log(&format!("cannot resolve shell page {page}")),
        }
    }
}

impl ShellHost for TauriShellHost {
    fn load_main_url(&self, url: &str) {
        let host = self.clone();
        let url = url.to_string();
        tauri::async_runtime::spawn(async move {
            let reachable = probe_url(
                &host.http,
                &url,
                Some(&host.shared_secret),
                host.policy.request_timeout,
            )
            .await;
            let navigated = reachable
                && Url::parse(&url).is_ok_and(|target| {
                    window_actions::navigate_window(
                        &host.app_handle,
                        MAIN_WINDOW_LABEL,
                        &target,
                        append_desktop_log,
                    )
                });
            if !navigated {
                append_desktop_log(&format!("main window could not load {url}"));
                host.events
                    .send(SessionEvent::Load(LoadSignal::FailLoad(FrameKind::Main)));
            }
        });
    }

    fn show_loading_page(&self) {
        self.show_shell_page(LOADING_PAGE);
    }

    fn show_error_page(&self) {
        self.show_shell_page(CONNECT_ERROR_PAGE);
    }

    fn poll_reachability(&self, generation: u64, url: &str) {
        let host = self.clone();
        let url = url.to_string();
        tauri::async_runtime::spawn(async move {
            let result =
                wait_for_url(&host.http, &url, Some(&host.shared_secret), &host.policy).await;
            host.events
                .send(SessionEvent::ReachabilityResolved { generation, result });
        });
    }

    fn probe_quit_hooks(&self) {
        let host = self.clone();
        tauri::async_runtime::spawn(async move {
            let reply = host
                .query_main_window(QUIT_HOOKS_PROBE_SCRIPT, Some(QUIT_HOOK_PROBE_TIMEOUT))
                .await;
            if let Err(error) = &reply {
                tracing::warn!(
                    category = DesktopLogCategory::Shutdown.as_str(),
                    "quit hook probe failed: {error}"
                );
            }
            let present = matches!(reply, Ok(Value::Bool(true)));
            host.events.send(SessionEvent::QuitHooksProbed { present });
        });
    }

    fn invoke_quit_hook(&self, hook: QuitHook) {
        let host = self.clone();
        tauri::async_runtime::spawn(async move {
            append_shutdown_log(&format!("invoking {hook:?} hook"));
            let reply = host.query_main_window(hook.script(), None).await;
            host.events
                .send(SessionEvent::QuitHookResolved(reply.map(|_| ())));
        });
    }

    fn notify_session_crashed(&self) {
        let host = self.clone();
        tauri::async_runtime::spawn(async move {
            if let Err(error) = host
                .query_main_window(NOTIFY_CRASHED_SCRIPT, Some(QUIT_HOOK_PROBE_TIMEOUT))
                .await
            {
                tracing::debug!(
                    category = DesktopLogCategory::Runtime.as_str(),
                    "page was not told about the crash: {error}"
                );
            }
        });
    }

    fn refresh_title(&self) {
        let host = self.clone();
        tauri::async_runtime::spawn(async move {
            let project_dir = host
                .query_main_window(ACTIVE_PROJECT_DIR_SCRIPT, Some(QUIT_HOOK_PROBE_TIMEOUT))
                .await
                .ok()
                .and_then(|value| value.as_str().map(str::to_string));
            let title = window_title(APP_NAME, project_dir.as_deref());
            if let Some(window) = host.app_handle.get_webview_window(MAIN_WINDOW_LABEL) {
                if let Err(error) = window.set_title(&title) {
                    append_desktop_log(&format!("failed to set main window title: {error}"));
                }
            }
        });
    }

    fn close_satellites(&self) {
        let closed = window_actions::close_all_except(
            &self.app_handle,
            &self.registry,
            MAIN_WINDOW_LABEL,
            append_shutdown_log,
        );
        if closed > 0 {
            append_shutdown_log(&format!("closed {closed} secondary window(s)"));
        }
    }

    fn close_main_window(&self) {
        window_actions::close_main_window(&self.app_handle, append_shutdown_log);
    }

    fn report_fatal_error(&self, message: &str) {
        tracing::error!(category = DesktopLogCategory::Startup.as_str(), "{message}");
        let app_handle = self.app_handle.clone();
        self.app_handle
            .dialog()
            .message(message.to_string())
            .title(APP_NAME)
            .kind(MessageDialogKind::Error)
            .buttons(MessageDialogButtons::Ok)
            .show(move |_| {
                if app_handle.get_webview_window(MAIN_WINDOW_LABEL).is_some() {
                    window_actions::close_main_window(&app_handle, append_shutdown_log);
                } else {
                    app_handle.exit(EXIT_FAILURE);
                }
            });
    }
}
