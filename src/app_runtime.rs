use std::sync::Arc;

use tauri::{webview::PageLoadEvent, AppHandle, Manager, RunEvent, Runtime, Webview, WindowEvent};

use crate::{
    append_desktop_log, append_shutdown_log, append_startup_log,
    app_helpers::session_env_from_args,
    desktop_bridge::DESKTOP_BRIDGE_SCRIPT,
    desktop_options::OptionsStore,
    fonts::{self, FontCatalog},
    ipc_dispatch::IpcDispatcher,
    launch_context::{EphemeralPortAllocator, LaunchContextBuilder},
    logging::{init_logging, resolve_desktop_log_path},
    main_window::{decide_close, CloseDecision},
    native_services::TauriNativeServices,
    page_bridge::PageBridge,
    reachability::{build_http_client, ReachabilityPolicy},
    runtime_paths,
    session_launcher::{run_session_loop, LauncherSettings, SessionEvent, SessionEvents, SessionLauncher},
    session_process::ProcessSupervisor,
    session_status::SessionStatus,
    shell_host::TauriShellHost,
    window_actions,
    window_registry::{WindowEntry, WindowKind, WindowRegistry},
    DesktopState, DESKTOP_LOG_FILE, DESKTOP_LOG_FILTER_ENV, DESKTOP_LOG_MAX_BYTES,
    LOG_BACKUP_COUNT, MAIN_WINDOW_LABEL, SESSION_HOME_ENV, SESSION_KILL_TIMEOUT,
    SHARED_SECRET_ENV, STDERR_TAIL_LINES,
};

fn inject_desktop_bridge<R: Runtime>(webview: &Webview<R>) {
    if let Err(error) = webview.eval(DESKTOP_BRIDGE_SCRIPT) {
        append_desktop_log(&format!(
            "failed to inject desktop bridge into '{}': {error}",
            webview.label()
        ));
    }
}

fn shared_secret() -> String {
    std::env::var(SHARED_SECRET_ENV)
        .ok()
        .filter(|secret| !secret.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
}

fn start_desktop(app_handle: &AppHandle) -> Result<(), Box<dyn std::error::Error>> {
    let root_dir = runtime_paths::default_desktop_root_dir();
    let options = Arc::new(OptionsStore::load(root_dir.as_deref())?);
    let snapshot = options.snapshot();

    let registry = WindowRegistry::shared();
    let status = Arc::new(SessionStatus::default());
    let page_bridge = Arc::new(PageBridge::default());
    let fonts = Arc::new(FontCatalog::default());
    let (events, receiver) = SessionEvents::channel();

    let main_window = window_actions::create_main_window(app_handle, snapshot.zoom_level)?;
    let asset_base = main_window.url()?;
    {
        let mut entry = WindowEntry::new(MAIN_WINDOW_LABEL, "", WindowKind::Main);
        entry.zoom = snapshot.zoom_level;
        registry.lock().register(entry)?;
    }

    let supervisor = ProcessSupervisor::new(
        snapshot.resolved_session_path(),
        std::env::var_os(SESSION_HOME_ENV).map(Into::into),
        shared_secret(),
        session_env_from_args(std::env::args().skip(1)),
        STDERR_TAIL_LINES,
    );
    let contexts = LaunchContextBuilder::new(
        snapshot.session_host.clone(),
        snapshot.config_file.clone(),
        snapshot.session_args.clone(),
        EphemeralPortAllocator,
    );
    append_startup_log(&format!(
        "session launcher token {}",
        contexts.launcher_token()
    ));

    let host = TauriShellHost::new(
        app_handle.clone(),
        registry.clone(),
        page_bridge.clone(),
        events.clone(),
        build_http_client()?,
        supervisor.shared_secret().to_string(),
        ReachabilityPolicy::from_options(&snapshot),
        asset_base.clone(),
    );
    let launcher = SessionLauncher::new(
        host,
        supervisor,
        contexts,
        events.clone(),
        status.clone(),
        LauncherSettings {
            max_reload_attempts: snapshot.max_reload_attempts,
            prompt_on_quit: snapshot.prompt_on_quit,
        },
    );

    let dispatcher = IpcDispatcher::new(
        TauriNativeServices::new(app_handle.clone()),
        registry.clone(),
        options,
        fonts.clone(),
        status.clone(),
        events.clone(),
    );
    app_handle.manage(DesktopState {
        registry,
        status,
        events: events.clone(),
        page_bridge,
        dispatcher,
        asset_base,
    });

    std::thread::spawn(move || {
        let (monospace, proportional) = fonts::enumerate_system_fonts();
        append_startup_log(&format!(
            "found {} monospace and {} proportional font families",
            monospace.len(),
            proportional.len()
        ));
        fonts.replace(monospace, proportional);
    });

    tauri::async_runtime::spawn(run_session_loop(launcher, receiver));
    events.send(SessionEvent::LaunchFirst);
    Ok(())
}

fn handle_main_close_requested(app_handle: &AppHandle, state: &DesktopState) -> bool {
    match decide_close(state.status.quit_confirmed(), state.status.backend_alive()) {
        CloseDecision::CloseNow => {
            let closed = window_actions::close_all_except(
                app_handle,
                &state.registry,
                MAIN_WINDOW_LABEL,
                append_shutdown_log,
            );
            append_shutdown_log(&format!(
                "closing main window after closing {closed} secondary window(s)"
            ));
            true
        }
        CloseDecision::Defer => {
            state.events.send(SessionEvent::CloseRequested);
            false
        }
    }
}

fn handle_exit(app_handle: &AppHandle) {
    let Some(state) = app_handle.try_state::<DesktopState>() else {
        return;
    };
    state.events.send(SessionEvent::Shutdown);
    // The process exits once this returns, so the kill is awaited here.
    let reaped = tauri::async_runtime::block_on(
        state
            .status
            .terminate_backend_and_wait(SESSION_KILL_TIMEOUT),
    );
    if reaped {
        append_shutdown_log("terminated session process on exit");
    } else if state.status.backend_alive() {
        append_shutdown_log("session process still running after exit timeout");
    }
    let mut registry = state.registry.lock();
    append_shutdown_log(&format!("releasing {} window(s)", registry.len()));
    registry.clear();
}

pub(crate) fn run() {
    let log_path = resolve_desktop_log_path(
        runtime_paths::default_desktop_root_dir(),
        DESKTOP_LOG_FILE,
    );
    if let Err(error) = init_logging(
        &log_path,
        DESKTOP_LOG_FILTER_ENV,
        DESKTOP_LOG_MAX_BYTES,
        LOG_BACKUP_COUNT,
    ) {
        eprintln!("{error}");
    }

    append_startup_log("desktop process starting");
    append_startup_log(&format!("desktop log path: {}", log_path.display()));
    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_clipboard_manager::init())
        .invoke_handler(tauri::generate_handler![
            crate::desktop_bridge_commands::desktop_is_desktop_runtime,
            crate::desktop_bridge_commands::desktop_callback,
            crate::desktop_bridge_commands::desktop_page_reply,
        ])
        .on_window_event(|window, event| {
            let app_handle = window.app_handle();
            let Some(state) = app_handle.try_state::<DesktopState>() else {
                return;
            };

            match event {
                WindowEvent::CloseRequested { api, .. } if window.label() == MAIN_WINDOW_LABEL => {
                    if !handle_main_close_requested(app_handle, &state) {
                        api.prevent_close();
                    }
                }
                WindowEvent::Destroyed => {
                    if state.registry.lock().unregister(window.label()).is_some() {
                        append_desktop_log(&format!("window '{}' closed", window.label()));
                    }
                }
                _ => {}
            }
        })
        .on_page_load(|webview, payload| {
            let Some(state) = webview.app_handle().try_state::<DesktopState>() else {
                return;
            };
            let url = payload.url();
            match payload.event() {
                PageLoadEvent::Started => {
                    append_desktop_log(&format!("page-load started: {url}"))
                }
                PageLoadEvent::Finished => {
                    append_desktop_log(&format!("page-load finished: {url}"))
                }
            }
            if state.should_inject_bridge(url) {
                inject_desktop_bridge(webview);
            }
            state.report_page_load(webview.label(), url, payload.event());
        })
        .setup(|app| {
            if let Err(error) = start_desktop(app.handle()) {
                append_startup_log(&format!("failed to start desktop shell: {error}"));
                return Err(error);
            }
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| {
            if let RunEvent::Exit = event {
                handle_exit(app_handle);
            }
        });
}
