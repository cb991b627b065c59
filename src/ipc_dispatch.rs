use std::{path::Path, sync::Arc};

use serde_json::{json, Value};
use url::Url;

use crate::{
    app_helpers::expand_home_path,
    desktop_options::OptionsStore,
    error::IpcError,
    fonts::FontCatalog,
    ipc_message::{
        clamp_zoom, ActionMessage, DesktopMessage, NamedWindowRequest, Notification,
        QueryMessage,
    },
    logging::DesktopLogCategory,
    main_window::window_title,
    native_services::{parse_openable_url, NativeServices},
    session_launcher::{SessionEvent, SessionEvents},
    session_status::SessionStatus,
    window_actions::WindowRequest,
    window_registry::{
        is_anonymous_name, label_for_name, SharedWindowRegistry, WindowEntry, WindowKind,
    },
    APP_NAME, ZOOM_WINDOW_NAME,
};

pub struct IpcDispatcher<S> {
    services: S,
    registry: SharedWindowRegistry,
    options: Arc<OptionsStore>,
    fonts: Arc<FontCatalog>,
    status: Arc<SessionStatus>,
    events: SessionEvents,
}

impl<S: NativeServices> IpcDispatcher<S> {
    pub fn new(
        services: S,
        registry: SharedWindowRegistry,
        options: Arc<OptionsStore>,
        fonts: Arc<FontCatalog>,
        status: Arc<SessionStatus>,
        events: SessionEvents,
    ) -> Self {
        Self {
            services,
            registry,
            options,
            fonts,
            status,
            events,
        }
    }

    /// Unknown names answer `null`. Notification failures are only logged.
    pub async fn dispatch(
        &self,
        sender_label: &str,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, IpcError> {
        let sender = self
            .registry
            .lock()
            .resolve_sender(name, sender_label)
            .inspect_err(|error| log_ipc_error(error))?;

        let message = match DesktopMessage::parse(name, args) {
            Ok(message) => message,
            Err(IpcError::UnknownMessage(name) | IpcError::Unimplemented(name)) => {
                tracing::warn!(
                    category = DesktopLogCategory::Ipc.as_str(),
                    "desktop callback {name} from '{}' is not handled",
                    sender.label
                );
                if cfg!(debug_assertions) {
                    self.services.notify_unimplemented(&name);
                }
                return Ok(Value::Null);
            }
            Err(error) => {
                log_ipc_error(&error);
                return Err(error);
            }
        };

        tracing::debug!(
            category = DesktopLogCategory::Ipc.as_str(),
            "desktop callback {name} from '{}' ({:?})",
            sender.label,
            message.contract()
        );

        match message {
            DesktopMessage::Query(query) => Ok(self.answer_query(query)),
            DesktopMessage::Action(action) => self
                .perform_action(&sender, name, action)
                .await
                .inspect_err(|error| log_ipc_error(error)),
            DesktopMessage::Notify(notification) => {
                if let Err(error) = self.handle_notification(&sender, name, notification) {
                    log_ipc_error(&error);
                }
                Ok(Value::Null)
            }
        }
    }

    fn answer_query(&self, query: QueryMessage) -> Value {
        match query {
            QueryMessage::FixedWidthFontList => json!(self.fonts.monospace_list().join("\n")),
            QueryMessage::FixedWidthFont => {
                let configured = self.options.fixed_width_font();
                json!(quoted(&self.fonts.preferred_monospace(configured.as_deref())))
            }
            QueryMessage::ProportionalFont => json!(quoted(&self.fonts.preferred_proportional())),
            QueryMessage::ZoomLevel => json!(self.options.zoom_level()),
            QueryMessage::EnableAccessibility => json!(self.options.enable_accessibility()),
            QueryMessage::InitMessages => json!(""),
            QueryMessage::IsMacos | QueryMessage::SupportsFullscreenMode => {
                json!(cfg!(target_os = "macos"))
            }
            QueryMessage::SupportsClipboardMetafile => json!(cfg!(target_os = "windows")),
            QueryMessage::SessionServers => json!([]),
            QueryMessage::StartupErrorInfo { var_name } => {
                json!(self.status.error_page_var(&var_name))
            }
            QueryMessage::SetPendingQuit(pending) => {
                self.events.send(SessionEvent::SetPendingQuit(pending));
                Value::Null
            }
        }
    }

    async fn perform_action(
        &self,
        sender: &WindowEntry,
        name: &str,
        action: ActionMessage,
    ) -> Result<Value, IpcError> {
        let failed = |reason: String| IpcError::handler(name, reason);
        let owner = |focus_owner: bool| focus_owner.then_some(sender.label.as_str());

        match action {
            ActionMessage::OpenFileName(request) => {
                let paths = self
                    .services
                    .open_file_dialog(owner(request.focus_owner), &request)
                    .await
                    .map_err(failed)?;
                Ok(json!({ "canceled": paths.is_empty(), "filePaths": paths }))
            }
            ActionMessage::SaveFileName(request) => {
                let path = self
                    .services
                    .save_file_dialog(owner(request.focus_owner), &request)
                    .await
                    .map_err(failed)?;
                Ok(json!({
                    "canceled": path.is_none(),
                    "filePath": path.unwrap_or_default(),
                }))
            }
            ActionMessage::ExistingDirectory(request) => {
                let path = self
                    .services
                    .directory_dialog(owner(request.focus_owner), &request)
                    .await
                    .map_err(failed)?;
                Ok(json!({
                    "canceled": path.is_none(),
                    "filePaths": path.into_iter().collect::<Vec<_>>(),
                }))
            }
            ActionMessage::ClipboardText => {
                let text = self.services.clipboard_text().await.map_err(failed)?;
                Ok(json!(text))
            }
            ActionMessage::MessageBox(request) => {
                let response = self
                    .services
                    .message_box(&sender.label, &request)
                    .await
                    .map_err(failed)?;
                Ok(json!({ "response": response, "checkboxChecked": false }))
            }
            ActionMessage::DisplayDpi => {
                let dpi = self
                    .services
                    .display_dpi(&sender.label)
                    .await
                    .map_err(failed)?;
                Ok(json!(dpi.round().to_string()))
            }
        }
    }

    fn handle_notification(
        &self,
        sender: &WindowEntry,
        name: &str,
        notification: Notification,
    ) -> Result<(), IpcError> {
        let failed = |reason: String| IpcError::handler(name, reason);

        match notification {
            Notification::BrowseUrl(raw_url) => {
                let url = parse_openable_url(&raw_url).map_err(failed)?;
                self.services.open_external(&url).map_err(failed)
            }
            Notification::SetClipboardText(text) => {
                self.services.set_clipboard_text(&text).map_err(failed)
            }
            Notification::Edit(command) => self
                .services
                .run_edit_command(&sender.label, command)
                .map_err(failed),
            Notification::ShowFolder(path) | Notification::OpenDocument(path) => {
                self.open_path(name, &path, false)
            }
            Notification::ShowFile(path) => self.open_path(name, &path, true),
            Notification::WorkbenchInitialized { scratch_dir } => {
                let scratch_dir = Some(scratch_dir).filter(|dir| !dir.trim().is_empty());
                self.events
                    .send(SessionEvent::WorkbenchInitialized { scratch_dir });
                Ok(())
            }
            Notification::SessionQuit => {
                self.events.send(SessionEvent::SessionQuit);
                Ok(())
            }
            Notification::LaunchSession { reload } => {
                self.events.send(SessionEvent::LaunchSession { reload });
                Ok(())
            }
            Notification::OpenProjectInNewWindow(project) => {
                self.launch_new_instance(name, "--project", &project)
            }
            Notification::OpenSessionInNewWindow(working_dir) => {
                self.launch_new_instance(name, "--working-dir", &working_dir)
            }
            Notification::OpenMinimalWindow(request) => {
                self.open_named_window(name, request, WindowKind::Minimal)
            }
            Notification::OpenSatelliteWindow(request) => {
                self.open_named_window(name, request, WindowKind::Satellite)
            }
            Notification::ActivateMinimalWindow(window_name)
            | Notification::ActivateSatelliteWindow(window_name) => {
                self.activate_named_window(name, &window_name)
            }
            Notification::BringMainFrameToFront => {
                let main = self.registry.lock().main().map(|entry| entry.label.clone());
                let label = main.ok_or_else(|| failed("main window is not registered".into()))?;
                self.services.focus_window(&label).map_err(failed)
            }
            Notification::SetZoomLevel(zoom) => self.apply_zoom(name, sender, clamp_zoom(zoom)),
            Notification::Zoom(step) => {
                let current = self
                    .registry
                    .lock()
                    .by_label(&sender.label)
                    .map(|entry| entry.zoom)
                    .unwrap_or(sender.zoom);
                self.apply_zoom(name, sender, step.apply(current))
            }
            Notification::SetFixedWidthFont(font) => {
                self.options.set_fixed_width_font(&font).map_err(failed)
            }
            Notification::SetEnableAccessibility(enabled) => {
                self.options.set_enable_accessibility(enabled).map_err(failed)
            }
            Notification::SetWindowTitle(title) => {
                let title = match sender.kind {
                    WindowKind::Main => window_title(APP_NAME, Some(&title)),
                    _ => title,
                };
                self.services
                    .set_window_title(&sender.label, &title)
                    .map_err(failed)
            }
            Notification::ToggleFullscreenMode => {
                if cfg!(target_os = "macos") {
                    self.services
                        .toggle_fullscreen(&sender.label)
                        .map_err(failed)?;
                }
                Ok(())
            }
            Notification::ReloadZoomWindow => {
                let zoom = self
                    .registry
                    .lock()
                    .find(ZOOM_WINDOW_NAME)
                    .map(|entry| entry.label.clone());
                match zoom {
                    Some(label) => self.services.reload_window(&label).map_err(failed),
                    None => Ok(()),
                }
            }
            Notification::Ignored => Ok(()),
        }
    }

    fn open_path(&self, name: &str, raw_path: &str, reveal_parent: bool) -> Result<(), IpcError> {
        if raw_path.trim().is_empty() {
            return Err(IpcError::InvalidArguments {
                message: name.to_string(),
                reason: "missing path".to_string(),
            });
        }
        let path = expand_home_path(raw_path);
        let target = if reveal_parent {
            path.parent().unwrap_or(Path::new(raw_path)).to_path_buf()
        } else {
            path
        };
        self.services
            .open_path(&target)
            .map_err(|reason| IpcError::handler(name, reason))
    }

    fn launch_new_instance(&self, name: &str, flag: &str, value: &str) -> Result<(), IpcError> {
        let mut args = Vec::new();
        if !value.trim().is_empty() {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
        self.services
            .launch_new_instance(&args)
            .map_err(|reason| IpcError::handler(name, reason))
    }

    fn resolve_window_url(&self, name: &str, raw_url: &str) -> Result<Url, IpcError> {
        let parsed = match Url::parse(raw_url) {
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self
                    .status
                    .session_url()
                    .and_then(|base| Url::parse(&base).ok())
                    .ok_or_else(|| IpcError::handler(name, "no session URL to resolve against"))?;
                base.join(raw_url)
            }
            other => other,
        }
        .map_err(|error| IpcError::InvalidArguments {
            message: name.to_string(),
            reason: format!("invalid window URL '{raw_url}': {error}"),
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(IpcError::InvalidArguments {
                message: name.to_string(),
                reason: format!("unsupported window URL scheme '{scheme}'"),
            }),
        }
    }

    /// Reuses a window with the same name, otherwise registers and opens a new
    /// one. Anonymous names always get a new window.
    fn open_named_window(
        &self,
        name: &str,
        request: NamedWindowRequest,
        kind: WindowKind,
    ) -> Result<(), IpcError> {
        let failed = |reason: String| IpcError::handler(name, reason);
        let url = self.resolve_window_url(name, &request.url)?;

        let existing = self
            .registry
            .lock()
            .find(&request.name)
            .map(|entry| entry.label.clone());
        if let Some(label) = existing {
            if kind == WindowKind::Minimal {
                self.services.navigate_window(&label, &url).map_err(failed)?;
            }
            return self.services.focus_window(&label).map_err(failed);
        }

        let label = label_for_name(&request.name);
        self.registry
            .lock()
            .register(WindowEntry::new(label.clone(), request.name.clone(), kind))
            .map_err(failed)?;
        let window = WindowRequest::new(label.clone(), url, request.width, request.height);
        if let Err(reason) = self.services.open_window(&window) {
            self.registry.lock().unregister(&label);
            return Err(failed(reason));
        }
        tracing::info!(
            category = DesktopLogCategory::Ipc.as_str(),
            "opened {kind:?} window '{}' as {label}",
            request.name
        );
        Ok(())
    }

    fn activate_named_window(&self, name: &str, window_name: &str) -> Result<(), IpcError> {
        if is_anonymous_name(window_name) {
            return Ok(());
        }
        let label = self
            .registry
            .lock()
            .find(window_name)
            .map(|entry| entry.label.clone());
        match label {
            Some(label) => self
                .services
                .focus_window(&label)
                .map_err(|reason| IpcError::handler(name, reason)),
            None => Err(IpcError::handler(
                name,
                format!("no window named '{window_name}'"),
            )),
        }
    }

    fn apply_zoom(&self, name: &str, sender: &WindowEntry, zoom: f64) -> Result<(), IpcError> {
        let failed = |reason: String| IpcError::handler(name, reason);
        self.services
            .set_zoom(&sender.label, zoom)
            .map_err(failed)?;
        self.registry.lock().set_zoom(&sender.label, zoom);
        if sender.kind == WindowKind::Main {
            self.options.set_zoom_level(zoom).map_err(failed)?;
        }
        Ok(())
    }
}

fn quoted(font: &str) -> String {
    format!("\"{font}\"")
}

fn log_ipc_error(error: &IpcError) {
    tracing::warn!(category = DesktopLogCategory::Ipc.as_str(), "{error}");
}

#[cfg(test)]
mod tests {
    use std::{future::Future, path::PathBuf};

    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        desktop_options::DesktopOptions,
        error_page::ErrorPageData,
        ipc_message::{
            DirectoryDialogRequest, EditCommand, FileDialogRequest, MessageBoxRequest,
            SaveDialogRequest,
        },
        pending_quit::PendingQuit,
        window_registry::WindowRegistry,
        MAIN_WINDOW_LABEL,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        OpenFileDialog(Option<String>),
        SaveFileDialog(Option<String>),
        MessageBox(String),
        SetClipboard(String),
        Edit(String, EditCommand),
        OpenExternal(String),
        OpenPath(PathBuf),
        OpenWindow(String, String),
        Navigate(String, String),
        Focus(String),
        Reload(String),
        Title(String, String),
        Zoom(String, f64),
        NewInstance(Vec<String>),
        Unimplemented(String),
    }

    #[derive(Default)]
    struct FakeServices {
        calls: Mutex<Vec<Call>>,
        picked_files: Vec<String>,
        clipboard: Option<String>,
        fail_open_window: bool,
    }

    impl FakeServices {
        fn record(&self, call: Call) {
            self.calls.lock().push(call);
        }
    }

    impl NativeServices for Arc<FakeServices> {
        fn open_file_dialog(
            &self,
            owner: Option<&str>,
            _request: &FileDialogRequest,
        ) -> impl Future<Output = Result<Vec<String>, String>> + Send {
            self.record(Call::OpenFileDialog(owner.map(str::to_string)));
            let picked = self.picked_files.clone();
            async move { Ok::<_, String>(picked) }
        }

        fn save_file_dialog(
            &self,
            owner: Option<&str>,
            _request: &SaveDialogRequest,
        ) -> impl Future<Output = Result<Option<String>, String>> + Send {
            self.record(Call::SaveFileDialog(owner.map(str::to_string)));
            async move { Ok::<_, String>(Some("/tmp/out.R".to_string())) }
        }

        fn directory_dialog(
            &self,
            _owner: Option<&str>,
            _request: &DirectoryDialogRequest,
        ) -> impl Future<Output = Result<Option<String>, String>> + Send {
            async move { Ok::<_, String>(None) }
        }

        fn message_box(
            &self,
            owner: &str,
            request: &MessageBoxRequest,
        ) -> impl Future<Output = Result<usize, String>> + Send {
            self.record(Call::MessageBox(owner.to_string()));
            let response = request.cancel_button;
            async move { Ok::<_, String>(response) }
        }

        fn clipboard_text(&self) -> impl Future<Output = Result<String, String>> + Send {
            let text = self
                .clipboard
                .clone()
                .ok_or_else(|| "clipboard unavailable".to_string());
            async move { text }
        }

        fn display_dpi(&self, _label: &str) -> impl Future<Output = Result<f64, String>> + Send {
            async move { Ok::<_, String>(144.0) }
        }

        fn set_clipboard_text(&self, text: &str) -> Result<(), String> {
            self.record(Call::SetClipboard(text.to_string()));
            Ok(())
        }

        fn run_edit_command(&self, label: &str, command: EditCommand) -> Result<(), String> {
            self.record(Call::Edit(label.to_string(), command));
            Ok(())
        }

        fn open_external(&self, url: &Url) -> Result<(), String> {
            self.record(Call::OpenExternal(url.to_string()));
            Ok(())
        }

        fn open_path(&self, path: &Path) -> Result<(), String> {
            self.record(Call::OpenPath(path.to_path_buf()));
            Ok(())
        }

        fn open_window(&self, request: &WindowRequest) -> Result<(), String> {
            self.record(Call::OpenWindow(request.label.clone(), request.url.to_string()));
            if self.fail_open_window {
                Err("webview creation failed".to_string())
            } else {
                Ok(())
            }
        }

        fn navigate_window(&self, label: &str, url: &Url) -> Result<(), String> {
            self.record(Call::Navigate(label.to_string(), url.to_string()));
            Ok(())
        }

        fn focus_window(&self, label: &str) -> Result<(), String> {
            self.record(Call::Focus(label.to_string()));
            Ok(())
        }

        fn reload_window(&self, label: &str) -> Result<(), String> {
            self.record(Call::Reload(label.to_string()));
            Ok(())
        }

        fn set_window_title(&self, label: &str, title: &str) -> Result<(), String> {
            self.record(Call::Title(label.to_string(), title.to_string()));
            Ok(())
        }

        fn set_zoom(&self, label: &str, zoom: f64) -> Result<(), String> {
            self.record(Call::Zoom(label.to_string(), zoom));
            Ok(())
        }

        fn toggle_fullscreen(&self, _label: &str) -> Result<(), String> {
            Ok(())
        }

        fn launch_new_instance(&self, args: &[String]) -> Result<(), String> {
            self.record(Call::NewInstance(args.to_vec()));
            Ok(())
        }

        fn notify_unimplemented(&self, message: &str) {
            self.record(Call::Unimplemented(message.to_string()));
        }
    }

    struct Harness {
        services: Arc<FakeServices>,
        dispatcher: IpcDispatcher<Arc<FakeServices>>,
        registry: SharedWindowRegistry,
        options: Arc<OptionsStore>,
        fonts: Arc<FontCatalog>,
        status: Arc<SessionStatus>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_services(FakeServices::default())
        }

        fn with_services(services: FakeServices) -> Self {
            let services = Arc::new(services);
            let registry = WindowRegistry::shared();
            {
                let mut registry = registry.lock();
                registry
                    .register(WindowEntry::new(MAIN_WINDOW_LABEL, "", WindowKind::Main))
                    .expect("register main");
                registry
                    .register(WindowEntry::new("window-viewer", "viewer", WindowKind::Satellite))
                    .expect("register satellite");
            }
            let options = Arc::new(OptionsStore::new(None, DesktopOptions::default()));
            let fonts = Arc::new(FontCatalog::default());
            let status = Arc::new(SessionStatus::default());
            status.set_session_url(Some("http://127.0.0.1:8787/".to_string()));
            let (events, receiver) = SessionEvents::channel();
            let dispatcher = IpcDispatcher::new(
                services.clone(),
                registry.clone(),
                options.clone(),
                fonts.clone(),
                status.clone(),
                events,
            );
            Self {
                services,
                dispatcher,
                registry,
                options,
                fonts,
                status,
                events: receiver,
            }
        }

        async fn send(&self, sender: &str, name: &str, args: Value) -> Result<Value, IpcError> {
            let args = match args {
                Value::Array(values) => values,
                other => vec![other],
            };
            self.dispatcher.dispatch(sender, name, args).await
        }

        fn calls(&self) -> Vec<Call> {
            std::mem::take(&mut *self.services.calls.lock())
        }

        fn next_event(&mut self) -> Option<SessionEvent> {
            self.events.try_recv().ok()
        }
    }

    #[tokio::test]
    async fn unregistered_sender_is_rejected_without_side_effects() {
        let mut harness = Harness::new();

        let result = harness
            .send("ghost", "desktop_set_pending_quit", json!([1]))
            .await;

        assert_eq!(
            result,
            Err(IpcError::UnregisteredSender {
                message: "desktop_set_pending_quit".to_string(),
                label: "ghost".to_string(),
            })
        );
        let result = harness
            .send("ghost", "desktop_set_clipboard_text", json!(["secret"]))
            .await;
        assert!(result.is_err());
        assert!(harness.calls().is_empty());
        assert!(harness.next_event().is_none());
    }

    #[tokio::test]
    async fn unknown_and_unimplemented_names_answer_null() {
        let harness = Harness::new();

        for name in ["desktop_frobnicate", "desktop_show_license_dialog"] {
            let result = harness.send(MAIN_WINDOW_LABEL, name, json!([])).await;
            assert_eq!(result, Ok(Value::Null), "{name}");
        }

        let notices = harness.calls();
        if cfg!(debug_assertions) {
            assert_eq!(
                notices,
                vec![
                    Call::Unimplemented("desktop_frobnicate".to_string()),
                    Call::Unimplemented("desktop_show_license_dialog".to_string()),
                ]
            );
        } else {
            assert!(notices.is_empty());
        }
    }

    #[tokio::test]
    async fn invalid_arguments_are_returned() {
        let harness = Harness::new();
        let result = harness
            .send(MAIN_WINDOW_LABEL, "desktop_set_zoom_level", json!(["huge"]))
            .await;
        assert!(matches!(result, Err(IpcError::InvalidArguments { .. })));
        assert!(harness.calls().is_empty());
    }

    #[tokio::test]
    async fn font_queries_answer_synchronously_from_cache() {
        let harness = Harness::new();
        harness.fonts.replace(
            vec!["Fira Code".to_string(), "Noto Mono".to_string()],
            Vec::new(),
        );

        assert_eq!(
            harness
                .send(MAIN_WINDOW_LABEL, "desktop_get_fixed_width_font_list", json!([]))
                .await,
            Ok(json!("Fira Code\nNoto Mono"))
        );

        harness
            .send(MAIN_WINDOW_LABEL, "desktop_set_fixed_width_font", json!(["Fira Code"]))
            .await
            .expect("set font");
        assert_eq!(
            harness
                .send(MAIN_WINDOW_LABEL, "desktop_get_fixed_width_font", json!([]))
                .await,
            Ok(json!("\"Fira Code\""))
        );
    }

    #[tokio::test]
    async fn set_pending_quit_is_posted_to_the_session_loop() {
        let mut harness = Harness::new();
        let result = harness
            .send(MAIN_WINDOW_LABEL, "desktop_set_pending_quit", json!([3]))
            .await;

        assert_eq!(result, Ok(Value::Null));
        assert!(matches!(
            harness.next_event(),
            Some(SessionEvent::SetPendingQuit(PendingQuit::QuitRestartAndReload))
        ));
    }

    #[tokio::test]
    async fn workbench_initialized_treats_empty_scratch_dir_as_none() {
        let mut harness = Harness::new();
        harness
            .send(MAIN_WINDOW_LABEL, "desktop_on_workbench_initialized", json!([""]))
            .await
            .expect("notify");

        assert!(matches!(
            harness.next_event(),
            Some(SessionEvent::WorkbenchInitialized { scratch_dir: None })
        ));
    }

    #[tokio::test]
    async fn file_dialog_is_parented_only_when_requested() {
        let harness = Harness::with_services(FakeServices {
            picked_files: vec!["/tmp/a.R".to_string()],
            ..FakeServices::default()
        });

        let result = harness
            .send(
                "window-viewer",
                "desktop_get_open_file_name",
                json!(["Open", "Open", "", "", false, true]),
            )
            .await;
        assert_eq!(
            result,
            Ok(json!({ "canceled": false, "filePaths": ["/tmp/a.R"] }))
        );

        harness
            .send(
                MAIN_WINDOW_LABEL,
                "desktop_get_save_file_name",
                json!(["Save", "Save", "", "R", true, false]),
            )
            .await
            .expect("save dialog");

        assert_eq!(
            harness.calls(),
            vec![
                Call::OpenFileDialog(Some("window-viewer".to_string())),
                Call::SaveFileDialog(None),
            ]
        );
    }

    #[tokio::test]
    async fn canceled_dialogs_report_empty_selection() {
        let harness = Harness::new();
        assert_eq!(
            harness
                .send(MAIN_WINDOW_LABEL, "desktop_get_open_file_name", json!([]))
                .await,
            Ok(json!({ "canceled": true, "filePaths": [] }))
        );
        assert_eq!(
            harness
                .send(MAIN_WINDOW_LABEL, "desktop_get_existing_directory", json!([]))
                .await,
            Ok(json!({ "canceled": true, "filePaths": [] }))
        );
    }

    #[tokio::test]
    async fn message_box_returns_chosen_index_for_sender() {
        let harness = Harness::new();
        let result = harness
            .send(
                "window-viewer",
                "desktop_show_message_box",
                json!([4, "Quit", "Save first?", "Yes|No|Cancel", 0, 2]),
            )
            .await;

        assert_eq!(result, Ok(json!({ "response": 2, "checkboxChecked": false })));
        assert_eq!(harness.calls(), vec![Call::MessageBox("window-viewer".to_string())]);
    }

    #[tokio::test]
    async fn action_failures_are_returned_to_the_page() {
        let harness = Harness::new();
        let result = harness
            .send(MAIN_WINDOW_LABEL, "desktop_get_clipboard_text", json!([]))
            .await;
        assert_eq!(
            result,
            Err(IpcError::handler(
                "desktop_get_clipboard_text",
                "clipboard unavailable"
            ))
        );
    }

    #[tokio::test]
    async fn notification_failures_are_swallowed() {
        let harness = Harness::new();
        let result = harness
            .send(MAIN_WINDOW_LABEL, "desktop_browse_url", json!(["javascript:alert(1)"]))
            .await;

        assert_eq!(result, Ok(Value::Null));
        assert!(harness.calls().is_empty());

        harness
            .send(MAIN_WINDOW_LABEL, "desktop_browse_url", json!(["https://example.com/"]))
            .await
            .expect("browse");
        assert_eq!(
            harness.calls(),
            vec![Call::OpenExternal("https://example.com/".to_string())]
        );
    }

    #[tokio::test]
    async fn edit_commands_target_the_sending_window() {
        let harness = Harness::new();
        harness
            .send("window-viewer", "desktop_clipboard_copy", json!([]))
            .await
            .expect("copy");
        assert_eq!(
            harness.calls(),
            vec![Call::Edit("window-viewer".to_string(), EditCommand::Copy)]
        );
    }

    #[tokio::test]
    async fn show_file_reveals_parent_folder() {
        let harness = Harness::new();
        harness
            .send(MAIN_WINDOW_LABEL, "desktop_show_file", json!(["/data/project/analysis.R"]))
            .await
            .expect("show file");
        assert_eq!(
            harness.calls(),
            vec![Call::OpenPath(PathBuf::from("/data/project"))]
        );
    }

    #[tokio::test]
    async fn zoom_applies_to_sender_and_persists_only_for_main() {
        let harness = Harness::new();

        harness
            .send("window-viewer", "desktop_zoom_in", json!([]))
            .await
            .expect("zoom satellite");
        assert_eq!(harness.options.zoom_level(), 1.0);
        assert_eq!(
            harness.registry.lock().by_label("window-viewer").map(|entry| entry.zoom),
            Some(1.1)
        );

        harness
            .send(MAIN_WINDOW_LABEL, "desktop_set_zoom_level", json!([9.0]))
            .await
            .expect("zoom main");
        assert_eq!(harness.options.zoom_level(), 5.0);
        assert_eq!(
            harness
                .send(MAIN_WINDOW_LABEL, "desktop_get_zoom_level", json!([]))
                .await,
            Ok(json!(5.0))
        );

        assert_eq!(
            harness.calls(),
            vec![
                Call::Zoom("window-viewer".to_string(), 1.1),
                Call::Zoom(MAIN_WINDOW_LABEL.to_string(), 5.0),
            ]
        );
    }

    #[tokio::test]
    async fn minimal_window_is_registered_then_reused_by_name() {
        let harness = Harness::new();

        harness
            .send(
                MAIN_WINDOW_LABEL,
                "desktop_open_minimal_window",
                json!(["help", "help/index.html", 600, 400]),
            )
            .await
            .expect("open");
        harness
            .send(
                MAIN_WINDOW_LABEL,
                "desktop_open_minimal_window",
                json!(["help", "http://127.0.0.1:8787/help/other.html", 600, 400]),
            )
            .await
            .expect("reopen");

        assert_eq!(
            harness.calls(),
            vec![
                Call::OpenWindow(
                    "window-help".to_string(),
                    "http://127.0.0.1:8787/help/index.html".to_string()
                ),
                Call::Navigate(
                    "window-help".to_string(),
                    "http://127.0.0.1:8787/help/other.html".to_string()
                ),
                Call::Focus("window-help".to_string()),
            ]
        );
        assert_eq!(
            harness.registry.lock().find("help").map(|entry| entry.kind),
            Some(WindowKind::Minimal)
        );
    }

    #[tokio::test]
    async fn failed_window_creation_is_unregistered() {
        let harness = Harness::with_services(FakeServices {
            fail_open_window: true,
            ..FakeServices::default()
        });

        let result = harness
            .send(
                MAIN_WINDOW_LABEL,
                "desktop_open_satellite_window",
                json!(["plots", "/plots", 800, 600]),
            )
            .await;

        assert_eq!(result, Ok(Value::Null));
        assert!(harness.registry.lock().find("plots").is_none());
        assert_eq!(harness.registry.lock().len(), 2);
    }

    #[tokio::test]
    async fn anonymous_windows_are_never_activated() {
        let harness = Harness::new();
        harness
            .send(MAIN_WINDOW_LABEL, "desktop_activate_minimal_window", json!(["_blank"]))
            .await
            .expect("activate blank");
        harness
            .send(MAIN_WINDOW_LABEL, "desktop_activate_satellite_window", json!(["viewer"]))
            .await
            .expect("activate viewer");

        assert_eq!(harness.calls(), vec![Call::Focus("window-viewer".to_string())]);
    }

    #[tokio::test]
    async fn window_title_is_suffixed_only_for_main() {
        let harness = Harness::new();
        harness
            .send(MAIN_WINDOW_LABEL, "desktop_set_window_title", json!(["~/analysis"]))
            .await
            .expect("main title");
        harness
            .send("window-viewer", "desktop_set_window_title", json!(["Plot"]))
            .await
            .expect("satellite title");

        assert_eq!(
            harness.calls(),
            vec![
                Call::Title(MAIN_WINDOW_LABEL.to_string(), "~/analysis - Workbench".to_string()),
                Call::Title("window-viewer".to_string(), "Plot".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn reload_zoom_window_only_when_open() {
        let harness = Harness::new();
        harness
            .send(MAIN_WINDOW_LABEL, "desktop_reload_zoom_window", json!([]))
            .await
            .expect("no zoom window");
        assert!(harness.calls().is_empty());

        harness
            .registry
            .lock()
            .register(WindowEntry::new(
                "window-_workbench_zoom",
                ZOOM_WINDOW_NAME,
                WindowKind::Satellite,
            ))
            .expect("register zoom");
        harness
            .send(MAIN_WINDOW_LABEL, "desktop_reload_zoom_window", json!([]))
            .await
            .expect("reload");
        assert_eq!(
            harness.calls(),
            vec![Call::Reload("window-_workbench_zoom".to_string())]
        );
    }

    #[tokio::test]
    async fn new_instance_passes_project_flag() {
        let harness = Harness::new();
        harness
            .send(
                MAIN_WINDOW_LABEL,
                "desktop_open_project_in_new_window",
                json!(["~/work/demo.Rproj"]),
            )
            .await
            .expect("open project");
        harness
            .send(MAIN_WINDOW_LABEL, "desktop_open_session_in_new_window", json!([""]))
            .await
            .expect("open session");

        assert_eq!(
            harness.calls(),
            vec![
                Call::NewInstance(vec![
                    "--project".to_string(),
                    "~/work/demo.Rproj".to_string()
                ]),
                Call::NewInstance(Vec::new()),
            ]
        );
    }

    #[tokio::test]
    async fn startup_error_info_reads_published_error_page() {
        let harness = Harness::new();
        harness.status.set_error_page(ErrorPageData::for_unreachable_session(
            "http://127.0.0.1:8787/",
        ));

        assert_eq!(
            harness
                .send(MAIN_WINDOW_LABEL, "desktop_startup_error_info", json!(["retry_url"]))
                .await,
            Ok(json!("http://127.0.0.1:8787/"))
        );
        assert_eq!(
            harness
                .send(MAIN_WINDOW_LABEL, "desktop_startup_error_info", json!(["nope"]))
                .await,
            Ok(json!(""))
        );
    }
}
