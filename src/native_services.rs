use std::{
    ffi::OsStr,
    future::Future,
    path::Path,
    process::{Command, Stdio},
};

use tauri::{AppHandle, Manager, WebviewWindow};
use tauri_plugin_clipboard_manager::ClipboardExt;
use tauri_plugin_dialog::{DialogExt, FileDialogBuilder, MessageDialogButtons, MessageDialogKind};
use tokio::sync::oneshot;
use url::Url;

use crate::{
    append_desktop_log,
    ipc_message::{
        DirectoryDialogRequest, EditCommand, FileDialogRequest, MessageBoxKind,
        MessageBoxRequest, SaveDialogRequest,
    },
    window_actions::{self, WindowRequest},
    APP_NAME,
};

const BASE_DPI: f64 = 96.0;

pub trait NativeServices: Send + Sync {
    fn open_file_dialog(
        &self,
        owner: Option<&str>,
        request: &FileDialogRequest,
    ) -> impl Future<Output = Result<Vec<String>, String>> + Send;
    fn save_file_dialog(
        &self,
        owner: Option<&str>,
        request: &SaveDialogRequest,
    ) -> impl Future<Output = Result<Option<String>, String>> + Send;
    fn directory_dialog(
        &self,
        owner: Option<&str>,
        request: &DirectoryDialogRequest,
    ) -> impl Future<Output = Result<Option<String>, String>> + Send;
    /// Resolves to the index of the chosen button.
    fn message_box(
        &self,
        owner: &str,
        request: &MessageBoxRequest,
    ) -> impl Future<Output = Result<usize, String>> + Send;
    fn clipboard_text(&self) -> impl Future<Output = Result<String, String>> + Send;
    fn display_dpi(&self, label: &str) -> impl Future<Output = Result<f64, String>> + Send;

    fn set_clipboard_text(&self, text: &str) -> Result<(), String>;
    fn run_edit_command(&self, label: &str, command: EditCommand) -> Result<(), String>;
    fn open_external(&self, url: &Url) -> Result<(), String>;
    fn open_path(&self, path: &Path) -> Result<(), String>;
    fn open_window(&self, request: &WindowRequest) -> Result<(), String>;
    fn navigate_window(&self, label: &str, url: &Url) -> Result<(), String>;
    fn focus_window(&self, label: &str) -> Result<(), String>;
    fn reload_window(&self, label: &str) -> Result<(), String>;
    fn set_window_title(&self, label: &str, title: &str) -> Result<(), String>;
    fn set_zoom(&self, label: &str, zoom: f64) -> Result<(), String>;
    fn toggle_fullscreen(&self, label: &str) -> Result<(), String>;
    fn launch_new_instance(&self, args: &[String]) -> Result<(), String>;
    /// Visible notice for callbacks the shell does not provide.
    fn notify_unimplemented(&self, message: &str);
}

/// Accepts the schemes the workbench is allowed to hand to the OS.
pub fn parse_openable_url(raw_url: &str) -> Result<Url, String> {
    let trimmed = raw_url.trim();
    if trimmed.is_empty() {
        return Err("Missing external URL.".to_string());
    }

    let parsed = Url::parse(trimmed).map_err(|error| format!("Invalid URL: {error}"))?;
    match parsed.scheme() {
        "http" | "https" | "mailto" | "file" => Ok(parsed),
        scheme => Err(format!(
            "Unsupported URL scheme '{scheme}', only http/https/mailto/file are allowed."
        )),
    }
}

#[cfg(target_os = "macos")]
fn open_with_system_handler(target: &OsStr) -> Result<(), String> {
    Command::new("open")
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|error| format!("Failed to run 'open': {error}"))
}

#[cfg(target_os = "windows")]
fn open_with_system_handler(target: &OsStr) -> Result<(), String> {
    Command::new("rundll32")
        .arg("url.dll,FileProtocolHandler")
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|error| format!("Failed to run 'rundll32': {error}"))
}

#[cfg(all(unix, not(target_os = "macos")))]
fn open_with_system_handler(target: &OsStr) -> Result<(), String> {
    Command::new("xdg-open")
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|error| format!("Failed to run 'xdg-open': {error}"))
}

#[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
fn open_with_system_handler(_target: &OsStr) -> Result<(), String> {
    Err("Opening files and URLs is not supported on this platform.".to_string())
}

fn dialog_kind(kind: MessageBoxKind) -> MessageDialogKind {
    match kind {
        MessageBoxKind::Warning => MessageDialogKind::Warning,
        MessageBoxKind::Error => MessageDialogKind::Error,
        MessageBoxKind::Info | MessageBoxKind::Question => MessageDialogKind::Info,
    }
}

/// The native message box offers at most a confirm and a cancel button:
/// confirm maps to the default button and cancel to the cancel button.
fn dialog_buttons(request: &MessageBoxRequest) -> MessageDialogButtons {
    let label = |index: usize| request.buttons.get(index).cloned();
    match (label(request.default_button), label(request.cancel_button)) {
        (Some(ok), Some(cancel)) if request.default_button != request.cancel_button => {
            MessageDialogButtons::OkCancelCustom(ok, cancel)
        }
        (Some(ok), _) => MessageDialogButtons::OkCustom(ok),
        (None, _) => MessageDialogButtons::Ok,
    }
}

async fn await_dialog<T>(rx: oneshot::Receiver<T>) -> Result<T, String> {
    rx.await
        .map_err(|_| "dialog closed without a result".to_string())
}

pub struct TauriNativeServices {
    app_handle: AppHandle,
}

impl TauriNativeServices {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }

    fn window(&self, label: &str) -> Result<WebviewWindow, String> {
        self.app_handle
            .get_webview_window(label)
            .ok_or_else(|| format!("window '{label}' not found"))
    }

    fn file_dialog(&self, owner: Option<&str>, caption: &str, dir: &str) -> FileDialogBuilder<tauri::Wry> {
        let mut builder = self.app_handle.dialog().file();
        if !caption.is_empty() {
            builder = builder.set_title(caption);
        }
        if !dir.is_empty() {
            builder = builder.set_directory(crate::app_helpers::expand_home_path(dir));
        }
        if let Some(window) = owner.and_then(|label| self.app_handle.get_webview_window(label)) {
            builder = builder.set_parent(&window);
        }
        builder
    }
}

fn file_path_string(path: tauri_plugin_dialog::FilePath) -> Option<String> {
    path.into_path()
        .ok()
        .map(|path| path.to_string_lossy().into_owned())
}

impl NativeServices for TauriNativeServices {
    fn open_file_dialog(
        &self,
        owner: Option<&str>,
        request: &FileDialogRequest,
    ) -> impl Future<Output = Result<Vec<String>, String>> + Send {
        let (tx, rx) = oneshot::channel();
        let mut builder = self.file_dialog(owner, &request.caption, &request.dir);
        if request.can_choose_directories {
            builder.pick_folder(move |path| {
                let _ = tx.send(path.and_then(file_path_string).into_iter().collect());
            });
        } else {
            for filter in &request.filters {
                let extensions: Vec<&str> =
                    filter.extensions.iter().map(String::as_str).collect();
                builder = builder.add_filter(filter.name.clone(), &extensions);
            }
            builder.pick_files(move |paths| {
                let _ = tx.send(
                    paths
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(file_path_string)
                        .collect(),
                );
            });
        }
        await_dialog(rx)
    }

    fn save_file_dialog(
        &self,
        owner: Option<&str>,
        request: &SaveDialogRequest,
    ) -> impl Future<Output = Result<Option<String>, String>> + Send {
        let (tx, rx) = oneshot::channel();
        let mut builder = self.file_dialog(owner, &request.caption, &request.dir);
        let extension = request.default_extension.trim_start_matches('.');
        if !extension.is_empty() {
            builder = builder.add_filter(extension.to_uppercase(), &[extension]);
        }
        let forced_extension = request
            .force_default_extension
            .then(|| extension.to_string())
            .filter(|extension| !extension.is_empty());
        builder.save_file(move |path| {
            let path = path.and_then(file_path_string).map(|path| match &forced_extension {
                Some(extension) if !path.ends_with(&format!(".{extension}")) => {
                    format!("{path}.{extension}")
                }
                _ => path,
            });
            let _ = tx.send(path);
        });
        await_dialog(rx)
    }

    fn directory_dialog(
        &self,
        owner: Option<&str>,
        request: &DirectoryDialogRequest,
    ) -> impl Future<Output = Result<Option<String>, String>> + Send {
        let (tx, rx) = oneshot::channel();
        self.file_dialog(owner, &request.caption, &request.dir)
            .pick_folder(move |path| {
                let _ = tx.send(path.and_then(file_path_string));
            });
        await_dialog(rx)
    }

    fn message_box(
        &self,
        owner: &str,
        request: &MessageBoxRequest,
    ) -> impl Future<Output = Result<usize, String>> + Send {
        let (tx, rx) = oneshot::channel();
        let mut builder = self
            .app_handle
            .dialog()
            .message(request.message.clone())
            .title(request.caption.clone())
            .kind(dialog_kind(request.kind))
            .buttons(dialog_buttons(request));
        if let Some(window) = self.app_handle.get_webview_window(owner) {
            builder = builder.parent(&window);
        }
        let (confirmed, canceled) = (request.default_button, request.cancel_button);
        builder.show(move |ok| {
            let _ = tx.send(if ok { confirmed } else { canceled });
        });
        await_dialog(rx)
    }

    fn clipboard_text(&self) -> impl Future<Output = Result<String, String>> + Send {
        let text = self
            .app_handle
            .clipboard()
            .read_text()
            .map_err(|error| format!("Failed to read clipboard: {error}"));
        async move { text }
    }

    fn display_dpi(&self, label: &str) -> impl Future<Output = Result<f64, String>> + Send {
        let dpi = self.window(label).and_then(|window| {
            window
                .scale_factor()
                .map(|scale| scale * BASE_DPI)
                .map_err(|error| format!("Failed to read scale factor: {error}"))
        });
        async move { dpi }
    }

    fn set_clipboard_text(&self, text: &str) -> Result<(), String> {
        self.app_handle
            .clipboard()
            .write_text(text.to_string())
            .map_err(|error| format!("Failed to write clipboard: {error}"))
    }

    fn run_edit_command(&self, label: &str, command: EditCommand) -> Result<(), String> {
        self.window(label)?
            .eval(command.script())
            .map_err(|error| format!("Failed to run edit command: {error}"))
    }

    fn open_external(&self, url: &Url) -> Result<(), String> {
        open_with_system_handler(OsStr::new(url.as_str()))
    }

    fn open_path(&self, path: &Path) -> Result<(), String> {
        if !path.exists() {
            return Err(format!("{} does not exist", path.display()));
        }
        open_with_system_handler(path.as_os_str())
    }

    fn open_window(&self, request: &WindowRequest) -> Result<(), String> {
        window_actions::open_secondary_window(&self.app_handle, request)
            .map_err(|error| format!("Failed to open window '{}': {error}", request.label))
    }

    fn navigate_window(&self, label: &str, url: &Url) -> Result<(), String> {
        if window_actions::navigate_window(&self.app_handle, label, url, append_desktop_log) {
            Ok(())
        } else {
            Err(format!("could not navigate window '{label}'"))
        }
    }

    fn focus_window(&self, label: &str) -> Result<(), String> {
        if window_actions::focus_window(&self.app_handle, label, append_desktop_log) {
            Ok(())
        } else {
            Err(format!("window '{label}' not found"))
        }
    }

    fn reload_window(&self, label: &str) -> Result<(), String> {
        self.window(label)?
            .eval("window.location.reload()")
            .map_err(|error| format!("Failed to reload '{label}': {error}"))
    }

    fn set_window_title(&self, label: &str, title: &str) -> Result<(), String> {
        self.window(label)?
            .set_title(title)
            .map_err(|error| format!("Failed to set title of '{label}': {error}"))
    }

    fn set_zoom(&self, label: &str, zoom: f64) -> Result<(), String> {
        self.window(label)?
            .set_zoom(zoom)
            .map_err(|error| format!("Failed to zoom '{label}': {error}"))
    }

    fn toggle_fullscreen(&self, label: &str) -> Result<(), String> {
        let window = self.window(label)?;
        let fullscreen = window
            .is_fullscreen()
            .map_err(|error| format!("Failed to read fullscreen state: {error}"))?;
        window
            .set_fullscreen(!fullscreen)
            .map_err(|error| format!("Failed to toggle fullscreen: {error}"))
    }

    fn launch_new_instance(&self, args: &[String]) -> Result<(), String> {
        let program = std::env::current_exe()
            .map_err(|error| format!("Failed to resolve the shell executable: {error}"))?;
        append_desktop_log(&format!(
            "launching new instance: {}",
            crate::build_debug_command(&program.to_string_lossy(), args)
        ));
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|error| format!("Failed to launch a new instance: {error}"))
    }

    fn notify_unimplemented(&self, message: &str) {
        self.app_handle
            .dialog()
            .message(format!("{message} is not implemented in this build of {APP_NAME}."))
            .title(APP_NAME)
            .kind(MessageDialogKind::Info)
            .buttons(MessageDialogButtons::Ok)
            .show(|_| {});
    }
}
