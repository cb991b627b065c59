use serde_json::Value;

use crate::{error::IpcError, pending_quit::PendingQuit};

pub const MIN_ZOOM: f64 = 0.25;
pub const MAX_ZOOM: f64 = 5.0;
const ZOOM_STEP: f64 = 0.1;

/// Known callbacks the shell does not provide. They are reported, never failed.
pub const UNIMPLEMENTED_MESSAGES: &[&str] = &[
    "desktop_allow_product_usage",
    "desktop_connect_to_launcher_server",
    "desktop_control_launcher_job",
    "desktop_export_page_region_to_file",
    "desktop_external_synctex_preview",
    "desktop_external_synctex_view",
    "desktop_get_desktop_synctex_viewer",
    "desktop_get_job_container_user",
    "desktop_get_launcher_server",
    "desktop_get_license_status_message",
    "desktop_get_proxy_port_number",
    "desktop_get_session_server",
    "desktop_reconnect_to_session_server",
    "desktop_set_launcher_server",
    "desktop_set_shiny_dialog_url",
    "desktop_set_tutorial_url",
    "desktop_show_license_dialog",
    "desktop_show_session_server_options_dialog",
    "desktop_start_launcher_job_output_stream",
    "desktop_start_launcher_job_status_stream",
    "desktop_stop_launcher_job_output_stream",
    "desktop_stop_launcher_job_status_stream",
    "desktop_submit_launcher_job",
    "desktop_validate_jobs_config",
];

/// Callbacks that are accepted and intentionally do nothing.
const IGNORED_MESSAGES: &[&str] = &[
    "desktop_change_title_bar_color",
    "desktop_on_clipboard_selection_changed",
    "desktop_prepare_show_ppt_presentation",
    "desktop_prepare_show_word_doc",
    "desktop_set_background_color",
    "desktop_set_busy",
    "desktop_sync_to_editor_theme",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallContract {
    SyncQuery,
    AsyncAction,
    FireAndForget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DesktopMessage {
    Query(QueryMessage),
    Action(ActionMessage),
    Notify(Notification),
}

impl DesktopMessage {
    pub fn contract(&self) -> CallContract {
        match self {
            Self::Query(_) => CallContract::SyncQuery,
            Self::Action(_) => CallContract::AsyncAction,
            Self::Notify(_) => CallContract::FireAndForget,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryMessage {
    FixedWidthFontList,
    FixedWidthFont,
    ProportionalFont,
    ZoomLevel,
    EnableAccessibility,
    InitMessages,
    IsMacos,
    SupportsFullscreenMode,
    SupportsClipboardMetafile,
    SessionServers,
    StartupErrorInfo { var_name: String },
    SetPendingQuit(PendingQuit),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionMessage {
    OpenFileName(FileDialogRequest),
    SaveFileName(SaveDialogRequest),
    ExistingDirectory(DirectoryDialogRequest),
    ClipboardText,
    MessageBox(MessageBoxRequest),
    DisplayDpi,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    BrowseUrl(String),
    SetClipboardText(String),
    Edit(EditCommand),
    ShowFolder(String),
    ShowFile(String),
    OpenDocument(String),
    WorkbenchInitialized { scratch_dir: String },
    SessionQuit,
    LaunchSession { reload: bool },
    OpenProjectInNewWindow(String),
    OpenSessionInNewWindow(String),
    OpenMinimalWindow(NamedWindowRequest),
    OpenSatelliteWindow(NamedWindowRequest),
    ActivateMinimalWindow(String),
    ActivateSatelliteWindow(String),
    BringMainFrameToFront,
    SetZoomLevel(f64),
    Zoom(ZoomStep),
    SetFixedWidthFont(String),
    SetEnableAccessibility(bool),
    SetWindowTitle(String),
    ToggleFullscreenMode,
    ReloadZoomWindow,
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDialogRequest {
    pub caption: String,
    pub label: String,
    pub dir: String,
    pub filters: Vec<DialogFilter>,
    pub can_choose_directories: bool,
    pub focus_owner: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveDialogRequest {
    pub caption: String,
    pub label: String,
    pub dir: String,
    pub default_extension: String,
    pub force_default_extension: bool,
    pub focus_owner: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryDialogRequest {
    pub caption: String,
    pub label: String,
    pub dir: String,
    pub focus_owner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBoxKind {
    Info,
    Warning,
    Error,
    Question,
}

impl MessageBoxKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Info,
            2 => Self::Warning,
            3 => Self::Error,
            _ => Self::Question,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageBoxRequest {
    pub kind: MessageBoxKind,
    pub caption: String,
    pub message: String,
    pub buttons: Vec<String>,
    pub default_button: usize,
    pub cancel_button: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedWindowRequest {
    pub name: String,
    pub url: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditCommand {
    Undo,
    Redo,
    Cut,
    Copy,
    Paste,
}

impl EditCommand {
    pub fn script(self) -> &'static str {
        match self {
            Self::Undo => "document.execCommand('undo')",
            Self::Redo => "document.execCommand('redo')",
            Self::Cut => "document.execCommand('cut')",
            Self::Copy => "document.execCommand('copy')",
            Self::Paste => "document.execCommand('paste')",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomStep {
    In,
    Out,
    ActualSize,
}

impl ZoomStep {
    pub fn apply(self, current: f64) -> f64 {
        let next = match self {
            Self::In => current + ZOOM_STEP,
            Self::Out => current - ZOOM_STEP,
            Self::ActualSize => 1.0,
        };
        clamp_zoom((next * 100.0).round() / 100.0)
    }
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

/// Parses a Qt-style filter such as `R Files (*.R *.r);;All Files (*)`.
pub fn parse_dialog_filter(filter: &str) -> Vec<DialogFilter> {
    filter
        .split(";;")
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let patterns = entry
                .rfind('(')
                .filter(|_| entry.ends_with(')'))
                .map(|open| (&entry[..open], &entry[open + 1..entry.len() - 1]));
            match patterns {
                Some((name, patterns)) => DialogFilter {
                    name: name.trim().to_string(),
                    extensions: patterns
                        .split_whitespace()
                        .map(|pattern| {
                            pattern
                                .strip_prefix("*.")
                                .unwrap_or(pattern)
                                .to_string()
                        })
                        .collect(),
                },
                None => DialogFilter {
                    name: entry.to_string(),
                    extensions: vec!["*".to_string()],
                },
            }
        })
        .collect()
}

struct Args<'a> {
    message: &'a str,
    values: Vec<Value>,
}

impl Args<'_> {
    fn invalid(&self, reason: String) -> IpcError {
        IpcError::InvalidArguments {
            message: self.message.to_string(),
            reason,
        }
    }

    fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).filter(|value| !value.is_null())
    }

    /// Missing arguments read as an empty string.
    fn string(&self, index: usize) -> Result<String, IpcError> {
        match self.get(index) {
            None => Ok(String::new()),
            Some(Value::String(value)) => Ok(value.clone()),
            Some(Value::Number(value)) => Ok(value.to_string()),
            Some(other) => Err(self.invalid(format!("argument {index} is not a string: {other}"))),
        }
    }

    fn bool(&self, index: usize) -> Result<bool, IpcError> {
        match self.get(index) {
            None => Ok(false),
            Some(Value::Bool(value)) => Ok(*value),
            Some(Value::Number(value)) => Ok(value.as_f64().is_some_and(|value| value != 0.0)),
            Some(other) => Err(self.invalid(format!("argument {index} is not a boolean: {other}"))),
        }
    }

    fn number(&self, index: usize) -> Result<f64, IpcError> {
        match self.get(index) {
            Some(Value::Number(value)) => value
                .as_f64()
                .ok_or_else(|| self.invalid(format!("argument {index} is out of range"))),
            Some(Value::String(value)) => value
                .trim()
                .parse()
                .map_err(|_| self.invalid(format!("argument {index} is not a number: {value}"))),
            Some(other) => Err(self.invalid(format!("argument {index} is not a number: {other}"))),
            None => Err(self.invalid(format!("argument {index} is missing"))),
        }
    }

    fn integer(&self, index: usize) -> Result<i64, IpcError> {
        let value = self.number(index)?;
        if value.fract() != 0.0 {
            return Err(self.invalid(format!("argument {index} is not an integer: {value}")));
        }
        Ok(value as i64)
    }

    fn index_or(&self, index: usize, fallback: usize) -> Result<usize, IpcError> {
        if self.get(index).is_none() {
            return Ok(fallback);
        }
        let value = self.integer(index)?;
        usize::try_from(value).map_err(|_| self.invalid(format!("argument {index} is negative")))
    }
}

impl DesktopMessage {
    pub fn parse(name: &str, values: Vec<Value>) -> Result<Self, IpcError> {
        let args = Args {
            message: name,
            values,
        };
        let query = |message| Ok(Self::Query(message));
        let action = |message| Ok(Self::Action(message));
        let notify = |message| Ok(Self::Notify(message));

        match name {
            "desktop_get_fixed_width_font_list" => query(QueryMessage::FixedWidthFontList),
            "desktop_get_fixed_width_font" => query(QueryMessage::FixedWidthFont),
            "desktop_get_proportional_font" => query(QueryMessage::ProportionalFont),
            "desktop_get_zoom_level" => query(QueryMessage::ZoomLevel),
            "desktop_get_enable_accessibility" => query(QueryMessage::EnableAccessibility),
            "desktop_get_init_messages" => query(QueryMessage::InitMessages),
            "desktop_is_macos" => query(QueryMessage::IsMacos),
            "desktop_supports_fullscreen_mode" => query(QueryMessage::SupportsFullscreenMode),
            "desktop_supports_clipboard_metafile" => query(QueryMessage::SupportsClipboardMetafile),
            "desktop_get_session_servers" => query(QueryMessage::SessionServers),
            "desktop_startup_error_info" => query(QueryMessage::StartupErrorInfo {
                var_name: args.string(0)?,
            }),
            "desktop_set_pending_quit" => {
                let code = args.integer(0)?;
                let pending = PendingQuit::from_code(code)
                    .ok_or_else(|| args.invalid(format!("unknown pending quit code {code}")))?;
                query(QueryMessage::SetPendingQuit(pending))
            }

            "desktop_get_open_file_name" => action(ActionMessage::OpenFileName(FileDialogRequest {
                caption: args.string(0)?,
                label: args.string(1)?,
                dir: args.string(2)?,
                filters: parse_dialog_filter(&args.string(3)?),
                can_choose_directories: args.bool(4)?,
                focus_owner: args.bool(5)?,
            })),
            "desktop_get_save_file_name" => action(ActionMessage::SaveFileName(SaveDialogRequest {
                caption: args.string(0)?,
                label: args.string(1)?,
                dir: args.string(2)?,
                default_extension: args.string(3)?,
                force_default_extension: args.bool(4)?,
                focus_owner: args.bool(5)?,
            })),
            "desktop_get_existing_directory" => {
                action(ActionMessage::ExistingDirectory(DirectoryDialogRequest {
                    caption: args.string(0)?,
                    label: args.string(1)?,
                    dir: args.string(2)?,
                    focus_owner: args.bool(3)?,
                }))
            }
            "desktop_get_clipboard_text" => action(ActionMessage::ClipboardText),
            "desktop_show_message_box" => {
                let kind = match args.get(0) {
                    Some(_) => MessageBoxKind::from_code(args.integer(0)?),
                    None => MessageBoxKind::Question,
                };
                let buttons: Vec<String> = args
                    .string(3)?
                    .split('|')
                    .map(str::trim)
                    .filter(|button| !button.is_empty())
                    .map(str::to_string)
                    .collect();
                action(ActionMessage::MessageBox(MessageBoxRequest {
                    kind,
                    caption: args.string(1)?,
                    message: args.string(2)?,
                    default_button: args.index_or(4, 0)?,
                    cancel_button: args.index_or(5, buttons.len().saturating_sub(1))?,
                    buttons,
                }))
            }
            "desktop_get_display_dpi" => action(ActionMessage::DisplayDpi),

            "desktop_browse_url" => notify(Notification::BrowseUrl(args.string(0)?)),
            "desktop_set_clipboard_text" => notify(Notification::SetClipboardText(args.string(0)?)),
            "desktop_undo" => notify(Notification::Edit(EditCommand::Undo)),
            "desktop_redo" => notify(Notification::Edit(EditCommand::Redo)),
            "desktop_clipboard_cut" => notify(Notification::Edit(EditCommand::Cut)),
            "desktop_clipboard_copy" => notify(Notification::Edit(EditCommand::Copy)),
            "desktop_clipboard_paste" => notify(Notification::Edit(EditCommand::Paste)),
            "desktop_show_folder" => notify(Notification::ShowFolder(args.string(0)?)),
            "desktop_show_file" => notify(Notification::ShowFile(args.string(0)?)),
            "desktop_show_word_doc" | "desktop_show_ppt_presentation" | "desktop_show_pdf" => {
                notify(Notification::OpenDocument(args.string(0)?))
            }
            "desktop_on_workbench_initialized" => notify(Notification::WorkbenchInitialized {
                scratch_dir: args.string(0)?,
            }),
            "desktop_on_session_quit" => notify(Notification::SessionQuit),
            "desktop_launch_session" => notify(Notification::LaunchSession {
                reload: args.bool(0)?,
            }),
            "desktop_open_project_in_new_window" => {
                notify(Notification::OpenProjectInNewWindow(args.string(0)?))
            }
            "desktop_open_session_in_new_window" => {
                notify(Notification::OpenSessionInNewWindow(args.string(0)?))
            }
            "desktop_open_minimal_window" => {
                notify(Notification::OpenMinimalWindow(NamedWindowRequest {
                    name: args.string(0)?,
                    url: args.string(1)?,
                    width: args.number(2)?,
                    height: args.number(3)?,
                }))
            }
            "desktop_open_satellite_window" => {
                notify(Notification::OpenSatelliteWindow(NamedWindowRequest {
                    name: args.string(0)?,
                    url: args.string(1)?,
                    width: args.number(2)?,
                    height: args.number(3)?,
                }))
            }
            "desktop_activate_minimal_window" => {
                notify(Notification::ActivateMinimalWindow(args.string(0)?))
            }
            "desktop_activate_satellite_window" => {
                notify(Notification::ActivateSatelliteWindow(args.string(0)?))
            }
            "desktop_bring_main_frame_to_front" => notify(Notification::BringMainFrameToFront),
            "desktop_set_zoom_level" => notify(Notification::SetZoomLevel(args.number(0)?)),
            "desktop_zoom_in" => notify(Notification::Zoom(ZoomStep::In)),
            "desktop_zoom_out" => notify(Notification::Zoom(ZoomStep::Out)),
            "desktop_zoom_actual_size" => notify(Notification::Zoom(ZoomStep::ActualSize)),
            "desktop_set_fixed_width_font" => {
                notify(Notification::SetFixedWidthFont(args.string(0)?))
            }
            "desktop_set_enable_accessibility" => {
                notify(Notification::SetEnableAccessibility(args.bool(0)?))
            }
            "desktop_set_window_title" => notify(Notification::SetWindowTitle(args.string(0)?)),
            "desktop_toggle_fullscreen_mode" => notify(Notification::ToggleFullscreenMode),
            "desktop_reload_zoom_window" => notify(Notification::ReloadZoomWindow),
            name if IGNORED_MESSAGES.contains(&name) => notify(Notification::Ignored),

            name if UNIMPLEMENTED_MESSAGES.contains(&name) => {
                Err(IpcError::Unimplemented(name.to_string()))
            }
            name => Err(IpcError::UnknownMessage(name.to_string())),
        }
    }
}
