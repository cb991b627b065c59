use serde_json::Value;
use tauri::{State, WebviewWindow};

use crate::DesktopState;

#[tauri::command]
pub(crate) fn desktop_is_desktop_runtime() -> bool {
    true
}

/// Entry point for every `window.desktop.*` call. The sender is the webview
/// the call came from.
#[tauri::command]
pub(crate) async fn desktop_callback(
    window: WebviewWindow,
    state: State<'_, DesktopState>,
    message: String,
    args: Option<Vec<Value>>,
) -> Result<Value, String> {
    state
        .dispatcher
        .dispatch(window.label(), &message, args.unwrap_or_default())
        .await
        .map_err(|error| error.to_string())
}

/// Settles a pending page query started by the shell.
#[tauri::command]
pub(crate) fn desktop_page_reply(
    state: State<'_, DesktopState>,
    id: u64,
    ok: bool,
    value: Option<Value>,
) -> bool {
    state.page_bridge.resolve(id, ok, value.unwrap_or(Value::Null))
}
