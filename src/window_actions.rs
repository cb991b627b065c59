use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindow, WebviewWindowBuilder};
use url::Url;

use crate::{
    window_registry::SharedWindowRegistry, APP_NAME, LOADING_PAGE, MAIN_WINDOW_LABEL,
};

const MAIN_WINDOW_SIZE: (f64, f64) = (1200.0, 900.0);
const MAIN_WINDOW_MIN_SIZE: (f64, f64) = (640.0, 480.0);
const SECONDARY_WINDOW_SIZE: (f64, f64) = (800.0, 600.0);

#[derive(Debug, Clone, PartialEq)]
pub struct WindowRequest {
    pub label: String,
    pub url: Url,
    pub title: String,
    pub width: f64,
    pub height: f64,
}

impl WindowRequest {
    /// Non-positive or non-finite sizes fall back to the default secondary size.
    pub fn new(label: String, url: Url, width: f64, height: f64) -> Self {
        let usable = |value: f64| value.is_finite() && value > 0.0;
        let (width, height) = if usable(width) && usable(height) {
            (width, height)
        } else {
            SECONDARY_WINDOW_SIZE
        };
        Self {
            label,
            url,
            title: APP_NAME.to_string(),
            width,
            height,
        }
    }
}

/// Opens the main window on the bundled loading page.
pub fn create_main_window(app_handle: &AppHandle, zoom: f64) -> tauri::Result<WebviewWindow> {
    let window = WebviewWindowBuilder::new(
        app_handle,
        MAIN_WINDOW_LABEL,
        WebviewUrl::App(LOADING_PAGE.into()),
    )
    .title(APP_NAME)
    .inner_size(MAIN_WINDOW_SIZE.0, MAIN_WINDOW_SIZE.1)
    .min_inner_size(MAIN_WINDOW_MIN_SIZE.0, MAIN_WINDOW_MIN_SIZE.1)
    .build()?;
    if (zoom - 1.0).abs() > f64::EPSILON {
        window.set_zoom(zoom)?;
    }
    Ok(window)
}

pub fn open_secondary_window(app_handle: &AppHandle, request: &WindowRequest) -> tauri::Result<()> {
    WebviewWindowBuilder::new(
        app_handle,
        request.label.clone(),
        WebviewUrl::External(request.url.clone()),
    )
    .title(request.title.clone())
    .inner_size(request.width, request.height)
    .build()?;
    Ok(())
}

/// Resolves one of the bundled shell pages relative to where the main window
/// first loaded from.
pub fn shell_page_url(asset_base: &Url, page: &str) -> Option<Url> {
    asset_base.join(page).ok()
}

pub fn navigate_window<F>(app_handle: &AppHandle, label: &str, url: &Url, log: F) -> bool
where
    F: Fn(&str),
{
    let Some(window) = app_handle.get_webview_window(label) else {
        log(&format!("navigate skipped: window '{label}' not found"));
        return false;
    };
    match window.navigate(url.clone()) {
        Ok(()) => true,
        Err(error) => {
            log(&format!("failed to navigate '{label}' to {url}: {error}"));
            false
        }
    }
}

pub fn focus_window<F>(app_handle: &AppHandle, label: &str, log: F) -> bool
where
    F: Fn(&str),
{
    let Some(window) = app_handle.get_webview_window(label) else {
        log(&format!("focus skipped: window '{label}' not found"));
        return false;
    };
    if let Err(error) = window.unminimize() {
        log(&format!("failed to unminimize '{label}': {error}"));
    }
    if let Err(error) = window.show() {
        log(&format!("failed to show '{label}': {error}"));
    }
    if let Err(error) = window.set_focus() {
        log(&format!("failed to focus '{label}': {error}"));
    }
    true
}

pub fn close_main_window<F>(app_handle: &AppHandle, log: F)
where
    F: Fn(&str),
{
    let Some(window) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) else {
        log("close skipped: main window not found");
        return;
    };
    if let Err(error) = window.close() {
        log(&format!("failed to close main window: {error}"));
    }
}

/// Destroys every registered window except `keep_label`. The registry lock is
/// released before any window is touched.
pub fn close_all_except<F>(
    app_handle: &AppHandle,
    registry: &SharedWindowRegistry,
    keep_label: &str,
    log: F,
) -> usize
where
    F: Fn(&str),
{
    let labels = registry.lock().labels_except(keep_label);
    let mut closed = 0;
    for label in labels {
        match app_handle.get_webview_window(&label) {
            Some(window) => match window.destroy() {
                Ok(()) => closed += 1,
                Err(error) => log(&format!("failed to close window '{label}': {error}")),
            },
            None => {
                registry.lock().unregister(&label);
            }
        }
    }
    closed
}
