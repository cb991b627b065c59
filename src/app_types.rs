use std::sync::Arc;

use tauri::webview::PageLoadEvent;
use url::Url;

use crate::{
    desktop_bridge,
    ipc_dispatch::IpcDispatcher,
    main_window::page_load_signal,
    native_services::TauriNativeServices,
    page_bridge::PageBridge,
    session_launcher::{SessionEvent, SessionEvents},
    session_status::SessionStatus,
    window_registry::SharedWindowRegistry,
};

/// Everything window callbacks and commands share with the session loop.
pub(crate) struct DesktopState {
    pub(crate) registry: SharedWindowRegistry,
    pub(crate) status: Arc<SessionStatus>,
    pub(crate) events: SessionEvents,
    pub(crate) page_bridge: Arc<PageBridge>,
    pub(crate) dispatcher: IpcDispatcher<TauriNativeServices>,
    pub(crate) asset_base: Url,
}

impl DesktopState {
    pub(crate) fn should_inject_bridge(&self, page_url: &Url) -> bool {
        desktop_bridge::should_inject_desktop_bridge(
            page_url,
            self.status.session_url().as_deref(),
            Some(&self.asset_base),
        )
    }

    /// Load signals are only reported for pages served by the session.
    pub(crate) fn report_page_load(&self, window_label: &str, page_url: &Url, event: PageLoadEvent) {
        if !desktop_bridge::is_session_page(page_url, self.status.session_url().as_deref()) {
            return;
        }
        let finished = matches!(event, PageLoadEvent::Finished);
        self.events
            .send(SessionEvent::Load(page_load_signal(window_label, finished)));
    }
}
