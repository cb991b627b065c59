use crate::MAIN_WINDOW_LABEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Main,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSignal {
    StartNavigation(FrameKind),
    FailLoad(FrameKind),
    FinishLoad(FrameKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Navigating,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAction {
    None,
    ShowLoadingAndPoll,
    ShowErrorPage,
}

#[derive(Debug, Clone)]
pub struct MainWindowLoad {
    base_url: String,
    phase: LoadPhase,
    main_frame_loaded: bool,
    reload_count: u32,
    max_reload_attempts: u32,
    error_displayed: bool,
}

impl MainWindowLoad {
    pub fn new(max_reload_attempts: u32) -> Self {
        Self {
            base_url: String::new(),
            phase: LoadPhase::Idle,
            main_frame_loaded: false,
            reload_count: 0,
            max_reload_attempts,
            error_displayed: false,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[cfg(test)]
    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn reload_count(&self) -> u32 {
        self.reload_count
    }

    pub fn is_error_displayed(&self) -> bool {
        self.error_displayed
    }

    pub fn begin_navigation(&mut self, url: &str) {
        self.base_url = url.to_string();
        self.phase = LoadPhase::Navigating;
        self.main_frame_loaded = false;
    }

    /// Clears retry state ahead of a new session launch.
    pub fn reset_for_launch(&mut self) {
        self.reload_count = 0;
        self.error_displayed = false;
    }

    pub fn on_signal(&mut self, signal: LoadSignal) -> LoadAction {
        match signal {
            LoadSignal::StartNavigation(FrameKind::Main) => {
                self.main_frame_loaded = false;
                self.phase = LoadPhase::Navigating;
                LoadAction::None
            }
            LoadSignal::FinishLoad(FrameKind::Main) => {
                self.main_frame_loaded = true;
                self.on_load_finished(true)
            }
            LoadSignal::FailLoad(FrameKind::Main) if !self.main_frame_loaded => {
                self.on_load_finished(false)
            }
            // Embedded frames and late failures after a good main-frame load
            // never drive retries.
            LoadSignal::FailLoad(_)
            | LoadSignal::StartNavigation(FrameKind::Sub)
            | LoadSignal::FinishLoad(FrameKind::Sub) => LoadAction::None,
        }
    }

    fn on_load_finished(&mut self, ok: bool) -> LoadAction {
        if ok {
            self.phase = LoadPhase::Loaded;
            self.reload_count = 0;
            return LoadAction::None;
        }

        self.phase = LoadPhase::Failed;
        if self.error_displayed {
            return LoadAction::None;
        }
        if self.reload_count < self.max_reload_attempts {
            return LoadAction::ShowLoadingAndPoll;
        }
        self.show_error();
        LoadAction::ShowErrorPage
    }

    /// The session answered again; returns the URL to navigate back to.
    pub fn retry(&mut self) -> Option<String> {
        if self.error_displayed {
            return None;
        }
        self.reload_count += 1;
        let url = self.base_url.clone();
        self.begin_navigation(&url);
        Some(url)
    }

    /// Gives up on the current page. Returns false if the error page is
    /// already up.
    pub fn escalate(&mut self) -> bool {
        if self.error_displayed {
            return false;
        }
        self.show_error();
        true
    }

    fn show_error(&mut self) {
        self.reload_count = 0;
        self.error_displayed = true;
        self.phase = LoadPhase::Failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    CloseNow,
    Defer,
}

pub fn decide_close(quit_confirmed: bool, backend_alive: bool) -> CloseDecision {
    if quit_confirmed || !backend_alive {
        CloseDecision::CloseNow
    } else {
        CloseDecision::Defer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitHook {
    Quit,
    PromptToQuit,
}

impl QuitHook {
    pub fn script(self) -> &'static str {
        match self {
            Self::Quit => "window.desktopHooks.quitR()",
            Self::PromptToQuit => "window.desktopHooks.promptToQuitR()",
        }
    }
}

pub const QUIT_HOOKS_PROBE_SCRIPT: &str = "!!window.desktopHooks";
pub const NOTIFY_CRASHED_SCRIPT: &str = "window.desktopHooks.notifyRCrashed()";
pub const ACTIVE_PROJECT_DIR_SCRIPT: &str = "window.desktopHooks.getActiveProjectDir()";

/// `None` means the page cannot take part in the quit handshake.
pub fn decide_quit_hook(hooks_present: bool, prompt_on_quit: bool) -> Option<QuitHook> {
    if !hooks_present {
        return None;
    }
    Some(if prompt_on_quit {
        QuitHook::PromptToQuit
    } else {
        QuitHook::Quit
    })
}

/// Page loads in any webview other than the main window count as sub-frame
/// loads and never drive the retry path.
pub fn page_load_signal(window_label: &str, finished: bool) -> LoadSignal {
    let frame = if window_label == MAIN_WINDOW_LABEL {
        FrameKind::Main
    } else {
        FrameKind::Sub
    };
    if finished {
        LoadSignal::FinishLoad(frame)
    } else {
        LoadSignal::StartNavigation(frame)
    }
}

pub fn window_title(app_name: &str, project_dir: Option<&str>) -> String {
    let project_dir = project_dir.map(str::trim).filter(|dir| !dir.is_empty());
    match project_dir {
        Some(dir) => format!("{dir} - {app_name}"),
        None => app_name.to_string(),
    }
}
