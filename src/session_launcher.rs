use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    app_helpers::log_session_environment,
    append_restart_log, append_shutdown_log, append_startup_log,
    error::SessionError,
    error_page::ErrorPageData,
    launch_context::{LaunchContext, LaunchContextBuilder, PortAllocator},
    logging::DesktopLogCategory,
    main_window::{
        decide_close, decide_quit_hook, CloseDecision, FrameKind, LoadAction, LoadSignal,
        MainWindowLoad, QuitHook,
    },
    pending_quit::{PendingQuit, PendingQuitSlot},
    session_process::{ExitStatusSummary, ProcessHandle, SessionSpawner},
    session_status::SessionStatus,
};

const RUNTIME_MISMATCH_MARKER: &str = "arguments passed to .Internal";

#[derive(Debug)]
pub enum SessionEvent {
    LaunchFirst,
    LaunchSession { reload: bool },
    ProcessExited { generation: u64, status: ExitStatusSummary },
    Load(LoadSignal),
    ReachabilityResolved { generation: u64, result: Result<u32, SessionError> },
    WorkbenchInitialized { scratch_dir: Option<String> },
    SessionQuit,
    SetPendingQuit(PendingQuit),
    CloseRequested,
    QuitHooksProbed { present: bool },
    QuitHookResolved(Result<(), String>),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn send(&self, event: SessionEvent) {
        if let Err(error) = self.sender.send(event) {
            tracing::debug!(
                category = DesktopLogCategory::Runtime.as_str(),
                "session loop stopped; dropping {:?}",
                error.0
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherState {
    Idle,
    Launching,
    WaitingForReachability,
    Bound,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailure {
    Spawn,
    BootFailure,
    RuntimeCrash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    BootFailure,
    RuntimeCrash,
    QuitAndExit,
    Relaunch { reload: bool },
}

pub fn decide_exit(pending: PendingQuit, workbench_initialized: bool) -> ExitDecision {
    match pending {
        PendingQuit::None if workbench_initialized => ExitDecision::RuntimeCrash,
        PendingQuit::None => ExitDecision::BootFailure,
        PendingQuit::QuitAndExit => ExitDecision::QuitAndExit,
        PendingQuit::QuitAndRestart => ExitDecision::Relaunch { reload: false },
        PendingQuit::QuitRestartAndReload => ExitDecision::Relaunch { reload: true },
    }
}

pub fn launch_failed_message(stderr_tail: &str) -> String {
    let mut message = String::from("The session process had a fatal error.");
    if stderr_tail.contains(RUNTIME_MISMATCH_MARKER) {
        message.push_str(
            "\n\nThis error was very likely caused by the session loading packages built \
             for a different, incompatible runtime version. Remove other runtime versions \
             and any environment variables that reference their libraries before proceeding.",
        );
    }
    let stderr_tail = stderr_tail.trim();
    if !stderr_tail.is_empty() {
        message.push_str("\n\n");
        message.push_str(stderr_tail);
    }
    message
}

/// Implementations must not block; results come back as [`SessionEvent`]s.
pub trait ShellHost {
    fn load_main_url(&self, url: &str);
    fn show_loading_page(&self);
    fn show_error_page(&self);
    fn poll_reachability(&self, generation: u64, url: &str);
    fn probe_quit_hooks(&self);
    fn invoke_quit_hook(&self, hook: QuitHook);
    fn notify_session_crashed(&self);
    fn refresh_title(&self);
    fn close_satellites(&self);
    fn close_main_window(&self);
    fn report_fatal_error(&self, message: &str);
}

pub struct LauncherSettings {
    pub max_reload_attempts: u32,
    pub prompt_on_quit: bool,
}

pub struct SessionLauncher<H, S, P> {
    host: H,
    spawner: S,
    contexts: LaunchContextBuilder<P>,
    events: SessionEvents,
    status: Arc<SessionStatus>,
    prompt_on_quit: bool,
    state: LauncherState,
    generation: u64,
    context: Option<LaunchContext>,
    process: Option<ProcessHandle>,
    pending_quit: PendingQuitSlot,
    workbench_initialized: bool,
    load: MainWindowLoad,
    last_failure: Option<SessionFailure>,
}

impl<H, S, P> SessionLauncher<H, S, P>
where
    H: ShellHost,
    S: SessionSpawner,
    P: PortAllocator,
{
    pub fn new(
        host: H,
        spawner: S,
        contexts: LaunchContextBuilder<P>,
        events: SessionEvents,
        status: Arc<SessionStatus>,
        settings: LauncherSettings,
    ) -> Self {
        Self {
            host,
            spawner,
            contexts,
            events,
            status,
            prompt_on_quit: settings.prompt_on_quit,
            state: LauncherState::Idle,
            generation: 0,
            context: None,
            process: None,
            pending_quit: PendingQuitSlot::default(),
            workbench_initialized: false,
            load: MainWindowLoad::new(settings.max_reload_attempts),
            last_failure: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> LauncherState {
        self.state
    }

    #[cfg(test)]
    pub fn last_failure(&self) -> Option<SessionFailure> {
        self.last_failure
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub fn load(&self) -> &MainWindowLoad {
        &self.load
    }

    #[cfg(test)]
    pub fn workbench_initialized(&self) -> bool {
        self.workbench_initialized
    }

    fn backend_alive(&self) -> bool {
        self.process
            .as_ref()
            .is_some_and(|process| !process.has_exited())
    }

    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::LaunchFirst => self.launch_first(),
            SessionEvent::LaunchSession { reload } => self.launch_session(reload),
            SessionEvent::ProcessExited { generation, status } => {
                if generation != self.generation {
                    tracing::debug!(
                        category = DesktopLogCategory::Runtime.as_str(),
                        "ignoring exit of superseded session {generation}"
                    );
                    return;
                }
                self.on_session_exited(status);
            }
            SessionEvent::Load(signal) => self.on_load_signal(signal),
            SessionEvent::ReachabilityResolved { generation, result } => {
                if generation == self.generation {
                    self.on_reachability_resolved(result);
                }
            }
            SessionEvent::WorkbenchInitialized { scratch_dir } => {
                self.on_workbench_initialized(scratch_dir)
            }
            SessionEvent::SessionQuit => append_shutdown_log("session reported quit"),
            SessionEvent::SetPendingQuit(pending) => self.pending_quit.set(pending),
            SessionEvent::CloseRequested => {
                self.on_close_requested();
            }
            SessionEvent::QuitHooksProbed { present } => self.on_quit_hooks_probed(present),
            SessionEvent::QuitHookResolved(result) => match result {
                Ok(()) => self.status.set_quit_confirmed(true),
                Err(error) => tracing::error!(
                    category = DesktopLogCategory::Shutdown.as_str(),
                    "quit hook failed: {error}"
                ),
            },
            SessionEvent::Shutdown => self.shutdown(),
        }
    }

    pub fn launch_first(&mut self) {
        append_startup_log("launching first session");
        self.state = LauncherState::Launching;

        let mut context = match self.contexts.build(false) {
            Ok(context) => context,
            Err(error) => return self.fail_first_launch(&error),
        };
        context
            .args
            .extend(["--show-help-home".to_string(), "1".to_string()]);

        let url = context.url.clone();
        if let Err(error) = self.start_session(context) {
            return self.fail_first_launch(&error);
        }
        self.navigate_to_session(&url);
    }

    /// Relaunch requested from the page, e.g. the error page's retry action.
    /// A session that is still running is reloaded instead of replaced.
    pub fn launch_session(&mut self, reload: bool) {
        if !self.backend_alive() {
            self.launch_next_session(reload);
            return;
        }
        if !self.load.is_error_displayed() {
            tracing::warn!(
                category = DesktopLogCategory::Restart.as_str(),
                "ignoring launch request: a session is still running"
            );
            return;
        }

        let url = self.load.base_url().to_string();
        append_restart_log(&format!("retrying {url} on the running session"));
        self.load.reset_for_launch();
        self.navigate_to_session(&url);
    }

    fn launch_next_session(&mut self, reload: bool) {
        append_restart_log(&format!("launching next session (reload={reload})"));
        self.state = LauncherState::Launching;

        let context = match self.contexts.build(!reload) {
            Ok(context) => context,
            Err(error) => return self.fail_relaunch(&error),
        };
        let url = context.url.clone();
        if let Err(error) = self.start_session(context) {
            return self.fail_relaunch(&error);
        }

        if reload {
            self.navigate_to_session(&url);
        } else {
            // Same address; the open page reconnects on its own.
            self.state = LauncherState::Bound;
        }
    }

    fn start_session(&mut self, context: LaunchContext) -> Result<(), SessionError> {
        log_session_environment();
        self.workbench_initialized = false;
        self.load.reset_for_launch();
        if let Some(previous) = self.last_failure.take() {
            append_restart_log(&format!("launching again after {previous:?}"));
        }
        self.generation += 1;

        let generation = self.generation;
        let events = self.events.clone();
        let process = self.spawner.spawn(
            &context.args,
            Box::new(move |status| events.send(SessionEvent::ProcessExited { generation, status })),
        )?;

        append_startup_log(&format!(
            "session {generation} started (pid {}) for {}",
            process
                .pid()
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "?".to_string()),
            context.url
        ));
        self.status.set_process(Some(process.liveness()));
        self.status.set_session_url(Some(context.url.clone()));
        self.process = Some(process);
        self.context = Some(context);
        Ok(())
    }

    fn navigate_to_session(&mut self, url: &str) {
        self.load.begin_navigation(url);
        self.state = LauncherState::WaitingForReachability;
        self.host.load_main_url(url);
    }

    fn fail_first_launch(&mut self, error: &SessionError) {
        tracing::error!(
            category = DesktopLogCategory::Startup.as_str(),
            "failed to launch session: {error}"
        );
        self.state = LauncherState::Exited;
        self.last_failure = Some(SessionFailure::Spawn);
        self.status.set_quit_confirmed(true);
        self.host
            .report_fatal_error(&format!("{}\n\n{error}", launch_failed_message("")));
    }

    fn fail_relaunch(&mut self, error: &SessionError) {
        tracing::error!(
            category = DesktopLogCategory::Restart.as_str(),
            "failed to relaunch session: {error}"
        );
        self.state = LauncherState::Exited;
        self.last_failure = Some(SessionFailure::Spawn);
        self.status.set_quit_confirmed(true);
        self.host
            .report_fatal_error(&format!("The session failed to start.\n\n{error}"));
    }

    fn retire_process(&mut self) -> String {
        let process = self.process.take();
        let stderr_tail = process
            .as_ref()
            .map(|process| process.stderr_tail())
            .unwrap_or_default();
        if let Some(context) = self.context.take() {
            let uptime = process
                .as_ref()
                .map(|process| (chrono::Local::now() - process.started_at()).num_seconds())
                .unwrap_or_default();
            append_restart_log(&format!(
                "retired session at {} after {uptime}s",
                context.url
            ));
        }
        self.status.set_process(None);
        stderr_tail
    }

    fn on_session_exited(&mut self, status: ExitStatusSummary) {
        let stderr_tail = self.retire_process();
        self.state = LauncherState::Exited;

        let pending = self.pending_quit.collect();
        match decide_exit(pending, self.workbench_initialized) {
            ExitDecision::BootFailure => {
                tracing::error!(
                    category = DesktopLogCategory::Runtime.as_str(),
                    "{}",
                    SessionError::BootFailure { status }
                );
                self.last_failure = Some(SessionFailure::BootFailure);
                self.host.notify_session_crashed();
                self.show_launch_error_page(&stderr_tail);
            }
            ExitDecision::RuntimeCrash => {
                tracing::error!(
                    category = DesktopLogCategory::Runtime.as_str(),
                    "{}",
                    SessionError::RuntimeCrash { status }
                );
                self.last_failure = Some(SessionFailure::RuntimeCrash);
                self.host.notify_session_crashed();
            }
            ExitDecision::QuitAndExit => {
                append_shutdown_log(&format!("session quit ({status}); closing main window"));
                self.quit();
            }
            ExitDecision::Relaunch { reload } => {
                append_restart_log(&format!("session exited for restart ({status})"));
                if reload {
                    self.host.close_satellites();
                }
                self.launch_next_session(reload);
            }
        }
    }

    // Also replaces an unreachable-session page that is already up.
    fn show_launch_error_page(&mut self, stderr_tail: &str) {
        self.load.escalate();
        self.status.set_error_page(ErrorPageData::for_boot_failure(
            self.load.base_url(),
            &launch_failed_message(stderr_tail),
            stderr_tail,
        ));
        self.host.show_error_page();
    }

    fn show_unreachable_error_page(&mut self) {
        self.last_failure = Some(SessionFailure::BootFailure);
        self.status
            .set_error_page(ErrorPageData::for_unreachable_session(self.load.base_url()));
        self.host.show_error_page();
    }

    fn on_load_signal(&mut self, signal: LoadSignal) {
        match self.load.on_signal(signal) {
            LoadAction::None => {
                if signal == LoadSignal::FinishLoad(FrameKind::Main)
                    && self.state == LauncherState::WaitingForReachability
                {
                    self.state = LauncherState::Bound;
                    append_startup_log(&format!(
                        "main window bound to {}",
                        self.load.base_url()
                    ));
                }
            }
            LoadAction::ShowLoadingAndPoll => {
                append_startup_log(&format!(
                    "main frame failed to load (retry {})",
                    self.load.reload_count()
                ));
                self.host.show_loading_page();
                self.host
                    .poll_reachability(self.generation, self.load.base_url());
            }
            LoadAction::ShowErrorPage => {
                tracing::warn!(
                    category = DesktopLogCategory::Runtime.as_str(),
                    "giving up on {} after repeated load failures",
                    self.load.base_url()
                );
                self.show_unreachable_error_page();
            }
        }
    }

    fn on_reachability_resolved(&mut self, result: Result<u32, SessionError>) {
        match result {
            Ok(attempts) => {
                if let Some(url) = self.load.retry() {
                    append_startup_log(&format!(
                        "session reachable after {attempts} attempt(s); reloading {url}"
                    ));
                    self.host.load_main_url(&url);
                }
            }
            Err(error) => {
                tracing::warn!(
                    category = DesktopLogCategory::Runtime.as_str(),
                    "{error}"
                );
                if self.load.escalate() {
                    self.show_unreachable_error_page();
                }
            }
        }
    }

    fn on_workbench_initialized(&mut self, scratch_dir: Option<String>) {
        self.workbench_initialized = true;
        self.status.set_quit_confirmed(false);
        append_startup_log(&format!(
            "workbench initialized (scratch dir: {})",
            scratch_dir.as_deref().unwrap_or("none")
        ));
        self.host.refresh_title();
    }

    /// Second half of the close handshake; the window callback already
    /// prevented the close when this runs.
    pub fn on_close_requested(&mut self) -> CloseDecision {
        let decision = decide_close(self.status.quit_confirmed(), self.backend_alive());
        match decision {
            CloseDecision::CloseNow => self.quit(),
            CloseDecision::Defer => self.host.probe_quit_hooks(),
        }
        decision
    }

    fn on_quit_hooks_probed(&mut self, present: bool) {
        match decide_quit_hook(present, self.prompt_on_quit) {
            Some(hook) => self.host.invoke_quit_hook(hook),
            None => {
                tracing::error!(
                    category = DesktopLogCategory::Shutdown.as_str(),
                    "Main window closed unexpectedly"
                );
                self.quit();
            }
        }
    }

    fn quit(&mut self) {
        self.status.set_quit_confirmed(true);
        self.host.close_satellites();
        self.host.close_main_window();
    }

    fn shutdown(&mut self) {
        if let Some(process) = &self.process {
            if process.terminate() {
                append_shutdown_log("terminating session process");
            }
        }
        self.state = LauncherState::Exited;
    }
}

pub async fn run_session_loop<H, S, P>(
    mut launcher: SessionLauncher<H, S, P>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) where
    H: ShellHost,
    S: SessionSpawner,
    P: PortAllocator,
{
    while let Some(event) = events.recv().await {
        let shutdown = matches!(event, SessionEvent::Shutdown);
        launcher.handle(event);
        if shutdown {
            break;
        }
    }
    append_shutdown_log("session loop stopped");
}
