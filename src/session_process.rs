//! Spawning and supervising the session server child process.

use std::{
    collections::VecDeque,
    fmt,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::{oneshot, watch},
};

use crate::{
    app_helpers::build_debug_command, error::SessionError, logging::DesktopLogCategory,
    OUTPUT_DRAIN_TIMEOUT, SHARED_SECRET_ENV,
};

pub const PRELOAD_ENV: &str = "DYLD_INSERT_LIBRARIES";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitStatusSummary {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitStatusSummary {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitStatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Invoked exactly once when the child has been reaped.
pub type ExitObserver = Box<dyn FnOnce(ExitStatusSummary) + Send + 'static>;

/// Bounded buffer of the most recent stderr lines.
#[derive(Debug, Clone)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl StderrTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn snapshot(&self) -> String {
        let lines = self.lines.lock();
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Shared view on whether a child is still running, and a way to stop it.
#[derive(Debug, Clone)]
pub struct ProcessLiveness {
    exited: Arc<watch::Sender<bool>>,
    kill: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl ProcessLiveness {
    fn new(kill: oneshot::Sender<()>) -> Self {
        let (exited, _) = watch::channel(false);
        Self {
            exited: Arc::new(exited),
            kill: Arc::new(Mutex::new(Some(kill))),
        }
    }

    pub fn is_alive(&self) -> bool {
        !*self.exited.borrow()
    }

    fn mark_exited(&self) {
        self.exited.send_replace(true);
    }

    /// Waits until the child has been reaped. Returns false on timeout.
    pub async fn wait_exited(&self, timeout: Duration) -> bool {
        let mut exited = self.exited.subscribe();
        let reaped = matches!(
            tokio::time::timeout(timeout, exited.wait_for(|exited| *exited)).await,
            Ok(Ok(_))
        );
        reaped
    }

    #[cfg(test)]
    pub(crate) fn mark_exited_for_test(&self) {
        self.mark_exited();
    }

    /// Requests termination. Returns false when the child was already gone or
    /// a termination had been requested before.
    pub fn terminate(&self) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.kill.lock().take() {
            Some(sender) => sender.send(()).is_ok(),
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    started_at: chrono::DateTime<chrono::Local>,
    liveness: ProcessLiveness,
    stderr_tail: StderrTail,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> chrono::DateTime<chrono::Local> {
        self.started_at
    }

    pub fn liveness(&self) -> ProcessLiveness {
        self.liveness.clone()
    }

    pub fn has_exited(&self) -> bool {
        !self.liveness.is_alive()
    }

    pub fn stderr_tail(&self) -> String {
        self.stderr_tail.snapshot()
    }

    pub fn terminate(&self) -> bool {
        self.liveness.terminate()
    }
}

#[cfg(test)]
impl ProcessHandle {
    /// A handle with no real child behind it. The returned sender's receiver
    /// fires when `terminate` is called.
    pub(crate) fn detached(pid: u32) -> (Self, oneshot::Receiver<()>) {
        let (kill_tx, kill_rx) = oneshot::channel();
        let handle = Self {
            pid: Some(pid),
            started_at: chrono::Local::now(),
            liveness: ProcessLiveness::new(kill_tx),
            stderr_tail: StderrTail::new(crate::STDERR_TAIL_LINES),
        };
        (handle, kill_rx)
    }

    pub(crate) fn mark_exited_for_test(&self) {
        self.liveness.mark_exited();
    }

    pub(crate) fn push_stderr_for_test(&self, line: &str) {
        self.stderr_tail.push(line.to_string());
    }
}

pub trait SessionSpawner {
    fn spawn(&self, args: &[String], on_exit: ExitObserver) -> Result<ProcessHandle, SessionError>;
}

/// Path of the runtime library injected on macOS so the child resolves the
/// same runtime the shell was configured with.
pub fn resolve_preload_library(session_home: Option<&Path>) -> Option<PathBuf> {
    let library = session_home?.join("lib").join("libR.dylib");
    library.is_file().then_some(library)
}

fn preload_library_env(session_home: Option<&Path>) -> Option<(&'static str, PathBuf)> {
    if !cfg!(target_os = "macos") {
        return None;
    }
    resolve_preload_library(session_home).map(|library| (PRELOAD_ENV, library))
}

pub struct ProcessSupervisor {
    program: PathBuf,
    session_home: Option<PathBuf>,
    shared_secret: String,
    extra_env: Vec<(String, String)>,
    stderr_tail_lines: usize,
}

impl ProcessSupervisor {
    pub fn new(
        program: PathBuf,
        session_home: Option<PathBuf>,
        shared_secret: String,
        extra_env: Vec<(String, String)>,
        stderr_tail_lines: usize,
    ) -> Self {
        Self {
            program,
            session_home,
            shared_secret,
            extra_env,
            stderr_tail_lines,
        }
    }

    pub fn shared_secret(&self) -> &str {
        &self.shared_secret
    }
}

impl SessionSpawner for ProcessSupervisor {
    fn spawn(&self, args: &[String], on_exit: ExitObserver) -> Result<ProcessHandle, SessionError> {
        let program = self.program.to_string_lossy().into_owned();
        tracing::info!(
            category = DesktopLogCategory::Backend.as_str(),
            "spawning session: {}",
            build_debug_command(&program, args)
        );

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .env(SHARED_SECRET_ENV, &self.shared_secret)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.extra_env {
            command.env(key, value);
        }
        if let Some((key, library)) = preload_library_env(self.session_home.as_deref()) {
            tracing::info!(
                category = DesktopLogCategory::Backend.as_str(),
                "preloading {}",
                library.display()
            );
            command.env(key, library);
        }

        let mut child = command
            .spawn()
            .map_err(|source| SessionError::Spawn { program, source })?;
        let pid = child.id();

        let stderr_tail = StderrTail::new(self.stderr_tail_lines);
        let mut forwarders = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_output(stdout, "stdout", None)));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_output(
                stderr,
                "stderr",
                Some(stderr_tail.clone()),
            )));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let liveness = ProcessLiveness::new(kill_tx);
        let waiter = liveness.clone();
        tokio::spawn(async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_rx => None,
            };
            let status = match finished {
                Some(status) => status,
                None => {
                    if let Err(error) = child.start_kill() {
                        tracing::warn!(
                            category = DesktopLogCategory::Backend.as_str(),
                            "failed to kill session process: {error}"
                        );
                    }
                    child.wait().await
                }
            };
            let summary = match status {
                Ok(status) => ExitStatusSummary::from(status),
                Err(error) => {
                    tracing::warn!(
                        category = DesktopLogCategory::Backend.as_str(),
                        "failed to wait for session process: {error}"
                    );
                    ExitStatusSummary::default()
                }
            };
            // Grandchildren may hold the pipes open, so draining is bounded.
            for forwarder in forwarders {
                if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, forwarder)
                    .await
                    .is_err()
                {
                    tracing::debug!(
                        category = DesktopLogCategory::Backend.as_str(),
                        "session output still open after exit"
                    );
                }
            }
            waiter.mark_exited();
            tracing::info!(
                category = DesktopLogCategory::Backend.as_str(),
                "session process {} exited with {summary}",
                pid.map(|pid| pid.to_string()).unwrap_or_else(|| "?".to_string())
            );
            on_exit(summary);
        });

        Ok(ProcessHandle {
            pid,
            started_at: chrono::Local::now(),
            liveness,
            stderr_tail,
        })
    }
}

async fn forward_output<R>(reader: R, stream: &'static str, tail: Option<StderrTail>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::info!(
                    category = DesktopLogCategory::Backend.as_str(),
                    stream,
                    "{line}"
                );
                if let Some(tail) = &tail {
                    tail.push(line);
                }
            }
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(
                    category = DesktopLogCategory::Backend.as_str(),
                    stream,
                    "stopped reading session output: {error}"
                );
                break;
            }
        }
    }
}
