use thiserror::Error;

use crate::session_process::ExitStatusSummary;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start session process {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no session port could be allocated: {0}")]
    PortAllocation(#[source] std::io::Error),
    #[error("session at {url} did not answer after {attempts} attempts")]
    ReachabilityTimeout { url: String, attempts: u32 },
    #[error("session exited before the workbench initialized ({status})")]
    BootFailure { status: ExitStatusSummary },
    #[error("session exited unexpectedly ({status})")]
    RuntimeCrash { status: ExitStatusSummary },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IpcError {
    #[error("Received callback {message} from unknown window '{label}'")]
    UnregisteredSender { message: String, label: String },
    #[error("unknown desktop callback '{0}'")]
    UnknownMessage(String),
    #[error("desktop callback '{0}' is not implemented")]
    Unimplemented(String),
    #[error("invalid arguments for '{message}': {reason}")]
    InvalidArguments { message: String, reason: String },
    #[error("'{message}' failed: {reason}")]
    Handler { message: String, reason: String },
}

impl IpcError {
    pub fn handler(message: &str, reason: impl Into<String>) -> Self {
        Self::Handler {
            message: message.to_string(),
            reason: reason.into(),
        }
    }
}
