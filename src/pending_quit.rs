/// What the session asked the shell to do once it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingQuit {
    #[default]
    None,
    QuitAndExit,
    QuitAndRestart,
    QuitRestartAndReload,
}

impl PendingQuit {
    /// Decodes the numeric code the workbench sends with `setPendingQuit`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::QuitAndExit),
            2 => Some(Self::QuitAndRestart),
            3 => Some(Self::QuitRestartAndReload),
            _ => None,
        }
    }
}

/// Holds the latest pending quit until the session exits. Reading it resets it.
#[derive(Debug, Default)]
pub struct PendingQuitSlot {
    pending: PendingQuit,
}

impl PendingQuitSlot {
    pub fn set(&mut self, pending: PendingQuit) {
        self.pending = pending;
    }

    #[cfg(test)]
    pub fn peek(&self) -> PendingQuit {
        self.pending
    }

    pub fn collect(&mut self) -> PendingQuit {
        std::mem::take(&mut self.pending)
    }
}
