use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use parking_lot::{Mutex, RwLock};

use crate::{error_page::ErrorPageData, session_process::ProcessLiveness};

#[derive(Debug, Default)]
pub struct SessionStatus {
    quit_confirmed: AtomicBool,
    process: Mutex<Option<ProcessLiveness>>,
    session_url: RwLock<Option<String>>,
    error_page: RwLock<ErrorPageData>,
}

impl SessionStatus {
    pub fn quit_confirmed(&self) -> bool {
        self.quit_confirmed.load(Ordering::SeqCst)
    }

    pub fn set_quit_confirmed(&self, confirmed: bool) {
        self.quit_confirmed.store(confirmed, Ordering::SeqCst);
    }

    pub fn backend_alive(&self) -> bool {
        self.process
            .lock()
            .as_ref()
            .is_some_and(ProcessLiveness::is_alive)
    }

    pub fn set_process(&self, process: Option<ProcessLiveness>) {
        *self.process.lock() = process;
    }

    /// Kills the backend and waits up to `timeout` for it to be reaped.
    /// Returns false when nothing was running or the child outlived the wait.
    pub async fn terminate_backend_and_wait(&self, timeout: Duration) -> bool {
        let process = self.process.lock().clone();
        match process {
            Some(process) if process.terminate() => process.wait_exited(timeout).await,
            _ => false,
        }
    }

    pub fn session_url(&self) -> Option<String> {
        self.session_url.read().clone()
    }

    pub fn set_session_url(&self, url: Option<String>) {
        *self.session_url.write() = url;
    }

    pub fn error_page_var(&self, name: &str) -> String {
        self.error_page.read().resolve(name)
    }

    pub fn set_error_page(&self, data: ErrorPageData) {
        *self.error_page.write() = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_process::ProcessHandle;

    #[test]
    fn backend_alive_follows_published_process() {
        let status = SessionStatus::default();
        assert!(!status.backend_alive());

        let (handle, _kill_rx) = ProcessHandle::detached(10);
        status.set_process(Some(handle.liveness()));
        assert!(status.backend_alive());

        handle.mark_exited_for_test();
        assert!(!status.backend_alive());
    }

    #[tokio::test]
    async fn terminate_backend_waits_until_process_is_reaped() {
        let status = SessionStatus::default();
        assert!(
            !status
                .terminate_backend_and_wait(Duration::from_millis(20))
                .await
        );

        let (handle, kill_rx) = ProcessHandle::detached(10);
        status.set_process(Some(handle.liveness()));
        tokio::spawn(async move {
            if kill_rx.await.is_ok() {
                handle.mark_exited_for_test();
            }
        });

        assert!(
            status
                .terminate_backend_and_wait(Duration::from_secs(5))
                .await
        );
        assert!(!status.backend_alive());
    }

    #[tokio::test]
    async fn terminate_backend_reports_process_that_outlives_the_wait() {
        let status = SessionStatus::default();
        let (handle, _kill_rx) = ProcessHandle::detached(10);
        status.set_process(Some(handle.liveness()));

        assert!(
            !status
                .terminate_backend_and_wait(Duration::from_millis(20))
                .await
        );
        assert!(status.backend_alive());
    }
}
