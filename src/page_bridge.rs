//! `eval` returns nothing, so evaluations reply through `desktop_page_reply`.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use serde_json::Value;
use tauri::{Runtime, WebviewWindow};
use tokio::sync::oneshot;

pub type PageReply = Result<Value, String>;

#[derive(Debug, Default)]
pub struct PageBridge {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<PageReply>>>,
}

impl PageBridge {
    pub fn register(&self) -> (u64, oneshot::Receiver<PageReply>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (id, rx)
    }

    /// Delivers a reply. Returns false for unknown or already answered ids.
    pub fn resolve(&self, id: u64, ok: bool, value: Value) -> bool {
        let Some(sender) = self.pending.lock().remove(&id) else {
            return false;
        };
        let reply = if ok {
            Ok(value)
        } else {
            Err(match value {
                Value::String(message) => message,
                other => other.to_string(),
            })
        };
        sender.send(reply).is_ok()
    }

    pub fn forget(&self, id: u64) {
        self.pending.lock().remove(&id);
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn evaluate<R: Runtime>(&self, window: &WebviewWindow<R>, id: u64, expression: &str) {
        if let Err(error) = window.eval(&wrap_expression(id, expression)) {
            if let Some(sender) = self.pending.lock().remove(&id) {
                let _ = sender.send(Err(format!("Failed to evaluate script: {error}")));
            }
        }
    }

    /// Evaluates `expression` and waits for its value. `None` waits forever.
    pub async fn query<R: Runtime>(
        &self,
        window: &WebviewWindow<R>,
        expression: &str,
        timeout: Option<Duration>,
    ) -> PageReply {
        let (id, rx) = self.register();
        self.evaluate(window, id, expression);
        let reply = await_reply(rx, timeout).await;
        self.forget(id);
        reply
    }
}

pub async fn await_reply(rx: oneshot::Receiver<PageReply>, timeout: Option<Duration>) -> PageReply {
    let received = match timeout {
        Some(limit) => match tokio::time::timeout(limit, rx).await {
            Ok(received) => received,
            Err(_) => return Err(format!("page did not answer within {limit:?}")),
        },
        None => rx.await,
    };
    received.unwrap_or_else(|_| Err("page reply channel closed".to_string()))
}

pub fn wrap_expression(id: u64, expression: &str) -> String {
    format!(
        r#"(function () {{
  var reply = function (ok, value) {{
    try {{
      window.__TAURI_INTERNALS__.invoke('desktop_page_reply', {{ id: {id}, ok: ok, value: value === undefined ? null : value }});
    }} catch (_) {{}}
  }};
  try {{
    Promise.resolve((function () {{ return ({expression}); }})()).then(
      function (value) {{ reply(true, value); }},
      function (error) {{ reply(false, String(error)); }}
    );
  }} catch (error) {{
    reply(false, String(error));
  }}
}})();"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_are_routed_by_id() {
        let bridge = PageBridge::default();
        let (first_id, mut first_rx) = bridge.register();
        let (second_id, mut second_rx) = bridge.register();
        assert_ne!(first_id, second_id);

        assert!(bridge.resolve(second_id, true, Value::from("second")));
        assert!(bridge.resolve(first_id, false, Value::from("boom")));

        assert_eq!(second_rx.try_recv().expect("second reply"), Ok(Value::from("second")));
        assert_eq!(first_rx.try_recv().expect("first reply"), Err("boom".to_string()));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[test]
    fn resolve_rejects_unknown_or_repeated_ids() {
        let bridge = PageBridge::default();
        let (id, _rx) = bridge.register();
        assert!(!bridge.resolve(id + 100, true, Value::Null));
        assert!(bridge.resolve(id, true, Value::Null));
        assert!(!bridge.resolve(id, true, Value::Null));
    }

    #[tokio::test]
    async fn await_reply_times_out_without_answer() {
        let bridge = PageBridge::default();
        let (id, rx) = bridge.register();

        let reply = await_reply(rx, Some(Duration::from_millis(20))).await;

        assert!(reply.is_err());
        bridge.forget(id);
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn await_reply_reports_dropped_waiter() {
        let bridge = PageBridge::default();
        let (id, rx) = bridge.register();
        bridge.forget(id);
        assert_eq!(
            await_reply(rx, None).await,
            Err("page reply channel closed".to_string())
        );
    }

    #[test]
    fn wrap_expression_embeds_id_and_expression() {
        let script = wrap_expression(7, "window.desktopHooks.getActiveProjectDir()");
        assert!(script.contains("id: 7"));
        assert!(script.contains("return (window.desktopHooks.getActiveProjectDir());"));
        assert!(script.contains("desktop_page_reply"));
    }
}
