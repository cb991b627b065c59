use std::time::Duration;

use crate::{
    desktop_options::DesktopOptions, error::SessionError, logging::DesktopLogCategory,
    SHARED_SECRET_HEADER,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityPolicy {
    pub interval: Duration,
    pub request_timeout: Duration,
    pub max_attempts: u32,
}

impl Default for ReachabilityPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            request_timeout: Duration::from_millis(1000),
            max_attempts: 10,
        }
    }
}

impl ReachabilityPolicy {
    pub fn from_options(options: &DesktopOptions) -> Self {
        Self {
            interval: Duration::from_millis(options.reachability_interval_ms),
            request_timeout: Duration::from_millis(options.reachability_timeout_ms),
            max_attempts: options.reachability_attempts.max(1),
        }
    }
}

pub fn build_http_client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .map_err(|error| format!("Failed to build HTTP client: {error}"))
}

/// One GET against `url`. Success and redirect statuses count as reachable.
pub async fn probe_url(
    client: &reqwest::Client,
    url: &str,
    shared_secret: Option<&str>,
    timeout: Duration,
) -> bool {
    let mut request = client.get(url).timeout(timeout);
    if let Some(secret) = shared_secret {
        request = request.header(SHARED_SECRET_HEADER, secret);
    }

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            status.is_success() || status.is_redirection()
        }
        Err(error) => {
            tracing::debug!(
                category = DesktopLogCategory::Runtime.as_str(),
                "probe of {url} failed: {error}"
            );
            false
        }
    }
}

/// Polls `url` until it answers or the attempt cap is reached. Returns the
/// number of attempts used.
pub async fn wait_for_url(
    client: &reqwest::Client,
    url: &str,
    shared_secret: Option<&str>,
    policy: &ReachabilityPolicy,
) -> Result<u32, SessionError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        if probe_url(client, url, shared_secret, policy.request_timeout).await {
            return Ok(attempt);
        }
        if attempt < attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(SessionError::ReachabilityTimeout {
        url: url.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        sync::mpsc,
    };

    use super::*;

    fn fast_policy(max_attempts: u32) -> ReachabilityPolicy {
        ReachabilityPolicy {
            interval: Duration::from_millis(10),
            request_timeout: Duration::from_millis(500),
            max_attempts,
        }
    }

    /// Serves `status_line` to every connection and reports each raw request.
    async fn serve(status_line: &'static str) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buffer = vec![0_u8; 4096];
                let read = stream.read(&mut buffer).await.unwrap_or(0);
                let _ = tx.send(String::from_utf8_lossy(&buffer[..read]).into_owned());
                let response =
                    format!("{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (url, rx)
    }

    async fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        drop(listener);
        url
    }

    #[test]
    fn policy_from_options_never_allows_zero_attempts() {
        let options = DesktopOptions {
            reachability_attempts: 0,
            ..DesktopOptions::default()
        };
        assert_eq!(ReachabilityPolicy::from_options(&options).max_attempts, 1);
    }

    #[tokio::test]
    async fn wait_for_url_succeeds_and_sends_shared_secret() {
        let (url, mut requests) = serve("HTTP/1.1 200 OK").await;
        let client = build_http_client().expect("client");

        let attempts = wait_for_url(&client, &url, Some("s3cret"), &fast_policy(3))
            .await
            .expect("reachable");

        assert_eq!(attempts, 1);
        let request = requests.recv().await.expect("request recorded");
        assert!(request
            .to_ascii_lowercase()
            .contains("x-shared-secret: s3cret"));
    }

    #[tokio::test]
    async fn probe_url_accepts_redirects() {
        let (url, _requests) = serve("HTTP/1.1 304 Not Modified").await;
        let client = build_http_client().expect("client");
        assert!(probe_url(&client, &url, None, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn probe_url_rejects_server_errors() {
        let (url, _requests) = serve("HTTP/1.1 503 Service Unavailable").await;
        let client = build_http_client().expect("client");
        assert!(!probe_url(&client, &url, None, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn wait_for_url_times_out_after_attempt_cap() {
        let url = closed_port_url().await;
        let client = build_http_client().expect("client");

        let result = wait_for_url(&client, &url, None, &fast_policy(3)).await;

        match result {
            Err(SessionError::ReachabilityTimeout {
                url: failed,
                attempts,
            }) => {
                assert_eq!(failed, url);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected reachability timeout, got {other:?}"),
        }
    }
}
