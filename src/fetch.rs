use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::warn;

const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF_MS: u64 = 2000;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// How a fetch ended. Carried through to the results CSV as a status label
/// so failed rows can be retried or triaged later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    Http(u16),
    Timeout,
    RequestError,
}

impl FetchStatus {
    pub fn label(&self) -> String {
        match self {
            FetchStatus::Success => "success".to_string(),
            FetchStatus::Http(code) => format!("http_{}", code),
            FetchStatus::Timeout => "timeout".to_string(),
            FetchStatus::RequestError => "request_error".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchStatus::Success)
    }

    /// Statuses where a human completing a challenge in a real browser tends
    /// to unblock the URL.
    pub fn manual_retryable(&self) -> bool {
        matches!(self, FetchStatus::Http(403) | FetchStatus::Http(429) | FetchStatus::Timeout)
    }

    fn transient(&self) -> bool {
        matches!(self, FetchStatus::Http(429) | FetchStatus::Http(500..=599))
    }
}

pub struct FetchOutcome {
    pub status: FetchStatus,
    pub body: Option<String>,
}

impl FetchOutcome {
    fn failed(status: FetchStatus) -> Self {
        Self { status, body: None }
    }
}

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("Failed to build HTTP client")
}

/// Fetch one URL, classifying the failure mode instead of propagating it.
/// An optional Cookie header carries session state from a manual recovery.
pub async fn fetch_once(client: &Client, url: &str, cookie: Option<&str>) -> FetchOutcome {
    let mut request = client
        .get(url)
        .header(reqwest::header::ACCEPT, ACCEPT)
        .header(reqwest::header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE);
    if let Some(cookie) = cookie {
        request = request.header(reqwest::header::COOKIE, cookie);
    }

    let response = match request.send().await {
        Ok(resp) => resp,
        Err(e) if e.is_timeout() => return FetchOutcome::failed(FetchStatus::Timeout),
        Err(_) => return FetchOutcome::failed(FetchStatus::RequestError),
    };

    let code = response.status().as_u16();
    if !response.status().is_success() {
        return FetchOutcome::failed(FetchStatus::Http(code));
    }

    match response.text().await {
        Ok(body) => FetchOutcome {
            status: FetchStatus::Success,
            body: Some(body),
        },
        Err(e) if e.is_timeout() => FetchOutcome::failed(FetchStatus::Timeout),
        Err(_) => FetchOutcome::failed(FetchStatus::RequestError),
    }
}

/// Fetch with exponential backoff on rate limiting and server errors. Hard
/// failures (404, 403, request errors) return immediately.
pub async fn fetch_with_retry(client: &Client, url: &str, cookie: Option<&str>) -> FetchOutcome {
    let mut attempt = 0;
    loop {
        let outcome = fetch_once(client, url, cookie).await;

        if !outcome.status.transient() || attempt == MAX_RETRIES {
            return outcome;
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "{} on {} (attempt {}/{}), backing off {:.1}s",
            outcome.status.label(),
            url,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels() {
        assert_eq!(FetchStatus::Success.label(), "success");
        assert_eq!(FetchStatus::Http(403).label(), "http_403");
        assert_eq!(FetchStatus::Http(503).label(), "http_503");
        assert_eq!(FetchStatus::Timeout.label(), "timeout");
        assert_eq!(FetchStatus::RequestError.label(), "request_error");
    }

    #[test]
    fn manual_retry_classification() {
        assert!(FetchStatus::Http(403).manual_retryable());
        assert!(FetchStatus::Http(429).manual_retryable());
        assert!(FetchStatus::Timeout.manual_retryable());
        assert!(!FetchStatus::Http(404).manual_retryable());
        assert!(!FetchStatus::RequestError.manual_retryable());
        assert!(!FetchStatus::Success.manual_retryable());
    }

    #[test]
    fn transient_classification() {
        assert!(FetchStatus::Http(429).transient());
        assert!(FetchStatus::Http(502).transient());
        assert!(!FetchStatus::Http(403).transient());
        assert!(!FetchStatus::Http(404).transient());
        assert!(!FetchStatus::Timeout.transient());
    }
}
