//! HTTP client for the managed browser-automation app's local API.
//!
//! The app exposes a small REST surface for starting and stopping browser
//! profiles. Every response is wrapped in a `{code, msg, data}` envelope
//! where `code == 0` means success.

use std::time::Duration;

use {
    serde::Deserialize,
    tracing::{debug, info, warn},
};

use {crate::error::SessionError, gleaner_config::SessionConfig};

const START_PATH: &str = "/api/v1/browser/start";
const STOP_PATH: &str = "/api/v1/browser/stop";
const ACTIVE_PATH: &str = "/api/v1/browser/active";

/// Poll interval while waiting for a started profile to report active.
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Response envelope used by every launcher endpoint.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the envelope, mapping a non-zero code to a launcher error.
    fn into_data(self, context: &str) -> Result<T, SessionError> {
        if self.code != 0 {
            let msg = self.msg.unwrap_or_else(|| "no message".into());
            return Err(SessionError::LauncherApi(format!(
                "{context}: code {} ({msg})",
                self.code
            )));
        }
        self.data
            .ok_or_else(|| SessionError::LauncherApi(format!("{context}: empty data")))
    }
}

/// Remote-debugging endpoints for a started browser.
#[derive(Debug, Clone, Deserialize)]
pub struct WsEndpoints {
    #[serde(default)]
    pub puppeteer: Option<String>,
    #[serde(default)]
    pub playwright: Option<String>,
}

/// Payload returned by the start endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartedBrowser {
    #[serde(default)]
    pub ws: Option<WsEndpoints>,
    #[serde(default)]
    pub debug_port: Option<String>,
}

impl StartedBrowser {
    /// The websocket URL usable for CDP control, if the app reported one.
    #[must_use]
    pub fn control_endpoint(&self) -> Option<&str> {
        let ws = self.ws.as_ref()?;
        ws.puppeteer.as_deref().or(ws.playwright.as_deref())
    }
}

/// Payload returned by the active-status endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileStatus {
    #[serde(default)]
    pub status: String,
}

impl ProfileStatus {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

/// Client for the managed app's profile lifecycle API.
#[derive(Debug, Clone)]
pub struct LauncherClient {
    http: reqwest::Client,
    api_url: String,
    start_retries: u32,
    short_delay: Duration,
    long_delay: Duration,
}

impl LauncherClient {
    #[must_use]
    pub fn new(cfg: &SessionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            start_retries: cfg.start_retries,
            short_delay: Duration::from_millis(cfg.retry_short_delay_ms),
            long_delay: Duration::from_millis(cfg.retry_long_delay_ms),
        }
    }

    /// Start a browser profile with bounded retries.
    ///
    /// The first retry waits a short delay, subsequent retries a longer one.
    /// After the budget is exhausted the session is reported unavailable.
    pub async fn start_profile(&self, profile_id: &str) -> Result<StartedBrowser, SessionError> {
        let attempts = self.start_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.try_start(profile_id).await {
                Ok(started) => {
                    info!(profile_id, attempt, "browser profile started");
                    return Ok(started);
                },
                Err(e) => {
                    last_error = e.to_string();
                    if attempt + 1 == attempts {
                        break;
                    }
                    let delay = if attempt == 0 {
                        self.short_delay
                    } else {
                        self.long_delay
                    };
                    warn!(
                        profile_id,
                        attempt,
                        error = %last_error,
                        delay_ms = delay.as_millis() as u64,
                        "profile start failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }

        Err(SessionError::Unavailable(format!(
            "profile {profile_id} failed to start after {attempts} attempts: {last_error}"
        )))
    }

    async fn try_start(&self, profile_id: &str) -> Result<StartedBrowser, SessionError> {
        let url = format!("{}{START_PATH}", self.api_url);
        let envelope: ApiEnvelope<StartedBrowser> = self
            .http
            .get(&url)
            .query(&[("user_id", profile_id)])
            .send()
            .await?
            .json()
            .await?;
        let started = envelope.into_data("start")?;
        if started.control_endpoint().is_none() {
            return Err(SessionError::LauncherApi(format!(
                "start: profile {profile_id} reported no debug endpoint"
            )));
        }
        Ok(started)
    }

    /// Stop a profile. Best-effort: failures are logged, not propagated,
    /// since stop runs on teardown paths that must not mask the real error.
    pub async fn stop_profile(&self, profile_id: &str) -> bool {
        let url = format!("{}{STOP_PATH}", self.api_url);
        let result: Result<ApiEnvelope<serde_json::Value>, _> = async {
            self.http
                .get(&url)
                .query(&[("user_id", profile_id)])
                .send()
                .await?
                .json()
                .await
        }
        .await;

        match result {
            Ok(envelope) if envelope.code == 0 => {
                debug!(profile_id, "browser profile stopped");
                true
            },
            Ok(envelope) => {
                warn!(profile_id, code = envelope.code, "stop rejected by launcher");
                false
            },
            Err(e) => {
                warn!(profile_id, error = %e, "stop request failed");
                false
            },
        }
    }

    /// Query whether a profile's browser is currently active.
    pub async fn status(&self, profile_id: &str) -> Result<ProfileStatus, SessionError> {
        let url = format!("{}{ACTIVE_PATH}", self.api_url);
        let envelope: ApiEnvelope<ProfileStatus> = self
            .http
            .get(&url)
            .query(&[("user_id", profile_id)])
            .send()
            .await?
            .json()
            .await?;
        envelope.into_data("active")
    }

    /// Poll until the profile reports active or the deadline passes.
    pub async fn wait_until_ready(
        &self,
        profile_id: &str,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.status(profile_id).await {
                Ok(status) if status.is_active() => return Ok(()),
                Ok(_) => debug!(profile_id, "profile not yet active"),
                Err(e) => debug!(profile_id, error = %e, "status poll failed"),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SessionError::Unavailable(format!(
                    "profile {profile_id} did not become active within {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::Server) -> LauncherClient {
        let mut cfg = SessionConfig::default();
        cfg.api_url = server.url();
        cfg.start_retries = 2;
        cfg.retry_short_delay_ms = 1;
        cfg.retry_long_delay_ms = 1;
        LauncherClient::new(&cfg)
    }

    #[tokio::test]
    async fn start_returns_ws_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", START_PATH)
            .match_query(mockito::Matcher::UrlEncoded(
                "user_id".into(),
                "p1".into(),
            ))
            .with_body(
                r#"{"code":0,"msg":"success","data":{"ws":{"puppeteer":"ws://127.0.0.1:9222/devtools/browser/abc"}}}"#,
            )
            .create_async()
            .await;

        let started = client_for(&server).start_profile("p1").await.unwrap();
        assert_eq!(
            started.control_endpoint(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn start_retries_then_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", START_PATH)
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"code":-1,"msg":"profile busy"}"#)
            .expect(2)
            .create_async()
            .await;

        let err = client_for(&server).start_profile("p1").await.unwrap_err();
        assert!(matches!(err, SessionError::Unavailable(_)));
        assert!(err.to_string().contains("profile busy"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn start_rejects_missing_endpoint() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", START_PATH)
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"code":0,"msg":"success","data":{"ws":{}}}"#)
            .expect(2)
            .create_async()
            .await;

        let err = client_for(&server).start_profile("p1").await.unwrap_err();
        assert!(err.to_string().contains("no debug endpoint"));
    }

    #[tokio::test]
    async fn stop_is_best_effort() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", STOP_PATH)
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"code":0,"msg":"success","data":{}}"#)
            .create_async()
            .await;

        assert!(client_for(&server).stop_profile("p1").await);
    }

    #[tokio::test]
    async fn stop_swallows_http_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", STOP_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        assert!(!client_for(&server).stop_profile("p1").await);
    }

    #[tokio::test]
    async fn status_parses_active() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", ACTIVE_PATH)
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"code":0,"msg":"success","data":{"status":"Active"}}"#)
            .create_async()
            .await;

        let status = client_for(&server).status("p1").await.unwrap();
        assert!(status.is_active());
    }
}
