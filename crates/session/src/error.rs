//! Session error types.

use thiserror::Error;

/// Errors that can occur while acquiring or driving a browser session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The managed app could not provide a working session. Fatal to the
    /// collector that needed it, never to the whole run.
    #[error("session unavailable: {0}")]
    Unavailable(String),

    #[error("launcher API error: {0}")]
    LauncherApi(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript evaluation failed: {0}")]
    JsEvalFailed(String),

    /// A browser control round-trip exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    /// Health check found the session's host environment unusable.
    #[error("session unhealthy: {0}")]
    Unhealthy(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<chromiumoxide::error::CdpError> for SessionError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        SessionError::Cdp(err.to_string())
    }
}

impl SessionError {
    /// Transient errors earn one in-place retry before the round is written
    /// off as stagnant; everything else escalates.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Cdp(_) | Self::JsEvalFailed(_) | Self::NavigationFailed(_)
        )
    }
}
