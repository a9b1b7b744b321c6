//! Browser session pool for the managed automation app.
//!
//! Sessions are browser profiles started through the app's local HTTP API
//! and driven over CDP. The pool layers health monitoring on top: before a
//! session is handed out the host is checked, runaway workers are killed,
//! and a dead app is relaunched.

pub mod control;
pub mod error;
pub mod health;
pub mod launcher;
pub mod pool;

pub use {
    control::{BrowserControl, CdpControl, NodeHandle},
    error::SessionError,
    health::{HealthMonitor, HealthReport},
    launcher::{LauncherClient, ProfileStatus, StartedBrowser},
    pool::{PooledSession, SessionPool, SessionSource, SessionSpec},
};
