//! Observability side channel to the calling session.
//!
//! The orchestrator reports progress through a [`NotificationSink`]. Delivery
//! is best effort: a sink error is logged and otherwise ignored, so it can
//! never fail an acquisition.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Severity of a session notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotificationLevel {
    /// Verbose diagnostics (payload previews).
    Debug,
    /// Progress updates.
    Info,
    /// Degraded but continuing.
    Warning,
    /// Failure surfaced to the session.
    Error,
}

impl NotificationLevel {
    /// Returns the stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure delivering a notification.
#[derive(Debug, Clone, Error)]
#[error("notification delivery failed: {reason}")]
pub struct NotifyError {
    /// Why delivery failed.
    pub reason: String,
}

impl NotifyError {
    /// Creates a delivery error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Receives `(level, message)` notifications from the pipeline.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification.
    async fn notify(&self, level: NotificationLevel, message: &str) -> Result<(), NotifyError>;
}

/// Sink that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    async fn notify(&self, _level: NotificationLevel, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Sink that forwards notifications to `tracing` at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, level: NotificationLevel, message: &str) -> Result<(), NotifyError> {
        match level {
            NotificationLevel::Debug => debug!(target: "session", "{message}"),
            NotificationLevel::Info => info!(target: "session", "{message}"),
            NotificationLevel::Warning => warn!(target: "session", "{message}"),
            NotificationLevel::Error => error!(target: "session", "{message}"),
        }
        Ok(())
    }
}

/// Sends a notification and swallows delivery failures.
pub(crate) async fn notify_best_effort(
    sink: &dyn NotificationSink,
    level: NotificationLevel,
    message: &str,
) {
    if let Err(error) = sink.notify(level, message).await {
        warn!(error = %error, level = %level, "Session notification dropped");
    }
}
