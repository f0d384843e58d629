//! Notification sink consumed by the orchestrator.
//!
//! The core only raises notifications; rendering them (toasts, status bar,
//! whatever the shell uses) is the embedding UI's job.

use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, message: &str, severity: Severity);
}

/// Drops every notification. Default when the shell doesn't care.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _title: &str, _message: &str, _severity: Severity) {}
}

/// Forwards notifications to the tracing log.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(title, "{}", message),
            Severity::Error => error!(title, "{}", message),
        }
    }
}
