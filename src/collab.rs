//! External collaborators of the live view.
//!
//! The view does not own authentication or user notification; it talks to
//! them through these traits. Simple implementations are provided for
//! command-line use and tests.

use std::sync::Mutex;

use crate::error::ChainError;

/// Supplies the bearer credential and receives fatal credential errors.
pub trait AuthContext: Send + Sync {
    /// The current bearer credential, if signed in.
    fn bearer_token(&self) -> Option<String>;

    /// The backend rejected the credential itself. The view stops trusting
    /// it; signing in again is the collaborator's job.
    fn on_fatal_credential_error(&self, err: &ChainError);
}

/// A fixed credential that logs fatal errors.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl AuthContext for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.clone())
    }

    fn on_fatal_credential_error(&self, err: &ChainError) {
        tracing::error!(error = %err, "Bearer credential rejected");
    }
}

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Toast / notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Writes notices to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info | NoticeLevel::Success => tracing::info!(notice = message),
            NoticeLevel::Warning => tracing::warn!(notice = message),
            NoticeLevel::Error => tracing::error!(notice = message),
        }
    }
}

/// Keeps every notice in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        if let Ok(mut n) = self.notices.lock() {
            n.push((level, message.to_owned()));
        }
    }
}
