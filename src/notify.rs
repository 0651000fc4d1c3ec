//! Notification Surface
//!
//! The toast/banner surface is presentation and lives outside this crate;
//! components talk to it through the `Notifier` trait.

use tracing::{info, warn};

/// Visual flavor of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// A sink for user-facing notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NoticeKind, message: &str);
}

/// Default notifier that routes notices into the tracing pipeline.
///
/// Useful for headless runs and as a fallback when no UI shell is attached.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Success => info!(target: "notice", "{}", message),
            NoticeKind::Error => warn!(target: "notice", "{}", message),
        }
    }
}
