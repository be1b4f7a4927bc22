pub mod telegram;
pub mod throttle;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::info;

use crate::store::StoreError;

pub use telegram::TelegramNotifier;
pub use throttle::{Alert, NotificationThrottler, DEFAULT_THROTTLE_WINDOW};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Notification credentials are not configured")]
    NotConfigured,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Endpoint rejected message with status {0}")]
    Rejected(u16),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outbound text alerts to the account holder
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), SendError>;
}

/// Notifier for installations without a remote endpoint.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), SendError> {
        info!(text, "notification");
        Ok(())
    }
}

/// Keeps every message it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// While set, sends fail and nothing is recorded.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), SendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SendError::Transport("injected failure".to_string()));
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}
