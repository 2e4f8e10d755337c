use crate::domain::notification::Notification;
use crate::domain::ports::NotificationSink;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Emits each notification as a `tracing` event.
///
/// The default sink when no transport is wired in; delivery is whatever the
/// log pipeline does with `packledger::notify` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        tracing::info!(
            target: "packledger::notify",
            user = %notification.user_id,
            category = %notification.category,
            message = %notification.message,
            "notification"
        );
        Ok(())
    }
}

/// Collects notifications in memory.
///
/// Can be switched into a failing mode to exercise the best-effort delivery
/// path: while failing, nothing is recorded and every call errors.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotificationSink {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::NotificationError(format!(
                "sink unavailable for user {}",
                notification.user_id
            )));
        }
        self.sent.lock().await.push(notification);
        Ok(())
    }
}
