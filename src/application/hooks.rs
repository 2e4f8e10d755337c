use crate::domain::notification::Notification;
use crate::domain::ports::NotificationSink;

/// Side effects that run only after a ledger mutation has committed.
///
/// Processors collect notifications here while handling a subscription and
/// dispatch them once the store call has returned. Delivery failures are
/// logged and counted, never propagated.
#[derive(Debug, Default)]
#[must_use = "post-commit hooks do nothing until dispatched"]
pub struct PostCommit {
    notifications: Vec<Notification>,
}

impl PostCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Sends every queued notification; returns how many failed.
    pub async fn dispatch(self, sink: &dyn NotificationSink) -> usize {
        let mut failures = 0;
        for notification in self.notifications {
            let user = notification.user_id;
            let category = notification.category;
            if let Err(e) = sink.notify(notification).await {
                failures += 1;
                tracing::warn!(%user, %category, error = %e, "notification dropped");
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::NotificationCategory;
    use crate::domain::subscription::UserId;
    use crate::infrastructure::notify::RecordingNotificationSink;

    #[tokio::test]
    async fn test_dispatch_delivers_in_order() {
        let sink = RecordingNotificationSink::new();
        let mut hooks = PostCommit::new();
        hooks.notify(Notification::new(UserId(1), NotificationCategory::EarningCredited, "a"));
        hooks.notify(Notification::new(UserId(1), NotificationCategory::PackCompleted, "b"));

        assert_eq!(hooks.dispatch(&sink).await, 0);
        let categories: Vec<_> = sink.sent().await.into_iter().map(|n| n.category).collect();
        assert_eq!(
            categories,
            vec![NotificationCategory::EarningCredited, NotificationCategory::PackCompleted]
        );
    }

    #[tokio::test]
    async fn test_empty_hooks_send_nothing() {
        let sink = RecordingNotificationSink::new();
        assert_eq!(PostCommit::new().dispatch(&sink).await, 0);
        assert!(sink.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_counts_failures() {
        let sink = RecordingNotificationSink::failing();
        let mut hooks = PostCommit::new();
        hooks.notify(Notification::new(UserId(1), NotificationCategory::PackActivated, "a"));
        assert_eq!(hooks.dispatch(&sink).await, 1);
    }
}
