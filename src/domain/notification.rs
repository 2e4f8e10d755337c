use super::subscription::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    PaymentDetected,
    SystemInfo,
    PackActivated,
    EarningCredited,
    PackCompleted,
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PaymentDetected => "payment_detected",
            Self::SystemInfo => "system_info",
            Self::PackActivated => "pack_activated",
            Self::EarningCredited => "earning_credited",
            Self::PackCompleted => "pack_completed",
        };
        f.write_str(name)
    }
}

/// A request to tell a user about an event. Never persisted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub category: NotificationCategory,
    pub message: String,
}

impl Notification {
    pub fn new(user_id: UserId, category: NotificationCategory, message: impl Into<String>) -> Self {
        Self {
            user_id,
            category,
            message: message.into(),
        }
    }
}
