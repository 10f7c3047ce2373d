//! User-visible notifications raised by the coordinator.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
    pub dismissible: bool,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level,
            dismissible: true,
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, message)
    }
}

/// Surfaces notifications to the user. Implemented by the host application.
pub trait NotificationSink: Send + Sync {
    fn add_notification(&self, notification: &Notification);
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn add_notification(&self, notification: &Notification) {
        match notification.level {
            NotificationLevel::Error => {
                error!("{}: {}", notification.title, notification.message)
            }
            NotificationLevel::Warning => {
                warn!("{}: {}", notification.title, notification.message)
            }
            NotificationLevel::Success | NotificationLevel::Info => {
                info!("{}: {}", notification.title, notification.message)
            }
        }
    }
}
