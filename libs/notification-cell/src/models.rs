use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;

/// A single outbound message waiting for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationJob {
    pub fn new(recipient: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.notification_max_attempts.max(1),
            retry_delay: Duration::from_millis(config.notification_retry_delay_ms),
            attempt_timeout: Duration::from_secs(config.request_timeout_seconds.max(1)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}
