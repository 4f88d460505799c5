use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::{NotificationError, NotificationJob};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError>;
}

/// Posts messages to an HTTP mail API as JSON with a bearer key.
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_url: config.mail_api_url.clone(),
            api_key: config.mail_api_key.clone(),
            from: config.mail_from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        debug!("Posting notification {} to mail API", job.id);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": job.recipient,
                "subject": job.subject,
                "text": job.body,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

/// Used when no mail API is configured; the message only reaches the logs.
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        info!(recipient = %job.recipient, subject = %job.subject, "Notification (mail disabled)");
        Ok(())
    }
}
