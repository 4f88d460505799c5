use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tokio::time::{sleep, timeout};
use tracing::{error, info, instrument, warn};

use shared_config::AppConfig;

use crate::services::mailer::{HttpMailer, Mailer, TracingMailer};
use crate::{NotificationError, NotificationJob, RetryPolicy};

pub struct NotificationWorker {
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
}

impl NotificationWorker {
    pub fn new(mailer: Arc<dyn Mailer>, policy: RetryPolicy) -> Self {
        Self { mailer, policy }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mailer: Arc<dyn Mailer> = if config.is_mail_configured() {
            Arc::new(HttpMailer::new(config))
        } else {
            warn!("MAIL_API_URL not set, notifications will only be logged");
            Arc::new(TracingMailer)
        };

        Self::new(mailer, RetryPolicy::from_config(config))
    }

    /// Drains the queue until every producer handle has been dropped.
    pub async fn run(self, mut receiver: Receiver<NotificationJob>) {
        info!("Notification worker started");

        while let Some(job) = receiver.recv().await {
            // Failures are logged inside deliver.
            let _ = self.deliver(job).await;
        }

        info!("Notification queue closed, worker stopping");
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn deliver(&self, job: NotificationJob) -> Result<(), NotificationError> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let outcome = match timeout(self.policy.attempt_timeout, self.mailer.send(&job)).await {
                Ok(result) => result,
                Err(_) => Err(NotificationError::Timeout {
                    timeout_ms: self.policy.attempt_timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(()) => {
                    info!("Delivered notification to {} on attempt {}", job.recipient, attempt);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Attempt {}/{} for {} failed: {}", attempt, max_attempts, job.recipient, e);
                    if attempt < max_attempts {
                        sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        error!(
            "Giving up on notification '{}' for {} after {} attempts",
            job.subject, job.recipient, max_attempts
        );
        Err(NotificationError::Exhausted {
            job_id: job.id.to_string(),
            max_attempts,
        })
    }
}
