use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification queue is full")]
    QueueFull,

    #[error("Notification queue is closed")]
    QueueClosed,

    #[error("Mail API rejected message with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Delivery attempt timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Maximum delivery attempts ({max_attempts}) exceeded for notification {job_id}")]
    Exhausted { job_id: String, max_attempts: u32 },
}
