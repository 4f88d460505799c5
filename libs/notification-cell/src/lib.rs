pub mod error;
pub mod models;
pub mod services;

pub use error::NotificationError;
pub use models::{NotificationJob, RetryPolicy};
pub use services::mailer::{HttpMailer, Mailer, TracingMailer};
pub use services::queue::NotificationQueue;
pub use services::worker::NotificationWorker;
