pub mod mailer;
pub mod queue;
pub mod worker;
