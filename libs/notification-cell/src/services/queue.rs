use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::{NotificationError, NotificationJob};

/// Producer side of the in-process notification queue.
///
/// Enqueueing never waits: when the buffer is full or the worker has gone away the job is
/// dropped and the caller carries on.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<NotificationJob>,
}

impl NotificationQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, job: NotificationJob) -> Result<(), NotificationError> {
        match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(NotificationError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(NotificationError::QueueClosed),
        }
    }

    /// Fire-and-forget helper used by request handlers.
    pub fn notify(&self, recipient: &str, subject: &str, body: &str) {
        if recipient.is_empty() {
            debug!("Skipping notification '{}' with no recipient", subject);
            return;
        }

        let job = NotificationJob::new(recipient, subject, body);
        let job_id = job.id;
        match self.enqueue(job) {
            Ok(()) => debug!("Queued notification {} for {}", job_id, recipient),
            Err(e) => warn!("Dropping notification '{}' for {}: {}", subject, recipient, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn full_queue_rejects_without_blocking() {
        let (queue, _receiver) = NotificationQueue::channel(1);

        assert!(queue.enqueue(NotificationJob::new("a@x.io", "s", "b")).is_ok());
        assert_matches!(
            queue.enqueue(NotificationJob::new("b@x.io", "s", "b")),
            Err(NotificationError::QueueFull)
        );
    }

    #[test]
    fn closed_queue_is_reported() {
        let (queue, receiver) = NotificationQueue::channel(4);
        drop(receiver);

        assert_matches!(
            queue.enqueue(NotificationJob::new("a@x.io", "s", "b")),
            Err(NotificationError::QueueClosed)
        );
        // notify swallows the error
        queue.notify("a@x.io", "s", "b");
    }

    #[test]
    fn zero_capacity_still_buffers_one() {
        let (queue, mut receiver) = NotificationQueue::channel(0);
        queue.notify("a@x.io", "Hello", "body");
        queue.notify("", "Ignored", "body");

        let job = receiver.try_recv().unwrap();
        assert_eq!(job.subject, "Hello");
        assert!(receiver.try_recv().is_err());
    }
}
