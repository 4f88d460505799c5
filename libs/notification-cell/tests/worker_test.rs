use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::{
    HttpMailer, Mailer, NotificationError, NotificationJob, NotificationQueue, NotificationWorker,
    RetryPolicy,
};
use shared_utils::test_utils::TestConfig;

/// Fails a fixed number of times before accepting, recording what it delivered.
struct FlakyMailer {
    failures_left: AtomicU32,
    calls: AtomicU32,
    delivered: Mutex<Vec<String>>,
}

impl FlakyMailer {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            delivered: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Mailer for FlakyMailer {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(NotificationError::Rejected {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        self.delivered.lock().unwrap().push(job.recipient.clone());
        Ok(())
    }
}

struct SlowMailer;

#[async_trait]
impl Mailer for SlowMailer {
    async fn send(&self, _job: &NotificationJob) -> Result<(), NotificationError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        retry_delay: Duration::from_millis(5),
        attempt_timeout: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let mailer = FlakyMailer::new(2);
    let worker = NotificationWorker::new(mailer.clone(), fast_policy(3));

    let result = worker
        .deliver(NotificationJob::new("patient@clinic.test", "Booked", "See you soon"))
        .await;

    assert!(result.is_ok());
    assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(*mailer.delivered.lock().unwrap(), vec!["patient@clinic.test".to_string()]);
}

#[tokio::test]
async fn exhausted_job_reports_attempt_count() {
    let mailer = FlakyMailer::new(10);
    let worker = NotificationWorker::new(mailer.clone(), fast_policy(2));

    let result = worker
        .deliver(NotificationJob::new("patient@clinic.test", "Booked", "body"))
        .await;

    assert_matches!(result, Err(NotificationError::Exhausted { max_attempts: 2, .. }));
    assert_eq!(mailer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn hung_mailer_attempts_time_out() {
    let worker = NotificationWorker::new(Arc::new(SlowMailer), fast_policy(2));

    let started = std::time::Instant::now();
    let result = worker
        .deliver(NotificationJob::new("doctor@clinic.test", "New booking", "body"))
        .await;

    assert_matches!(result, Err(NotificationError::Exhausted { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn worker_drains_queue_until_closed() {
    let mailer = FlakyMailer::new(0);
    let worker = NotificationWorker::new(mailer.clone(), fast_policy(1));
    let (queue, receiver) = NotificationQueue::channel(8);

    let handle = tokio::spawn(worker.run(receiver));

    queue.notify("a@clinic.test", "One", "body");
    queue.notify("b@clinic.test", "Two", "body");
    drop(queue);

    handle.await.unwrap();

    assert_eq!(
        *mailer.delivered.lock().unwrap(),
        vec!["a@clinic.test".to_string(), "b@clinic.test".to_string()]
    );
}

#[tokio::test]
async fn http_mailer_posts_json_with_bearer_key() {
    let server = MockServer::start().await;
    let mut config = TestConfig::default().to_app_config();
    config.mail_api_url = format!("{}/send", server.uri());

    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer test-mail-key"))
        .and(body_partial_json(serde_json::json!({
            "from": "clinic@test.local",
            "to": "patient@clinic.test",
            "subject": "Appointment confirmed"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(&config);
    let result = mailer
        .send(&NotificationJob::new("patient@clinic.test", "Appointment confirmed", "body"))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn http_mailer_surfaces_rejections() {
    let server = MockServer::start().await;
    let mut config = TestConfig::default().to_app_config();
    config.mail_api_url = format!("{}/send", server.uri());

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad recipient"))
        .mount(&server)
        .await;

    let result = HttpMailer::new(&config)
        .send(&NotificationJob::new("nobody", "x", "y"))
        .await;

    assert_matches!(result, Err(NotificationError::Rejected { status: 422, .. }));
}
