use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::appointment_routes;
use notification_cell::NotificationQueue;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn app(config: &TestConfig) -> axum::Router {
    let (queue, _receiver) = NotificationQueue::channel(4);
    appointment_routes(config.to_arc(), queue)
}

fn authed(method: &str, uri: String, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn booking_requires_bearer_token() {
    let response = app(&TestConfig::default())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn patient_cannot_approve() {
    let config = TestConfig::default();
    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let response = app(&config)
        .oneshot(authed("POST", format!("/{}/approve", Uuid::new_v4()), &token, json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_appointment_is_not_found() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(server.uri());
    let doctor = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, None);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let response = app(&config)
        .oneshot(authed("GET", format!("/{}", Uuid::new_v4()), &token, Value::Null))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn out_of_range_page_size_is_bad_request() {
    let config = TestConfig::default();
    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.jwt_secret, None);

    let response = app(&config)
        .oneshot(authed("GET", "/?limit=500".to_string(), &token, Value::Null))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patient_listing_is_scoped_and_paged() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(server.uri());
    let patient = TestUser::patient("patient@example.com");
    let doctor = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let rows: Vec<Value> = [("09:00", "09:30"), ("09:30", "10:00"), ("10:00", "10:30")]
        .iter()
        .map(|(start, end)| {
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &patient.id,
                &doctor.id,
                "2030-03-04",
                start,
                end,
                "pending",
                "video_call",
            )
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient.id)))
        .and(query_param("limit", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&config)
        .oneshot(authed("GET", "/?limit=2".to_string(), &token, Value::Null))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["appointments"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], true);
    assert_eq!(body["page"], 1);
}

#[tokio::test]
async fn patient_cannot_list_video_meetings() {
    let config = TestConfig::default();
    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let response = app(&config)
        .oneshot(authed("GET", "/video-meetings".to_string(), &token, Value::Null))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
