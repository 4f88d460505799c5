use assert_matches::assert_matches;
use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_database::{SupabaseClient, SupabaseError};
use shared_utils::test_utils::TestConfig;

fn client_for(server: &MockServer) -> SupabaseClient {
    let config = TestConfig {
        supabase_url: server.uri(),
        ..TestConfig::default()
    };
    SupabaseClient::new(&config.to_app_config())
}

#[tokio::test]
async fn insert_sends_representation_preference() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/work_schedules"))
        .and(header("Prefer", "return=representation"))
        .and(header("apikey", "test-anon-key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": "abc"}])))
        .expect(1)
        .mount(&server)
        .await;

    let rows: Vec<Value> = client_for(&server)
        .insert_returning("work_schedules", Some("token"), json!({"id": "abc"}))
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "abc");
}

#[tokio::test]
async fn constraint_violation_maps_to_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23P01",
            "message": "conflicting key value violates exclusion constraint"
        })))
        .mount(&server)
        .await;

    let result: Result<Vec<Value>, _> = client_for(&server)
        .insert_returning("appointments", Some("token"), json!({}))
        .await;

    assert_matches!(result, Err(SupabaseError::Conflict(_)));
}

#[tokio::test]
async fn conditional_update_with_no_match_returns_empty() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/user_packages"))
        .and(query_param("remaining_appointments", "eq.2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let rows: Vec<Value> = client_for(&server)
        .update_returning(
            "/rest/v1/user_packages?id=eq.p1&remaining_appointments=eq.2",
            None,
            json!({"remaining_appointments": 1}),
        )
        .await
        .unwrap();

    assert!(rows.is_empty());
}

#[tokio::test]
async fn auth_failures_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
        .mount(&server)
        .await;

    let result: Result<Vec<Value>, _> = client_for(&server)
        .request(Method::GET, "/rest/v1/appointments?id=eq.1", Some("stale"), None)
        .await;

    assert_matches!(result, Err(SupabaseError::Auth(msg)) if msg.contains("expired"));
}
