use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schedule_cell::models::Session;
use schedule_cell::services::availability::{find_containing_session, AvailabilityResolver};
use shared_database::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn resolver_for(server: &MockServer) -> AvailabilityResolver {
    let config = TestConfig::with_supabase_url(server.uri()).to_app_config();
    AvailabilityResolver::with_client(Arc::new(SupabaseClient::new(&config)))
}

#[tokio::test]
async fn schedule_without_approved_session_means_unavailable() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/work_schedules"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::work_schedule_response(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "2030-03-04",
                MockSupabaseResponses::session(true, "09:00", "12:00", "pending"),
                MockSupabaseResponses::session(true, "13:00", "17:00", "rejected"),
                MockSupabaseResponses::disabled_session(),
            )
        ])))
        .mount(&server)
        .await;

    let resolved = resolver_for(&server)
        .resolve_approved_schedule(doctor_id, NaiveDate::from_ymd_opt(2030, 3, 4).unwrap(), None)
        .await
        .unwrap();

    assert!(resolved.is_none());
}

#[tokio::test]
async fn approved_schedule_is_resolved_and_checked_for_containment() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/work_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::work_schedule_response(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "2030-03-04",
                MockSupabaseResponses::session(true, "09:00", "12:00", "approved"),
                MockSupabaseResponses::disabled_session(),
                MockSupabaseResponses::disabled_session(),
            )
        ])))
        .mount(&server)
        .await;

    let schedule = resolver_for(&server)
        .resolve_approved_schedule(doctor_id, NaiveDate::from_ymd_opt(2030, 3, 4).unwrap(), None)
        .await
        .unwrap()
        .expect("approved schedule");

    assert_eq!(find_containing_session(&schedule.schedules, "10:00", "10:30"), Some(Session::Morning));
    assert_eq!(find_containing_session(&schedule.schedules, "11:30", "12:30"), None);
}

#[tokio::test]
async fn availability_merges_bookings_per_day() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/work_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::work_schedule_response(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "2030-03-04",
                MockSupabaseResponses::session(true, "09:00", "12:00", "approved"),
                MockSupabaseResponses::session(true, "13:00", "17:00", "pending"),
                MockSupabaseResponses::disabled_session(),
            ),
            MockSupabaseResponses::work_schedule_response(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "2030-03-05",
                MockSupabaseResponses::session(true, "09:00", "12:00", "pending"),
                MockSupabaseResponses::disabled_session(),
                MockSupabaseResponses::disabled_session(),
            )
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "not.in.(cancelled,completed)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": Uuid::new_v4(),
                "appointment_date": "2030-03-04",
                "start_time": "10:00",
                "end_time": "10:30",
                "status": "pending"
            }
        ])))
        .mount(&server)
        .await;

    let days = resolver_for(&server)
        .availability_with_bookings(
            doctor_id,
            NaiveDate::from_ymd_opt(2030, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2030, 3, 7).unwrap(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(days.len(), 1);
    assert_eq!(days[0].available_sessions.len(), 1);
    assert_eq!(days[0].available_sessions[0].session, Session::Morning);
    assert_eq!(days[0].booked_slots.len(), 1);
    assert_eq!(days[0].booked_slots[0].start_time, "10:00");
    assert_eq!(days[0].default_consultation_duration, 30);
}
