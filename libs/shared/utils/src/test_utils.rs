use std::sync::Arc;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub client_url: String,
    pub payment_webhook_secret: String,
    pub mail_api_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            client_url: "https://clinic.test".to_string(),
            payment_webhook_secret: "test-payment-secret".to_string(),
            mail_api_url: String::new(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            client_url: self.client_url.clone(),
            payment_webhook_secret: self.payment_webhook_secret.clone(),
            mail_api_url: self.mail_api_url.clone(),
            mail_api_key: "test-mail-key".to_string(),
            mail_from: "clinic@test.local".to_string(),
            notification_queue_capacity: 16,
            notification_max_attempts: 3,
            notification_retry_delay_ms: 5,
            request_timeout_seconds: 5,
            port: 0,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).unwrap_or_else(|_| Uuid::nil())
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }
}

/// PostgREST row fixtures shaped like the clinic tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn user_response(user_id: &str, email: &str, role: &str) -> Value {
        json!({
            "id": user_id,
            "email": email,
            "role": role,
            "full_name": "Test User"
        })
    }

    pub fn doctor_profile_response(doctor_id: &str, consultation_fee: f64, is_available: bool) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "specialty": "General Practice",
            "consultation_fee": consultation_fee,
            "is_available": is_available
        })
    }

    pub fn session(enabled: bool, start: &str, end: &str, approval_status: &str) -> Value {
        json!({
            "enabled": enabled,
            "start": start,
            "end": end,
            "approval_status": approval_status,
            "rejection_reason": ""
        })
    }

    pub fn disabled_session() -> Value {
        Self::session(false, "", "", "pending")
    }

    pub fn work_schedule_response(
        schedule_id: &str,
        doctor_id: &str,
        date: &str,
        morning: Value,
        afternoon: Value,
        evening: Value,
    ) -> Value {
        json!({
            "id": schedule_id,
            "doctor_id": doctor_id,
            "date": date,
            "default_consultation_duration": 30,
            "schedules": {
                "morning": morning,
                "afternoon": afternoon,
                "evening": evening
            },
            "version": 1,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn appointment_response(
        appointment_id: &str,
        patient_id: &str,
        doctor_id: &str,
        date: &str,
        start_time: &str,
        end_time: &str,
        status: &str,
        appointment_type: &str,
    ) -> Value {
        json!({
            "id": appointment_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "appointment_date": date,
            "start_time": start_time,
            "end_time": end_time,
            "start_date_time": format!("{}T{}:00Z", date, start_time),
            "end_date_time": format!("{}T{}:00Z", date, end_time),
            "appointment_type": appointment_type,
            "status": status,
            "appointment_fee": 200000.0,
            "medical_info": {
                "symptoms": "Headache",
                "reason": "Checkup",
                "current_medications": ["Paracetamol"],
                "notes": null
            },
            "video_call_info": null,
            "is_video_call_started": false,
            "is_video_call_ended": false,
            "is_follow_up": false,
            "original_appointment_id": null,
            "follow_up_appointment_ids": [],
            "created_by": patient_id,
            "approved_by": null,
            "approved_at": null,
            "cancelled_by": null,
            "cancelled_at": null,
            "cancel_reason": null,
            "updated_by": null,
            "version": 1,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn user_package_response(
        package_entry_id: &str,
        user_id: &str,
        remaining: i32,
        used: i32,
        expiry_date: DateTime<Utc>,
    ) -> Value {
        json!({
            "id": package_entry_id,
            "user_id": user_id,
            "package_id": Uuid::new_v4(),
            "payment_id": format!("pay-{}", package_entry_id),
            "remaining_appointments": remaining,
            "total_appointments": used,
            "purchase_date": "2024-01-01T00:00:00Z",
            "expiry_date": expiry_date,
            "status": "active"
        })
    }

    pub fn appointment_package_response(package_id: &str, appointment_count: i32, price: f64) -> Value {
        json!({
            "id": package_id,
            "name": "Starter",
            "description": "Starter bundle",
            "appointment_count": appointment_count,
            "price": price,
            "is_active": true,
            "validity_period": 365,
            "features": ["video consultations"]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(app_config.is_configured());
        assert!(!app_config.is_mail_configured());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::doctor("doc@example.com");
        assert_eq!(user.role, "doctor");

        let user_model = user.to_user();
        assert_eq!(user_model.id, user.id);
        assert!(user_model.is_doctor());
        assert!(!user_model.is_admin());
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));

        assert_eq!(token.split('.').count(), 3);
    }
}
