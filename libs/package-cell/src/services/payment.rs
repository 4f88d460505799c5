use std::sync::Arc;

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};

use crate::models::{
    AppointmentPackage, PackageError, PaymentConfirmation, UserPackage, UserPackageStatus,
};

type HmacSha256 = Hmac<Sha256>;

const SUCCESS_CODE: &str = "00";

/// Turns a signed "payment succeeded" callback into a ledger entry.
pub struct PaymentConfirmationService {
    supabase: Arc<SupabaseClient>,
    webhook_secret: String,
}

impl PaymentConfirmationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            webhook_secret: config.payment_webhook_secret.clone(),
        }
    }

    #[instrument(skip(self, confirmation), fields(payment_id = %confirmation.payment_id))]
    pub async fn confirm(&self, confirmation: PaymentConfirmation) -> Result<UserPackage, PackageError> {
        if self.webhook_secret.is_empty() {
            return Err(PackageError::NotConfigured);
        }
        verify_signature(&confirmation, &self.webhook_secret)?;

        let package = self.get_package(confirmation.package_id).await?;
        if (package.price - confirmation.amount).abs() > 0.005 {
            warn!("Amount {} does not match package price {}", confirmation.amount, package.price);
            return Err(PackageError::AmountMismatch {
                expected: package.price,
                received: confirmation.amount,
            });
        }

        if self.find_by_payment(&confirmation.payment_id).await?.is_some() {
            return Err(PackageError::AlreadyProcessed);
        }

        if confirmation.response_code != SUCCESS_CODE {
            info!("Payment {} reported failure code {}", confirmation.payment_id, confirmation.response_code);
            return Err(PackageError::PaymentFailed(confirmation.response_code));
        }

        let entry = grant(&package, &confirmation);
        let body = serde_json::to_value(&entry)?;

        let rows: Vec<UserPackage> = match self.supabase.insert_returning("user_packages", None, body).await {
            Ok(rows) => rows,
            // Unique payment_id: a concurrent delivery of the same callback won.
            Err(SupabaseError::Conflict(_)) => return Err(PackageError::AlreadyProcessed),
            Err(e) => return Err(e.into()),
        };

        let created = rows.into_iter().next().unwrap_or(entry);
        info!(
            "Granted {} appointments to user {} from package {}",
            created.remaining_appointments, created.user_id, package.id
        );
        Ok(created)
    }

    async fn get_package(&self, package_id: Uuid) -> Result<AppointmentPackage, PackageError> {
        let path = format!("/rest/v1/appointment_packages?id=eq.{}", package_id);
        let rows: Vec<AppointmentPackage> = self.supabase.request(Method::GET, &path, None, None).await?;
        rows.into_iter().next().ok_or(PackageError::PackageNotFound)
    }

    async fn find_by_payment(&self, payment_id: &str) -> Result<Option<UserPackage>, PackageError> {
        let path = format!(
            "/rest/v1/user_packages?payment_id=eq.{}",
            urlencoding::encode(payment_id)
        );
        let rows: Vec<UserPackage> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }
}

/// Ledger entry for a freshly paid package.
pub fn grant(package: &AppointmentPackage, confirmation: &PaymentConfirmation) -> UserPackage {
    let now = Utc::now();
    UserPackage {
        id: Uuid::new_v4(),
        user_id: confirmation.user_id,
        package_id: package.id,
        payment_id: Some(confirmation.payment_id.clone()),
        remaining_appointments: package.appointment_count,
        total_appointments: 0,
        purchase_date: now,
        expiry_date: now + Duration::days(package.validity_period),
        status: UserPackageStatus::Active,
    }
}

fn keyed_mac(secret: &str) -> Result<HmacSha256, PackageError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| PackageError::NotConfigured)
}

/// Lowercase hex HMAC-SHA256, the format the gateway callback carries.
pub fn sign(payload: &str, secret: &str) -> Result<String, PackageError> {
    let mut mac = keyed_mac(secret)?;
    mac.update(payload.as_bytes());
    Ok(mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

pub fn verify_signature(confirmation: &PaymentConfirmation, secret: &str) -> Result<(), PackageError> {
    let provided = decode_hex(&confirmation.signature).ok_or(PackageError::InvalidSignature)?;

    let mut mac = keyed_mac(secret)?;
    mac.update(confirmation.canonical_payload().as_bytes());
    mac.verify_slice(&provided).map_err(|_| PackageError::InvalidSignature)
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|i| value.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn confirmation(secret: &str) -> PaymentConfirmation {
        let mut c = PaymentConfirmation {
            payment_id: "pay-1".to_string(),
            user_id: Uuid::new_v4(),
            package_id: Uuid::new_v4(),
            amount: 500000.0,
            response_code: "00".to_string(),
            signature: String::new(),
        };
        c.signature = sign(&c.canonical_payload(), secret).unwrap();
        c
    }

    #[test]
    fn signature_round_trip() {
        let c = confirmation("s3cret");
        assert!(verify_signature(&c, "s3cret").is_ok());
        assert_matches!(verify_signature(&c, "other"), Err(PackageError::InvalidSignature));
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let mut c = confirmation("s3cret");
        c.amount = 1.0;
        assert_matches!(verify_signature(&c, "s3cret"), Err(PackageError::InvalidSignature));
    }

    #[test]
    fn malformed_hex_is_rejected() {
        let mut c = confirmation("s3cret");
        c.signature = "zz".to_string();
        assert_matches!(verify_signature(&c, "s3cret"), Err(PackageError::InvalidSignature));
        assert_eq!(decode_hex("0aff"), Some(vec![0x0a, 0xff]));
        assert_eq!(decode_hex("abc"), None);
    }

    #[test]
    fn grant_uses_package_count_and_validity() {
        let package = AppointmentPackage {
            id: Uuid::new_v4(),
            name: "Family".to_string(),
            description: None,
            appointment_count: 6,
            price: 500000.0,
            is_active: true,
            validity_period: 30,
            features: vec![],
        };
        let entry = grant(&package, &confirmation("s3cret"));

        assert_eq!(entry.remaining_appointments, 6);
        assert_eq!(entry.total_appointments, 0);
        assert_eq!(entry.status, UserPackageStatus::Active);
        assert_eq!((entry.expiry_date - entry.purchase_date).num_days(), 30);
    }
}
