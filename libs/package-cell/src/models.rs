use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;

pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentPackage {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub appointment_count: i32,
    pub price: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Days a purchased package stays usable.
    #[serde(default = "default_validity")]
    pub validity_period: i64,
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_active() -> bool {
    true
}

fn default_validity() -> i64 {
    DEFAULT_VALIDITY_DAYS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserPackageStatus {
    Active,
    Expired,
    Depleted,
}

/// One patient's purchased package: credits left and credits used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPackage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    #[serde(default)]
    pub payment_id: Option<String>,
    pub remaining_appointments: i32,
    /// Credits already consumed.
    pub total_appointments: i32,
    pub purchase_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub status: UserPackageStatus,
}

impl UserPackage {
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.status == UserPackageStatus::Active
            && self.expiry_date > now
            && self.remaining_appointments > 0
    }
}

/// A credit taken from a package during appointment approval.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumedCredit {
    pub package: UserPackage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub payment_id: String,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub amount: f64,
    /// Gateway result code; `"00"` is success.
    pub response_code: String,
    /// Lowercase hex HMAC-SHA256 of the canonical payload.
    pub signature: String,
}

impl PaymentConfirmation {
    pub fn canonical_payload(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.payment_id, self.user_id, self.package_id, self.amount, self.response_code
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub packages: Vec<UserPackage>,
    pub remaining_appointments: i32,
    pub used_appointments: i32,
}

/// New catalog entry. Omitted optional fields take the column defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePackageRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub appointment_count: i32,
    pub price: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "default_validity")]
    pub validity_period: i64,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Partial catalog update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePackageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_period: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
}

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Patient has no active package with remaining appointments")]
    NoEligiblePackage,

    #[error("Package ledger is busy, please retry")]
    Contention,

    #[error("Appointment package not found")]
    PackageNotFound,

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Payment amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: f64, received: f64 },

    #[error("Payment already processed")]
    AlreadyProcessed,

    #[error("Payment was not successful (code {0})")]
    PaymentFailed(String),

    #[error("Payment confirmation is not configured")]
    NotConfigured,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<PackageError> for AppError {
    fn from(e: PackageError) -> Self {
        match e {
            PackageError::NoEligiblePackage | PackageError::PaymentFailed(_) => {
                AppError::BadRequest(e.to_string())
            }
            PackageError::Contention
            | PackageError::InvalidSignature
            | PackageError::AmountMismatch { .. }
            | PackageError::AlreadyProcessed => AppError::Conflict(e.to_string()),
            PackageError::PackageNotFound => AppError::NotFound(e.to_string()),
            PackageError::Forbidden(msg) => AppError::Forbidden(msg),
            PackageError::Validation(msg) => AppError::ValidationError(msg),
            PackageError::Database(db) => db.into(),
            PackageError::NotConfigured | PackageError::Serialization(_) => {
                AppError::Internal(e.to_string())
            }
        }
    }
}
