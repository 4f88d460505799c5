use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    AppointmentPackage, ConsumedCredit, PackageError, PackageSummary, UserPackage,
    UserPackageStatus,
};

const MAX_LEDGER_ATTEMPTS: usize = 3;

/// Credit accounting for purchased appointment packages.
///
/// Every write is a conditional update keyed on the remaining count that was read, so two
/// approvals racing for the same package cannot both debit the same credit.
pub struct PackageLedgerService {
    supabase: Arc<SupabaseClient>,
}

impl PackageLedgerService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    #[instrument(skip(self, auth_token))]
    pub async fn consume_credit(
        &self,
        patient_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<ConsumedCredit, PackageError> {
        for attempt in 1..=MAX_LEDGER_ATTEMPTS {
            let now = Utc::now();
            let candidates = self.eligible_packages(patient_id, now, auth_token).await?;

            let package = select_eligible(&candidates, now).ok_or(PackageError::NoEligiblePackage)?;
            let debited = debit(package);

            let path = format!(
                "/rest/v1/user_packages?id=eq.{}&remaining_appointments=eq.{}",
                package.id, package.remaining_appointments
            );
            let body = json!({
                "remaining_appointments": debited.remaining_appointments,
                "total_appointments": debited.total_appointments,
                "status": debited.status,
            });

            let rows: Vec<UserPackage> = self.supabase.update_returning(&path, auth_token, body).await?;
            if let Some(updated) = rows.into_iter().next() {
                info!(
                    "Consumed credit from package {} for patient {} ({} left)",
                    updated.id, patient_id, updated.remaining_appointments
                );
                return Ok(ConsumedCredit { package: updated });
            }

            debug!("Package {} changed under us on attempt {}", package.id, attempt);
        }

        warn!("Giving up debiting a credit for patient {} after {} attempts", patient_id, MAX_LEDGER_ATTEMPTS);
        Err(PackageError::Contention)
    }

    /// Puts back a credit taken by [`consume_credit`](Self::consume_credit).
    pub async fn restore_credit(
        &self,
        credit: &ConsumedCredit,
        auth_token: Option<&str>,
    ) -> Result<UserPackage, PackageError> {
        let mut current = credit.package.clone();

        for attempt in 1..=MAX_LEDGER_ATTEMPTS {
            let restored = credit_back(&current);
            let path = format!(
                "/rest/v1/user_packages?id=eq.{}&remaining_appointments=eq.{}",
                current.id, current.remaining_appointments
            );
            let body = json!({
                "remaining_appointments": restored.remaining_appointments,
                "total_appointments": restored.total_appointments,
                "status": restored.status,
            });

            let rows: Vec<UserPackage> = self.supabase.update_returning(&path, auth_token, body).await?;
            if let Some(updated) = rows.into_iter().next() {
                info!("Restored credit to package {}", updated.id);
                return Ok(updated);
            }

            debug!("Restore of package {} raced on attempt {}, re-reading", current.id, attempt);
            current = self.get_user_package(current.id, auth_token).await?;
        }

        Err(PackageError::Contention)
    }

    pub async fn summary(&self, patient_id: Uuid, auth_token: &str) -> Result<PackageSummary, PackageError> {
        let now = Utc::now();
        let packages = self.eligible_packages(patient_id, now, Some(auth_token)).await?;

        Ok(PackageSummary {
            remaining_appointments: packages.iter().map(|p| p.remaining_appointments).sum(),
            used_appointments: packages.iter().map(|p| p.total_appointments).sum(),
            packages,
        })
    }

    pub async fn list_active_packages(&self) -> Result<Vec<AppointmentPackage>, PackageError> {
        let path = "/rest/v1/appointment_packages?is_active=eq.true&order=price.asc";
        Ok(self.supabase.request(Method::GET, path, None, None).await?)
    }

    async fn get_user_package(&self, id: Uuid, auth_token: Option<&str>) -> Result<UserPackage, PackageError> {
        let path = format!("/rest/v1/user_packages?id=eq.{}", id);
        let rows: Vec<UserPackage> = self.supabase.request(Method::GET, &path, auth_token, None).await?;
        rows.into_iter().next().ok_or(PackageError::PackageNotFound)
    }

    async fn eligible_packages(
        &self,
        patient_id: Uuid,
        now: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<Vec<UserPackage>, PackageError> {
        let path = format!(
            "/rest/v1/user_packages?user_id=eq.{}&status=eq.active&remaining_appointments=gt.0\
             &expiry_date=gt.{}&order=expiry_date.asc",
            patient_id,
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        Ok(self.supabase.request(Method::GET, &path, auth_token, None).await?)
    }
}

/// Soonest-expiring package that is active, unexpired and has credit left.
pub fn select_eligible(packages: &[UserPackage], now: DateTime<Utc>) -> Option<&UserPackage> {
    packages
        .iter()
        .filter(|p| p.is_eligible_at(now))
        .min_by_key(|p| p.expiry_date)
}

/// One credit moved from remaining to used.
pub fn debit(package: &UserPackage) -> UserPackage {
    let remaining = package.remaining_appointments - 1;
    UserPackage {
        remaining_appointments: remaining,
        total_appointments: package.total_appointments + 1,
        status: if remaining == 0 {
            UserPackageStatus::Depleted
        } else {
            package.status
        },
        ..package.clone()
    }
}

fn credit_back(package: &UserPackage) -> UserPackage {
    UserPackage {
        remaining_appointments: package.remaining_appointments + 1,
        total_appointments: (package.total_appointments - 1).max(0),
        status: UserPackageStatus::Active,
        ..package.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn package(remaining: i32, used: i32, expires_in_days: i64, status: UserPackageStatus) -> UserPackage {
        let now = Utc::now();
        UserPackage {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            package_id: Uuid::new_v4(),
            payment_id: None,
            remaining_appointments: remaining,
            total_appointments: used,
            purchase_date: now - Duration::days(10),
            expiry_date: now + Duration::days(expires_in_days),
            status,
        }
    }

    #[test]
    fn selects_soonest_expiring_eligible_package() {
        let late = package(5, 0, 90, UserPackageStatus::Active);
        let soon = package(2, 3, 10, UserPackageStatus::Active);
        let expired = package(4, 0, -1, UserPackageStatus::Active);
        let empty = package(0, 5, 5, UserPackageStatus::Active);
        let depleted = package(1, 4, 2, UserPackageStatus::Depleted);

        let all = vec![late.clone(), expired, empty, depleted, soon.clone()];
        assert_eq!(select_eligible(&all, Utc::now()).map(|p| p.id), Some(soon.id));
    }

    #[test]
    fn nothing_selected_without_credit() {
        let all = vec![package(0, 3, 30, UserPackageStatus::Active)];
        assert!(select_eligible(&all, Utc::now()).is_none());
        assert!(select_eligible(&[], Utc::now()).is_none());
    }

    #[test]
    fn debit_conserves_total_credits() {
        let before = package(3, 2, 30, UserPackageStatus::Active);
        let after = debit(&before);

        assert_eq!(after.remaining_appointments, 2);
        assert_eq!(after.total_appointments, 3);
        assert_eq!(
            after.remaining_appointments + after.total_appointments,
            before.remaining_appointments + before.total_appointments
        );
        assert_eq!(after.status, UserPackageStatus::Active);
    }

    #[test]
    fn last_credit_depletes_package_and_restore_reactivates() {
        let after = debit(&package(1, 4, 30, UserPackageStatus::Active));
        assert_eq!(after.remaining_appointments, 0);
        assert_eq!(after.status, UserPackageStatus::Depleted);

        let restored = credit_back(&after);
        assert_eq!(restored.remaining_appointments, 1);
        assert_eq!(restored.total_appointments, 4);
        assert_eq!(restored.status, UserPackageStatus::Active);
    }
}
