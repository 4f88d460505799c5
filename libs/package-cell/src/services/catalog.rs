use std::sync::Arc;

use reqwest::Method;
use tracing::{info, instrument};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::User;

use crate::models::{AppointmentPackage, CreatePackageRequest, PackageError, UpdatePackageRequest};

/// Administrator management of the package catalog, inactive packages included.
pub struct PackageCatalogService {
    supabase: Arc<SupabaseClient>,
}

impl PackageCatalogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    #[instrument(skip(self, actor, request, auth_token))]
    pub async fn create(
        &self,
        actor: &User,
        request: CreatePackageRequest,
        auth_token: &str,
    ) -> Result<AppointmentPackage, PackageError> {
        require_admin(actor)?;
        validate_fields(
            Some(&request.name),
            Some(request.appointment_count),
            Some(request.price),
            Some(request.validity_period),
        )?;

        let mut body = serde_json::to_value(&request)?;
        body["id"] = serde_json::json!(Uuid::new_v4());

        let rows: Vec<AppointmentPackage> = self
            .supabase
            .insert_returning("appointment_packages", Some(auth_token), body)
            .await?;
        let created = rows
            .into_iter()
            .next()
            .ok_or_else(|| PackageError::Validation("Package was not created".to_string()))?;

        info!("Created appointment package {} ({})", created.id, created.name);
        Ok(created)
    }

    pub async fn list_all(&self, actor: &User, auth_token: &str) -> Result<Vec<AppointmentPackage>, PackageError> {
        require_admin(actor)?;

        let path = "/rest/v1/appointment_packages?order=price.asc";
        let packages = self.supabase.request(Method::GET, path, Some(auth_token), None).await?;
        Ok(packages)
    }

    pub async fn get(
        &self,
        actor: &User,
        package_id: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentPackage, PackageError> {
        require_admin(actor)?;

        let path = format!("/rest/v1/appointment_packages?id=eq.{}", package_id);
        let rows: Vec<AppointmentPackage> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        rows.into_iter().next().ok_or(PackageError::PackageNotFound)
    }

    #[instrument(skip(self, actor, request, auth_token))]
    pub async fn update(
        &self,
        actor: &User,
        package_id: Uuid,
        request: UpdatePackageRequest,
        auth_token: &str,
    ) -> Result<AppointmentPackage, PackageError> {
        require_admin(actor)?;
        validate_fields(
            request.name.as_deref(),
            request.appointment_count,
            request.price,
            request.validity_period,
        )?;

        let body = serde_json::to_value(&request)?;
        if body.as_object().is_some_and(|fields| fields.is_empty()) {
            return Err(PackageError::Validation("No fields to update".to_string()));
        }

        let path = format!("/rest/v1/appointment_packages?id=eq.{}", package_id);
        let rows: Vec<AppointmentPackage> = self.supabase.update_returning(&path, Some(auth_token), body).await?;
        let updated = rows.into_iter().next().ok_or(PackageError::PackageNotFound)?;

        info!("Updated appointment package {}", updated.id);
        Ok(updated)
    }

    pub async fn remove(&self, actor: &User, package_id: Uuid, auth_token: &str) -> Result<(), PackageError> {
        require_admin(actor)?;

        let path = format!("/rest/v1/appointment_packages?id=eq.{}", package_id);
        let removed: Vec<AppointmentPackage> = self.supabase.delete_returning(&path, Some(auth_token)).await?;
        if removed.is_empty() {
            return Err(PackageError::PackageNotFound);
        }

        info!("Removed appointment package {}", package_id);
        Ok(())
    }
}

fn require_admin(actor: &User) -> Result<(), PackageError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(PackageError::Forbidden(
            "Only administrators can manage appointment packages".to_string(),
        ))
    }
}

fn validate_fields(
    name: Option<&str>,
    appointment_count: Option<i32>,
    price: Option<f64>,
    validity_period: Option<i64>,
) -> Result<(), PackageError> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(PackageError::Validation("name must not be empty".to_string()));
    }
    if appointment_count.is_some_and(|c| c < 1) {
        return Err(PackageError::Validation("appointment_count must be at least 1".to_string()));
    }
    if price.is_some_and(|p| !p.is_finite() || p < 0.0) {
        return Err(PackageError::Validation("price must not be negative".to_string()));
    }
    if validity_period.is_some_and(|days| days < 1) {
        return Err(PackageError::Validation("validity_period must be at least 1 day".to_string()));
    }
    Ok(())
}
