use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreatePackageRequest, PaymentConfirmation, UpdatePackageRequest};
use crate::services::{
    catalog::PackageCatalogService, ledger::PackageLedgerService, payment::PaymentConfirmationService,
};

#[axum::debug_handler]
pub async fn list_packages(
    State(state): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let ledger = PackageLedgerService::new(&state);

    let packages = ledger.list_active_packages().await?;

    Ok(Json(json!({
        "packages": packages,
        "total": packages.len()
    })))
}

#[axum::debug_handler]
pub async fn my_packages(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let patient_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid user id".to_string()))?;
    let ledger = PackageLedgerService::new(&state);

    let summary = ledger.summary(patient_id, auth.token()).await?;

    Ok(Json(json!(summary)))
}

/// Gateway callback. Authenticated by its HMAC signature, not by a bearer token.
#[axum::debug_handler]
pub async fn confirm_payment(
    State(state): State<Arc<AppConfig>>,
    Json(confirmation): Json<PaymentConfirmation>,
) -> Result<Json<Value>, AppError> {
    let service = PaymentConfirmationService::new(&state);

    let entry = service.confirm(confirmation).await?;

    Ok(Json(json!({
        "success": true,
        "user_package": entry
    })))
}

// ==============================================================================
// CATALOG (ADMIN)
// ==============================================================================

#[axum::debug_handler]
pub async fn list_catalog(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let catalog = PackageCatalogService::new(&state);

    let packages = catalog.list_all(&user, auth.token()).await?;

    Ok(Json(json!({
        "packages": packages,
        "total": packages.len()
    })))
}

#[axum::debug_handler]
pub async fn create_package(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePackageRequest>,
) -> Result<Json<Value>, AppError> {
    let catalog = PackageCatalogService::new(&state);

    let package = catalog.create(&user, request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "package": package
    })))
}

#[axum::debug_handler]
pub async fn get_package(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(package_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let catalog = PackageCatalogService::new(&state);

    let package = catalog.get(&user, package_id, auth.token()).await?;

    Ok(Json(json!(package)))
}

#[axum::debug_handler]
pub async fn update_package(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(package_id): Path<Uuid>,
    Json(request): Json<UpdatePackageRequest>,
) -> Result<Json<Value>, AppError> {
    let catalog = PackageCatalogService::new(&state);

    let package = catalog.update(&user, package_id, request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "package": package
    })))
}

#[axum::debug_handler]
pub async fn delete_package(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(package_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let catalog = PackageCatalogService::new(&state);

    catalog.remove(&user, package_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment package removed"
    })))
}
