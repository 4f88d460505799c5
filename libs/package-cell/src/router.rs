use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn package_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/", get(handlers::list_packages))
        .route("/payments/confirm", post(handlers::confirm_payment));

    let protected_routes = Router::new()
        .route("/mine", get(handlers::my_packages))
        .route(
            "/catalog",
            get(handlers::list_catalog).post(handlers::create_package),
        )
        .route(
            "/catalog/{package_id}",
            get(handlers::get_package)
                .patch(handlers::update_package)
                .delete(handlers::delete_package),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
