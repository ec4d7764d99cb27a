use axum::{
    routing::{get, post},
    Router,
};

use crate::{accounts, entitlements, validation};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/tiers", get(entitlements::list_tiers))
        .route("/api/accounts", post(accounts::create_account))
        .route("/api/accounts/:id", get(accounts::get_account))
        .route(
            "/api/accounts/:id/authorize",
            post(entitlements::authorize_operation),
        )
        .route("/api/accounts/:id/quota", get(entitlements::read_quota))
        .route(
            "/api/accounts/:id/validate",
            post(validation::validate_emails),
        )
        .route(
            "/api/admin/accounts/:id/usage/reset",
            post(entitlements::force_reset_usage),
        )
}
