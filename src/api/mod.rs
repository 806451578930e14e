pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod settings;
pub mod validation;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::ui;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential forms (public, rate limited)
    let auth_routes = ui::auth_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit::rate_limit_auth,
    ));

    // JSON endpoints (session checked in the handler)
    let api_routes = Router::new()
        .route("/save_settings", post(settings::save_settings))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes)
        .merge(api_routes)
        .merge(ui::ledger_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
