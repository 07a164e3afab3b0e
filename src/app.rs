//! HTTP application assembly
//! Mission: Wire the auth routes, gateway and health probe into one router

use crate::auth::{api, auth_middleware, AuthState};
use crate::db::Database;
use crate::middleware::request_logging;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

/// Build the full application router.
///
/// Auth routes live under `/api/auth`. Login and logout are public; profile,
/// change-password and admin creation sit behind the gateway.
pub fn build_router(auth_state: AuthState, db: Database) -> Router {
    let public_routes = Router::new()
        .route("/login", post(api::login))
        .route("/logout", post(api::logout));

    let protected_routes = Router::new()
        .route("/profile", get(api::profile))
        .route("/change-password", post(api::change_password))
        .route("/admins", post(api::create_admin))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ));

    let auth_router: Router = public_routes
        .merge(protected_routes)
        .with_state(auth_state);

    let health_routes: Router = Router::new()
        .route("/health", get(health_check))
        .with_state(db);

    Router::new()
        .nest("/api/auth", auth_router)
        .merge(health_routes)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Store liveness probe - GET /health
async fn health_check(State(db): State<Database>) -> impl IntoResponse {
    match db.ping() {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "status": "ok" })),
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "status": "unavailable",
                    "message": "Database unavailable",
                })),
            )
        }
    }
}
