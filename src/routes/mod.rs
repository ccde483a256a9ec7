use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{StatusCode, Uri},
    routing::get,
};
use tower_http::services::ServeDir;

use crate::{
    response::{ApiResponse, Meta},
    state::AppState,
};

pub mod addresses;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod contact;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod products;
pub mod settings;

/// Request body cap; product forms carry several images.
pub const BODY_LIMIT_BYTES: usize = 8 * 1024 * 1024;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/products", products::router())
        .nest("/auth", auth::router())
        .nest("/cart", cart::router())
        .nest("/addresses", addresses::router())
        .nest("/orders", orders::router())
        .nest("/admin", admin::router())
        .nest("/settings", settings::router())
        .nest("/contact", contact::router())
}

/// Every route of the service, bound to `state`. Tracing, CORS and the other
/// middleware layers are added by the binary.
pub fn create_app(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.config.upload_dir);
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", create_api_router())
        .nest_service("/uploads", uploads)
        .merge(doc::scalar_docs())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state)
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ApiResponse<serde_json::Value>>) {
    let body = ApiResponse::success(
        "Not Found",
        serde_json::json!({ "path": uri.path() }),
        Some(Meta::empty()),
    );
    (StatusCode::NOT_FOUND, Json(body))
}
