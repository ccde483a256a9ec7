use axum::{Json, Router, extract::State, routing::get};

use crate::{
    error::AppResult, models::Settings, response::ApiResponse, services::settings_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_settings))
}

#[utoipa::path(
    get,
    path = "/api/settings",
    responses(
        (status = 200, description = "Storefront discount and banner settings", body = ApiResponse<Settings>)
    ),
    tag = "Settings"
)]
pub async fn get_settings(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Settings>>> {
    let resp = settings_service::get_settings(&state).await?;
    Ok(Json(resp))
}
