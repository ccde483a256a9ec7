use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

use crate::{
    dto::contact::ContactRequest, error::AppResult, models::ContactMessage,
    response::ApiResponse, services::contact_service, state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit_contact))
}

#[utoipa::path(
    post,
    path = "/api/contact",
    request_body = ContactRequest,
    responses(
        (status = 201, description = "Message stored", body = ApiResponse<ContactMessage>),
        (status = 400, description = "Invalid input")
    ),
    tag = "Contact"
)]
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ContactMessage>>)> {
    let resp = contact_service::submit_contact(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}
