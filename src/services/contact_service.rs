use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect,
    Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::contact::{ContactList, ContactRequest},
    entity::contact_messages::{
        ActiveModel as ContactActive, Column as ContactCol, Entity as ContactMessages,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::ContactMessage,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::validate,
    state::AppState,
};

const MAX_MESSAGE_LEN: usize = 5000;

pub async fn submit_contact(
    state: &AppState,
    payload: ContactRequest,
) -> AppResult<ApiResponse<ContactMessage>> {
    let name = validate::required("name", &payload.name)?;
    let email = validate::email(&payload.email)?;
    let message = validate::required("message", &payload.message)?;
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::BadRequest(format!(
            "message must be at most {MAX_MESSAGE_LEN} characters"
        )));
    }
    let phone = match validate::optional(payload.phone) {
        Some(phone) => Some(validate::phone(&phone)?),
        None => None,
    };

    let saved = ContactActive {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        email: Set(email),
        phone: Set(phone),
        subject: Set(validate::optional(payload.subject)),
        message: Set(message),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(contact_id = %saved.id, "contact message received");
    audit::record(
        &state.orm,
        None,
        "contact_submit",
        "contact_messages",
        serde_json::json!({ "contact_id": saved.id }),
    )
    .await;

    Ok(ApiResponse::item(
        "Thanks, we will get back to you soon",
        ContactMessage::from(saved),
    ))
}

pub async fn list_contact(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ContactList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let total = ContactMessages::find().count(&state.orm).await? as i64;
    let items = ContactMessages::find()
        .order_by_desc(ContactCol::CreatedAt)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ContactMessage::from)
        .collect();

    Ok(ApiResponse::success(
        "Messages",
        ContactList { items },
        Some(Meta::new(page, limit, total)),
    ))
}
