use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};

use crate::{
    audit,
    dto::settings::UpdateSettingsRequest,
    entity::settings::{ActiveModel as SettingsActive, Entity as SettingsEntity},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Settings,
    response::ApiResponse,
    state::AppState,
};

pub const SETTINGS_ID: i32 = 1;
pub const MAX_DISCOUNT_PERCENTAGE: i32 = 90;

/// Current storefront settings; defaults when the row has not been created yet.
pub async fn load<C: ConnectionTrait>(db: &C) -> AppResult<Settings> {
    Ok(SettingsEntity::find_by_id(SETTINGS_ID)
        .one(db)
        .await?
        .map(Settings::from)
        .unwrap_or_default())
}

pub async fn get_settings(state: &AppState) -> AppResult<ApiResponse<Settings>> {
    Ok(ApiResponse::item("Settings", load(&state.orm).await?))
}

pub async fn update_settings(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateSettingsRequest,
) -> AppResult<ApiResponse<Settings>> {
    ensure_admin(user)?;
    if let Some(pct) = payload.discount_percentage
        && !(0..=MAX_DISCOUNT_PERCENTAGE).contains(&pct)
    {
        return Err(AppError::BadRequest(format!(
            "discount_percentage must be between 0 and {MAX_DISCOUNT_PERCENTAGE}"
        )));
    }

    let existing = SettingsEntity::find_by_id(SETTINGS_ID).one(&state.orm).await?;
    let is_new = existing.is_none();
    let mut active: SettingsActive = match existing {
        Some(model) => model.into(),
        None => SettingsActive {
            id: Set(SETTINGS_ID),
            discount_enabled: Set(false),
            discount_percentage: Set(0),
            banner_text: Set(None),
            banner_enabled: Set(false),
            updated_at: Set(Utc::now().into()),
        },
    };

    if let Some(enabled) = payload.discount_enabled {
        active.discount_enabled = Set(enabled);
    }
    if let Some(pct) = payload.discount_percentage {
        active.discount_percentage = Set(pct);
    }
    if let Some(text) = payload.banner_text {
        let text = text.trim().to_string();
        active.banner_text = Set((!text.is_empty()).then_some(text));
    }
    if let Some(enabled) = payload.banner_enabled {
        active.banner_enabled = Set(enabled);
    }
    active.updated_at = Set(Utc::now().into());

    let saved = if is_new {
        active.insert(&state.orm).await?
    } else {
        active.update(&state.orm).await?
    };

    audit::record(
        &state.orm,
        Some(user.user_id),
        "settings_update",
        "settings",
        serde_json::json!({
            "discount_enabled": saved.discount_enabled,
            "discount_percentage": saved.discount_percentage,
        }),
    )
    .await;

    Ok(ApiResponse::item("Settings updated", Settings::from(saved)))
}
