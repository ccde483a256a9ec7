use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    pub discount_enabled: Option<bool>,
    pub discount_percentage: Option<i32>,
    pub banner_text: Option<String>,
    pub banner_enabled: Option<bool>,
}
