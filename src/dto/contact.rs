use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ContactMessage;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ContactList {
    #[schema(value_type = Vec<ContactMessage>)]
    pub items: Vec<ContactMessage>,
}
