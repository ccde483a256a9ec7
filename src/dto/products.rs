use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Highlight, Product};

/// Product fields collected from a multipart form. Every field is optional
/// so the same shape serves create and update.
#[derive(Debug, Default)]
pub struct ProductForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Option<i64>,
    pub stock: Option<i32>,
    pub sizes: Option<Vec<String>>,
    pub size_stock: Option<BTreeMap<String, i32>>,
    pub highlights: Option<Vec<Highlight>>,
    pub in_stock: Option<bool>,
    /// Existing image references to keep; replaces the stored list when present.
    pub images: Option<Vec<String>>,
    /// File names of images saved from this request.
    pub uploaded: Vec<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryList {
    #[schema(value_type = Vec<String>)]
    pub items: Vec<String>,
}

/// Multipart fields accepted by the admin product endpoints. JSON-valued
/// fields are sent as strings.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct ProductUpload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    /// Price in paise.
    pub price: Option<i64>,
    pub stock: Option<i32>,
    /// JSON array, e.g. `["S","M"]`.
    pub sizes: Option<String>,
    /// JSON object, e.g. `{"S":2,"M":5}`.
    pub size_stock: Option<String>,
    /// JSON array of `{icon, text}`.
    pub highlights: Option<String>,
    pub in_stock: Option<bool>,
    /// JSON array of image URLs to keep.
    pub images: Option<String>,
    /// Image file; repeat the part to upload several.
    #[schema(value_type = Option<String>, format = Binary)]
    pub image: Option<Vec<u8>>,
}
