use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Product;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LowStockQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub threshold: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
    /// Size to adjust; required for sized products.
    pub size: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LowStockList {
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub products: i64,
    pub users: i64,
    pub orders: i64,
    pub orders_by_status: BTreeMap<String, i64>,
    pub revenue: i64,
    pub revenue_display: String,
    pub low_stock: i64,
}
