use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    assets,
    entity::{
        addresses::Model as AddressModel, cart_items::Model as CartItemModel,
        contact_messages::Model as ContactModel, order_items::Model as OrderItemModel,
        orders::Model as OrderModel, products::Model as ProductModel,
        settings::Model as SettingsModel, users::Model as UserModel,
    },
    pricing::{self, PriceDisplay},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserModel> for User {
    fn from(model: UserModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            role: model.role,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Highlight {
    pub icon: String,
    pub text: String,
}

/// Variant data stored as JSON columns on a product row.
#[derive(Debug, Clone, Default)]
pub struct ProductAttrs {
    pub images: Vec<String>,
    pub sizes: Vec<String>,
    pub size_stock: BTreeMap<String, i32>,
    pub highlights: Vec<Highlight>,
}

impl ProductAttrs {
    pub fn from_model(model: &ProductModel) -> Self {
        Self {
            images: decode(&model.images),
            sizes: decode(&model.sizes),
            size_stock: decode(&model.size_stock),
            highlights: decode(&model.highlights),
        }
    }

    /// Units that can still be sold for `size`. Sized products need a size.
    pub fn available_units(&self, model: &ProductModel, size: Option<&str>) -> i32 {
        if !model.in_stock {
            return 0;
        }
        if self.sizes.is_empty() {
            return model.stock.max(0);
        }
        size.and_then(|s| self.size_stock.get(s))
            .copied()
            .unwrap_or(0)
            .max(0)
    }

    pub fn has_size(&self, size: &str) -> bool {
        self.sizes.iter().any(|s| s == size)
    }
}

fn decode<T: serde::de::DeserializeOwned + Default>(value: &Value) -> T {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: i64,
    pub price_display: PriceDisplay,
    pub images: Vec<String>,
    pub sizes: Vec<String>,
    pub size_stock: BTreeMap<String, i32>,
    pub stock: i32,
    pub highlights: Vec<Highlight>,
    pub in_stock: bool,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn from_model(model: ProductModel, asset_base: &str, settings: &Settings) -> Self {
        let attrs = ProductAttrs::from_model(&model);
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            brand: model.brand,
            category: model.category,
            price: model.price,
            price_display: PriceDisplay::new(model.price, settings),
            images: assets::resolve_images(asset_base, &attrs.images),
            sizes: attrs.sizes,
            size_stock: attrs.size_stock,
            stock: model.stock,
            highlights: attrs.highlights,
            in_stock: model.in_stock,
            available: model.in_stock && model.stock > 0,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub size: Option<String>,
    pub height: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CartItemModel> for CartItem {
    fn from(model: CartItemModel) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            quantity: model.quantity,
            size: model.size,
            height: model.height,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub landmark: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub label: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AddressModel> for Address {
    fn from(model: AddressModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            phone: model.phone,
            line1: model.line1,
            line2: model.line2,
            landmark: model.landmark,
            city: model.city,
            state: model.state,
            postal_code: model.postal_code,
            country: model.country,
            label: model.label,
            is_default: model.is_default,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub subtotal: i64,
    pub gst_amount: i64,
    pub total_amount: i64,
    pub total_display: String,
    pub amount_paid: i64,
    pub amount_due: i64,
    pub advance_amount: i64,
    pub payment_reference: Option<String>,
    pub gateway_order_id: Option<String>,
    #[schema(value_type = Object)]
    pub shipping_address: Value,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderModel> for Order {
    fn from(model: OrderModel) -> Self {
        let amount_due = if model.status == "cancelled" {
            0
        } else {
            (model.total_amount - model.amount_paid).max(0)
        };
        Self {
            id: model.id,
            user_id: model.user_id,
            status: model.status,
            payment_status: model.payment_status,
            payment_method: model.payment_method,
            subtotal: model.subtotal,
            gst_amount: model.gst_amount,
            total_amount: model.total_amount,
            total_display: pricing::format_inr(model.total_amount),
            amount_paid: model.amount_paid,
            amount_due,
            advance_amount: model.advance_amount,
            payment_reference: model.payment_reference,
            gateway_order_id: model.gateway_order_id,
            shipping_address: model.shipping_address,
            notes: model.notes,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub size: Option<String>,
    pub height: Option<String>,
    pub quantity: i32,
    pub price: i64,
    pub line_total: i64,
    pub created_at: DateTime<Utc>,
}

impl From<OrderItemModel> for OrderItem {
    fn from(model: OrderItemModel) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            product_name: model.product_name,
            size: model.size,
            height: model.height,
            quantity: model.quantity,
            price: model.price,
            line_total: model.line_total,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Settings {
    pub discount_enabled: bool,
    pub discount_percentage: i32,
    pub banner_text: Option<String>,
    pub banner_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl Settings {
    /// Discount percentage to display, when the storewide discount is on.
    pub fn active_discount(&self) -> Option<i32> {
        (self.discount_enabled && (1..100).contains(&self.discount_percentage))
            .then_some(self.discount_percentage)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            discount_enabled: false,
            discount_percentage: 0,
            banner_text: None,
            banner_enabled: false,
            updated_at: Utc::now(),
        }
    }
}

impl From<SettingsModel> for Settings {
    fn from(model: SettingsModel) -> Self {
        Self {
            discount_enabled: model.discount_enabled,
            discount_percentage: model.discount_percentage,
            banner_text: model.banner_text,
            banner_enabled: model.banner_enabled,
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<ContactModel> for ContactMessage {
    fn from(model: ContactModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            subject: model.subject,
            message: model.message,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use serde_json::json;

    fn product(in_stock: bool, stock: i32, sizes: Value, size_stock: Value) -> ProductModel {
        let now = Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap());
        ProductModel {
            id: Uuid::new_v4(),
            name: "Kurta".into(),
            description: None,
            brand: None,
            category: Some("ethnic".into()),
            price: 79_900,
            stock,
            images: json!(["kurta.png", "https://cdn.test/k2.png"]),
            sizes,
            size_stock,
            highlights: json!([{ "icon": "leaf", "text": "Pure cotton" }]),
            in_stock,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unsized_products_sell_from_total_stock() {
        let model = product(true, 4, json!([]), json!({}));
        let attrs = ProductAttrs::from_model(&model);
        assert_eq!(attrs.available_units(&model, None), 4);
        assert_eq!(attrs.available_units(&model, Some("M")), 4);
    }

    #[test]
    fn sized_products_sell_per_size() {
        let model = product(true, 5, json!(["S", "M"]), json!({ "S": 2, "M": 3 }));
        let attrs = ProductAttrs::from_model(&model);
        assert_eq!(attrs.available_units(&model, Some("M")), 3);
        assert_eq!(attrs.available_units(&model, Some("XL")), 0);
        assert_eq!(attrs.available_units(&model, None), 0);
        assert!(attrs.has_size("S"));
        assert!(!attrs.has_size("L"));
    }

    #[test]
    fn out_of_stock_flag_wins() {
        let model = product(false, 9, json!([]), json!({}));
        let attrs = ProductAttrs::from_model(&model);
        assert_eq!(attrs.available_units(&model, None), 0);
    }

    #[test]
    fn malformed_json_columns_decode_empty() {
        let model = product(true, 1, json!("oops"), json!([1, 2]));
        let attrs = ProductAttrs::from_model(&model);
        assert!(attrs.sizes.is_empty());
        assert!(attrs.size_stock.is_empty());
    }

    #[test]
    fn product_view_resolves_images_and_discount() {
        let settings = Settings {
            discount_enabled: true,
            discount_percentage: 20,
            ..Settings::default()
        };
        let view = Product::from_model(
            product(true, 3, json!([]), json!({})),
            "https://shop.test",
            &settings,
        );
        assert_eq!(
            view.images,
            vec![
                "https://shop.test/uploads/kurta.png".to_string(),
                "https://cdn.test/k2.png".to_string()
            ]
        );
        assert_eq!(view.price_display.old_price.as_deref(), Some("₹999"));
        assert!(view.available);
        assert_eq!(view.highlights[0].text, "Pure cotton");
    }
}
