use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    checkout::{self, SummaryLine},
    dto::cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
    entity::{
        cart_items::{
            ActiveModel as CartActive, Column as CartCol, Entity as CartItems, Model as CartModel,
        },
        products::{Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, Product, ProductAttrs, Settings},
    pricing::{self, PriceDisplay},
    response::{ApiResponse, Meta},
    services::{settings_service, validate},
    state::AppState,
};

/// Cart lines joined with their products, oldest first.
pub async fn load_lines<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
) -> AppResult<Vec<(CartModel, ProductModel)>> {
    let rows = CartItems::find()
        .find_also_related(Products)
        .filter(CartCol::UserId.eq(user_id))
        .order_by_asc(CartCol::CreatedAt)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(item, product)| product.map(|p| (item, p)))
        .collect())
}

pub fn summary_lines(lines: &[(CartModel, ProductModel)], settings: &Settings) -> Vec<SummaryLine> {
    lines
        .iter()
        .map(|(item, product)| SummaryLine {
            quantity: item.quantity,
            price: product.price,
            mrp: PriceDisplay::new(product.price, settings).mrp(),
        })
        .collect()
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let settings = settings_service::load(&state.orm).await?;
    let lines = load_lines(&state.orm, user.user_id).await?;
    let summary = checkout::summarize(
        &summary_lines(&lines, &settings),
        state.config.payment.gst_rate,
    );
    let total = lines.len() as i64;

    let items = lines
        .into_iter()
        .map(|(item, product)| {
            let line_total = product.price * i64::from(item.quantity);
            CartLine {
                id: item.id,
                product: Product::from_model(product, &state.config.asset_base_url, &settings),
                quantity: item.quantity,
                size: item.size,
                height: item.height,
                line_total,
                line_total_display: pricing::format_inr(line_total),
            }
        })
        .collect();

    Ok(ApiResponse::success(
        "OK",
        CartView { items, summary },
        Some(Meta::new(1, total, total)),
    ))
}

/// Check that `quantity` of `product` in `size` can be sold, returning the
/// normalized size.
fn check_variant(
    product: &ProductModel,
    size: Option<String>,
    quantity: i32,
) -> AppResult<Option<String>> {
    let attrs = ProductAttrs::from_model(product);
    let size = validate::optional(size);

    if attrs.sizes.is_empty() {
        if size.is_some() {
            return Err(AppError::BadRequest("This product has no sizes".into()));
        }
    } else {
        match size.as_deref() {
            None => return Err(AppError::BadRequest("Please select a size".into())),
            Some(s) if !attrs.has_size(s) => {
                return Err(AppError::BadRequest(format!("Size {s} is not available")));
            }
            Some(_) => {}
        }
    }

    let available = attrs.available_units(product, size.as_deref());
    if available <= 0 {
        return Err(AppError::BadRequest(format!("{} is out of stock", product.name)));
    }
    if quantity > available {
        return Err(AppError::BadRequest(format!(
            "Only {available} left for {}",
            product.name
        )));
    }
    Ok(size)
}

fn same_variant(size: &Option<String>, height: &Option<String>) -> Condition {
    let mut condition = Condition::all();
    condition = match size {
        Some(s) => condition.add(CartCol::Size.eq(s.clone())),
        None => condition.add(CartCol::Size.is_null()),
    };
    match height {
        Some(h) => condition.add(CartCol::Height.eq(h.clone())),
        None => condition.add(CartCol::Height.is_null()),
    }
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("product not found".to_string()))?;

    let height = validate::optional(payload.height);
    let size = validate::optional(payload.size);

    let existing = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::ProductId.eq(payload.product_id))
        .filter(same_variant(&size, &height))
        .one(&state.orm)
        .await?;

    let wanted = existing
        .as_ref()
        .map_or(0, |item| item.quantity)
        .saturating_add(payload.quantity);
    let size = check_variant(&product, size, wanted)?;

    let cart_item = match existing {
        Some(item) => {
            let mut active: CartActive = item.into();
            active.quantity = Set(wanted);
            active.updated_at = Set(Utc::now().into());
            active.update(&state.orm).await?
        }
        None => {
            CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(payload.product_id),
                quantity: Set(wanted),
                size: Set(size),
                height: Set(height),
                created_at: NotSet,
                updated_at: NotSet,
            }
            .insert(&state.orm)
            .await?
        }
    };

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": payload.product_id, "quantity": cart_item.quantity }),
    )
    .await;

    Ok(ApiResponse::success("Added to cart", CartItem::from(cart_item), None))
}

/// Set a line's quantity and optionally switch its variant. Zero removes the line.
pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    if payload.quantity < 0 {
        return Err(AppError::BadRequest("quantity must not be negative".into()));
    }

    let item = find_own_line(state, user, id).await?;
    if payload.quantity == 0 {
        return remove_from_cart(state, user, id).await;
    }

    let product = Products::find_by_id(item.product_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let size = payload.size.or_else(|| item.size.clone());
    let height = match payload.height {
        Some(h) => validate::optional(Some(h)),
        None => item.height.clone(),
    };
    let size = check_variant(&product, size, payload.quantity)?;

    let mut active: CartActive = item.into();
    active.quantity = Set(payload.quantity);
    active.size = Set(size);
    active.height = Set(height);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "cart_item_id": id, "quantity": updated.quantity }),
    )
    .await;

    Ok(ApiResponse::item(
        "Cart updated",
        serde_json::to_value(CartItem::from(updated)).map_err(|e| AppError::Internal(e.into()))?,
    ))
}

async fn find_own_line(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<CartModel> {
    CartItems::find()
        .filter(CartCol::Id.eq(id))
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::Id.eq(id))
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "cart_item_id": id }),
    )
    .await;

    Ok(ApiResponse::item("Removed from cart", serde_json::json!({})))
}

pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_clear",
        "cart_items",
        serde_json::json!({ "removed": result.rows_affected }),
    )
    .await;

    Ok(ApiResponse::item(
        "Cart cleared",
        serde_json::json!({ "removed": result.rows_affected }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use serde_json::json;

    fn product(
        sizes: serde_json::Value,
        size_stock: serde_json::Value,
        stock: i32,
    ) -> ProductModel {
        let now = Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap());
        ProductModel {
            id: Uuid::new_v4(),
            name: "Kurta".into(),
            description: None,
            brand: None,
            category: None,
            price: 79_900,
            stock,
            images: json!([]),
            sizes,
            size_stock,
            highlights: json!([]),
            in_stock: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sized_products_require_a_listed_size() {
        let p = product(json!(["S", "M"]), json!({ "S": 1, "M": 4 }), 5);
        assert!(check_variant(&p, None, 1).is_err());
        assert!(check_variant(&p, Some("XL".into()), 1).is_err());
        assert_eq!(check_variant(&p, Some(" M ".into()), 4).unwrap().as_deref(), Some("M"));
    }

    #[test]
    fn quantity_is_capped_by_stock() {
        let p = product(json!(["S"]), json!({ "S": 1 }), 1);
        assert!(check_variant(&p, Some("S".into()), 2).is_err());

        let p = product(json!([]), json!({}), 0);
        assert!(check_variant(&p, None, 1).is_err());
    }

    #[test]
    fn unsized_products_reject_sizes() {
        let p = product(json!([]), json!({}), 3);
        assert!(check_variant(&p, Some("M".into()), 1).is_err());
        assert_eq!(check_variant(&p, Some("  ".into()), 1).unwrap(), None);
    }

    #[test]
    fn summary_lines_use_marked_up_mrp() {
        let settings = Settings {
            discount_enabled: true,
            discount_percentage: 20,
            ..Settings::default()
        };
        let now = Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap());
        let p = product(json!([]), json!({}), 3);
        let item = CartModel {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            product_id: p.id,
            quantity: 2,
            size: None,
            height: None,
            created_at: now,
            updated_at: now,
        };
        let lines = summary_lines(&[(item, p)], &settings);
        assert_eq!(lines[0].price, 79_900);
        assert_eq!(lines[0].mrp, 99_900);
        assert_eq!(lines[0].quantity, 2);
    }
}
