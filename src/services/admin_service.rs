use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    checkout::{OrderStatus, PaymentMethod, PaymentStatus},
    dto::{
        admin::{DashboardStats, InventoryAdjustRequest, LowStockList, LowStockQuery},
        orders::{EditOrderRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
    },
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        products::{Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, Product},
    pricing,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, Pagination},
    services::{order_service, product_service, settings_service, validate},
    state::AppState,
};

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let condition = order_service::list_condition(&query)?;
    order_service::page_orders(&state.orm, condition, &query).await
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let items = order_service::load_items(&state.orm, order.id).await?;

    Ok(ApiResponse::item(
        "Order found",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
    ))
}

/// Move `order` to `next`. Confirming takes stock if checkout has not;
/// completing a cash-on-delivery order records the cash as collected.
async fn apply_status<C: ConnectionTrait>(
    db: &C,
    order: OrderModel,
    next: OrderStatus,
) -> AppResult<OrderModel> {
    if next == OrderStatus::Cancelled {
        return order_service::cancel(db, order).await;
    }

    let current: OrderStatus = order.status.parse()?;
    let next = current.transition(next)?;
    let method: PaymentMethod = order.payment_method.parse()?;
    let payment_status: PaymentStatus = order.payment_status.parse()?;

    let take_stock = next == OrderStatus::Confirmed && !order.stock_committed;
    if take_stock {
        let lines = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order.id))
            .all(db)
            .await?;
        order_service::take_stock(db, &lines).await?;
    }

    let total = order.total_amount;
    let mut active: OrderActive = order.into();
    active.status = Set(next.to_string());
    if take_stock {
        active.stock_committed = Set(true);
    }
    if next == OrderStatus::Completed
        && method == PaymentMethod::Cod
        && payment_status == PaymentStatus::AdvancePaid
    {
        active.payment_status = Set(PaymentStatus::Paid.to_string());
        active.amount_paid = Set(total);
    }
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(db).await?)
}

async fn change_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    next: OrderStatus,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let previous = order.status.clone();
    let order = apply_status(&txn, order, next).await?;
    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        from = %previous,
        to = %order.status,
        "order status changed"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({
            "order_id": order.id,
            "from": previous,
            "status": order.status,
            "payment_status": order.payment_status,
        }),
    )
    .await;

    Ok(ApiResponse::item("Order updated", Order::from(order)))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    let next: OrderStatus = payload.status.parse()?;
    change_status(state, user, id, next).await
}

pub async fn confirm_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    change_status(state, user, id, OrderStatus::Confirmed).await
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    change_status(state, user, id, OrderStatus::Cancelled).await
}

pub async fn edit_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: EditOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    if payload.notes.is_none() && payload.payment_reference.is_none() {
        return Err(AppError::BadRequest("Nothing to update".into()));
    }

    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: OrderActive = existing.into();
    if payload.notes.is_some() {
        active.notes = Set(validate::optional(payload.notes));
    }
    if payload.payment_reference.is_some() {
        active.payment_reference = Set(validate::optional(payload.payment_reference));
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_edit",
        "orders",
        serde_json::json!({ "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::item("Order updated", Order::from(order)))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<LowStockList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD).max(0);
    let (page, limit, offset) = Pagination {
        page: query.page,
        per_page: query.per_page,
    }
    .normalize();

    let finder = Products::find()
        .filter(ProdCol::Stock.lte(threshold))
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let settings = settings_service::load(&state.orm).await?;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|p| Product::from_model(p, &state.config.asset_base_url, &settings))
        .collect();

    Ok(ApiResponse::success(
        "Low stock",
        LowStockList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let updated =
        product_service::apply_stock_shift(product, payload.size.as_deref(), payload.delta)?
            .update(&txn)
            .await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({
            "product_id": updated.id,
            "size": payload.size,
            "delta": payload.delta,
            "stock": updated.stock,
        }),
    )
    .await;

    let settings = settings_service::load(&state.orm).await?;
    Ok(ApiResponse::item(
        "Inventory updated",
        Product::from_model(updated, &state.config.asset_base_url, &settings),
    ))
}

pub async fn dashboard(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<DashboardStats>> {
    ensure_admin(user)?;

    let products = Products::find().count(&state.orm).await? as i64;
    let users = Users::find().count(&state.orm).await? as i64;
    let low_stock = Products::find()
        .filter(ProdCol::Stock.lte(DEFAULT_LOW_STOCK_THRESHOLD))
        .count(&state.orm)
        .await? as i64;

    let orders_by_status: BTreeMap<String, i64> = Orders::find()
        .select_only()
        .column(OrderCol::Status)
        .column_as(Expr::col(OrderCol::Id).count(), "count")
        .group_by(OrderCol::Status)
        .into_tuple::<(String, i64)>()
        .all(&state.orm)
        .await?
        .into_iter()
        .collect();
    let orders = orders_by_status.values().sum();

    // SUM(bigint) is numeric in Postgres
    let revenue = Orders::find()
        .select_only()
        .column_as(Expr::cust("COALESCE(SUM(amount_paid), 0)::bigint"), "revenue")
        .filter(OrderCol::Status.ne(OrderStatus::Cancelled.as_str()))
        .into_tuple::<i64>()
        .one(&state.orm)
        .await?
        .unwrap_or(0);

    Ok(ApiResponse::item(
        "Dashboard",
        DashboardStats {
            products,
            users,
            orders,
            orders_by_status,
            revenue,
            revenue_display: pricing::format_inr(revenue),
            low_stock,
        },
    ))
}
