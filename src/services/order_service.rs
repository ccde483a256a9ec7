use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    audit,
    checkout::{self, OrderStatus, PaymentMethod, PaymentPlan, PaymentStatus},
    dto::orders::{
        CreateGatewayOrderRequest, GatewayCheckout, OrderList, OrderWithItems, UpiLink,
        VerifyPaymentRequest,
    },
    entity::{
        addresses::Model as AddressModel,
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        products::{Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, ProductAttrs},
    payment::upi,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{address_service, cart_service, product_service, settings_service, validate},
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = list_condition(&query)?.add(OrderCol::UserId.eq(user.user_id));
    page_orders(&state.orm, condition, &query).await
}

/// Status and payment method filters shared by the customer and admin lists.
pub fn list_condition(query: &OrderListQuery) -> AppResult<Condition> {
    let mut condition = Condition::all();
    if let Some(status) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status: OrderStatus = status.parse()?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }
    if let Some(method) = query.payment_method.as_deref().filter(|s| !s.trim().is_empty()) {
        let method: PaymentMethod = method.parse()?;
        condition = condition.add(OrderCol::PaymentMethod.eq(method.as_str()));
    }
    Ok(condition)
}

pub async fn page_orders<C: ConnectionTrait>(
    db: &C,
    condition: Condition,
    query: &OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(db).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(db)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    Ok(ApiResponse::success(
        "Orders",
        OrderList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn load_items<C: ConnectionTrait>(db: &C, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect())
}

async fn find_own_order<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    id: Uuid,
    lock: bool,
) -> AppResult<OrderModel> {
    let mut finder = Orders::find()
        .filter(OrderCol::Id.eq(id))
        .filter(OrderCol::UserId.eq(user_id));
    if lock {
        finder = finder.lock(LockType::Update);
    }
    finder.one(db).await?.ok_or(AppError::NotFound)
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = find_own_order(&state.orm, user.user_id, id, false).await?;
    let items = load_items(&state.orm, order.id).await?;
    Ok(ApiResponse::item(
        "OK",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
    ))
}

/// Fail when `quantity` units of `size` can no longer be sold.
fn ensure_available(product: &ProductModel, size: Option<&str>, quantity: i32) -> AppResult<()> {
    let available = ProductAttrs::from_model(product).available_units(product, size);
    if quantity <= available {
        return Ok(());
    }
    let message = if available <= 0 {
        format!("{} is out of stock", product.name)
    } else {
        format!("Only {available} left for {}", product.name)
    };
    Err(AppError::BadRequest(message))
}

fn address_snapshot(address: &AddressModel) -> Value {
    json!({
        "address_id": address.id,
        "name": address.name,
        "phone": address.phone,
        "line1": address.line1,
        "line2": address.line2,
        "landmark": address.landmark,
        "city": address.city,
        "state": address.state,
        "postal_code": address.postal_code,
        "country": address.country,
        "label": address.label,
    })
}

/// Gateway receipts are capped at 40 characters.
fn receipt_for(order_id: Uuid) -> String {
    format!("rcpt_{}", order_id.simple())
}

pub async fn create_gateway_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateGatewayOrderRequest,
) -> AppResult<ApiResponse<GatewayCheckout>> {
    let payment = &state.config.payment;

    let lines = cart_service::load_lines(&state.orm, user.user_id).await?;
    if lines.is_empty() {
        return Err(AppError::BadRequest("Your cart is empty".into()));
    }
    for (item, product) in &lines {
        ensure_available(product, item.size.as_deref(), item.quantity)?;
    }

    // the address picked at checkout becomes the default for next time
    let txn = state.orm.begin().await?;
    let address = match payload.address_id {
        Some(id) => address_service::make_default(&txn, user.user_id, id).await?,
        None => address_service::find_default(&txn, user.user_id)
            .await?
            .ok_or_else(|| AppError::BadRequest("Please add a delivery address".into()))?,
    };
    txn.commit().await?;

    let settings = settings_service::load(&state.orm).await?;
    let summary = checkout::summarize(
        &cart_service::summary_lines(&lines, &settings),
        payment.gst_rate,
    );
    let plan = PaymentPlan::for_method(
        summary.total,
        payload.payment_method,
        payment.cod_advance_amount,
    );
    if plan.pay_now <= 0 {
        return Err(AppError::BadRequest("Order total must be greater than zero".into()));
    }

    let order_id = Uuid::new_v4();
    let gateway = state
        .gateway
        .create_order(plan.pay_now, &payment.currency, &receipt_for(order_id))
        .await?;

    let txn = state.orm.begin().await?;
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        subtotal: Set(summary.subtotal),
        gst_amount: Set(summary.gst_included),
        total_amount: Set(summary.total),
        amount_paid: Set(0),
        advance_amount: Set(plan.advance),
        status: Set(OrderStatus::Pending.to_string()),
        payment_status: Set(PaymentStatus::Pending.to_string()),
        payment_method: Set(payload.payment_method.to_string()),
        payment_reference: Set(None),
        gateway_order_id: Set(Some(gateway.order_id.clone())),
        shipping_address: Set(address_snapshot(&address)),
        notes: Set(validate::optional(payload.notes)),
        stock_committed: Set(false),
        paid_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (item, product) in &lines {
        let row = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(Some(product.id)),
            product_name: Set(product.name.clone()),
            size: Set(item.size.clone()),
            height: Set(item.height.clone()),
            quantity: Set(item.quantity),
            price: Set(product.price),
            line_total: Set(product.price * i64::from(item.quantity)),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(OrderItem::from(row));
    }
    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        gateway_order_id = %gateway.order_id,
        amount = plan.pay_now,
        method = %plan.method,
        "checkout started"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "checkout_start",
        "orders",
        json!({
            "order_id": order.id,
            "gateway_order_id": gateway.order_id,
            "pay_now": plan.pay_now,
        }),
    )
    .await;

    Ok(ApiResponse::item(
        "Order created",
        GatewayCheckout {
            order: Order::from(order),
            items,
            gateway,
            plan,
        },
    ))
}

pub async fn verify_payment(
    state: &AppState,
    user: &AuthUser,
    payload: VerifyPaymentRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let gateway_order_id = validate::required("razorpay_order_id", &payload.razorpay_order_id)?;
    let payment_id = validate::required("razorpay_payment_id", &payload.razorpay_payment_id)?;

    let order = Orders::find()
        .filter(OrderCol::GatewayOrderId.eq(gateway_order_id.as_str()))
        .filter(OrderCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if !state
        .gateway
        .verify_signature(&gateway_order_id, &payment_id, payload.razorpay_signature.trim())
    {
        tracing::warn!(order_id = %order.id, "payment signature mismatch");
        audit::record(
            &state.orm,
            Some(user.user_id),
            "payment_verify_failed",
            "orders",
            json!({ "order_id": order.id, "payment_id": payment_id }),
        )
        .await;
        return Err(AppError::PaymentVerification);
    }

    let txn = state.orm.begin().await?;
    let order = find_own_order(&txn, user.user_id, order.id, true).await?;

    let payment_status: PaymentStatus = order.payment_status.parse()?;
    if payment_status.is_settled() {
        let items = load_items(&txn, order.id).await?;
        txn.commit().await?;
        return Ok(ApiResponse::item(
            "Payment already verified",
            OrderWithItems {
                order: Order::from(order),
                items,
            },
        ));
    }
    if payment_status == PaymentStatus::RefundPending {
        return Err(AppError::Conflict(
            "This payment could not be fulfilled and is being refunded".into(),
        ));
    }

    let status: OrderStatus = order.status.parse()?;
    let next = status.transition(OrderStatus::Confirmed)?;
    let method: PaymentMethod = order.payment_method.parse()?;
    let amount_paid =
        PaymentPlan::for_method(order.total_amount, method, order.advance_amount).pay_now;

    let lines = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;
    if let Err(err) = take_stock(&txn, &lines).await {
        txn.rollback().await?;
        let AppError::BadRequest(reason) = err else {
            return Err(err);
        };
        record_unfulfilled_payment(state, user, order.id, &payment_id, amount_paid, &reason)
            .await?;
        return Err(AppError::Conflict(format!(
            "{reason}. Your payment was received and will be refunded"
        )));
    }

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.status = Set(next.to_string());
    active.payment_status = Set(method.settled_status().to_string());
    active.amount_paid = Set(amount_paid);
    active.payment_reference = Set(Some(payment_id.clone()));
    active.paid_at = Set(Some(now.into()));
    active.stock_committed = Set(true);
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    let items = lines.into_iter().map(OrderItem::from).collect();
    txn.commit().await?;

    tracing::info!(order_id = %order.id, payment_id = %payment_id, "payment verified");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "payment_verified",
        "orders",
        json!({
            "order_id": order.id,
            "payment_id": payment_id,
            "amount_paid": order.amount_paid,
        }),
    )
    .await;

    Ok(ApiResponse::item(
        "Order placed",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
    ))
}

/// A verified payment whose stock is gone: keep the payment on the order and
/// cancel it with a refund owed.
async fn record_unfulfilled_payment(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    payment_id: &str,
    amount_paid: i64,
    reason: &str,
) -> AppResult<OrderModel> {
    let txn = state.orm.begin().await?;
    let order = find_own_order(&txn, user.user_id, order_id, true).await?;

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.to_string());
    active.payment_status = Set(PaymentStatus::RefundPending.to_string());
    active.amount_paid = Set(amount_paid);
    active.payment_reference = Set(Some(payment_id.to_string()));
    active.paid_at = Set(Some(now.into()));
    active.stock_committed = Set(false);
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;
    txn.commit().await?;

    tracing::warn!(
        order_id = %order.id,
        payment_id = %payment_id,
        reason = %reason,
        "paid order could not be fulfilled"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "payment_unfulfilled",
        "orders",
        json!({
            "order_id": order.id,
            "payment_id": payment_id,
            "amount_paid": amount_paid,
            "reason": reason,
        }),
    )
    .await;

    Ok(order)
}

/// Take each line's units out of stock under a row lock.
pub async fn take_stock<C: ConnectionTrait>(db: &C, lines: &[OrderItemModel]) -> AppResult<()> {
    for line in lines {
        let gone = || AppError::BadRequest(format!("{} is no longer available", line.product_name));
        let product_id = line.product_id.ok_or_else(gone)?;
        let product = Products::find_by_id(product_id)
            .lock(LockType::Update)
            .one(db)
            .await?
            .ok_or_else(gone)?;

        ensure_available(&product, line.size.as_deref(), line.quantity)?;
        product_service::apply_stock_shift(product, line.size.as_deref(), -line.quantity)?
            .update(db)
            .await?;
    }
    Ok(())
}

/// Put each line's units back. Lines whose product or size has since been
/// removed are skipped.
async fn restore_stock<C: ConnectionTrait>(db: &C, order_id: Uuid) -> AppResult<()> {
    let lines = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(db)
        .await?;

    for line in lines {
        let Some(product_id) = line.product_id else {
            continue;
        };
        let Some(product) = Products::find_by_id(product_id)
            .lock(LockType::Update)
            .one(db)
            .await?
        else {
            continue;
        };

        match product_service::apply_stock_shift(product, line.size.as_deref(), line.quantity) {
            Ok(active) => {
                active.update(db).await?;
            }
            Err(err) => {
                tracing::warn!(%order_id, %product_id, error = %err, "stock not restored");
            }
        }
    }
    Ok(())
}

/// Cancel `order`, restoring stock it had taken. Runs inside the caller's
/// transaction.
pub async fn cancel<C: ConnectionTrait>(db: &C, order: OrderModel) -> AppResult<OrderModel> {
    let status: OrderStatus = order.status.parse()?;
    let next = status.transition(OrderStatus::Cancelled)?;
    let payment_status: PaymentStatus = order.payment_status.parse()?;

    if order.stock_committed {
        restore_stock(db, order.id).await?;
    }

    let mut active: OrderActive = order.into();
    active.status = Set(next.to_string());
    active.payment_status = Set(payment_status.on_cancel().to_string());
    active.stock_committed = Set(false);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(db).await?)
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;
    let order = find_own_order(&txn, user.user_id, id, true).await?;

    let status: OrderStatus = order.status.parse()?;
    if !matches!(status, OrderStatus::Pending | OrderStatus::Confirmed) {
        return Err(AppError::BadRequest(format!(
            "A {status} order can no longer be cancelled"
        )));
    }

    let order = cancel(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_cancel",
        "orders",
        json!({ "order_id": order.id, "payment_status": order.payment_status }),
    )
    .await;

    Ok(ApiResponse::item("Order cancelled", Order::from(order)))
}

pub async fn upi_link(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<UpiLink>> {
    let payment = &state.config.payment;
    let vpa = payment
        .upi_payee_vpa
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("UPI payments are not configured".into()))?;

    let order = Order::from(find_own_order(&state.orm, user.user_id, id, false).await?);
    let note = format!("Order {}", &order.id.simple().to_string()[..8]);
    let link = upi::upi_intent(
        vpa,
        &payment.upi_payee_name,
        order.amount_due,
        &payment.currency,
        &note,
    )?;

    Ok(ApiResponse::item(
        "UPI link",
        UpiLink {
            amount: order.amount_due,
            link,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(in_stock: bool, stock: i32, sizes: Value, size_stock: Value) -> ProductModel {
        let now = Utc::now().fixed_offset();
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
            in_stock,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn availability_is_checked_per_size() {
        let p = product(true, 3, json!(["S", "M"]), json!({ "S": 0, "M": 3 }));
        assert!(ensure_available(&p, Some("M"), 3).is_ok());
        assert!(ensure_available(&p, Some("M"), 4).is_err());
        assert!(ensure_available(&p, Some("S"), 1).is_err());
    }

    #[test]
    fn hidden_products_cannot_be_bought() {
        let p = product(false, 10, json!([]), json!({}));
        assert!(ensure_available(&p, None, 1).is_err());
    }

    #[test]
    fn receipts_fit_the_gateway_limit() {
        let receipt = receipt_for(Uuid::new_v4());
        assert!(receipt.starts_with("rcpt_"));
        assert!(receipt.len() <= 40);
    }

    #[test]
    fn list_filters_reject_unknown_values() {
        let query = OrderListQuery {
            status: Some("shipped".into()),
            ..OrderListQuery::default()
        };
        assert!(list_condition(&query).is_err());

        let query = OrderListQuery {
            status: Some("Confirmed".into()),
            payment_method: Some("cod".into()),
            ..OrderListQuery::default()
        };
        assert!(list_condition(&query).is_ok());
    }
}
