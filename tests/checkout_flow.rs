use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, Statement};
use serde_json::json;
use shopfront_api::{
    checkout::PaymentMethod,
    config::{AppConfig, PaymentConfig},
    db::{create_orm_conn, run_migrations},
    dto::{
        addresses::CreateAddressRequest,
        admin::{InventoryAdjustRequest, LowStockQuery},
        auth::RegisterRequest,
        cart::{AddToCartRequest, UpdateCartItemRequest},
        orders::{CreateGatewayOrderRequest, UpdateOrderStatusRequest, VerifyPaymentRequest},
    },
    entity::products::{ActiveModel as ProductActive, Entity as Products},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_USER},
    payment::{self, GatewayOrder, PaymentGateway},
    routes::params::OrderListQuery,
    services::{address_service, admin_service, auth_service, cart_service, order_service},
    state::AppState,
};
use uuid::Uuid;

const GATEWAY_SECRET: &str = "flow-test-secret";

/// Hands out sequential gateway order ids and checks signatures with the test secret.
struct FakeGateway {
    next: AtomicU32,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        "rzp_test_flow"
    }

    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        _receipt: &str,
    ) -> AppResult<GatewayOrder> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayOrder {
            key_id: self.key_id().to_string(),
            order_id: format!("order_flow_{n}"),
            amount,
            currency: currency.to_string(),
        })
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        payment::verify_payment_signature(GATEWAY_SECRET, order_id, payment_id, signature)
    }
}

fn verify_request(gateway_order_id: &str, payment_id: &str) -> VerifyPaymentRequest {
    VerifyPaymentRequest {
        razorpay_order_id: gateway_order_id.to_string(),
        razorpay_payment_id: payment_id.to_string(),
        razorpay_signature: payment::payment_signature(GATEWAY_SECRET, gateway_order_id, payment_id)
            .expect("signature"),
    }
}

fn address(name: &str, line1: &str) -> CreateAddressRequest {
    CreateAddressRequest {
        name: name.into(),
        phone: "+91 98765 43210".into(),
        line1: line1.into(),
        line2: None,
        landmark: None,
        city: "Jaipur".into(),
        state: "Rajasthan".into(),
        postal_code: "302001".into(),
        country: None,
        label: None,
        is_default: false,
    }
}

// Customer checks out prepaid and COD orders; admin walks one to completion.
#[tokio::test]
async fn checkout_verify_and_cancel_flow() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run the checkout flow."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let user_id = auth_service::ensure_user_with_role(
        &state.orm,
        "Asha",
        "asha@example.com",
        "password1",
        ROLE_USER,
    )
    .await?;
    let admin_id = auth_service::ensure_user_with_role(
        &state.orm,
        "Admin",
        "admin@example.com",
        "password1",
        ROLE_ADMIN,
    )
    .await?;
    let customer = AuthUser {
        user_id,
        role: ROLE_USER.into(),
    };
    let admin = AuthUser {
        user_id: admin_id,
        role: ROLE_ADMIN.into(),
    };

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set("Block Print Kurta".into()),
        description: Set(None),
        brand: Set(None),
        category: Set(Some("Kurtas".into())),
        price: Set(79_900),
        stock: Set(4),
        images: Set(json!([])),
        sizes: Set(json!(["S", "M"])),
        size_stock: Set(json!({ "S": 1, "M": 3 })),
        highlights: Set(json!([])),
        in_stock: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    // An empty cart cannot be checked out
    let err = order_service::create_gateway_order(
        &state,
        &customer,
        CreateGatewayOrderRequest {
            address_id: None,
            payment_method: PaymentMethod::Prepaid,
            notes: None,
        },
    )
    .await
    .err()
    .expect("request should fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
            size: Some("M".into()),
            height: None,
        },
    )
    .await?;

    // Asking for more than the size holds is refused
    let err = cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
            size: Some("M".into()),
            height: None,
        },
    )
    .await
    .err()
    .expect("request should fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    // No address yet
    let err = order_service::create_gateway_order(
        &state,
        &customer,
        CreateGatewayOrderRequest {
            address_id: None,
            payment_method: PaymentMethod::Prepaid,
            notes: None,
        },
    )
    .await
    .err()
    .expect("request should fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    let home = address_service::create_address(&state, &customer, address("Asha", "1 MI Road"))
        .await?
        .data
        .expect("address");
    assert!(home.is_default, "first address becomes the default");
    let office =
        address_service::create_address(&state, &customer, address("Asha", "9 Tonk Road"))
            .await?
            .data
            .expect("address");
    assert!(!office.is_default);

    // Prepaid checkout to the office address
    let checkout = order_service::create_gateway_order(
        &state,
        &customer,
        CreateGatewayOrderRequest {
            address_id: Some(office.id),
            payment_method: PaymentMethod::Prepaid,
            notes: Some("Gift wrap".into()),
        },
    )
    .await?
    .data
    .expect("checkout");
    assert_eq!(checkout.plan.pay_now, 159_800);
    assert_eq!(checkout.gateway.amount, 159_800);
    assert_eq!(checkout.order.status, "pending");
    assert_eq!(checkout.items.len(), 1);
    assert_eq!(checkout.order.shipping_address["line1"], "9 Tonk Road");

    let addresses = address_service::list_addresses(&state, &customer)
        .await?
        .data
        .expect("addresses");
    let defaults: Vec<_> = addresses.items.iter().filter(|a| a.is_default).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].id, office.id);

    // A forged signature leaves the order untouched
    let gateway_order_id = checkout.gateway.order_id.clone();
    let mut forged = verify_request(&gateway_order_id, "pay_flow_1");
    forged.razorpay_signature = "0".repeat(64);
    let err = order_service::verify_payment(&state, &customer, forged)
        .await
        .err()
        .expect("request should fail");
    assert!(matches!(err, AppError::PaymentVerification));

    let pending = order_service::get_order(&state, &customer, checkout.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(pending.order.status, "pending");
    assert_eq!(pending.order.payment_status, "pending");

    let verified = order_service::verify_payment(
        &state,
        &customer,
        verify_request(&gateway_order_id, "pay_flow_1"),
    )
    .await?
    .data
    .expect("verified order");
    assert_eq!(verified.order.status, "confirmed");
    assert_eq!(verified.order.payment_status, "paid");
    assert_eq!(verified.order.amount_paid, 159_800);
    assert_eq!(verified.order.amount_due, 0);
    assert_eq!(verified.order.payment_reference.as_deref(), Some("pay_flow_1"));

    let cart = cart_service::get_cart(&state, &customer).await?.data.expect("cart");
    assert!(cart.items.is_empty());

    let stocked = Products::find_by_id(product.id)
        .one(&state.orm)
        .await?
        .expect("product");
    assert_eq!(stocked.stock, 2);
    assert_eq!(stocked.size_stock["M"], 1);

    // Replaying the callback does not take stock twice
    let replay = order_service::verify_payment(
        &state,
        &customer,
        verify_request(&gateway_order_id, "pay_flow_1"),
    )
    .await?;
    assert_eq!(replay.message, "Payment already verified");
    let stocked = Products::find_by_id(product.id)
        .one(&state.orm)
        .await?
        .expect("product");
    assert_eq!(stocked.stock, 2);

    // Admin cannot skip processing
    let err = admin_service::update_order_status(
        &state,
        &admin,
        checkout.order.id,
        UpdateOrderStatusRequest {
            status: "completed".into(),
        },
    )
    .await
    .err()
    .expect("request should fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = admin_service::update_order_status(
        &state,
        &customer,
        checkout.order.id,
        UpdateOrderStatusRequest {
            status: "processing".into(),
        },
    )
    .await
    .err()
    .expect("request should fail");
    assert!(matches!(err, AppError::Forbidden));

    for status in ["processing", "completed"] {
        let updated = admin_service::update_order_status(
            &state,
            &admin,
            checkout.order.id,
            UpdateOrderStatusRequest {
                status: status.into(),
            },
        )
        .await?
        .data
        .expect("order");
        assert_eq!(updated.status, status);
    }

    let err = admin_service::cancel_order(&state, &admin, checkout.order.id)
        .await
        .err()
        .expect("request should fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    // Cash on delivery: only the advance goes through the gateway
    cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
            size: Some("S".into()),
            height: Some("5'4\"".into()),
        },
    )
    .await?;
    let cod = order_service::create_gateway_order(
        &state,
        &customer,
        CreateGatewayOrderRequest {
            address_id: None,
            payment_method: PaymentMethod::Cod,
            notes: None,
        },
    )
    .await?
    .data
    .expect("checkout");
    assert_eq!(cod.plan.pay_now, 20_000);
    assert_eq!(cod.plan.due_on_delivery, 59_900);
    assert_ne!(cod.gateway.order_id, gateway_order_id);

    let cod_order = order_service::verify_payment(
        &state,
        &customer,
        verify_request(&cod.gateway.order_id, "pay_flow_2"),
    )
    .await?
    .data
    .expect("verified order")
    .order;
    assert_eq!(cod_order.payment_status, "advance_paid");
    assert_eq!(cod_order.amount_paid, 20_000);
    assert_eq!(cod_order.amount_due, 59_900);

    let stocked = Products::find_by_id(product.id)
        .one(&state.orm)
        .await?
        .expect("product");
    assert_eq!(stocked.stock, 1);
    assert_eq!(stocked.size_stock["S"], 0);

    // Cancelling forfeits the advance and puts the kurta back
    let cancelled = order_service::cancel_order(&state, &customer, cod_order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(cancelled.payment_status, "advance_forfeited");
    assert_eq!(cancelled.amount_due, 0);

    let stocked = Products::find_by_id(product.id)
        .one(&state.orm)
        .await?
        .expect("product");
    assert_eq!(stocked.stock, 2);
    assert_eq!(stocked.size_stock["S"], 1);

    let mine = order_service::list_orders(&state, &customer, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    assert_eq!(mine.items.len(), 2);

    let cancelled_only = order_service::list_orders(
        &state,
        &customer,
        OrderListQuery {
            status: Some("cancelled".into()),
            ..OrderListQuery::default()
        },
    )
    .await?
    .data
    .expect("orders");
    assert_eq!(cancelled_only.items.len(), 1);

    let stats = admin_service::dashboard(&state, &admin)
        .await?
        .data
        .expect("dashboard");
    assert_eq!(stats.revenue, 159_800);
    assert_eq!(stats.orders, 2);
    assert_eq!(stats.orders_by_status.get("completed"), Some(&1));

    let low = admin_service::list_low_stock(
        &state,
        &admin,
        LowStockQuery {
            page: Some(1),
            per_page: Some(20),
            threshold: None,
        },
    )
    .await?
    .data
    .expect("low stock");
    assert!(
        low.items.iter().any(|p| p.id == product.id),
        "expected product to appear in low-stock list"
    );

    // The same email cannot register twice, whatever its case
    let err = auth_service::register_user(
        &state,
        RegisterRequest {
            name: "Asha Again".into(),
            email: " ASHA@example.com ".into(),
            phone: None,
            password: "password1".into(),
        },
    )
    .await
    .err()
    .expect("request should fail");
    assert!(matches!(err, AppError::Conflict(_)));

    // Removing the last cart line leaves an empty cart
    let line = cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
            size: Some("S".into()),
            height: None,
        },
    )
    .await?
    .data
    .expect("cart line");
    cart_service::remove_from_cart(&state, &customer, line.id).await?;
    let cart = cart_service::get_cart(&state, &customer).await?.data.expect("cart");
    assert!(cart.items.is_empty());
    assert_eq!(cart.summary.item_count, 0);
    assert_eq!(cart.summary.total, 0);

    // Deleting the default address promotes the newest remaining one
    let studio =
        address_service::create_address(&state, &customer, address("Asha", "4 Station Road"))
            .await?
            .data
            .expect("address");
    let deleted = address_service::delete_address(&state, &customer, office.id)
        .await?
        .data
        .expect("deleted");
    assert_eq!(deleted["default_address_id"], json!(studio.id));

    // Concurrent default switches leave exactly one default
    let mut warehouse = address("Asha", "12 Sitapura");
    warehouse.is_default = true;
    let (switched, created) = tokio::join!(
        address_service::set_default_address(&state, &customer, home.id),
        address_service::create_address(&state, &customer, warehouse),
    );
    switched?;
    created?;
    let addresses = address_service::list_addresses(&state, &customer)
        .await?
        .data
        .expect("addresses");
    assert_eq!(addresses.items.len(), 3);
    assert_eq!(addresses.items.iter().filter(|a| a.is_default).count(), 1);

    // Paid, but the last unit went before verification
    let dupatta = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set("Silk Dupatta".into()),
        description: Set(None),
        brand: Set(None),
        category: Set(Some("Dupattas".into())),
        price: Set(129_900),
        stock: Set(1),
        images: Set(json!([])),
        sizes: Set(json!([])),
        size_stock: Set(json!({})),
        highlights: Set(json!([])),
        in_stock: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    let line = cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: dupatta.id,
            quantity: 1,
            size: None,
            height: None,
        },
    )
    .await?
    .data
    .expect("cart line");
    let late = order_service::create_gateway_order(
        &state,
        &customer,
        CreateGatewayOrderRequest {
            address_id: None,
            payment_method: PaymentMethod::Prepaid,
            notes: None,
        },
    )
    .await?
    .data
    .expect("checkout");
    admin_service::adjust_inventory(
        &state,
        &admin,
        dupatta.id,
        InventoryAdjustRequest {
            delta: -1,
            size: None,
        },
    )
    .await?;

    let err = order_service::verify_payment(
        &state,
        &customer,
        verify_request(&late.gateway.order_id, "pay_flow_3"),
    )
    .await
    .err()
    .expect("request should fail");
    assert!(matches!(err, AppError::Conflict(_)));

    let refunded = order_service::get_order(&state, &customer, late.order.id)
        .await?
        .data
        .expect("order")
        .order;
    assert_eq!(refunded.status, "cancelled");
    assert_eq!(refunded.payment_status, "refund_pending");
    assert_eq!(refunded.amount_paid, 129_900);
    assert_eq!(refunded.payment_reference.as_deref(), Some("pay_flow_3"));
    assert!(refunded.paid_at.is_some());

    let err = order_service::verify_payment(
        &state,
        &customer,
        verify_request(&late.gateway.order_id, "pay_flow_3"),
    )
    .await
    .err()
    .expect("request should fail");
    assert!(matches!(err, AppError::Conflict(_)));

    let stocked = Products::find_by_id(dupatta.id)
        .one(&state.orm)
        .await?
        .expect("product");
    assert_eq!(stocked.stock, 0);

    // Setting the quantity to zero drops the line too
    cart_service::update_cart_item(
        &state,
        &customer,
        line.id,
        UpdateCartItemRequest {
            quantity: 0,
            size: None,
            height: None,
        },
    )
    .await?;
    let cart = cart_service::get_cart(&state, &customer).await?.data.expect("cart");
    assert!(cart.items.is_empty());
    assert_eq!(cart.summary.total, 0);

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs; the settings row is kept
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, cart_items, addresses, contact_messages, \
         audit_logs, products, users CASCADE",
    ))
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        public_base_url: "http://localhost:8080".into(),
        asset_base_url: "http://localhost:8080/uploads".into(),
        upload_dir: std::env::temp_dir().to_string_lossy().into_owned(),
        jwt_secret: "flow-jwt-secret".into(),
        jwt_ttl_hours: 1,
        cors_origins: Vec::new(),
        payment: PaymentConfig {
            razorpay_key_id: "rzp_test_flow".into(),
            razorpay_key_secret: GATEWAY_SECRET.into(),
            razorpay_api_base: "http://localhost:9".into(),
            currency: "INR".into(),
            gst_rate: 5,
            cod_advance_amount: 20_000,
            upi_payee_vpa: None,
            upi_payee_name: "Shopfront".into(),
        },
    };

    Ok(AppState {
        orm,
        config: Arc::new(config),
        gateway: Arc::new(FakeGateway {
            next: AtomicU32::new(1),
        }),
    })
}
