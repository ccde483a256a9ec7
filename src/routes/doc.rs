use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    checkout::{CheckoutSummary, OrderStatus, PaymentMethod, PaymentPlan, PaymentStatus},
    dto::{
        addresses::{AddressList, CreateAddressRequest, UpdateAddressRequest},
        admin::{DashboardStats, InventoryAdjustRequest, LowStockList, LowStockQuery},
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
        contact::{ContactList, ContactRequest},
        orders::{
            CreateGatewayOrderRequest, EditOrderRequest, GatewayCheckout, OrderList,
            OrderWithItems, UpiLink, UpdateOrderStatusRequest, VerifyPaymentRequest,
        },
        products::{CategoryList, ProductList, ProductUpload},
        settings::UpdateSettingsRequest,
    },
    models::{
        Address, CartItem, ContactMessage, Highlight, Order, OrderItem, Product, Settings, User,
    },
    payment::GatewayOrder,
    pricing::PriceDisplay,
    response::{ApiResponse, Meta},
    routes::{addresses, admin, auth, cart, contact, health, orders, params, products, settings},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::me,
        products::list_products,
        products::list_categories,
        products::get_product,
        settings::get_settings,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        addresses::list_addresses,
        addresses::create_address,
        addresses::update_address,
        addresses::set_default_address,
        addresses::delete_address,
        orders::list_orders,
        orders::create_razorpay_order,
        orders::verify_payment,
        orders::get_order,
        orders::cancel_order,
        orders::upi_link,
        contact::submit_contact,
        admin::admin_login,
        admin::dashboard,
        admin::create_product,
        admin::update_product,
        admin::delete_product,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::edit_order,
        admin::update_order_status,
        admin::confirm_order,
        admin::cancel_order,
        admin::update_settings,
        admin::list_contact
    ),
    components(
        schemas(
            User,
            Product,
            PriceDisplay,
            Highlight,
            CartItem,
            Address,
            Order,
            OrderItem,
            Settings,
            ContactMessage,
            OrderStatus,
            PaymentStatus,
            PaymentMethod,
            PaymentPlan,
            CheckoutSummary,
            GatewayOrder,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            ProductList,
            CategoryList,
            ProductUpload,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartView,
            CartLine,
            CreateAddressRequest,
            UpdateAddressRequest,
            AddressList,
            CreateGatewayOrderRequest,
            GatewayCheckout,
            VerifyPaymentRequest,
            OrderWithItems,
            OrderList,
            UpiLink,
            UpdateOrderStatusRequest,
            EditOrderRequest,
            UpdateSettingsRequest,
            ContactRequest,
            ContactList,
            LowStockQuery,
            InventoryAdjustRequest,
            LowStockList,
            DashboardStats,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            health::HealthData,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartView>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<GatewayCheckout>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and login"),
        (name = "Products", description = "Catalogue browsing"),
        (name = "Settings", description = "Storefront discount and banner"),
        (name = "Cart", description = "Shopping cart of the signed-in user"),
        (name = "Addresses", description = "Saved delivery addresses"),
        (name = "Orders", description = "Checkout, payment verification and order tracking"),
        (name = "Contact", description = "Contact form"),
        (name = "Admin", description = "Admin dashboard endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
