use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    checkout::{PaymentMethod, PaymentPlan},
    models::{Order, OrderItem},
    payment::GatewayOrder,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateGatewayOrderRequest {
    pub address_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GatewayCheckout {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub gateway: GatewayOrder,
    pub plan: PaymentPlan,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpiLink {
    pub amount: i64,
    pub link: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EditOrderRequest {
    pub notes: Option<String>,
    pub payment_reference: Option<String>,
}
