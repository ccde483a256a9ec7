//! Checkout rules: order and payment states, how much is collected up front,
//! and the totals shown on the cart and checkout pages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{error::AppError, pricing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Prepaid,
    Cod,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Prepaid => "prepaid",
            PaymentMethod::Cod => "cod",
        }
    }

    /// Payment status once the gateway has confirmed the up-front amount.
    pub fn settled_status(&self) -> PaymentStatus {
        match self {
            PaymentMethod::Prepaid => PaymentStatus::Paid,
            PaymentMethod::Cod => PaymentStatus::AdvancePaid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Confirmed) | (Confirmed, Processing) | (Processing, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn transition(&self, next: OrderStatus) -> Result<OrderStatus, AppError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::BadRequest(format!(
                "Cannot move order from {self} to {next}"
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    AdvancePaid,
    Failed,
    RefundPending,
    AdvanceForfeited,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::AdvancePaid => "advance_paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::RefundPending => "refund_pending",
            PaymentStatus::AdvanceForfeited => "advance_forfeited",
        }
    }

    /// Status recorded when an order in this payment state is cancelled.
    /// A cash-on-delivery advance is never refunded.
    pub fn on_cancel(&self) -> PaymentStatus {
        match self {
            PaymentStatus::Paid => PaymentStatus::RefundPending,
            PaymentStatus::AdvancePaid => PaymentStatus::AdvanceForfeited,
            PaymentStatus::Pending => PaymentStatus::Failed,
            other => *other,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::AdvancePaid)
    }
}

macro_rules! str_enum {
    ($ty:ty, $label:literal, [$($variant:path),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim().to_ascii_lowercase();
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| AppError::BadRequest(format!("Invalid {}: {s}", $label)))
            }
        }
    };
}

str_enum!(PaymentMethod, "payment method", [PaymentMethod::Prepaid, PaymentMethod::Cod]);
str_enum!(
    OrderStatus,
    "order status",
    [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ]
);
str_enum!(
    PaymentStatus,
    "payment status",
    [
        PaymentStatus::Pending,
        PaymentStatus::Paid,
        PaymentStatus::AdvancePaid,
        PaymentStatus::Failed,
        PaymentStatus::RefundPending,
        PaymentStatus::AdvanceForfeited,
    ]
);

/// How an order total splits between the gateway payment and cash on delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PaymentPlan {
    pub method: PaymentMethod,
    pub total: i64,
    pub pay_now: i64,
    pub due_on_delivery: i64,
    /// Non-refundable part of `pay_now`.
    pub advance: i64,
}

impl PaymentPlan {
    pub fn for_method(total: i64, method: PaymentMethod, cod_advance: i64) -> Self {
        match method {
            PaymentMethod::Prepaid => Self {
                method,
                total,
                pay_now: total,
                due_on_delivery: 0,
                advance: 0,
            },
            PaymentMethod::Cod => {
                let advance = cod_advance.clamp(0, total.max(0));
                Self {
                    method,
                    total,
                    pay_now: advance,
                    due_on_delivery: total - advance,
                    advance,
                }
            }
        }
    }
}

/// One cart or order line as seen by the totals calculation.
#[derive(Debug, Clone, Copy)]
pub struct SummaryLine {
    pub quantity: i32,
    pub price: i64,
    pub mrp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CheckoutSummary {
    pub item_count: i64,
    pub subtotal: i64,
    pub mrp_total: i64,
    pub savings: i64,
    pub gst_included: i64,
    pub shipping: i64,
    pub total: i64,
    pub subtotal_display: String,
    pub mrp_total_display: String,
    pub savings_display: String,
    pub total_display: String,
}

pub fn summarize(lines: &[SummaryLine], gst_rate: u32) -> CheckoutSummary {
    let mut item_count = 0_i64;
    let mut subtotal = 0_i64;
    let mut mrp_total = 0_i64;
    for line in lines {
        let qty = i64::from(line.quantity.max(0));
        item_count += qty;
        subtotal += line.price * qty;
        mrp_total += line.mrp.max(line.price) * qty;
    }
    let shipping = 0;
    let total = subtotal + shipping;
    let savings = mrp_total - subtotal;

    CheckoutSummary {
        item_count,
        subtotal,
        mrp_total,
        savings,
        gst_included: pricing::gst_included(subtotal, gst_rate),
        shipping,
        total,
        subtotal_display: pricing::format_inr(subtotal),
        mrp_total_display: pricing::format_inr(mrp_total),
        savings_display: pricing::format_inr(savings),
        total_display: pricing::format_inr(total),
    }
}
