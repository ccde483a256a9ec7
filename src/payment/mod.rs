//! Payment gateway seam. Checkout talks to the gateway only through
//! [`PaymentGateway`], so the Razorpay client can be swapped for a fake in
//! tests.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use utoipa::ToSchema;

use crate::error::AppResult;

pub mod razorpay;
pub mod upi;

pub use razorpay::RazorpayClient;

type HmacSha256 = Hmac<Sha256>;

/// An order created on the gateway side, ready for the client checkout widget.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GatewayOrder {
    pub key_id: String,
    pub order_id: String,
    /// Amount in paise.
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn key_id(&self) -> &str;

    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> AppResult<GatewayOrder>;

    /// Check the signature the checkout widget hands back after payment.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}

/// `hex(HMAC_SHA256(secret, "{order_id}|{payment_id}"))`
pub fn payment_signature(secret: &str, order_id: &str, payment_id: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    match payment_signature(secret, order_id, payment_id) {
        Some(expected) => constant_time_eq(&expected, signature.trim()),
        None => false,
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_lowercase_hex_sha256() {
        let sig = payment_signature("secret", "order_1", "pay_1").expect("signature");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn verifies_matching_signature() {
        let sig = payment_signature("secret", "order_1", "pay_1").expect("signature");
        assert!(verify_payment_signature("secret", "order_1", "pay_1", &sig));
    }

    #[test]
    fn rejects_tampered_signatures() {
        let sig = payment_signature("secret", "order_1", "pay_1").expect("signature");
        assert!(!verify_payment_signature("other", "order_1", "pay_1", &sig));
        assert!(!verify_payment_signature("secret", "order_2", "pay_1", &sig));
        assert!(!verify_payment_signature("secret", "order_1", "pay_1", &sig[..63]));
        assert!(!verify_payment_signature("secret", "order_1", "pay_1", ""));
    }

    #[test]
    fn separator_is_part_of_the_message() {
        let a = payment_signature("secret", "order_1", "pay_1");
        let b = payment_signature("secret", "order_1|", "pay_1");
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_eq_compares_lengths() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
