//! Razorpay Orders API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GatewayOrder, PaymentGateway, verify_payment_signature};
use crate::{
    config::PaymentConfig,
    error::{AppError, AppResult},
};

#[derive(Clone)]
pub struct RazorpayClient {
    client: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: bool,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

impl RazorpayClient {
    pub fn new(config: &PaymentConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            api_base: config.razorpay_api_base.clone(),
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> AppResult<GatewayOrder> {
        if amount <= 0 {
            return Err(AppError::BadRequest("Nothing to pay".into()));
        }
        let url = format!("{}/orders", self.api_base);
        let body = CreateOrderBody {
            amount,
            currency,
            receipt,
            payment_capture: true,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("{} {}", status.as_u16(), message)));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        tracing::debug!(
            gateway_order_id = %order.id,
            amount = order.amount,
            "gateway order created"
        );

        Ok(GatewayOrder {
            key_id: self.key_id.clone(),
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
        })
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_payment_signature(&self.key_secret, order_id, payment_id, signature)
    }
}
