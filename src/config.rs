use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub public_base_url: String,
    pub asset_base_url: String,
    pub upload_dir: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub cors_origins: Vec<String>,
    pub payment: PaymentConfig,
}

/// Gateway credentials and the money rules applied at checkout.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_api_base: String,
    pub currency: String,
    /// Percent of GST already contained in catalogue prices.
    pub gst_rate: u32,
    /// Paise collected up front for cash-on-delivery orders.
    pub cod_advance_amount: i64,
    pub upi_payee_vpa: Option<String>,
    pub upi_payee_name: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let public_base_url = optional("PUBLIC_BASE_URL")
            .map(|url| trim_base(&url))
            .unwrap_or_else(|| format!("http://{host}:{port}"));
        let asset_base_url = optional("ASSET_BASE_URL")
            .map(|url| trim_base(&url))
            .unwrap_or_else(|| public_base_url.clone());

        let payment = PaymentConfig {
            razorpay_key_id: env::var("RAZORPAY_KEY_ID").context("RAZORPAY_KEY_ID is not set")?,
            razorpay_key_secret: env::var("RAZORPAY_KEY_SECRET")
                .context("RAZORPAY_KEY_SECRET is not set")?,
            razorpay_api_base: optional("RAZORPAY_API_BASE")
                .map(|url| trim_base(&url))
                .unwrap_or_else(|| "https://api.razorpay.com/v1".to_string()),
            currency: optional("CURRENCY").unwrap_or_else(|| "INR".to_string()),
            gst_rate: parse_or("GST_RATE", 18)?,
            cod_advance_amount: parse_or("COD_ADVANCE_AMOUNT", 20_000)?,
            upi_payee_vpa: optional("UPI_PAYEE_VPA"),
            upi_payee_name: optional("UPI_PAYEE_NAME").unwrap_or_else(|| "Store".to_string()),
        };
        if payment.cod_advance_amount < 0 {
            anyhow::bail!("COD_ADVANCE_AMOUNT must not be negative");
        }

        Ok(Self {
            database_url,
            host,
            port,
            public_base_url,
            asset_base_url,
            upload_dir: optional("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            jwt_ttl_hours: parse_or("JWT_TTL_HOURS", 24)?,
            cors_origins: optional("CORS_ORIGINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            payment,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slashes() {
        assert_eq!(trim_base("https://cdn.example.com//"), "https://cdn.example.com");
        assert_eq!(trim_base(" http://x "), "http://x");
    }

    #[test]
    fn splits_origin_lists() {
        assert_eq!(
            split_list("https://a.test, https://b.test,,"),
            vec!["https://a.test".to_string(), "https://b.test".to_string()]
        );
        assert!(split_list(" , ").is_empty());
    }
}
