use reqwest::Url;

use crate::error::{AppError, AppResult};

/// Build a `upi://pay` intent link for `amount` paise.
pub fn upi_intent(
    vpa: &str,
    payee_name: &str,
    amount: i64,
    currency: &str,
    note: &str,
) -> AppResult<String> {
    if amount <= 0 {
        return Err(AppError::BadRequest("Nothing is due for this order".into()));
    }
    let amount = format!("{}.{:02}", amount / 100, amount % 100);
    let url = Url::parse_with_params(
        "upi://pay",
        &[
            ("pa", vpa),
            ("pn", payee_name),
            ("am", amount.as_str()),
            ("cu", currency),
            ("tn", note),
        ],
    )
    .map_err(|e| AppError::Internal(e.into()))?;
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_encoded_intent() {
        let link = upi_intent("shop@upi", "Cotton Store", 130_050, "INR", "Order ABC").unwrap();
        assert!(link.starts_with("upi://pay?"));
        assert!(link.contains("pa=shop%40upi"));
        assert!(link.contains("pn=Cotton+Store"));
        assert!(link.contains("am=1300.50"));
        assert!(link.contains("cu=INR"));
    }

    #[test]
    fn rejects_zero_amounts() {
        assert!(upi_intent("shop@upi", "Store", 0, "INR", "x").is_err());
    }
}
