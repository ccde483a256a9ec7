//! Price formatting and the storewide discount display.
//!
//! The database price is always what the customer pays. When the storewide
//! discount is enabled, products are shown next to a crossed-out "original"
//! price derived from the real one.

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::Settings;

const PAISE_PER_RUPEE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PriceDisplay {
    /// Amount charged, in paise.
    pub price: i64,
    pub new_price: String,
    pub original_price: Option<i64>,
    pub old_price: Option<String>,
    pub discount_percentage: Option<i32>,
}

impl PriceDisplay {
    pub fn new(price: i64, settings: &Settings) -> Self {
        let pct = settings.active_discount();
        let original = pct
            .map(|pct| marked_up_price(price, pct))
            .filter(|original| *original > price);

        Self {
            price,
            new_price: format_inr(price),
            original_price: original,
            old_price: original.map(format_inr),
            discount_percentage: original.and(pct),
        }
    }

    /// The amount shown as the pre-discount price, or the real price.
    pub fn mrp(&self) -> i64 {
        self.original_price.unwrap_or(self.price)
    }
}

/// Cosmetic pre-discount price for `price` at `pct` percent off, rounded up
/// to a whole rupee. Out-of-range percentages leave the price unchanged.
pub fn marked_up_price(price: i64, pct: i32) -> i64 {
    if pct <= 0 || pct >= 100 || price <= 0 {
        return price;
    }
    let divisor = i64::from(100 - pct);
    let raw = (price * 100 + divisor - 1) / divisor;
    (raw + PAISE_PER_RUPEE - 1) / PAISE_PER_RUPEE * PAISE_PER_RUPEE
}

/// GST contained in a GST-inclusive amount.
pub fn gst_included(amount: i64, rate: u32) -> i64 {
    if amount <= 0 || rate == 0 {
        return 0;
    }
    let rate = i64::from(rate);
    let denom = 100 + rate;
    (amount * rate + denom / 2) / denom
}

/// Format paise as rupees with Indian digit grouping, e.g. `₹1,23,456.50`.
pub fn format_inr(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let abs = paise.unsigned_abs();
    let rupees = abs / PAISE_PER_RUPEE as u64;
    let fraction = abs % PAISE_PER_RUPEE as u64;

    let grouped = group_indian(&rupees.to_string());
    if fraction == 0 {
        format!("{sign}₹{grouped}")
    } else {
        format!("{sign}₹{grouped}.{fraction:02}")
    }
}

fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled: bool, pct: i32) -> Settings {
        Settings {
            discount_enabled: enabled,
            discount_percentage: pct,
            banner_text: None,
            banner_enabled: false,
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn formats_with_indian_grouping() {
        assert_eq!(format_inr(0), "₹0");
        assert_eq!(format_inr(99_900), "₹999");
        assert_eq!(format_inr(129_900), "₹1,299");
        assert_eq!(format_inr(12_345_600), "₹1,23,456");
        assert_eq!(format_inr(1_234_567_800), "₹1,23,45,678");
        assert_eq!(format_inr(1_250), "₹12.50");
        assert_eq!(format_inr(-5_000), "-₹50");
    }

    #[test]
    fn marks_up_to_whole_rupees() {
        // 799 at 20% off shows as 999.
        assert_eq!(marked_up_price(79_900, 20), 99_900);
        // 1000 at 50% off is exactly 2000.
        assert_eq!(marked_up_price(100_000, 50), 200_000);
        assert_eq!(marked_up_price(100_000, 0), 100_000);
        assert_eq!(marked_up_price(100_000, 100), 100_000);
        assert_eq!(marked_up_price(100_000, -5), 100_000);
    }

    #[test]
    fn display_without_discount_has_no_old_price() {
        let display = PriceDisplay::new(49_900, &settings(false, 30));
        assert_eq!(display.new_price, "₹499");
        assert_eq!(display.old_price, None);
        assert_eq!(display.mrp(), 49_900);
    }

    #[test]
    fn display_with_discount_shows_old_price() {
        let display = PriceDisplay::new(79_900, &settings(true, 20));
        assert_eq!(display.price, 79_900);
        assert_eq!(display.old_price.as_deref(), Some("₹999"));
        assert_eq!(display.discount_percentage, Some(20));
        assert_eq!(display.mrp(), 99_900);
    }

    #[test]
    fn gst_is_extracted_from_inclusive_amounts() {
        assert_eq!(gst_included(118_000, 18), 18_000);
        assert_eq!(gst_included(105_000, 5), 5_000);
        assert_eq!(gst_included(100_000, 0), 0);
        assert_eq!(gst_included(0, 18), 0);
    }
}
