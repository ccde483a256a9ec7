//! Small input checks shared by the services.

use crate::error::{AppError, AppResult};

/// Trimmed, lower-cased email with a non-empty local part and a dotted domain.
pub fn email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    let valid = !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace);
    if valid {
        Ok(email)
    } else {
        Err(AppError::BadRequest("Please enter a valid email address".into()))
    }
}

pub fn required(field: &str, raw: &str) -> AppResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Blank optional strings are stored as NULL.
pub fn optional(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn postal_code(raw: &str) -> AppResult<String> {
    let value = raw.trim().to_uppercase();
    let len = value.chars().filter(|c| !c.is_whitespace()).count();
    let charset_ok = value.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ');
    if (4..=10).contains(&len) && charset_ok {
        Ok(value)
    } else {
        Err(AppError::BadRequest("postal_code is invalid".into()))
    }
}

pub fn phone(raw: &str) -> AppResult<String> {
    let value = required("phone", raw)?;
    let digits = value.chars().filter(char::is_ascii_digit).count();
    let charset_ok = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if (7..=15).contains(&digits) && charset_ok {
        Ok(value)
    } else {
        Err(AppError::BadRequest("phone is invalid".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_emails() {
        assert_eq!(email("  Asha@Example.COM ").ok().as_deref(), Some("asha@example.com"));
        assert!(email("asha").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("asha@localhost").is_err());
        assert!(email("asha@example.").is_err());
        assert!(email("as ha@example.com").is_err());
    }

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("name", "  Asha ").ok().as_deref(), Some("Asha"));
        assert!(required("name", "   ").is_err());
        assert_eq!(optional(Some("  ".into())), None);
        assert_eq!(optional(Some(" x ".into())).as_deref(), Some("x"));
    }

    #[test]
    fn checks_postal_codes() {
        assert_eq!(postal_code("560001").ok().as_deref(), Some("560001"));
        assert_eq!(postal_code("sw1a 1aa").ok().as_deref(), Some("SW1A 1AA"));
        assert!(postal_code("12").is_err());
        assert!(postal_code("5600-01").is_err());
    }

    #[test]
    fn checks_phone_numbers() {
        assert!(phone("+91 98765 43210").is_ok());
        assert!(phone("12345").is_err());
        assert!(phone("98765abc43").is_err());
    }
}
