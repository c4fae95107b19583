// Utility modules

use crate::{
    constants::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT},
    error::{AppError, Result},
};

/// Clamp an optional page limit into the allowed range.
pub fn clamp_page_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Normalize a chain address to its canonical lowercase form.
pub fn normalize_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("address must not be empty".to_string()));
    }

    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_part.is_empty() || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::Validation(format!(
            "address '{}' is not valid hex",
            trimmed
        )));
    }

    Ok(format!("0x{}", hex_part.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_page_limit_defaults() {
        assert_eq!(clamp_page_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_page_limit(Some(0)), 1);
        assert_eq!(clamp_page_limit(Some(-5)), 1);
        assert_eq!(clamp_page_limit(Some(5000)), MAX_LIST_LIMIT);
        assert_eq!(clamp_page_limit(Some(50)), 50);
    }

    #[test]
    fn test_normalize_address_lowercases() {
        let normalized = normalize_address("0xABCDEF1234").unwrap();
        assert_eq!(normalized, "0xabcdef1234");
    }

    #[test]
    fn test_normalize_address_adds_prefix() {
        let normalized = normalize_address("DeadBeef").unwrap();
        assert_eq!(normalized, "0xdeadbeef");
    }

    #[test]
    fn test_normalize_address_rejects_garbage() {
        assert!(normalize_address("").is_err());
        assert!(normalize_address("0x").is_err());
        assert!(normalize_address("not-an-address").is_err());
    }
}
