//! Input validation for submitted forms.
//!
//! Checks return `Err(message)` with text fit for a flash message. Use
//! `ValidationErrorBuilder` from the `error` module to gather several.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

use crate::db::parse_amount;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_CATEGORY_NAME_LEN: usize = 64;
/// Largest magnitude accepted for any amount or setting (10^15)
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);
const MAX_EMAIL_LEN: usize = 254;

lazy_static! {
    /// Basic address shape: something@domain.tld, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)+$"
    ).unwrap();
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.trim().is_empty() {
        return Err("Username is required.".to_string());
    }
    if username.len() > 64 {
        return Err("Username is too long (max 64 characters).".to_string());
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required.".to_string());
    }
    if email.len() > MAX_EMAIL_LEN || !EMAIL_REGEX.is_match(email) {
        return Err("Email address is not valid.".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        ));
    }
    Ok(())
}

pub fn validate_security_answer(answer: &str) -> Result<(), String> {
    if answer.trim().is_empty() {
        return Err("Security answer is required.".to_string());
    }
    Ok(())
}

pub fn validate_category_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Category name is required.".to_string());
    }
    if name.chars().count() > MAX_CATEGORY_NAME_LEN {
        return Err(format!(
            "Category name is too long (max {} characters).",
            MAX_CATEGORY_NAME_LEN
        ));
    }
    Ok(())
}

/// Keep submitted numbers in a range where ledger totals cannot overflow
pub fn validate_amount(label: &str, value: Decimal) -> Result<(), String> {
    if value.abs() > MAX_AMOUNT {
        return Err(format!("{} is too large (max {}).", label, MAX_AMOUNT));
    }
    Ok(())
}

/// Parse a submitted amount: numeric and within `MAX_AMOUNT`
pub fn parse_amount_input(label: &str, raw: &str) -> Result<Decimal, String> {
    let value = parse_amount(raw).ok_or_else(|| format!("{} must be a number.", label))?;
    validate_amount(label, value)?;
    Ok(value)
}

/// Parse a numeric form field. A missing field counts as zero; a present
/// but empty, non-numeric or oversized one is an error.
pub fn parse_decimal_field(label: &str, raw: Option<&str>) -> Result<Decimal, String> {
    match raw {
        None => Ok(Decimal::ZERO),
        Some(value) => parse_amount_input(label, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a.b+tag@mail.example.co").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("alice").is_err());
        assert!(validate_email("alice@localhost").is_err());
        assert!(validate_email("al ice@example.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("1234567").is_err());
    }

    #[test]
    fn test_validate_username_and_answer() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("   ").is_err());
        assert!(validate_security_answer("Rex").is_ok());
        assert!(validate_security_answer("").is_err());
    }

    #[test]
    fn test_validate_category_name() {
        assert!(validate_category_name("Food").is_ok());
        assert!(validate_category_name(" ").is_err());
        assert!(validate_category_name(&"x".repeat(65)).is_err());
        assert!(validate_category_name(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn test_parse_decimal_field() {
        assert_eq!(parse_decimal_field("Saving", None), Ok(Decimal::ZERO));
        assert_eq!(
            parse_decimal_field("Saving", Some("12.50")),
            Ok(Decimal::new(1250, 2))
        );
        assert!(parse_decimal_field("Saving", Some("")).is_err());
        assert!(parse_decimal_field("Saving", Some("ten")).is_err());
    }

    #[test]
    fn test_amounts_are_capped() {
        assert_eq!(MAX_AMOUNT, Decimal::from(1_000_000_000_000_000i64));
        assert_eq!(
            parse_amount_input("Amount", "1000000000000000"),
            Ok(MAX_AMOUNT)
        );
        assert_eq!(
            parse_amount_input("Amount", "-1000000000000000"),
            Ok(-MAX_AMOUNT)
        );
        assert!(parse_amount_input("Amount", "1000000000000000.01").is_err());
        assert!(parse_amount_input("Amount", "1000000000000000000000000000").is_err());
        assert!(parse_amount_input("Amount", "1e27").is_err());
        assert!(parse_decimal_field("Saving percent", Some("-1e20")).is_err());
    }
}
