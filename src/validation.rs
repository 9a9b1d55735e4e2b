use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::{error::VALIDATION_TIME_RANGE, AppError, AppResult};

static MIME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._+-]+/[a-zA-Z0-9._+-]+$").expect("mime validation pattern to compile")
});

static COUPON_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").expect("coupon code pattern to compile"));

/// Trimmed, non-empty text or a `VALIDATION/MISSING_FIELD` error.
pub fn required_text(value: Option<&str>, field: &str) -> AppResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::missing_field(field)),
    }
}

/// A present-but-blank string is rejected; absence is allowed.
pub fn optional_non_blank(value: Option<&str>, field: &str) -> AppResult<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Err(AppError::invalid_field(
            field,
            format!("'{field}' cannot be blank"),
        )),
        Some(v) => Ok(Some(v.trim().to_string())),
    }
}

pub fn max_chars(value: &str, field: &str, max: usize) -> AppResult<()> {
    let len = value.chars().count();
    if len > max {
        return Err(AppError::invalid_field(
            field,
            format!("'{field}' may be at most {max} characters"),
        )
        .with_context("length", len.to_string()));
    }
    Ok(())
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn email(raw: &str, field: &str) -> AppResult<String> {
    let normalized = normalize_email(raw);
    let valid = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !normalized.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(normalized)
    } else {
        Err(AppError::invalid_field(field, "Email address is not valid"))
    }
}

pub fn non_negative_f64(value: f64, field: &str) -> AppResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AppError::invalid_field(field, format!("'{field}' cannot be negative"))
            .with_context("value", value.to_string()))
    }
}

pub fn positive_f64(value: f64, field: &str) -> AppResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(
            AppError::invalid_field(field, format!("'{field}' must be greater than 0"))
                .with_context("value", value.to_string()),
        )
    }
}

pub fn non_negative_i64(value: i64, field: &str) -> AppResult<()> {
    if value >= 0 {
        Ok(())
    } else {
        Err(AppError::invalid_field(field, format!("'{field}' cannot be negative"))
            .with_context("value", value.to_string()))
    }
}

/// `end` may not precede `start` when both are known.
pub fn time_range(
    start: Option<i64>,
    end: Option<i64>,
    start_field: &str,
    end_field: &str,
) -> AppResult<()> {
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            return Err(AppError::new(
                VALIDATION_TIME_RANGE,
                format!("'{end_field}' cannot be earlier than '{start_field}'"),
            )
            .with_context(start_field, s.to_string())
            .with_context(end_field, e.to_string()));
        }
    }
    Ok(())
}

pub fn mime_type(value: &str, field: &str) -> AppResult<()> {
    if MIME_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(
            AppError::invalid_field(field, "MIME types must follow type/subtype syntax.")
                .with_context("value", value.to_string()),
        )
    }
}

pub fn normalize_coupon_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub fn coupon_code(raw: &str, field: &str) -> AppResult<String> {
    let code = normalize_coupon_code(raw);
    if COUPON_CODE_PATTERN.is_match(&code) {
        Ok(code)
    } else {
        Err(AppError::invalid_field(
            field,
            "Coupon codes are 3 to 32 letters, digits, '-' or '_'",
        )
        .with_context("value", raw.to_string()))
    }
}

/// Patch helper: absent stays `None`, explicit `null` becomes `Some(None)`.
/// Use with `#[serde(default, deserialize_with = "nullable")]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Parse a path segment as a positive integer id.
pub fn parse_id(raw: &str, field: &str) -> AppResult<i64> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::invalid_id(field, raw)),
    }
}
