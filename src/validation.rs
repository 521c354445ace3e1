//! Field checks shared by request conversions. Every failure names the field.

use time::{macros::format_description, Date};

use crate::error::AppError;
use crate::intake::repo_types::DEFAULT_MASS_GRAMS;

pub fn parse_date(field: &str, raw: Option<&str>) -> Result<Date, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation(field, "is required"))?;
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::validation(field, "expected a YYYY-MM-DD date"))
}

pub fn required_text(field: &str, raw: Option<&str>) -> Result<String, AppError> {
    optional_text(raw).ok_or_else(|| AppError::validation(field, "is required"))
}

/// Trimmed text; blank counts as absent.
pub fn optional_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn positive_id(field: &str, raw: Option<i64>) -> Result<i64, AppError> {
    match raw {
        Some(id) if id > 0 => Ok(id),
        Some(_) => Err(AppError::validation(field, "must be a positive id")),
        None => Err(AppError::validation(field, "is required")),
    }
}

pub fn positive_number(field: &str, value: f64) -> Result<f64, AppError> {
    if !value.is_finite() {
        return Err(AppError::validation(field, "must be a number"));
    }
    if value <= 0.0 {
        return Err(AppError::validation(field, "must be greater than 0"));
    }
    Ok(value)
}

/// Unspecified mass defaults to 100 g everywhere.
pub fn mass_or_default(field: &str, raw: Option<f64>) -> Result<f64, AppError> {
    match raw {
        Some(mass) => positive_number(field, mass),
        None => Ok(DEFAULT_MASS_GRAMS),
    }
}
