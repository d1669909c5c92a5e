use rust_decimal::Decimal;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use validator::ValidationError;

use crate::error::{ApiError, Result};

/// `{ "success": true, "data": ... }` envelope for 2xx responses
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Simple message response for lightweight endpoints (e.g., delete)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse a start date given either as RFC 3339 or as a bare `YYYY-MM-DD`
/// (midnight UTC).
pub fn parse_start_date(raw: &str) -> Result<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(dt);
    }

    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| {
            ApiError::Validation(format!(
                "startDate '{}' is not a date (YYYY-MM-DD) or RFC 3339 timestamp",
                raw
            ))
        })
}

/// Fractional digits the amount columns store
pub const AMOUNT_SCALE: u32 = 6;

/// Reason `amount` cannot be retired, if any: it must be positive and fit
/// [`AMOUNT_SCALE`] fractional digits.
pub fn amount_problem(amount: Decimal) -> Option<String> {
    if amount <= Decimal::ZERO {
        return Some(format!("amount must be positive, got {}", amount));
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Some(format!(
            "amount {} has more than {} decimal places",
            amount, AMOUNT_SCALE
        ));
    }
    None
}

/// Validator hook for request amounts
pub fn validate_positive_amount(amount: &Decimal) -> std::result::Result<(), ValidationError> {
    match amount_problem(*amount) {
        None => Ok(()),
        Some(reason) => {
            let mut error = ValidationError::new("amount");
            error.message = Some(reason.into());
            Err(error)
        }
    }
}
