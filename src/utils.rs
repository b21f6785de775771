use axum::http::StatusCode;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, format_description::BorrowedFormatItem,
    macros::format_description,
};

use crate::constants::*;
use crate::gateway::GatewayError;

/// Storage format for `processed_at`. Fixed width, so lexical order in the
/// database matches chronological order.
pub const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]Z");

/// Storage format for calendar dates such as `marked_for_deletion`.
pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub fn db_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ERR_DATABASE_OPERATION.to_string(),
    )
}

pub fn db_error_with_context(context: &str) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Database error: {}", context),
    )
}

impl From<GatewayError> for (StatusCode, String) {
    fn from(e: GatewayError) -> Self {
        tracing::error!(error = %e, "datastore request failed");
        db_error_with_context(&e.to_string())
    }
}

pub fn validate_string_length(
    value: &str,
    field_name: &str,
    max_length: usize,
) -> Result<(), (StatusCode, String)> {
    if value.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} cannot be empty", field_name),
        ));
    }
    if value.len() > max_length {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} must be less than {} characters", field_name, max_length),
        ));
    }
    Ok(())
}

pub fn format_timestamp(value: OffsetDateTime) -> Result<String, GatewayError> {
    value
        .to_offset(time::UtcOffset::UTC)
        .format(TIMESTAMP_FORMAT)
        .map_err(|e| GatewayError::InvalidValue(e.to_string()))
}

pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime, GatewayError> {
    PrimitiveDateTime::parse(value.trim(), TIMESTAMP_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| GatewayError::InvalidValue(format!("timestamp '{}': {}", value, e)))
}

pub fn format_date(value: Date) -> Result<String, GatewayError> {
    value
        .format(DATE_FORMAT)
        .map_err(|e| GatewayError::InvalidValue(e.to_string()))
}

pub fn parse_date(value: &str) -> Result<Date, GatewayError> {
    Date::parse(value.trim(), DATE_FORMAT)
        .map_err(|e| GatewayError::InvalidValue(format!("date '{}': {}", value, e)))
}
