// src/extract.rs

//! Request extractors whose rejections are `AppError`s, so malformed bodies
//! and query strings get the same 400 shape as validation failures.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

/// `axum::Json` with field-level 400s instead of a plain-text 422.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// `axum::extract::Query` with field-level 400s.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);

/// Splits a serde message such as "missing field `email`" or
/// "role: unknown variant `root`, expected ..." into (field, message).
pub(crate) fn split_field_error(detail: &str) -> (String, String) {
    let detail = match detail.rfind(" at line ") {
        Some(at) => &detail[..at],
        None => detail,
    };

    if let Some(rest) = detail.strip_prefix("missing field `") {
        if let Some(field) = rest.split('`').next() {
            return (field.to_string(), "This field is required.".to_string());
        }
    }

    match detail.split_once(": ") {
        Some((path, message)) if !path.is_empty() && !path.contains(' ') => {
            (path.to_string(), message.to_string())
        }
        _ => ("non_field_errors".to_string(), detail.to_string()),
    }
}
