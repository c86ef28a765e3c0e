//! Resource handlers: one per level (service, container, blob).
//!
//! Each handler validates the names it is given, resolves the `op` selector and
//! runs the matching backend call.

mod blob;
mod container;
mod service;

pub use blob::*;
pub use container::*;
pub use service::*;

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::error::{ErrorCode, GatewayError, GatewayResult};
use crate::models::Metadata;

const APPLICATION_JSON: &str = "application/json";
const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// Serializes `value` into an `application/json` response.
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> GatewayResult<Response<Body>> {
    let body = serde_json::to_vec(value)
        .map_err(|e| GatewayError::with_message(ErrorCode::InternalError, e.to_string()))?;
    build_response(status, &[(header::CONTENT_TYPE, APPLICATION_JSON)], Body::from(body))
}

/// A `text/plain` response.
pub fn text_response(status: StatusCode, text: String) -> GatewayResult<Response<Body>> {
    build_response(status, &[(header::CONTENT_TYPE, TEXT_PLAIN_UTF8)], Body::from(text))
}

/// A body-less acknowledgement.
pub fn status_response(status: StatusCode) -> GatewayResult<Response<Body>> {
    build_response(status, &[], Body::empty())
}

/// Builds a response with the given status, headers and body.
pub fn build_response(
    status: StatusCode,
    headers: &[(header::HeaderName, &str)],
    body: Body,
) -> GatewayResult<Response<Body>> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    for (name, value) in headers {
        response.headers_mut().insert(name.clone(), header_value(value)?);
    }
    Ok(response)
}

pub fn header_value(value: &str) -> GatewayResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        GatewayError::with_message(ErrorCode::InternalError, format!("invalid header value '{value}'"))
    })
}

/// Parses a metadata request body: a JSON object of string, number or boolean values.
pub fn parse_metadata(body: &[u8]) -> GatewayResult<Metadata> {
    let invalid = |message: String| GatewayError::with_message(ErrorCode::InvalidArgument, message);

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| invalid(format!("metadata body is not valid JSON: {e}")))?;
    let Value::Object(object) = value else {
        return Err(invalid("metadata body must be a JSON object".to_string()));
    };

    object
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(invalid(format!("metadata value of '{key}' must be a string, number or boolean"))),
            };
            Ok((key, value))
        })
        .collect()
}
