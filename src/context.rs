//! Request context extraction and handling.

use axum::http::{header::HeaderMap, Method, Uri};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::SasPermissions;
use crate::error::{ErrorCode, GatewayError, GatewayResult};

/// Query parameter carrying the operation selector.
pub const OP_PARAM: &str = "op";

/// Default lifetime of a generated SAS URL, in seconds.
pub const DEFAULT_SAS_TTL_SECS: i64 = 3600;

/// Extracted request context containing all relevant information.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request ID.
    pub request_id: String,
    /// HTTP method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Container name (if the route has one).
    pub container: Option<String>,
    /// Blob name (if the route has one).
    pub blob: Option<String>,
    /// Query parameters.
    pub query_params: HashMap<String, String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request timestamp.
    pub timestamp: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context from request parts.
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        path_params: HashMap<String, String>,
        query_params: HashMap<String, String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            uri,
            container: path_params.get("container").cloned(),
            blob: path_params.get("blob").cloned(),
            query_params,
            headers,
            timestamp: Utc::now(),
        }
    }

    /// Returns the value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    /// Returns the value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the Content-Type header value.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the raw operation selector.
    pub fn op(&self) -> Option<&str> {
        self.query_param(OP_PARAM)
    }

    /// Container path parameter, empty when absent.
    pub fn container_name(&self) -> &str {
        self.container.as_deref().unwrap_or("")
    }

    /// Blob path parameter, empty when absent.
    pub fn blob_name(&self) -> &str {
        self.blob.as_deref().unwrap_or("")
    }
}

/// Query parameters for blob listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    /// Name prefix filter; empty means no filtering.
    pub prefix: String,
    /// Backend page-size hint.
    pub maxresults: Option<u32>,
}

impl ListParams {
    pub fn from_query(query: &HashMap<String, String>) -> GatewayResult<Self> {
        let maxresults = match query.get("maxresults") {
            None => None,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(GatewayError::with_message(
                        ErrorCode::InvalidArgument,
                        format!("maxresults must be a positive integer, got '{raw}'"),
                    ))
                }
            },
        };

        Ok(Self {
            prefix: query.get("prefix").cloned().unwrap_or_default(),
            maxresults,
        })
    }
}

/// Query parameters for SAS URL generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasParams {
    /// Lifetime in seconds.
    pub ttl: i64,
    pub permissions: SasPermissions,
}

impl SasParams {
    pub fn from_query(query: &HashMap<String, String>) -> GatewayResult<Self> {
        let ttl = match query.get("ttl") {
            None => DEFAULT_SAS_TTL_SECS,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) if n > 0 && Duration::try_seconds(n).is_some() => n,
                _ => return Err(invalid_ttl(raw)),
            },
        };

        let permissions = match query.get("perms") {
            None => SasPermissions::read_only(),
            Some(raw) => SasPermissions::parse(raw).ok_or_else(|| {
                GatewayError::with_message(
                    ErrorCode::InvalidArgument,
                    format!("perms contains an unknown permission: '{raw}'"),
                )
            })?,
        };

        Ok(Self { ttl, permissions })
    }

    /// Expiry instant for a URL issued at `now`.
    pub fn expires_on(&self, now: DateTime<Utc>) -> GatewayResult<DateTime<Utc>> {
        Duration::try_seconds(self.ttl)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| invalid_ttl(&self.ttl.to_string()))
    }
}

fn invalid_ttl(raw: &str) -> GatewayError {
    GatewayError::with_message(
        ErrorCode::InvalidArgument,
        format!("ttl must be a positive number of seconds within range, got '{raw}'"),
    )
}

/// Parses an HTTP date in RFC 1123 format.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(value, "%a, %d %b %Y %H:%M:%S GMT")
                .ok()
                .map(|dt| dt.and_utc())
        })
}

/// Formats a DateTime as RFC 1123 format for HTTP headers.
pub fn format_http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
