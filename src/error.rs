//! Gateway error types and error response formatting.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Request validation and dispatch
    InvalidContainer,
    InvalidBlob,
    InvalidOperation,
    InvalidUpload,
    MissingRequiredArgument,
    InvalidArgument,
    RequestBodyTooLarge,

    // Backend-originated
    ResourceNotFound,
    ResourceAlreadyExists,
    BackendFailure,
    InternalError,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidContainer => "InvalidContainer",
            ErrorCode::InvalidBlob => "InvalidBlob",
            ErrorCode::InvalidOperation => "InvalidOperation",
            ErrorCode::InvalidUpload => "InvalidUpload",
            ErrorCode::MissingRequiredArgument => "MissingRequiredArgument",
            ErrorCode::InvalidArgument => "InvalidArgument",
            ErrorCode::RequestBodyTooLarge => "RequestBodyTooLarge",
            ErrorCode::ResourceNotFound => "ResourceNotFound",
            ErrorCode::ResourceAlreadyExists => "ResourceAlreadyExists",
            ErrorCode::BackendFailure => "BackendFailure",
            ErrorCode::InternalError => "InternalError",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidContainer
            | ErrorCode::InvalidBlob
            | ErrorCode::InvalidOperation
            | ErrorCode::InvalidUpload
            | ErrorCode::MissingRequiredArgument
            | ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorCode::RequestBodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ResourceAlreadyExists => StatusCode::CONFLICT,
            ErrorCode::BackendFailure => StatusCode::BAD_GATEWAY,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidContainer => "Invalid container name.",
            ErrorCode::InvalidBlob => "Invalid blob name.",
            ErrorCode::InvalidOperation => "Invalid or missing operation.",
            ErrorCode::InvalidUpload => "Invalid or missing file upload.",
            ErrorCode::MissingRequiredArgument => "One or more required argument is missing.",
            ErrorCode::InvalidArgument => "One or more argument is malformed.",
            ErrorCode::RequestBodyTooLarge => "The request body exceeds the configured size limit.",
            ErrorCode::ResourceNotFound => "The specified resource does not exist.",
            ErrorCode::ResourceAlreadyExists => "The specified resource already exists.",
            ErrorCode::BackendFailure => "The storage backend failed to process the request.",
            ErrorCode::InternalError => "The server encountered an internal error.",
        }
    }

    /// Whether this error is the caller's fault.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Gateway error with code and message.
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: Option<String>,
}

impl GatewayError {
    /// Creates a new error with the given code and default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.default_message().to_string(),
            code,
            request_id: None,
        }
    }

    /// Creates a new error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: None,
        }
    }

    /// Sets the request ID for this error.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Replaces the message of server-side errors with the code's default message.
    pub fn conceal_details(mut self) -> Self {
        if !self.code.is_client_error() {
            self.message = self.code.default_message().to_string();
        }
        self
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let request_id = self
            .request_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let body = json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "requestId": request_id,
            }
        });

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert("x-request-id", value);
        }
        headers.insert("x-error-code", HeaderValue::from_static(self.code.as_str()));
        response
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
