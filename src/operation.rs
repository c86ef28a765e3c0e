//! Operation selectors (`op` query parameter), one closed set per route.

use crate::error::{ErrorCode, GatewayError, GatewayResult};

/// Resolves an optional raw selector into one of the route's operations.
///
/// A missing selector and an unknown selector are both `InvalidOperation`.
pub fn parse_op<T>(raw: Option<&str>, from_str: fn(&str) -> Option<T>) -> GatewayResult<T> {
    raw.and_then(from_str)
        .ok_or_else(|| GatewayError::new(ErrorCode::InvalidOperation))
}

/// `GET /`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOp {
    /// List containers.
    List,
    /// Find blobs by tag expression.
    Find,
}

impl ServiceOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceOp::List => "list",
            ServiceOp::Find => "find",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "list" => Some(ServiceOp::List),
            "find" => Some(ServiceOp::Find),
            _ => None,
        }
    }
}

/// `GET /{container}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerReadOp {
    List,
    Props,
}

impl ContainerReadOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerReadOp::List => "list",
            ContainerReadOp::Props => "props",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "list" => Some(ContainerReadOp::List),
            "props" => Some(ContainerReadOp::Props),
            _ => None,
        }
    }
}

/// `PUT /{container}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerWriteOp {
    Create,
    Metadata,
}

impl ContainerWriteOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerWriteOp::Create => "create",
            ContainerWriteOp::Metadata => "metadata",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ContainerWriteOp::Create),
            "metadata" => Some(ContainerWriteOp::Metadata),
            _ => None,
        }
    }
}

/// `GET /{container}/{blob}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobReadOp {
    Content,
    Props,
    Tags,
    Sas,
}

impl BlobReadOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobReadOp::Content => "content",
            BlobReadOp::Props => "props",
            BlobReadOp::Tags => "tags",
            BlobReadOp::Sas => "sas",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "content" => Some(BlobReadOp::Content),
            "props" => Some(BlobReadOp::Props),
            "tags" => Some(BlobReadOp::Tags),
            "sas" => Some(BlobReadOp::Sas),
            _ => None,
        }
    }
}

/// `PUT /{container}/{blob}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobWriteOp {
    Create,
    Metadata,
}

impl BlobWriteOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobWriteOp::Create => "create",
            BlobWriteOp::Metadata => "metadata",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create" => Some(BlobWriteOp::Create),
            "metadata" => Some(BlobWriteOp::Metadata),
            _ => None,
        }
    }
}

/// `POST /{container}/{blob}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobUploadOp {
    Upload,
}

impl BlobUploadOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobUploadOp::Upload => "upload",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(BlobUploadOp::Upload),
            _ => None,
        }
    }
}
