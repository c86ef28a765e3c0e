//! Storage backend collaborators.
//!
//! Handlers only talk to [`BlobBackend`]; the concrete client is chosen once at
//! startup and shared read-only by every request.

mod azure;
mod memory;
mod tag_filter;

pub use azure::AzureBackend;
pub use memory::MemoryBackend;
pub use tag_filter::{TagComparison, TagFilter, TagPredicate};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;
use url::Url;

use crate::auth::{BlobSasParameters, SasPermissions, SharedKeyCredential};
use crate::error::{ErrorCode, GatewayError};
use crate::models::{BlobItem, BlobProperties, ContainerItem, ContainerProperties, Metadata, Tags, TaggedBlob};

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("invalid tag query: {0}")]
    InvalidQuery(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("backend rejected the request with status {status}: {code}")]
    Rejected { status: u16, code: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("invalid blob endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("blob name '{0}' cannot be addressed: '.' and '..' path segments are not supported")]
    UnaddressableBlob(String),
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        let code = match &err {
            BackendError::NotFound(_) => ErrorCode::ResourceNotFound,
            BackendError::AlreadyExists(_) => ErrorCode::ResourceAlreadyExists,
            BackendError::InvalidQuery(_) | BackendError::InvalidMetadata(_) => ErrorCode::InvalidArgument,
            BackendError::Rejected { status: 404, .. } => ErrorCode::ResourceNotFound,
            BackendError::Rejected { status: 409, .. } => ErrorCode::ResourceAlreadyExists,
            BackendError::Rejected { .. }
            | BackendError::Transport(_)
            | BackendError::MalformedResponse(_) => ErrorCode::BackendFailure,
            BackendError::Credentials(_) | BackendError::InvalidEndpoint(_) => ErrorCode::InternalError,
            BackendError::UnaddressableBlob(_) => ErrorCode::InvalidBlob,
        };
        GatewayError::with_message(code, err.to_string())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A blob download: properties up front, content as a byte stream.
pub struct BlobDownload {
    pub properties: BlobProperties,
    pub body: BoxStream<'static, BackendResult<Bytes>>,
}

impl std::fmt::Debug for BlobDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobDownload")
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Parses and checks a blob service endpoint such as `http://127.0.0.1:10000/devstoreaccount1`.
pub fn parse_endpoint(endpoint: &str) -> BackendResult<Url> {
    let url = Url::parse(endpoint).map_err(|e| BackendError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(BackendError::InvalidEndpoint(format!("{endpoint}: expected an http(s) URL")));
    }
    Ok(url)
}

/// Rejects blob names that a URL cannot carry verbatim.
///
/// URL path normalization collapses `.` and `..` segments (encoded or not), so
/// `a/../b.txt` would silently address `b.txt`.
pub fn check_blob_path(blob: &str) -> BackendResult<()> {
    if blob.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(BackendError::UnaddressableBlob(blob.to_string()));
    }
    Ok(())
}

/// URL of a container, or of a blob when `blob` is given.
///
/// `/` inside blob names is kept as a path separator; every segment is percent-encoded.
pub fn resource_url(endpoint: &Url, container: &str, blob: Option<&str>) -> BackendResult<Url> {
    if let Some(blob) = blob {
        check_blob_path(blob)?;
    }

    let mut url = endpoint.clone();
    url.set_query(None);
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| BackendError::InvalidEndpoint(endpoint.to_string()))?;
        segments.pop_if_empty().push(container);
        if let Some(blob) = blob {
            segments.extend(blob.split('/'));
        }
    }
    Ok(url)
}

/// Blob URL carrying a service SAS signed with `credential`.
pub(crate) fn signed_blob_url(
    credential: &SharedKeyCredential,
    endpoint: &Url,
    container: &str,
    blob: &str,
    permissions: &SasPermissions,
    expires_on: DateTime<Utc>,
) -> BackendResult<String> {
    let params = BlobSasParameters {
        container: container.to_string(),
        blob: blob.to_string(),
        permissions: permissions.clone(),
        expires_on,
        starts_on: None,
    };
    let url = resource_url(endpoint, container, Some(blob))?;
    Ok(params.sign_url(credential, &url)?.to_string())
}

/// Operations the gateway needs from the object store.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// All containers with their properties, sorted by name.
    async fn list_containers(&self) -> BackendResult<Vec<ContainerItem>>;

    /// Blobs across all containers whose tags satisfy `expression`.
    async fn find_blobs_by_tags(&self, expression: &str) -> BackendResult<Vec<TaggedBlob>>;

    async fn create_container(&self, container: &str) -> BackendResult<()>;

    async fn container_properties(&self, container: &str) -> BackendResult<ContainerProperties>;

    async fn set_container_metadata(&self, container: &str, metadata: Metadata) -> BackendResult<()>;

    /// Blobs in `container` whose names start with `prefix`, sorted by name.
    ///
    /// `page_size` only sizes backend round trips; every match is returned.
    async fn list_blobs(
        &self,
        container: &str,
        prefix: &str,
        page_size: Option<u32>,
    ) -> BackendResult<Vec<BlobItem>>;

    async fn download(&self, container: &str, blob: &str) -> BackendResult<BlobDownload>;

    async fn blob_properties(&self, container: &str, blob: &str) -> BackendResult<BlobProperties>;

    async fn blob_tags(&self, container: &str, blob: &str) -> BackendResult<Tags>;

    async fn set_blob_tags(&self, container: &str, blob: &str, tags: Tags) -> BackendResult<()>;

    /// Creates or overwrites a block blob.
    async fn upload(
        &self,
        container: &str,
        blob: &str,
        content_type: &str,
        data: Bytes,
    ) -> BackendResult<()>;

    async fn set_blob_metadata(&self, container: &str, blob: &str, metadata: Metadata) -> BackendResult<()>;

    /// Signed URL granting `permissions` on the blob until `expires_on`.
    fn generate_sas_url(
        &self,
        container: &str,
        blob: &str,
        permissions: &SasPermissions,
        expires_on: DateTime<Utc>,
    ) -> BackendResult<String>;
}
