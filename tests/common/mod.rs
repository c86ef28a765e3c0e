//! Common test utilities.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::net::TcpListener;

use blob_gateway::auth::SasPermissions;
use blob_gateway::backend::{BackendError, BackendResult, BlobBackend, BlobDownload};
use blob_gateway::models::{
    BlobItem, BlobProperties, ContainerItem, ContainerProperties, Metadata, Tags, TaggedBlob,
};
use blob_gateway::{Config, GatewayServerBuilder, MemoryBackend, StorageAccount};

/// Test server wrapper.
pub struct TestServer {
    pub base_url: String,
    /// The store behind the gateway, for seeding state the HTTP surface cannot set.
    pub backend: Arc<MemoryBackend>,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Starts a gateway over an empty memory backend on a random port.
    pub async fn start() -> Self {
        let backend = Arc::new(MemoryBackend::new(&StorageAccount::development()).unwrap());
        let base_url = spawn(Config::default(), backend.clone()).await;

        Self {
            base_url,
            backend,
            client: reqwest::Client::new(),
        }
    }

    /// Starts a gateway over the given backend and configuration.
    pub async fn start_with(config: Config, backend: Arc<dyn BlobBackend>) -> String {
        spawn(config, backend).await
    }

    /// Returns the URL of the service root with the given query.
    pub fn service_url(&self, query: &str) -> String {
        format!("{}/?{}", self.base_url, query)
    }

    /// Returns the URL for a container.
    pub fn container_url(&self, container: &str, query: &str) -> String {
        format!("{}/{}?{}", self.base_url, container, query)
    }

    /// Returns the URL for a blob.
    pub fn blob_url(&self, container: &str, blob: &str, query: &str) -> String {
        format!("{}/{}/{}?{}", self.base_url, container, blob, query)
    }

    /// Creates a container through the gateway.
    pub async fn create_container(&self, container: &str) {
        let response = self
            .client
            .put(self.container_url(container, "op=create"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "creating {container}");
    }

    /// Uploads a blob through the gateway.
    pub async fn put_blob(&self, container: &str, blob: &str, content_type: &str, body: &'static [u8]) {
        let response = self
            .client
            .put(self.blob_url(container, blob, "op=create"))
            .header("content-type", content_type)
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "uploading {container}/{blob}");
    }
}

async fn spawn(config: Config, backend: Arc<dyn BlobBackend>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = GatewayServerBuilder::new()
        .config(config)
        .backend(backend)
        .build()
        .unwrap();

    // The listener is already bound, so requests queue until the server accepts them.
    tokio::spawn(async move {
        server.serve(listener, std::future::pending()).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Reads the `error.code` field of a JSON error response.
pub async fn error_code(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.unwrap();
    body["error"]["code"].as_str().unwrap().to_string()
}

/// A backend whose every call fails as an unreachable upstream would.
pub struct FailingBackend;

impl FailingBackend {
    pub const DETAIL: &'static str = "connection reset by 10.1.2.3:443";

    fn fail<T>() -> BackendResult<T> {
        Err(BackendError::MalformedResponse(Self::DETAIL.to_string()))
    }
}

#[async_trait]
impl BlobBackend for FailingBackend {
    async fn list_containers(&self) -> BackendResult<Vec<ContainerItem>> {
        Self::fail()
    }

    async fn find_blobs_by_tags(&self, _expression: &str) -> BackendResult<Vec<TaggedBlob>> {
        Self::fail()
    }

    async fn create_container(&self, _container: &str) -> BackendResult<()> {
        Self::fail()
    }

    async fn container_properties(&self, _container: &str) -> BackendResult<ContainerProperties> {
        Self::fail()
    }

    async fn set_container_metadata(&self, _container: &str, _metadata: Metadata) -> BackendResult<()> {
        Self::fail()
    }

    async fn list_blobs(
        &self,
        _container: &str,
        _prefix: &str,
        _page_size: Option<u32>,
    ) -> BackendResult<Vec<BlobItem>> {
        Self::fail()
    }

    async fn download(&self, _container: &str, _blob: &str) -> BackendResult<BlobDownload> {
        Self::fail()
    }

    async fn blob_properties(&self, _container: &str, _blob: &str) -> BackendResult<BlobProperties> {
        Self::fail()
    }

    async fn blob_tags(&self, _container: &str, _blob: &str) -> BackendResult<Tags> {
        Self::fail()
    }

    async fn set_blob_tags(&self, _container: &str, _blob: &str, _tags: Tags) -> BackendResult<()> {
        Self::fail()
    }

    async fn upload(
        &self,
        _container: &str,
        _blob: &str,
        _content_type: &str,
        _data: Bytes,
    ) -> BackendResult<()> {
        Self::fail()
    }

    async fn set_blob_metadata(&self, _container: &str, _blob: &str, _metadata: Metadata) -> BackendResult<()> {
        Self::fail()
    }

    fn generate_sas_url(
        &self,
        _container: &str,
        _blob: &str,
        _permissions: &SasPermissions,
        _expires_on: DateTime<Utc>,
    ) -> BackendResult<String> {
        Self::fail()
    }
}
