//! In-process backend used by tests and `--backend memory`.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use url::Url;

use super::{
    check_blob_path, parse_endpoint, signed_blob_url, BackendError, BackendResult, BlobBackend, BlobDownload,
    TagFilter,
};
use crate::auth::{SasPermissions, SharedKeyCredential};
use crate::config::StorageAccount;
use crate::models::{
    BlobItem, BlobProperties, BlobType, ContainerItem, ContainerProperties, Metadata, Tags,
    TaggedBlob,
};

const CONTAINER_NOT_FOUND: &str = "The specified container does not exist.";
const CONTAINER_EXISTS: &str = "The specified container already exists.";
const BLOB_NOT_FOUND: &str = "The specified blob does not exist.";

struct StoredBlob {
    properties: BlobProperties,
    tags: Tags,
    data: Bytes,
}

struct StoredContainer {
    properties: ContainerProperties,
    blobs: BTreeMap<String, StoredBlob>,
}

/// Containers and blobs held in memory, keyed by container name.
pub struct MemoryBackend {
    credential: SharedKeyCredential,
    endpoint: Url,
    containers: DashMap<String, StoredContainer>,
}

impl MemoryBackend {
    /// Creates an empty store; `account` is used to sign SAS URLs.
    pub fn new(account: &StorageAccount) -> BackendResult<Self> {
        Ok(Self {
            credential: SharedKeyCredential::new(account.name.clone(), &account.key)?,
            endpoint: parse_endpoint(&account.blob_endpoint)?,
            containers: DashMap::new(),
        })
    }

    fn with_blob<T>(
        &self,
        container: &str,
        blob: &str,
        f: impl FnOnce(&StoredBlob) -> T,
    ) -> BackendResult<T> {
        check_blob_path(blob)?;
        let entry = self
            .containers
            .get(container)
            .ok_or_else(|| BackendError::NotFound(CONTAINER_NOT_FOUND.to_string()))?;
        let stored = entry
            .blobs
            .get(blob)
            .ok_or_else(|| BackendError::NotFound(BLOB_NOT_FOUND.to_string()))?;
        Ok(f(stored))
    }

    fn with_blob_mut<T>(
        &self,
        container: &str,
        blob: &str,
        f: impl FnOnce(&mut StoredBlob) -> T,
    ) -> BackendResult<T> {
        check_blob_path(blob)?;
        let mut entry = self
            .containers
            .get_mut(container)
            .ok_or_else(|| BackendError::NotFound(CONTAINER_NOT_FOUND.to_string()))?;
        let stored = entry
            .blobs
            .get_mut(blob)
            .ok_or_else(|| BackendError::NotFound(BLOB_NOT_FOUND.to_string()))?;
        Ok(f(stored))
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn list_containers(&self) -> BackendResult<Vec<ContainerItem>> {
        let mut items: Vec<ContainerItem> = self
            .containers
            .iter()
            .map(|entry| ContainerItem {
                name: entry.key().clone(),
                properties: entry.properties.clone(),
            })
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn find_blobs_by_tags(&self, expression: &str) -> BackendResult<Vec<TaggedBlob>> {
        let filter = TagFilter::parse(expression)?;

        let mut found = Vec::new();
        for entry in self.containers.iter() {
            for (name, stored) in &entry.blobs {
                if filter.matches(entry.key(), &stored.tags) {
                    found.push(TaggedBlob {
                        name: name.clone(),
                        container_name: entry.key().clone(),
                        tags: stored.tags.clone(),
                    });
                }
            }
        }
        found.sort_by(|a, b| (&a.container_name, &a.name).cmp(&(&b.container_name, &b.name)));
        Ok(found)
    }

    async fn create_container(&self, container: &str) -> BackendResult<()> {
        match self.containers.entry(container.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(BackendError::AlreadyExists(CONTAINER_EXISTS.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(StoredContainer {
                    properties: ContainerProperties::new(),
                    blobs: BTreeMap::new(),
                });
                Ok(())
            }
        }
    }

    async fn container_properties(&self, container: &str) -> BackendResult<ContainerProperties> {
        self.containers
            .get(container)
            .map(|entry| entry.properties.clone())
            .ok_or_else(|| BackendError::NotFound(CONTAINER_NOT_FOUND.to_string()))
    }

    async fn set_container_metadata(&self, container: &str, metadata: Metadata) -> BackendResult<()> {
        let mut entry = self
            .containers
            .get_mut(container)
            .ok_or_else(|| BackendError::NotFound(CONTAINER_NOT_FOUND.to_string()))?;
        entry.properties.metadata = metadata;
        entry.properties.touch();
        Ok(())
    }

    async fn list_blobs(
        &self,
        container: &str,
        prefix: &str,
        _page_size: Option<u32>,
    ) -> BackendResult<Vec<BlobItem>> {
        let entry = self
            .containers
            .get(container)
            .ok_or_else(|| BackendError::NotFound(CONTAINER_NOT_FOUND.to_string()))?;

        Ok(entry
            .blobs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, stored)| BlobItem {
                name: name.clone(),
                properties: stored.properties.clone(),
            })
            .collect())
    }

    async fn download(&self, container: &str, blob: &str) -> BackendResult<BlobDownload> {
        let (properties, data) =
            self.with_blob(container, blob, |stored| (stored.properties.clone(), stored.data.clone()))?;

        Ok(BlobDownload {
            properties,
            body: stream::once(async move { Ok(data) }).boxed(),
        })
    }

    async fn blob_properties(&self, container: &str, blob: &str) -> BackendResult<BlobProperties> {
        self.with_blob(container, blob, |stored| stored.properties.clone())
    }

    async fn blob_tags(&self, container: &str, blob: &str) -> BackendResult<Tags> {
        self.with_blob(container, blob, |stored| stored.tags.clone())
    }

    async fn set_blob_tags(&self, container: &str, blob: &str, tags: Tags) -> BackendResult<()> {
        self.with_blob_mut(container, blob, |stored| stored.tags = tags)
    }

    async fn upload(
        &self,
        container: &str,
        blob: &str,
        content_type: &str,
        data: Bytes,
    ) -> BackendResult<()> {
        check_blob_path(blob)?;
        let mut entry = self
            .containers
            .get_mut(container)
            .ok_or_else(|| BackendError::NotFound(CONTAINER_NOT_FOUND.to_string()))?;

        let mut properties = BlobProperties {
            blob_type: BlobType::BlockBlob,
            content_type: content_type.to_string(),
            content_length: data.len() as u64,
            content_md5: Some(BASE64.encode(Md5::digest(&data))),
            ..BlobProperties::default()
        };
        properties.touch();
        properties.created_on = Some(properties.last_modified);

        // Overwrites replace the blob wholesale, including metadata and tags.
        entry.blobs.insert(
            blob.to_string(),
            StoredBlob {
                properties,
                tags: Tags::new(),
                data,
            },
        );
        Ok(())
    }

    async fn set_blob_metadata(&self, container: &str, blob: &str, metadata: Metadata) -> BackendResult<()> {
        self.with_blob_mut(container, blob, |stored| {
            stored.properties.metadata = metadata;
            stored.properties.touch();
        })
    }

    fn generate_sas_url(
        &self,
        container: &str,
        blob: &str,
        permissions: &SasPermissions,
        expires_on: DateTime<Utc>,
    ) -> BackendResult<String> {
        signed_blob_url(&self.credential, &self.endpoint, container, blob, permissions, expires_on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(&StorageAccount::development()).unwrap()
    }

    #[tokio::test]
    async fn test_create_container_twice_conflicts() {
        let backend = backend();
        backend.create_container("docs").await.unwrap();
        let err = backend.create_container("docs").await.unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let backend = backend();
        backend.create_container("docs").await.unwrap();
        backend
            .upload("docs", "a/b.txt", "text/plain", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let download = backend.download("docs", "a/b.txt").await.unwrap();
        assert_eq!(download.properties.content_type, "text/plain");
        assert_eq!(download.properties.content_length, 5);
        assert_eq!(download.properties.content_md5.as_deref(), Some("XUFAKrxLKna5cZ2REBfFkg=="));

        let chunks: Vec<Bytes> = download.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello");
    }

    #[tokio::test]
    async fn test_missing_resources() {
        let backend = backend();
        assert!(matches!(
            backend.blob_properties("nope", "a").await,
            Err(BackendError::NotFound(_))
        ));
        backend.create_container("docs").await.unwrap();
        assert!(matches!(
            backend.blob_tags("docs", "a").await,
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend.upload("other", "a", "text/plain", Bytes::new()).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_blobs_by_prefix() {
        let backend = backend();
        backend.create_container("docs").await.unwrap();
        for name in ["b", "a/2", "a/1", "ab"] {
            backend
                .upload("docs", name, "text/plain", Bytes::new())
                .await
                .unwrap();
        }

        let names = |items: Vec<BlobItem>| items.into_iter().map(|b| b.name).collect::<Vec<_>>();
        assert_eq!(names(backend.list_blobs("docs", "", None).await.unwrap()), ["a/1", "a/2", "ab", "b"]);
        assert_eq!(names(backend.list_blobs("docs", "a/", Some(1)).await.unwrap()), ["a/1", "a/2"]);
        assert!(backend.list_blobs("docs", "z", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_updates_etag() {
        let backend = backend();
        backend.create_container("docs").await.unwrap();
        let before = backend.container_properties("docs").await.unwrap();

        let metadata: Metadata = [("owner".to_string(), "ops".to_string())].into_iter().collect();
        backend.set_container_metadata("docs", metadata.clone()).await.unwrap();

        let after = backend.container_properties("docs").await.unwrap();
        assert_eq!(after.metadata, metadata);
        assert_ne!(after.etag, before.etag);
    }

    #[tokio::test]
    async fn test_overwrite_clears_tags() {
        let backend = backend();
        backend.create_container("docs").await.unwrap();
        backend.upload("docs", "a", "text/plain", Bytes::new()).await.unwrap();

        let tags: Tags = [("env".to_string(), "prod".to_string())].into_iter().collect();
        backend.set_blob_tags("docs", "a", tags.clone()).await.unwrap();
        assert_eq!(backend.blob_tags("docs", "a").await.unwrap(), tags);

        backend.upload("docs", "a", "text/plain", Bytes::new()).await.unwrap();
        assert!(backend.blob_tags("docs", "a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dot_segments_are_unaddressable() {
        let backend = backend();
        backend.create_container("docs").await.unwrap();

        let err = backend
            .upload("docs", "a/../b.txt", "text/plain", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::UnaddressableBlob(_)));
        assert!(matches!(
            backend.blob_properties("docs", "./b.txt").await,
            Err(BackendError::UnaddressableBlob(_))
        ));
        assert!(backend.list_blobs("docs", "", None).await.unwrap().is_empty());

        // Dots inside a segment are ordinary characters.
        backend
            .upload("docs", "a/..b/c..", "text/plain", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(backend.blob_properties("docs", "a/..b/c..").await.is_ok());
    }

    #[tokio::test]
    async fn test_find_blobs_by_tags() {
        let backend = backend();
        for container in ["logs", "docs"] {
            backend.create_container(container).await.unwrap();
            backend.upload(container, "x", "text/plain", Bytes::new()).await.unwrap();
            backend
                .set_blob_tags(
                    container,
                    "x",
                    [("env".to_string(), "prod".to_string())].into_iter().collect(),
                )
                .await
                .unwrap();
        }
        backend.upload("docs", "untagged", "text/plain", Bytes::new()).await.unwrap();

        let found = backend.find_blobs_by_tags("env='prod'").await.unwrap();
        let locations: Vec<_> = found.iter().map(|b| (b.container_name.as_str(), b.name.as_str())).collect();
        assert_eq!(locations, [("docs", "x"), ("logs", "x")]);

        let scoped = backend.find_blobs_by_tags("@container='logs' AND env='prod'").await.unwrap();
        assert_eq!(scoped.len(), 1);

        assert!(matches!(
            backend.find_blobs_by_tags("env=prod").await,
            Err(BackendError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_sas_url_targets_blob() {
        let expires = Utc::now() + chrono::Duration::hours(1);
        let url = backend()
            .generate_sas_url("docs", "a b.txt", &SasPermissions::read_only(), expires)
            .unwrap();
        assert!(url.starts_with("http://127.0.0.1:10000/devstoreaccount1/docs/a%20b.txt?sv="));
        assert!(url.contains("&sr=b&sp=r&sig="));
    }
}
