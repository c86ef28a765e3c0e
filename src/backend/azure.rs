//! Azure Blob Storage over its REST API, signed with the account's shared key.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use url::Url;

use super::{
    parse_endpoint, resource_url, signed_blob_url, BackendError, BackendResult, BlobBackend,
    BlobDownload, TagFilter,
};
use crate::auth::{SasPermissions, SharedKeyCredential};
use crate::config::StorageAccount;
use crate::context::{format_http_date, parse_http_date};
use crate::models::{
    BlobItem, BlobProperties, BlobType, ContainerItem, ContainerProperties, Metadata, Tags,
    TaggedBlob, DEFAULT_CONTENT_TYPE,
};
use crate::xml::{parse_error_code, parse_tags, serialize_tags, BlobListPage, ContainerListPage, FilterBlobsPage};

/// REST API version sent as `x-ms-version`.
pub const API_VERSION: &str = "2021-10-04";

const META_PREFIX: &str = "x-ms-meta-";

pub struct AzureBackend {
    client: Client,
    credential: SharedKeyCredential,
    endpoint: Url,
}

impl AzureBackend {
    pub fn new(account: &StorageAccount, timeout: Option<Duration>) -> BackendResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            credential: SharedKeyCredential::new(account.name.clone(), &account.key)?,
            endpoint: parse_endpoint(&account.blob_endpoint)?,
        })
    }

    fn container_url(&self, container: &str, params: &[(&str, &str)]) -> BackendResult<Url> {
        let mut url = resource_url(&self.endpoint, container, None)?;
        append_query(&mut url, params);
        Ok(url)
    }

    fn blob_url(&self, container: &str, blob: &str, params: &[(&str, &str)]) -> BackendResult<Url> {
        let mut url = resource_url(&self.endpoint, container, Some(blob))?;
        append_query(&mut url, params);
        Ok(url)
    }

    /// Stamps, signs and sends a request; non-2xx answers become `Rejected`.
    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        let mut request = request
            .header("x-ms-date", format_http_date(&Utc::now()))
            .header("x-ms-version", API_VERSION)
            .build()?;

        let authorization = self.credential.authorization(&request)?;
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization).map_err(|e| BackendError::Credentials(e.to_string()))?,
        );

        tracing::debug!(method = %request.method(), url = %request.url(), "sending blob service request");

        let response = self.client.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let header_code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        let code = header_code
            .or_else(|| parse_error_code(&body))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());

        tracing::warn!(status = status.as_u16(), code = %code, "blob service rejected request");
        Err(BackendError::Rejected {
            status: status.as_u16(),
            code,
        })
    }

    /// Issues `build(marker)` until the service stops returning a continuation marker.
    async fn collect_pages<T, P>(
        &self,
        build: impl Fn(Option<&str>) -> BackendResult<Url>,
        parse: impl Fn(&str) -> BackendResult<P>,
        split: impl Fn(P) -> (Vec<T>, Option<String>),
    ) -> BackendResult<Vec<T>> {
        let mut items = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let url = build(marker.as_deref())?;
            let body = self.send(self.client.get(url)).await?.text().await?;
            let (page, next) = split(parse(&body)?);
            items.extend(page);

            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(items)
    }
}

fn append_query(url: &mut Url, params: &[(&str, &str)]) {
    if params.is_empty() {
        return;
    }
    let mut query = url.query_pairs_mut();
    for (key, value) in params {
        query.append_pair(key, value);
    }
}

fn metadata_headers(metadata: &Metadata) -> BackendResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (key, value) in metadata {
        let name = HeaderName::from_bytes(format!("{META_PREFIX}{key}").as_bytes())
            .map_err(|_| BackendError::InvalidMetadata(format!("'{key}' is not a valid metadata name")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| BackendError::InvalidMetadata(format!("value of '{key}' is not a valid header value")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn metadata_from_headers(headers: &HeaderMap) -> Metadata {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(META_PREFIX)?;
            Some((key.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect()
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn header_date(headers: &HeaderMap, name: &str) -> Option<DateTime<Utc>> {
    header_text(headers, name).and_then(|v| parse_http_date(&v))
}

fn container_properties_from_headers(headers: &HeaderMap) -> BackendResult<ContainerProperties> {
    Ok(ContainerProperties {
        last_modified: header_date(headers, "last-modified")
            .ok_or_else(|| BackendError::MalformedResponse("missing Last-Modified".to_string()))?,
        etag: header_text(headers, "etag").unwrap_or_default(),
        metadata: metadata_from_headers(headers),
    })
}

fn blob_properties_from_headers(headers: &HeaderMap) -> BackendResult<BlobProperties> {
    Ok(BlobProperties {
        blob_type: header_text(headers, "x-ms-blob-type")
            .and_then(|t| BlobType::from_str(&t))
            .unwrap_or_default(),
        content_type: header_text(headers, "content-type")
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        content_length: header_text(headers, "content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        content_encoding: header_text(headers, "content-encoding"),
        content_md5: header_text(headers, "content-md5"),
        etag: header_text(headers, "etag").unwrap_or_default(),
        last_modified: header_date(headers, "last-modified")
            .ok_or_else(|| BackendError::MalformedResponse("missing Last-Modified".to_string()))?,
        created_on: header_date(headers, "x-ms-creation-time"),
        metadata: metadata_from_headers(headers),
    })
}

#[async_trait]
impl BlobBackend for AzureBackend {
    async fn list_containers(&self) -> BackendResult<Vec<ContainerItem>> {
        let mut containers = self
            .collect_pages(
                |marker| {
                    let mut url = self.endpoint.clone();
                    append_query(&mut url, &[("comp", "list"), ("include", "metadata")]);
                    if let Some(marker) = marker {
                        append_query(&mut url, &[("marker", marker)]);
                    }
                    Ok(url)
                },
                ContainerListPage::parse,
                |page| (page.containers, page.next_marker),
            )
            .await?;
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn find_blobs_by_tags(&self, expression: &str) -> BackendResult<Vec<TaggedBlob>> {
        // Reject malformed expressions before they reach the service.
        TagFilter::parse(expression)?;

        let mut blobs = self
            .collect_pages(
                |marker| {
                    let mut url = self.endpoint.clone();
                    append_query(&mut url, &[("comp", "blobs"), ("where", expression)]);
                    if let Some(marker) = marker {
                        append_query(&mut url, &[("marker", marker)]);
                    }
                    Ok(url)
                },
                FilterBlobsPage::parse,
                |page| (page.blobs, page.next_marker),
            )
            .await?;
        blobs.sort_by(|a, b| (&a.container_name, &a.name).cmp(&(&b.container_name, &b.name)));
        Ok(blobs)
    }

    async fn create_container(&self, container: &str) -> BackendResult<()> {
        let url = self.container_url(container, &[("restype", "container")])?;
        self.send(self.client.put(url).body(Vec::<u8>::new())).await?;
        Ok(())
    }

    async fn container_properties(&self, container: &str) -> BackendResult<ContainerProperties> {
        let url = self.container_url(container, &[("restype", "container")])?;
        let response = self.send(self.client.get(url)).await?;
        container_properties_from_headers(response.headers())
    }

    async fn set_container_metadata(&self, container: &str, metadata: Metadata) -> BackendResult<()> {
        let url = self.container_url(container, &[("restype", "container"), ("comp", "metadata")])?;
        let request = self
            .client
            .put(url)
            .headers(metadata_headers(&metadata)?)
            .body(Vec::<u8>::new());
        self.send(request).await?;
        Ok(())
    }

    async fn list_blobs(
        &self,
        container: &str,
        prefix: &str,
        page_size: Option<u32>,
    ) -> BackendResult<Vec<BlobItem>> {
        let page_size = page_size.map(|n| n.to_string());

        self.collect_pages(
            |marker| {
                let mut url = self.container_url(
                    container,
                    &[("restype", "container"), ("comp", "list"), ("include", "metadata")],
                )?;
                if !prefix.is_empty() {
                    append_query(&mut url, &[("prefix", prefix)]);
                }
                if let Some(ref size) = page_size {
                    append_query(&mut url, &[("maxresults", size.as_str())]);
                }
                if let Some(marker) = marker {
                    append_query(&mut url, &[("marker", marker)]);
                }
                Ok(url)
            },
            BlobListPage::parse,
            |page| (page.blobs, page.next_marker),
        )
        .await
    }

    async fn download(&self, container: &str, blob: &str) -> BackendResult<BlobDownload> {
        let url = self.blob_url(container, blob, &[])?;
        let response = self.send(self.client.get(url)).await?;
        let properties = blob_properties_from_headers(response.headers())?;

        Ok(BlobDownload {
            properties,
            body: response.bytes_stream().map_err(BackendError::from).boxed(),
        })
    }

    async fn blob_properties(&self, container: &str, blob: &str) -> BackendResult<BlobProperties> {
        let url = self.blob_url(container, blob, &[])?;
        let response = self.send(self.client.head(url)).await?;
        blob_properties_from_headers(response.headers())
    }

    async fn blob_tags(&self, container: &str, blob: &str) -> BackendResult<Tags> {
        let url = self.blob_url(container, blob, &[("comp", "tags")])?;
        let body = self.send(self.client.get(url)).await?.text().await?;
        parse_tags(&body)
    }

    async fn set_blob_tags(&self, container: &str, blob: &str, tags: Tags) -> BackendResult<()> {
        let url = self.blob_url(container, blob, &[("comp", "tags")])?;
        let request = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(serialize_tags(&tags));
        self.send(request).await?;
        Ok(())
    }

    async fn upload(
        &self,
        container: &str,
        blob: &str,
        content_type: &str,
        data: Bytes,
    ) -> BackendResult<()> {
        let url = self.blob_url(container, blob, &[])?;
        let request = self
            .client
            .put(url)
            .header("x-ms-blob-type", BlobType::BlockBlob.as_str())
            .header(CONTENT_TYPE, content_type)
            .body(data);
        self.send(request).await?;
        Ok(())
    }

    async fn set_blob_metadata(&self, container: &str, blob: &str, metadata: Metadata) -> BackendResult<()> {
        let url = self.blob_url(container, blob, &[("comp", "metadata")])?;
        let request = self
            .client
            .put(url)
            .headers(metadata_headers(&metadata)?)
            .body(Vec::<u8>::new());
        self.send(request).await?;
        Ok(())
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

    fn backend() -> AzureBackend {
        AzureBackend::new(&StorageAccount::development(), None).unwrap()
    }

    #[test]
    fn test_urls() {
        let backend = backend();
        let url = backend
            .container_url("docs", &[("restype", "container"), ("comp", "list")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/docs?restype=container&comp=list"
        );

        let url = backend.blob_url("docs", "a/b c.txt", &[("comp", "tags")]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/docs/a/b%20c.txt?comp=tags"
        );
    }

    #[test]
    fn test_metadata_headers() {
        let metadata: Metadata = [("owner".to_string(), "ops".to_string())].into_iter().collect();
        let headers = metadata_headers(&metadata).unwrap();
        assert_eq!(headers["x-ms-meta-owner"], "ops");
        assert_eq!(metadata_from_headers(&headers), metadata);

        let bad: Metadata = [("has space".to_string(), "x".to_string())].into_iter().collect();
        assert!(matches!(metadata_headers(&bad), Err(BackendError::InvalidMetadata(_))));

        let bad: Metadata = [("k".to_string(), "line\nbreak".to_string())].into_iter().collect();
        assert!(matches!(metadata_headers(&bad), Err(BackendError::InvalidMetadata(_))));
    }

    #[test]
    fn test_blob_properties_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("image/png"));
        headers.insert("content-length", HeaderValue::from_static("2048"));
        headers.insert("etag", HeaderValue::from_static("\"0x8DC\""));
        headers.insert("last-modified", HeaderValue::from_static("Sat, 09 Mar 2024 14:05:07 GMT"));
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers.insert("x-ms-meta-camera", HeaderValue::from_static("x100"));

        let props = blob_properties_from_headers(&headers).unwrap();
        assert_eq!(props.content_type, "image/png");
        assert_eq!(props.content_length, 2048);
        assert_eq!(props.etag, "\"0x8DC\"");
        assert_eq!(props.metadata["camera"], "x100");
        assert_eq!(props.created_on, None);

        headers.remove("last-modified");
        assert!(matches!(
            blob_properties_from_headers(&headers),
            Err(BackendError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let mut account = StorageAccount::development();
        account.key = "***".to_string();
        assert!(matches!(
            AzureBackend::new(&account, None),
            Err(BackendError::Credentials(_))
        ));
    }
}
