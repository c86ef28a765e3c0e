//! Blob data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Metadata, Tags};

/// Content type stored when a caller supplies none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Blob types reported by Azure Blob Storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BlobType {
    #[default]
    BlockBlob,
    PageBlob,
    AppendBlob,
}

impl BlobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobType::BlockBlob => "BlockBlob",
            BlobType::PageBlob => "PageBlob",
            BlobType::AppendBlob => "AppendBlob",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BlockBlob" => Some(BlobType::BlockBlob),
            "PageBlob" => Some(BlobType::PageBlob),
            "AppendBlob" => Some(BlobType::AppendBlob),
            _ => None,
        }
    }
}

/// Blob properties and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobProperties {
    pub blob_type: BlobType,
    pub content_type: String,
    pub content_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl Default for BlobProperties {
    fn default() -> Self {
        Self {
            blob_type: BlobType::BlockBlob,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            content_length: 0,
            content_encoding: None,
            content_md5: None,
            etag: String::new(),
            last_modified: DateTime::<Utc>::default(),
            created_on: None,
            metadata: Metadata::new(),
        }
    }
}

impl BlobProperties {
    /// Assigns a new ETag and bumps the modification time.
    pub fn touch(&mut self) {
        self.etag = format!("\"0x{}\"", uuid::Uuid::new_v4().simple());
        self.last_modified = Utc::now();
    }
}

/// A blob entry from a container listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobItem {
    pub name: String,
    pub properties: BlobProperties,
}

/// A blob matched by a tag query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedBlob {
    pub name: String,
    pub container_name: String,
    pub tags: Tags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_type_names() {
        for ty in [BlobType::BlockBlob, BlobType::PageBlob, BlobType::AppendBlob] {
            assert_eq!(BlobType::from_str(ty.as_str()), Some(ty));
        }
        assert_eq!(BlobType::from_str("blockblob"), None);
    }

    #[test]
    fn test_optional_properties_are_omitted() {
        let json = serde_json::to_value(BlobProperties::default()).unwrap();
        assert_eq!(json["contentType"], DEFAULT_CONTENT_TYPE);
        assert_eq!(json["blobType"], "BlockBlob");
        assert!(json.get("contentMd5").is_none());
        assert!(json.get("createdOn").is_none());
    }

    #[test]
    fn test_tagged_blob_json() {
        let blob = TaggedBlob {
            name: "a.txt".to_string(),
            container_name: "docs".to_string(),
            tags: [("env".to_string(), "prod".to_string())].into_iter().collect(),
        };
        assert_eq!(
            serde_json::to_string(&blob).unwrap(),
            r#"{"name":"a.txt","containerName":"docs","tags":{"env":"prod"}}"#
        );
    }
}
