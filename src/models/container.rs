//! Container data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

/// Container properties as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProperties {
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub metadata: Metadata,
}

impl ContainerProperties {
    /// Fresh properties for a newly created container.
    pub fn new() -> Self {
        let mut props = Self::default();
        props.touch();
        props
    }

    /// Assigns a new ETag and bumps the modification time.
    pub fn touch(&mut self) {
        self.etag = format!("\"0x{}\"", uuid::Uuid::new_v4().simple());
        self.last_modified = Utc::now();
    }
}

/// A container entry from a container listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerItem {
    pub name: String,
    pub properties: ContainerProperties,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_properties_json_is_camel_case() {
        let props = ContainerProperties {
            last_modified: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            etag: "\"0x1\"".to_string(),
            metadata: [("owner".to_string(), "ops".to_string())].into_iter().collect(),
        };
        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(
            json,
            r#"{"lastModified":"2024-03-09T14:05:07Z","etag":"\"0x1\"","metadata":{"owner":"ops"}}"#
        );
    }

    #[test]
    fn test_touch_changes_etag() {
        let mut props = ContainerProperties::new();
        let before = props.etag.clone();
        props.touch();
        assert_ne!(props.etag, before);
        assert!(props.etag.starts_with("\"0x"));
    }
}
