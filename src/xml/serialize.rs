//! XML request bodies for the Azure Blob REST API.

use crate::models::Tags;

/// Escapes special XML characters.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Serializes a Set Blob Tags request body.
pub fn serialize_tags(tags: &Tags) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str("<Tags><TagSet>");
    for (key, value) in tags {
        xml.push_str(&format!(
            "<Tag><Key>{}</Key><Value>{}</Value></Tag>",
            xml_escape(key),
            xml_escape(value)
        ));
    }
    xml.push_str("</TagSet></Tags>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_tags;

    #[test]
    fn test_escape() {
        assert_eq!(xml_escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
    }

    #[test]
    fn test_serialize_tags() {
        let tags: Tags = [("team".to_string(), "r&d".to_string())].into_iter().collect();
        let xml = serialize_tags(&tags);
        assert!(xml.ends_with("<Tags><TagSet><Tag><Key>team</Key><Value>r&amp;d</Value></Tag></TagSet></Tags>"));
        assert_eq!(parse_tags(&xml).unwrap(), tags);
    }

    #[test]
    fn test_serialize_empty_tags() {
        assert!(serialize_tags(&Tags::new()).ends_with("<Tags><TagSet></TagSet></Tags>"));
    }
}
