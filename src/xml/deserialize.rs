//! Parsing of Azure Blob REST XML responses.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::backend::BackendError;
use crate::context::parse_http_date;
use crate::models::{BlobItem, BlobType, ContainerItem, Tags, TaggedBlob};

/// One parser callback, carrying the element path from the document root.
enum Node<'a> {
    Open(&'a [String]),
    Text(&'a [String], String),
    Close(&'a [String]),
}

fn malformed(message: impl Into<String>) -> BackendError {
    BackendError::MalformedResponse(message.into())
}

/// Walks the document, reporting element opens, text and closes with their path.
fn walk<F>(xml: &str, mut visit: F) -> Result<(), BackendError>
where
    F: FnMut(Node<'_>) -> Result<(), BackendError>,
{
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
                visit(Node::Open(&path))?;
            }
            Ok(Event::Empty(e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
                visit(Node::Open(&path))?;
                visit(Node::Close(&path))?;
                path.pop();
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| malformed(e.to_string()))?.into_owned();
                visit(Node::Text(&path, text))?;
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                visit(Node::Text(&path, text))?;
            }
            Ok(Event::End(_)) => {
                visit(Node::Close(&path))?;
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e.to_string())),
            _ => {}
        }
    }

    if !path.is_empty() {
        return Err(malformed("unexpected end of document"));
    }
    Ok(())
}

/// Path segments below `base`, or `None` when `path` is not inside it.
fn relative<'p>(path: &'p [String], base: &[&str]) -> Option<Vec<&'p str>> {
    if path.len() < base.len() || path.iter().zip(base).any(|(a, b)| a != b) {
        return None;
    }
    Some(path[base.len()..].iter().map(String::as_str).collect())
}

fn parse_date(text: &str) -> Result<chrono::DateTime<chrono::Utc>, BackendError> {
    parse_http_date(text).ok_or_else(|| malformed(format!("invalid date '{text}'")))
}

const CONTAINER: &[&str] = &["EnumerationResults", "Containers", "Container"];
const BLOB: &[&str] = &["EnumerationResults", "Blobs", "Blob"];
const NEXT_MARKER: &[&str] = &["EnumerationResults", "NextMarker"];
const TAG: &[&str] = &["Tags", "TagSet", "Tag"];

/// One page of a List Containers response.
#[derive(Debug, Default)]
pub struct ContainerListPage {
    pub containers: Vec<ContainerItem>,
    pub next_marker: Option<String>,
}

impl ContainerListPage {
    pub fn parse(xml: &str) -> Result<Self, BackendError> {
        let mut page = Self::default();
        let mut current: Option<ContainerItem> = None;

        walk(xml, |node| {
            match node {
                Node::Open(path) if relative(path, CONTAINER).map_or(false, |r| r.is_empty()) => {
                    current = Some(ContainerItem::default());
                }
                Node::Close(path) if relative(path, CONTAINER).map_or(false, |r| r.is_empty()) => {
                    if let Some(item) = current.take() {
                        page.containers.push(item);
                    }
                }
                Node::Text(path, text) => {
                    if let Some(rel) = relative(path, NEXT_MARKER) {
                        if rel.is_empty() && !text.is_empty() {
                            page.next_marker = Some(text);
                        }
                        return Ok(());
                    }
                    let (Some(item), Some(rel)) = (current.as_mut(), relative(path, CONTAINER)) else {
                        return Ok(());
                    };
                    match rel.as_slice() {
                        ["Name"] => item.name = text,
                        ["Properties", "Last-Modified"] => {
                            item.properties.last_modified = parse_date(&text)?
                        }
                        ["Properties", "Etag"] => item.properties.etag = text,
                        ["Metadata", key] => {
                            item.properties.metadata.insert(key.to_string(), text);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
            Ok(())
        })?;

        Ok(page)
    }
}

/// One page of a List Blobs response.
#[derive(Debug, Default)]
pub struct BlobListPage {
    pub blobs: Vec<BlobItem>,
    pub next_marker: Option<String>,
}

impl BlobListPage {
    pub fn parse(xml: &str) -> Result<Self, BackendError> {
        let mut page = Self::default();
        let mut current: Option<BlobItem> = None;

        walk(xml, |node| {
            match node {
                Node::Open(path) if relative(path, BLOB).map_or(false, |r| r.is_empty()) => {
                    current = Some(BlobItem::default());
                }
                Node::Close(path) if relative(path, BLOB).map_or(false, |r| r.is_empty()) => {
                    if let Some(item) = current.take() {
                        page.blobs.push(item);
                    }
                }
                Node::Text(path, text) => {
                    if let Some(rel) = relative(path, NEXT_MARKER) {
                        if rel.is_empty() && !text.is_empty() {
                            page.next_marker = Some(text);
                        }
                        return Ok(());
                    }
                    let (Some(item), Some(rel)) = (current.as_mut(), relative(path, BLOB)) else {
                        return Ok(());
                    };
                    let props = &mut item.properties;
                    match rel.as_slice() {
                        ["Name"] => item.name = text,
                        ["Properties", "Creation-Time"] => props.created_on = Some(parse_date(&text)?),
                        ["Properties", "Last-Modified"] => props.last_modified = parse_date(&text)?,
                        ["Properties", "Etag"] => props.etag = text,
                        ["Properties", "Content-Length"] => {
                            props.content_length = text
                                .parse()
                                .map_err(|_| malformed(format!("invalid Content-Length '{text}'")))?
                        }
                        ["Properties", "Content-Type"] => props.content_type = text,
                        ["Properties", "Content-Encoding"] => props.content_encoding = Some(text),
                        ["Properties", "Content-MD5"] => props.content_md5 = Some(text),
                        ["Properties", "BlobType"] => {
                            props.blob_type = BlobType::from_str(&text)
                                .ok_or_else(|| malformed(format!("unknown BlobType '{text}'")))?
                        }
                        ["Metadata", key] => {
                            props.metadata.insert(key.to_string(), text);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
            Ok(())
        })?;

        Ok(page)
    }
}

/// One page of a Find Blobs by Tags response.
#[derive(Debug, Default)]
pub struct FilterBlobsPage {
    pub blobs: Vec<TaggedBlob>,
    pub next_marker: Option<String>,
}

impl FilterBlobsPage {
    pub fn parse(xml: &str) -> Result<Self, BackendError> {
        let mut page = Self::default();
        let mut current: Option<TaggedBlob> = None;
        let mut tag = TagPair::default();

        walk(xml, |node| {
            match node {
                Node::Open(path) if relative(path, BLOB).map_or(false, |r| r.is_empty()) => {
                    current = Some(TaggedBlob::default());
                }
                Node::Close(path) => match relative(path, BLOB).as_deref() {
                    Some([]) => {
                        if let Some(item) = current.take() {
                            page.blobs.push(item);
                        }
                    }
                    Some(["Tags", "TagSet", "Tag"]) => {
                        if let Some(item) = current.as_mut() {
                            tag.take_into(&mut item.tags)?;
                        }
                    }
                    _ => {}
                },
                Node::Text(path, text) => {
                    if let Some(rel) = relative(path, NEXT_MARKER) {
                        if rel.is_empty() && !text.is_empty() {
                            page.next_marker = Some(text);
                        }
                        return Ok(());
                    }
                    let (Some(item), Some(rel)) = (current.as_mut(), relative(path, BLOB)) else {
                        return Ok(());
                    };
                    match rel.as_slice() {
                        ["Name"] => item.name = text,
                        ["ContainerName"] => item.container_name = text,
                        ["Tags", "TagSet", "Tag", "Key"] => tag.key = Some(text),
                        ["Tags", "TagSet", "Tag", "Value"] => tag.value = Some(text),
                        _ => {}
                    }
                }
                _ => {}
            }
            Ok(())
        })?;

        Ok(page)
    }
}

#[derive(Default)]
struct TagPair {
    key: Option<String>,
    value: Option<String>,
}

impl TagPair {
    /// Moves the collected pair into `tags`; a missing value means an empty one.
    fn take_into(&mut self, tags: &mut Tags) -> Result<(), BackendError> {
        let key = self.key.take().ok_or_else(|| malformed("Tag without Key"))?;
        tags.insert(key, self.value.take().unwrap_or_default());
        Ok(())
    }
}

/// Parses a Get Blob Tags response body.
pub fn parse_tags(xml: &str) -> Result<Tags, BackendError> {
    let mut tags = Tags::new();
    let mut tag = TagPair::default();

    walk(xml, |node| {
        match node {
            Node::Close(path) if relative(path, TAG).map_or(false, |r| r.is_empty()) => {
                tag.take_into(&mut tags)?;
            }
            Node::Text(path, text) => match relative(path, TAG).as_deref() {
                Some(["Key"]) => tag.key = Some(text),
                Some(["Value"]) => tag.value = Some(text),
                _ => {}
            },
            _ => {}
        }
        Ok(())
    })?;

    Ok(tags)
}

/// Extracts `<Code>` from an Azure error body, if present.
pub fn parse_error_code(xml: &str) -> Option<String> {
    let mut code = None;
    walk(xml, |node| {
        if let Node::Text(path, text) = node {
            if relative(path, &["Error", "Code"]).map_or(false, |r| r.is_empty()) {
                code = Some(text);
            }
        }
        Ok(())
    })
    .ok()?;
    code
}
