//! Blob-level handlers: `GET`, `PUT` and `POST` on `/{container}/{blob}`.

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart},
    http::{header, Response, StatusCode},
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;

use crate::backend::BlobBackend;
use crate::context::{format_http_date, RequestContext, SasParams};
use crate::error::{ErrorCode, GatewayError, GatewayResult};
use crate::models::DEFAULT_CONTENT_TYPE;
use crate::operation::{parse_op, BlobReadOp, BlobUploadOp, BlobWriteOp};
use crate::validate::{validate_blob_name, validate_container_name};

use super::{build_response, header_value, json_response, parse_metadata, status_response, text_response};

/// Validates both path names; container errors win over blob errors.
fn validate_names(ctx: &RequestContext) -> GatewayResult<(&str, &str)> {
    let container = ctx.container_name();
    validate_container_name(container).into_result(ErrorCode::InvalidContainer)?;

    let blob = ctx.blob_name();
    validate_blob_name(blob).into_result(ErrorCode::InvalidBlob)?;

    Ok((container, blob))
}

/// GET /{container}/{blob}?op=content|props|tags|sas
pub async fn get_blob(
    ctx: &RequestContext,
    backend: Arc<dyn BlobBackend>,
) -> GatewayResult<Response<Body>> {
    let (container, blob) = validate_names(ctx)?;
    let op = parse_op(ctx.op(), BlobReadOp::from_str)?;
    tracing::debug!(request_id = %ctx.request_id, container, blob, op = op.as_str(), "blob request");

    match op {
        BlobReadOp::Content => {
            let download = backend.download(container, blob).await?;
            let props = &download.properties;

            let mut response = build_response(
                StatusCode::OK,
                &[
                    (header::CONTENT_TYPE, props.content_type.as_str()),
                    (header::CONTENT_LENGTH, props.content_length.to_string().as_str()),
                ],
                Body::empty(),
            )?;
            let headers = response.headers_mut();
            if !props.etag.is_empty() {
                headers.insert(header::ETAG, header_value(&props.etag)?);
            }
            headers.insert(header::LAST_MODIFIED, header_value(&format_http_date(&props.last_modified))?);
            if let Some(ref md5) = props.content_md5 {
                headers.insert("content-md5", header_value(md5)?);
            }

            *response.body_mut() = Body::from_stream(download.body);
            Ok(response)
        }
        BlobReadOp::Props => {
            let properties = backend.blob_properties(container, blob).await?;
            json_response(StatusCode::OK, &properties)
        }
        BlobReadOp::Tags => {
            let tags = backend.blob_tags(container, blob).await?;
            json_response(StatusCode::OK, &tags)
        }
        BlobReadOp::Sas => {
            let params = SasParams::from_query(&ctx.query_params)?;
            let expires_on = params.expires_on(Utc::now())?;
            let url = backend.generate_sas_url(container, blob, &params.permissions, expires_on)?;
            text_response(StatusCode::OK, url)
        }
    }
}

/// PUT /{container}/{blob}?op=create|metadata
pub async fn put_blob(
    ctx: &RequestContext,
    backend: Arc<dyn BlobBackend>,
    body: Bytes,
) -> GatewayResult<Response<Body>> {
    let (container, blob) = validate_names(ctx)?;
    let op = parse_op(ctx.op(), BlobWriteOp::from_str)?;
    tracing::debug!(request_id = %ctx.request_id, container, blob, op = op.as_str(), "blob request");

    match op {
        BlobWriteOp::Create => {
            let content_type = ctx.content_type().unwrap_or(DEFAULT_CONTENT_TYPE);
            backend.upload(container, blob, content_type, body).await?;
            status_response(StatusCode::CREATED)
        }
        BlobWriteOp::Metadata => {
            let metadata = parse_metadata(&body)?;
            backend.set_blob_metadata(container, blob, metadata).await?;
            status_response(StatusCode::OK)
        }
    }
}

/// POST /{container}/{blob}?op=upload
pub async fn post_blob(
    ctx: &RequestContext,
    backend: Arc<dyn BlobBackend>,
    multipart: Result<Multipart, MultipartRejection>,
) -> GatewayResult<Response<Body>> {
    let (container, blob) = validate_names(ctx)?;
    let op = parse_op(ctx.op(), BlobUploadOp::from_str)?;
    tracing::debug!(request_id = %ctx.request_id, container, blob, op = op.as_str(), "blob request");

    match op {
        BlobUploadOp::Upload => {
            let file = read_uploaded_file(multipart).await?;
            tracing::debug!(
                request_id = %ctx.request_id,
                file_name = %file.file_name,
                size = file.data.len(),
                "received upload"
            );
            backend
                .upload(container, blob, &file.content_type, file.data)
                .await?;
            status_response(StatusCode::CREATED)
        }
    }
}

/// The single file part of an upload request.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

fn upload_error(message: impl Into<String>) -> GatewayError {
    GatewayError::with_message(ErrorCode::InvalidUpload, message)
}

fn multipart_error(status: StatusCode, message: String) -> GatewayError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::with_message(ErrorCode::RequestBodyTooLarge, message)
    } else {
        upload_error(message)
    }
}

/// Reads exactly one file part; plain form fields are skipped.
async fn read_uploaded_file(
    multipart: Result<Multipart, MultipartRejection>,
) -> GatewayResult<UploadedFile> {
    let mut multipart = multipart.map_err(|e| multipart_error(e.status(), e.body_text()))?;
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e.status(), e.body_text()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if file.is_some() {
            return Err(upload_error("Exactly one uploaded file is expected."));
        }

        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e.status(), e.body_text()))?;

        file = Some(UploadedFile {
            file_name,
            content_type,
            data,
        });
    }

    file.ok_or_else(|| GatewayError::new(ErrorCode::InvalidUpload))
}
