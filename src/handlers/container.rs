//! Container-level handlers: `GET /{container}` and `PUT /{container}`.

use axum::{
    body::Body,
    http::{Response, StatusCode},
};
use bytes::Bytes;
use std::sync::Arc;

use crate::backend::BlobBackend;
use crate::context::{ListParams, RequestContext};
use crate::error::{ErrorCode, GatewayResult};
use crate::operation::{parse_op, ContainerReadOp, ContainerWriteOp};
use crate::validate::validate_container_name;

use super::{json_response, parse_metadata, status_response};

/// GET /{container}?op=list|props
pub async fn get_container(
    ctx: &RequestContext,
    backend: Arc<dyn BlobBackend>,
) -> GatewayResult<Response<Body>> {
    let container = ctx.container_name();
    validate_container_name(container).into_result(ErrorCode::InvalidContainer)?;

    let op = parse_op(ctx.op(), ContainerReadOp::from_str)?;
    tracing::debug!(request_id = %ctx.request_id, container, op = op.as_str(), "container request");

    match op {
        ContainerReadOp::List => {
            let params = ListParams::from_query(&ctx.query_params)?;
            let blobs = backend
                .list_blobs(container, &params.prefix, params.maxresults)
                .await?;
            json_response(StatusCode::OK, &blobs)
        }
        ContainerReadOp::Props => {
            let properties = backend.container_properties(container).await?;
            json_response(StatusCode::OK, &properties)
        }
    }
}

/// PUT /{container}?op=create|metadata
pub async fn put_container(
    ctx: &RequestContext,
    backend: Arc<dyn BlobBackend>,
    body: Bytes,
) -> GatewayResult<Response<Body>> {
    let container = ctx.container_name();
    validate_container_name(container).into_result(ErrorCode::InvalidContainer)?;

    let op = parse_op(ctx.op(), ContainerWriteOp::from_str)?;
    tracing::debug!(request_id = %ctx.request_id, container, op = op.as_str(), "container request");

    match op {
        ContainerWriteOp::Create => {
            backend.create_container(container).await?;
            status_response(StatusCode::CREATED)
        }
        ContainerWriteOp::Metadata => {
            let metadata = parse_metadata(&body)?;
            backend.set_container_metadata(container, metadata).await?;
            status_response(StatusCode::OK)
        }
    }
}
