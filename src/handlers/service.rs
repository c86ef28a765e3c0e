//! Service-level handler: `GET /`.

use axum::{
    body::Body,
    http::{Response, StatusCode},
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::BlobBackend;
use crate::context::RequestContext;
use crate::error::{ErrorCode, GatewayResult};
use crate::models::ContainerProperties;
use crate::operation::{parse_op, ServiceOp};
use crate::validate::validate_required_argument;

use super::json_response;

/// Query argument holding the tag filter of `op=find`.
pub const WHERE_PARAM: &str = "where";

/// GET /?op=list|find
pub async fn get_storage(
    ctx: &RequestContext,
    backend: Arc<dyn BlobBackend>,
) -> GatewayResult<Response<Body>> {
    let op = parse_op(ctx.op(), ServiceOp::from_str)?;
    tracing::debug!(request_id = %ctx.request_id, op = op.as_str(), "service request");

    match op {
        ServiceOp::List => {
            let containers: BTreeMap<String, ContainerProperties> = backend
                .list_containers()
                .await?
                .into_iter()
                .map(|item| (item.name, item.properties))
                .collect();
            json_response(StatusCode::OK, &containers)
        }
        ServiceOp::Find => {
            validate_required_argument(WHERE_PARAM, &ctx.query_params)
                .into_result(ErrorCode::MissingRequiredArgument)?;
            let expression = ctx.query_param(WHERE_PARAM).unwrap_or_default();

            let blobs = backend.find_blobs_by_tags(expression).await?;
            json_response(StatusCode::OK, &blobs)
        }
    }
}
