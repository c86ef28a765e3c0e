//! Request routing: binds (method, path) to the resource handlers.

use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::MultipartRejection,
        rejection::{BytesRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{HeaderMap, HeaderValue, Method, Response, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::BlobBackend;
use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{ErrorCode, GatewayError, GatewayResult};
use crate::handlers;

type Params = HashMap<String, String>;
type PathParams = Result<Path<Params>, PathRejection>;
type QueryParams = Result<Query<Params>, QueryRejection>;

/// Application state shared between handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<dyn BlobBackend>,
}

/// Creates the gateway router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        // Service level
        .route("/", get(service_handler))
        // Container level
        .route("/:container", get(container_read_handler).put(container_write_handler))
        // Blob level; the trailing-slash route carries an empty blob name
        .route(
            "/:container/",
            get(blob_read_handler).put(blob_write_handler).post(blob_upload_handler),
        )
        .route(
            "/:container/*blob",
            get(blob_read_handler).put(blob_write_handler).post(blob_upload_handler),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Handler for `GET /`.
async fn service_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: QueryParams,
) -> Response<Body> {
    let (ctx, extracted) = request_context(method, uri, headers, None, query);
    let result = match extracted {
        Ok(()) => handlers::get_storage(&ctx, state.backend.clone()).await,
        Err(e) => Err(e),
    };
    finish(&state, &ctx, result)
}

/// Handler for `GET /{container}`.
async fn container_read_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path: PathParams,
    query: QueryParams,
) -> Response<Body> {
    let (ctx, extracted) = request_context(method, uri, headers, Some(path), query);
    let result = match extracted {
        Ok(()) => handlers::get_container(&ctx, state.backend.clone()).await,
        Err(e) => Err(e),
    };
    finish(&state, &ctx, result)
}

/// Handler for `PUT /{container}`.
async fn container_write_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path: PathParams,
    query: QueryParams,
    body: Result<Bytes, BytesRejection>,
) -> Response<Body> {
    let (ctx, extracted) = request_context(method, uri, headers, Some(path), query);
    let result = match extracted.and(body.map_err(body_error)) {
        Ok(body) => handlers::put_container(&ctx, state.backend.clone(), body).await,
        Err(e) => Err(e),
    };
    finish(&state, &ctx, result)
}

/// Handler for `GET /{container}/{blob}`.
async fn blob_read_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path: PathParams,
    query: QueryParams,
) -> Response<Body> {
    let (ctx, extracted) = request_context(method, uri, headers, Some(path), query);
    let result = match extracted {
        Ok(()) => handlers::get_blob(&ctx, state.backend.clone()).await,
        Err(e) => Err(e),
    };
    finish(&state, &ctx, result)
}

/// Handler for `PUT /{container}/{blob}`.
async fn blob_write_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path: PathParams,
    query: QueryParams,
    body: Result<Bytes, BytesRejection>,
) -> Response<Body> {
    let (ctx, extracted) = request_context(method, uri, headers, Some(path), query);
    let result = match extracted.and(body.map_err(body_error)) {
        Ok(body) => handlers::put_blob(&ctx, state.backend.clone(), body).await,
        Err(e) => Err(e),
    };
    finish(&state, &ctx, result)
}

/// Handler for `POST /{container}/{blob}`.
///
/// A multipart rejection is handed to the handler so that name and `op`
/// errors still take precedence over upload errors.
async fn blob_upload_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path: PathParams,
    query: QueryParams,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response<Body> {
    let (ctx, extracted) = request_context(method, uri, headers, Some(path), query);
    let result = match extracted {
        Ok(()) => handlers::post_blob(&ctx, state.backend.clone(), multipart).await,
        Err(e) => Err(e),
    };
    finish(&state, &ctx, result)
}

/// Builds the request context. A malformed path or query still yields a
/// context (without parameters) so the error is rendered like any other.
fn request_context(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path: Option<PathParams>,
    query: QueryParams,
) -> (RequestContext, GatewayResult<()>) {
    let path = match path {
        None => Ok(Params::new()),
        Some(path) => path.map(|Path(params)| params).map_err(|e| {
            GatewayError::with_message(ErrorCode::InvalidArgument, e.body_text())
        }),
    };
    let query = query
        .map(|Query(params)| params)
        .map_err(|e| GatewayError::with_message(ErrorCode::InvalidArgument, e.body_text()));

    match path.and_then(|path| query.map(|query| (path, query))) {
        Ok((path, query)) => (RequestContext::new(method, uri, headers, path, query), Ok(())),
        Err(e) => (
            RequestContext::new(method, uri, headers, Params::new(), Params::new()),
            Err(e),
        ),
    }
}

fn body_error(rejection: BytesRejection) -> GatewayError {
    let code = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorCode::RequestBodyTooLarge
    } else {
        ErrorCode::InvalidArgument
    };
    GatewayError::with_message(code, rejection.body_text())
}

/// Renders the handler outcome and stamps the request id.
fn finish(state: &AppState, ctx: &RequestContext, result: GatewayResult<Response<Body>>) -> Response<Body> {
    match result {
        Ok(mut response) => {
            if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
                response.headers_mut().insert("x-request-id", value);
            }
            response
        }
        Err(err) => {
            if err.code.is_client_error() {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    method = %ctx.method,
                    uri = %ctx.uri,
                    code = err.code.as_str(),
                    message = %err.message,
                    "request rejected"
                );
            } else {
                tracing::error!(
                    request_id = %ctx.request_id,
                    method = %ctx.method,
                    uri = %ctx.uri,
                    code = err.code.as_str(),
                    message = %err.message,
                    "request failed"
                );
            }

            let err = if state.config.display_error_details {
                err
            } else {
                err.conceal_details()
            };
            err.with_request_id(&ctx.request_id).into_response()
        }
    }
}
