//! HTTP server side of the wire protocol.
//!
//! One resource per file: the URL path is the absolute path of the file on
//! the server's filesystem and the `action` query parameter selects the
//! operation (`info`, `hashes` or `block`). The server is stateless across
//! requests; hash streaming runs the same parallel pipeline as the client
//! and flushes entries as they become ordered.

use axum::body::{Body, Bytes};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::pdiffcopy::hashing::{self, HashMethod};
use crate::pdiffcopy::{operations, BLOCK_SIZE};

/// Server-wide settings; everything else lives in the request.
#[derive(Clone, Debug)]
pub struct ServerState {
    /// Hash workers per request when the client does not ask for a count.
    pub concurrency: usize,
}

#[derive(Debug, Deserialize)]
struct ActionParams {
    action: String,
    block_size: Option<u64>,
    method: Option<String>,
    concurrency: Option<usize>,
    offset: Option<u64>,
    length: Option<u64>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/{*path}", get(handle_read).put(handle_write).post(handle_write))
        .with_state(state)
}

/// Serve the wire protocol on an already-bound listener until the process
/// is stopped.
pub async fn serve(listener: TcpListener, state: ServerState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn handle_read(
    State(state): State<ServerState>,
    UrlPath(path): UrlPath<String>,
    Query(params): Query<ActionParams>,
) -> Response {
    let path = format!("/{path}");
    match params.action.as_str() {
        "info" => info_response(path).await,
        "hashes" => hashes_response(path, &params, &state).await,
        "block" => block_response(path, &params).await,
        other => bad_request(format!("unknown action: {other}")),
    }
}

async fn handle_write(
    UrlPath(path): UrlPath<String>,
    Query(params): Query<ActionParams>,
    body: Bytes,
) -> Response {
    let path = format!("/{path}");
    if params.action != "block" {
        return bad_request(format!("unknown write action: {}", params.action));
    }
    let Some(offset) = params.offset else {
        return bad_request("missing offset parameter".to_string());
    };

    let size = match size_of(path.clone()).await {
        Ok(Some(size)) => size,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(response) => return response,
    };
    let end = offset.saturating_add(body.len() as u64);
    if end > size {
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    }

    let result =
        tokio::task::spawn_blocking(move || operations::write_block(path.as_ref(), offset, &body))
            .await;
    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => internal_error(e.to_string()),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn info_response(path: String) -> Response {
    match size_of(path).await {
        Ok(Some(size)) => Json(serde_json::json!({ "size": size })).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(response) => response,
    }
}

async fn hashes_response(path: String, params: &ActionParams, state: &ServerState) -> Response {
    let method = match params.method.as_deref().unwrap_or("sha1").parse::<HashMethod>() {
        Ok(method) => method,
        Err(e) => return bad_request(e.to_string()),
    };
    let block_size = params.block_size.unwrap_or(BLOCK_SIZE);
    if block_size == 0 {
        return bad_request("block_size must be positive".to_string());
    }
    let concurrency = params.concurrency.unwrap_or(state.concurrency).max(1);

    let size = match size_of(path.clone()).await {
        Ok(Some(size)) => size,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(response) => return response,
    };

    tracing::info!("hashing {path} ({size} bytes) with {concurrency} workers");
    let entries = hashing::local_hash_stream(
        path.into(),
        size,
        block_size,
        method,
        concurrency,
        CancellationToken::new(),
    );
    let lines = ReceiverStream::new(entries).map(|entry| match entry {
        Ok(e) => Ok(Bytes::from(format!("{}\t{}\n", e.offset, e.digest))),
        Err(e) => Err(std::io::Error::other(e.to_string())),
    });

    (
        [(header::CONTENT_TYPE, "text/plain")],
        Body::from_stream(lines),
    )
        .into_response()
}

async fn block_response(path: String, params: &ActionParams) -> Response {
    let (Some(offset), Some(length)) = (params.offset, params.length) else {
        return bad_request("missing offset or length parameter".to_string());
    };

    let size = match size_of(path.clone()).await {
        Ok(Some(size)) => size,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(response) => return response,
    };
    let end = offset.saturating_add(length);
    if end > size {
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    }

    let result =
        tokio::task::spawn_blocking(move || operations::read_block(path.as_ref(), offset, length))
            .await;
    match result {
        Ok(Ok(data)) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            data,
        )
            .into_response(),
        Ok(Err(e)) => internal_error(e.to_string()),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn size_of(path: String) -> std::result::Result<Option<u64>, Response> {
    match tokio::task::spawn_blocking(move || operations::file_size(path.as_ref())).await {
        Ok(Ok(size)) => Ok(size),
        Ok(Err(e)) => Err(internal_error(e.to_string())),
        Err(e) => Err(internal_error(e.to_string())),
    }
}

fn bad_request(message: String) -> Response {
    tracing::warn!("rejecting request: {message}");
    (StatusCode::BAD_REQUEST, message).into_response()
}

fn internal_error(message: String) -> Response {
    tracing::error!("request failed: {message}");
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}
