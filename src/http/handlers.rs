//! Route handlers. Each one produces `Content` and leaves the wire format
//! to the negotiation pipeline.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use axum::{
    extract::{Path as UrlPath, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::http::response::{error_response, negotiate};
use crate::http::server::AppState;
use crate::negotiation::{Content, StreamSource};
use crate::observability::metrics;

#[derive(Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct EchoSummary {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
}

/// Plain banner; served as-is unless the client asks for a format.
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let banner = format!("response-pipeline {}\n", env!("CARGO_PKG_VERSION"));
    negotiate(state.pipeline(), "index", &headers, Content::Structured(Value::String(banner))).await
}

pub async fn health(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let status = HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    };
    match Content::structured(&status) {
        Ok(content) => negotiate(state.pipeline(), "health", &headers, content).await,
        Err(e) => error_response(&e),
    }
}

/// Describe the request back to the client.
pub async fn echo(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let summary = EchoSummary {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_owned),
        headers: headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect(),
    };
    match Content::structured(&summary) {
        Ok(content) => negotiate(state.pipeline(), "echo", &headers, content).await,
        Err(e) => error_response(&e),
    }
}

/// Offer a file under the media root as a stream source.
pub async fn media(
    State(state): State<AppState>,
    UrlPath(requested): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    let Some(path) = resolve_media_path(state.media_root(), &requested) else {
        tracing::warn!(path = %requested, "Rejected media path");
        return not_found();
    };

    let source = match open_source(&path).await {
        Ok(source) => source,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return not_found(),
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Failed to open media file");
            metrics::record_request("media", 500);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    negotiate(state.pipeline(), "media", &headers, Content::FileStream(source)).await
}

async fn open_source(path: &Path) -> io::Result<StreamSource> {
    let file = tokio::fs::File::open(path).await?;
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "not a regular file"));
    }
    Ok(StreamSource::with_len(file.into_std().await, metadata.len()))
}

fn not_found() -> Response {
    metrics::record_request("media", 404);
    (StatusCode::NOT_FOUND, "Media not found").into_response()
}

/// Join `requested` onto `root`, refusing anything but plain path segments.
pub fn resolve_media_path(root: &Path, requested: &str) -> Option<PathBuf> {
    let relative = Path::new(requested.trim_start_matches('/'));
    let mut path = root.to_path_buf();
    let mut segments = 0;
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                path.push(segment);
                segments += 1;
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    (segments > 0).then_some(path)
}
