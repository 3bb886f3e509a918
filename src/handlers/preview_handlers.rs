//! HTTP handlers for preview operations.
//! Each handler makes exactly one `PreviewStore` call and turns its outcome
//! into status, headers and body. Preview content is streamed out, never
//! buffered by the handler.

use crate::{
    errors::AppError,
    models::{
        metadata::Metadata,
        preview::{Content, Preview},
    },
    services::preview_store::{ContentFetch, PREVIEW_CONTENT_TYPE, PreviewStore},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::io;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, error};

/// `Overwrite: true` allows a deposit to replace existing content.
static OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
/// Optional base64 MD5 the deposited bytes must match.
static CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

/// HEAD `/{source_id}/{checksum}`: does a preview exist?
pub async fn check_preview_exists(
    State(store): State<PreviewStore>,
    Path((source_id, checksum)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let preview_checksum = store.get_preview_checksum(&source_id, &checksum).await?;
    debug!("check_preview_exists: etag {}", preview_checksum);

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_etag(response.headers_mut(), &preview_checksum);
    Ok(response)
}

/// GET `/{source_id}/{checksum}`: preview metadata as JSON.
pub async fn get_preview_metadata(
    State(store): State<PreviewStore>,
    Path((source_id, checksum)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let metadata = store.get_metadata(&source_id, &checksum).await?;
    debug!("get_preview_metadata: {:?}", metadata);
    Ok(metadata_response(StatusCode::OK, metadata))
}

/// GET `/{source_id}/{checksum}/content`: stream the PDF.
///
/// Answers `304 Not Modified` when `If-None-Match` carries the current
/// checksum.
pub async fn get_preview_content(
    State(store): State<PreviewStore>,
    Path((source_id, checksum)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(unquote_etag);

    let preview = match store
        .get_preview_if_none_match(&source_id, &checksum, none_match)
        .await?
    {
        ContentFetch::NotModified { checksum } => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::NOT_MODIFIED;
            set_etag(response.headers_mut(), &checksum);
            return Ok(response);
        }
        ContentFetch::Modified(preview) => preview,
    };

    let (Some(metadata), Some(content)) = (preview.metadata, preview.content) else {
        error!("Unexpected error loading content");
        return Err(AppError::internal("Unexpected error loading content"));
    };

    let body = Body::from_stream(ReaderStream::new(content.into_stream()));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    set_etag(headers, &metadata.checksum);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PREVIEW_CONTENT_TYPE),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(metadata.size_bytes.max(0)),
    );
    debug!("get_preview_content: {:?}", response.headers());
    Ok(response)
}

/// PUT `/{source_id}/{checksum}/content`: deposit a PDF.
pub async fn deposit_preview(
    State(store): State<PreviewStore>,
    Path((source_id, checksum)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim());
    match content_type {
        Some(value) if value.eq_ignore_ascii_case(PREVIEW_CONTENT_TYPE) => {}
        Some(value) => {
            return Err(AppError::bad_request(format!(
                "Unsupported content type `{}`",
                value
            )));
        }
        None => return Err(AppError::bad_request("Content type is required")),
    }

    let overwrite = headers
        .get(&OVERWRITE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
    let content_checksum = headers
        .get(&CONTENT_MD5)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string());

    let stream = body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other));
    let preview = Preview::for_deposit(source_id, checksum, Content::new(StreamReader::new(stream)));
    let preview = store.deposit(preview, overwrite, content_checksum).await?;

    let Some(metadata) = preview.metadata else {
        error!("Preview metadata not set");
        return Err(AppError::internal("An error occurred when storing preview"));
    };
    debug!("deposit_preview: {:?}", metadata);
    Ok(metadata_response(StatusCode::CREATED, metadata))
}

fn metadata_response(status: StatusCode, metadata: Metadata) -> Response {
    let mut resp_headers = HeaderMap::new();
    set_etag(&mut resp_headers, &metadata.checksum);
    (status, resp_headers, Json(metadata)).into_response()
}

fn set_etag(headers: &mut HeaderMap, checksum: &str) {
    let quoted = format!("\"{}\"", checksum);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }
}

/// Strip a weak-validator prefix and surrounding quotes from a client tag.
///
/// Only a single tag is understood. `*` and comma-separated lists never
/// match, so those requests get the full content.
fn unquote_etag(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    value.trim_matches('"')
}
