use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Extension,
};
use futures::TryStreamExt;
use serde_json::Value;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::errors::{AppError, AppResult, UpstreamError};
use crate::handlers::scope;
use crate::middleware::Caller;
use crate::state::AppState;

/// Size of the frames relayed to the browser.
const CHUNK_SIZE: usize = 1024 * 1024;

const FALLBACK_FILENAME: &str = "download";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Places a usable URL may appear in a download-url response, in order of
/// preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    /// `web_content_link`
    WebContentLink,
    /// `medias[0].link.url`
    FirstMedia,
    /// `url` of the first entry in the `links` map
    FirstLink,
}

impl LinkSource {
    pub const PREFERENCE: [LinkSource; 3] = [
        LinkSource::WebContentLink,
        LinkSource::FirstMedia,
        LinkSource::FirstLink,
    ];

    pub fn extract(self, response: &Value) -> Option<&str> {
        let url = match self {
            LinkSource::WebContentLink => response.get("web_content_link")?.as_str(),
            LinkSource::FirstMedia => response
                .get("medias")?
                .as_array()?
                .first()?
                .pointer("/link/url")?
                .as_str(),
            LinkSource::FirstLink => response
                .get("links")?
                .as_object()?
                .values()
                .next()?
                .get("url")?
                .as_str(),
        };
        url.filter(|u| !u.is_empty())
    }

    /// First source in preference order that yields a URL.
    pub fn find(response: &Value) -> Option<(LinkSource, &str)> {
        Self::PREFERENCE
            .iter()
            .find_map(|source| source.extract(response).map(|url| (*source, url)))
    }
}

pub async fn proxy_download(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(file_id): Path<String>,
) -> AppResult<Response> {
    scope::ensure_file_visible(&caller, &file_id).await?;

    let file_info = caller.client.offline_file_info(&file_id).await?;
    let download = caller.client.get_download_url(&file_id).await?;

    let (source, url) = LinkSource::find(&download).ok_or_else(|| {
        tracing::warn!("No download URL in upstream response for file {}", file_id);
        AppError::NotFound("Download URL not found".into())
    })?;
    tracing::info!("Proxying file {} via {:?}", file_id, source);

    let upstream = state
        .http
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(UpstreamError::from)?;

    let headers = download_headers(&file_info, upstream.headers());

    let stream = upstream.bytes_stream().map_err(std::io::Error::other);
    let reader = StreamReader::new(stream);
    let body = Body::from_stream(ReaderStream::with_capacity(reader, CHUNK_SIZE));

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {}", e)))?;
    response.headers_mut().extend(headers);
    Ok(response)
}

/// Disposition, type and length from our own metadata, falling back to what
/// the file host sent.
fn download_headers(file_info: &Value, upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let name = file_info
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_FILENAME);
    if let Ok(value) = HeaderValue::from_str(&content_disposition(name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    let content_type = file_info
        .get("mime_type")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .and_then(|m| HeaderValue::from_str(m).ok())
        .or_else(|| upstream.get(header::CONTENT_TYPE).cloned())
        .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
    headers.insert(header::CONTENT_TYPE, content_type);

    let content_length = file_info
        .get("size")
        .and_then(size_of)
        .map(HeaderValue::from)
        .or_else(|| upstream.get(header::CONTENT_LENGTH).cloned());
    if let Some(value) = content_length {
        headers.insert(header::CONTENT_LENGTH, value);
    }

    headers
}

// PikPak reports sizes as strings.
fn size_of(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        other => other.as_u64(),
    }
}

/// `attachment` with an ASCII `filename` plus the exact name as RFC 5987
/// `filename*`.
fn content_disposition(name: &str) -> String {
    let ascii: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(name)
    )
}
