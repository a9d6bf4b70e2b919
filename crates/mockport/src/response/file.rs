//! Static file serving for file-backed responses.
//!
//! Serves one resolved file with:
//! - content type from configuration, or guessed from the extension
//! - weak ETag and Last-Modified validators
//! - `If-None-Match` / `If-Modified-Since` handling (304)
//! - single `Range: bytes=...` requests (206 / 416)

use super::builder::{plain_text, ResponseBuilder};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    ACCEPT_RANGES, CONTENT_RANGE, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED, RANGE,
};
use hyper::{HeaderMap, Method, Response, StatusCode};
use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Validators derived from file metadata
struct Validators {
    etag_value: String,
    etag_header: String,
    modified: Option<SystemTime>,
}

impl Validators {
    fn from_metadata(metadata: &Metadata) -> Self {
        let modified = metadata.modified().ok();
        let mtime_nanos = modified
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let etag_value = format!("{}-{}", metadata.len(), mtime_nanos);
        let etag_header = format!(r#"W/"{etag_value}""#);
        Self {
            etag_value,
            etag_header,
            modified,
        }
    }

    fn last_modified(&self) -> Option<String> {
        self.modified.map(httpdate::fmt_http_date)
    }
}

/// Outcome of parsing a `Range` header against a file length
#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Serve `path`. `headers` are the configured response headers and win over
/// the detected content type.
pub(crate) async fn serve_file(
    path: &Path,
    method: &Method,
    request_headers: &HeaderMap,
    headers: &HeaderMap,
) -> Response<Full<Bytes>> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) | Err(_) => {
            debug!("File response target {} is missing", path.display());
            return plain_text(
                StatusCode::NOT_FOUND,
                format!("File does not exist {}\n", path.display()),
            );
        }
    };

    let validators = Validators::from_metadata(&metadata);
    let mut builder = ResponseBuilder::new(StatusCode::OK)
        .header(ACCEPT_RANGES.as_str(), "bytes")
        .header(ETAG.as_str(), &validators.etag_header);
    if let Some(last_modified) = validators.last_modified() {
        builder = builder.header(LAST_MODIFIED.as_str(), &last_modified);
    }

    if is_not_modified(method, request_headers, &validators) {
        let mut response = builder.merge_headers(headers).build();
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        return response;
    }

    if !headers.contains_key(CONTENT_TYPE) {
        let guessed = mime_guess::from_path(path).first_or_octet_stream();
        builder = builder.header(CONTENT_TYPE.as_str(), guessed.essence_str());
    }
    builder = builder.merge_headers(headers);

    let len = metadata.len();
    let range = if method == Method::GET {
        request_headers
            .get(RANGE)
            .and_then(|v| v.to_str().ok())
            .map(|v| parse_range(v, len))
            .unwrap_or(ByteRange::Full)
    } else {
        ByteRange::Full
    };

    match range {
        ByteRange::Full if method == Method::HEAD => builder.build(),
        ByteRange::Full => match tokio::fs::read(path).await {
            Ok(content) => builder.body(Bytes::from(content)).build(),
            Err(e) => read_failed(path, e),
        },
        ByteRange::Partial { start, end } => match read_range(path, start, end).await {
            Ok(content) => {
                let mut response = builder
                    .header(
                        CONTENT_RANGE.as_str(),
                        &format!("bytes {start}-{end}/{len}"),
                    )
                    .body(content)
                    .build();
                *response.status_mut() = StatusCode::PARTIAL_CONTENT;
                response
            }
            Err(e) => read_failed(path, e),
        },
        ByteRange::Unsatisfiable => {
            let mut response = builder
                .header(CONTENT_RANGE.as_str(), &format!("bytes */{len}"))
                .build();
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            response
        }
    }
}

/// Read the inclusive byte range `start..=end` without loading the rest of the file
async fn read_range(path: &Path, start: u64, end: u64) -> io::Result<Bytes> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;
    let mut content = vec![0; (end - start + 1) as usize];
    file.read_exact(&mut content).await?;
    Ok(Bytes::from(content))
}

fn read_failed(path: &Path, e: io::Error) -> Response<Full<Bytes>> {
    debug!("Failed to read {}: {}", path.display(), e);
    plain_text(
        StatusCode::NOT_FOUND,
        format!("File does not exist {}\n", path.display()),
    )
}

fn is_not_modified(method: &Method, request_headers: &HeaderMap, validators: &Validators) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return false;
    }

    let if_none_match: Vec<&str> = request_headers
        .get_all(IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if !if_none_match.is_empty() {
        // If-None-Match takes precedence over If-Modified-Since
        return if_none_match
            .iter()
            .flat_map(|v| v.split(','))
            .any(|tag| etag_matches(tag, &validators.etag_value));
    }

    let since = request_headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok());
    match (since, validators.modified) {
        // HTTP dates have second precision
        (Some(since), Some(modified)) => {
            let modified_secs = modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let since_secs = since
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            modified_secs <= since_secs
        }
        _ => false,
    }
}

fn etag_matches(token: &str, etag_value: &str) -> bool {
    let token = token.trim();
    if token == "*" {
        return true;
    }
    let token = token
        .strip_prefix("W/")
        .or_else(|| token.strip_prefix("w/"))
        .unwrap_or(token)
        .trim();
    let token = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token);
    !token.is_empty() && token == etag_value
}

fn parse_range(header: &str, len: u64) -> ByteRange {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    // Multiple ranges are served as the whole file
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((start, end)) = spec.trim().split_once('-') else {
        return ByteRange::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // Suffix range: last N bytes
        let Ok(suffix) = end.parse::<u64>() else {
            return ByteRange::Full;
        };
        if suffix == 0 || len == 0 {
            return ByteRange::Unsatisfiable;
        }
        let start = len.saturating_sub(suffix);
        return ByteRange::Partial {
            start,
            end: len - 1,
        };
    }

    let Ok(start) = start.parse::<u64>() else {
        return ByteRange::Full;
    };
    if start >= len {
        return ByteRange::Unsatisfiable;
    }
    let end = if end.is_empty() {
        len - 1
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => end.min(len - 1),
            _ => return ByteRange::Full,
        }
    };
    ByteRange::Partial { start, end }
}
