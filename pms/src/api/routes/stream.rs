//! Audio streaming route.
//!
//! `GET /api/stream/{id}` serves the committed file of a track with single
//! byte-range support.

use std::io::SeekFrom;
use std::path::Path as FsPath;

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::library::track_not_found;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

/// Create the stream router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(stream_track))
}

/// Outcome of interpreting a `Range` header against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// Serve the whole file.
    Full,
    /// Serve `start..=end`.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Interpret a `Range` header value.
///
/// Only a single `bytes=` range is honored; anything else falls back to the
/// full body. Suffix ranges (`bytes=-N`) select the last `N` bytes.
pub fn parse_range(value: &str, size: u64) -> ByteRange {
    let Some(ranges) = value.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if ranges.contains(',') {
        return ByteRange::Full;
    }
    let Some((start, end)) = ranges.split_once('-') else {
        return ByteRange::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let Ok(suffix) = end.parse::<u64>() else {
            return ByteRange::Full;
        };
        if suffix == 0 || size == 0 {
            return ByteRange::Unsatisfiable;
        }
        return ByteRange::Partial {
            start: size.saturating_sub(suffix),
            end: size - 1,
        };
    }

    let Ok(start) = start.parse::<u64>() else {
        return ByteRange::Full;
    };
    let end = if end.is_empty() {
        size.saturating_sub(1)
    } else {
        match end.parse::<u64>() {
            Ok(end) => end.min(size.saturating_sub(1)),
            Err(_) => return ByteRange::Full,
        }
    };

    if start >= size || start > end {
        return ByteRange::Unsatisfiable;
    }
    ByteRange::Partial { start, end }
}

/// MIME type for a committed track format. Unknown formats are served as MP3.
pub fn content_type_for(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "m4a" | "aac" | "mp4" => "audio/mp4",
        "opus" | "ogg" | "vorbis" => "audio/ogg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        _ => "audio/mpeg",
    }
}

fn no_source() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NO_SOURCE", "Audio file not found")
}

async fn stream_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let track = state.catalog.get_track(&id).ok_or_else(track_not_found)?;
    let path = FsPath::new(&track.file_path);

    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(no_source()),
        Err(e) => return Err(crate::Error::io_path("opening", path, e).into()),
    };
    let size = file
        .metadata()
        .await
        .map_err(|e| crate::Error::io_path("reading metadata of", path, e))?
        .len();

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map_or(ByteRange::Full, |v| parse_range(v, size));

    let mut out = HeaderMap::new();
    out.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&track.format)),
    );
    out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    match range {
        ByteRange::Full => {
            out.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
            let body = Body::from_stream(ReaderStream::new(file));
            Ok((StatusCode::OK, out, body).into_response())
        }
        ByteRange::Partial { start, end } => {
            debug!(track_id = %id, start, end, "Serving byte range");
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| crate::Error::io_path("seeking", path, e))?;
            let len = end - start + 1;
            out.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
            if let Ok(value) = HeaderValue::from_str(&format!("bytes {start}-{end}/{size}")) {
                out.insert(header::CONTENT_RANGE, value);
            }
            let body = Body::from_stream(ReaderStream::new(file.take(len)));
            Ok((StatusCode::PARTIAL_CONTENT, out, body).into_response())
        }
        ByteRange::Unsatisfiable => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                out.insert(header::CONTENT_RANGE, value);
            }
            let error = ApiError::new(
                StatusCode::RANGE_NOT_SATISFIABLE,
                "RANGE_NOT_SATISFIABLE",
                "Requested range not satisfiable",
            );
            Ok((out, error).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_bounded() {
        assert_eq!(
            parse_range("bytes=0-1", 3),
            ByteRange::Partial { start: 0, end: 1 }
        );
        assert_eq!(
            parse_range("bytes=1-100", 3),
            ByteRange::Partial { start: 1, end: 2 }
        );
    }

    #[test]
    fn test_parse_range_open_ended_and_suffix() {
        assert_eq!(
            parse_range("bytes=5-", 10),
            ByteRange::Partial { start: 5, end: 9 }
        );
        assert_eq!(
            parse_range("bytes=-4", 10),
            ByteRange::Partial { start: 6, end: 9 }
        );
        assert_eq!(
            parse_range("bytes=-40", 10),
            ByteRange::Partial { start: 0, end: 9 }
        );
    }

    #[test]
    fn test_parse_range_unsatisfiable() {
        assert_eq!(parse_range("bytes=10-", 10), ByteRange::Unsatisfiable);
        assert_eq!(parse_range("bytes=5-2", 10), ByteRange::Unsatisfiable);
        assert_eq!(parse_range("bytes=0-", 0), ByteRange::Unsatisfiable);
        assert_eq!(parse_range("bytes=-0", 10), ByteRange::Unsatisfiable);
    }

    #[test]
    fn test_content_type_follows_format() {
        assert_eq!(content_type_for("mp3"), "audio/mpeg");
        assert_eq!(content_type_for("M4A"), "audio/mp4");
        assert_eq!(content_type_for("opus"), "audio/ogg");
        assert_eq!(content_type_for("flac"), "audio/flac");
        assert_eq!(content_type_for("wav"), "audio/wav");
        assert_eq!(content_type_for(""), "audio/mpeg");
    }

    #[test]
    fn test_parse_range_ignored() {
        assert_eq!(parse_range("items=0-1", 10), ByteRange::Full);
        assert_eq!(parse_range("bytes=0-1,4-5", 10), ByteRange::Full);
        assert_eq!(parse_range("bytes=a-b", 10), ByteRange::Full);
    }
}
