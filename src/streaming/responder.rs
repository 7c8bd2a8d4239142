//! Range-aware responder for track playback requests.
//!
//! Turns one playback request into a [`StreamOutcome`]: a capped `206`
//! window, a full `200` body, or a rejection. Bodies are lazy streams pulled
//! by the transport, so a response never holds more than one read buffer of
//! the file in memory.

use std::fmt;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use tunestream_common::{Error, Result};

use super::content_type::ContentTypeResolver;
use super::range::{parse_range_header, unsatisfiable_content_range, ResponseWindow};
use super::store::{ByteStream, MediaStore};
use crate::error::AppError;

/// Result of handling one playback request.
pub enum StreamOutcome {
    /// No stored resource with this id.
    NotFound { resource_id: String },
    /// The requested start lies past the end of the resource.
    RangeNotSatisfiable { total: u64 },
    /// Ranged response covering `window`.
    Partial {
        resource_id: String,
        window: ResponseWindow,
        content_type: String,
        body: ByteStream,
    },
    /// Whole resource, sent when no usable range was requested.
    Full {
        resource_id: String,
        total: u64,
        content_type: String,
        body: ByteStream,
    },
}

impl StreamOutcome {
    fn not_found(resource_id: &str) -> Self {
        Self::NotFound {
            resource_id: resource_id.to_string(),
        }
    }

    /// HTTP status this outcome is answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Partial { .. } => StatusCode::PARTIAL_CONTENT,
            Self::Full { .. } => StatusCode::OK,
        }
    }

    /// Number of body bytes the response will carry.
    pub fn content_length(&self) -> u64 {
        match self {
            Self::NotFound { .. } | Self::RangeNotSatisfiable { .. } => 0,
            Self::Partial { window, .. } => window.len(),
            Self::Full { total, .. } => *total,
        }
    }
}

impl fmt::Debug for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { resource_id } => f
                .debug_struct("NotFound")
                .field("resource_id", resource_id)
                .finish(),
            Self::RangeNotSatisfiable { total } => f
                .debug_struct("RangeNotSatisfiable")
                .field("total", total)
                .finish(),
            Self::Partial {
                resource_id,
                window,
                content_type,
                ..
            } => f
                .debug_struct("Partial")
                .field("resource_id", resource_id)
                .field("window", window)
                .field("content_type", content_type)
                .finish_non_exhaustive(),
            Self::Full {
                resource_id,
                total,
                content_type,
                ..
            } => f
                .debug_struct("Full")
                .field("resource_id", resource_id)
                .field("total", total)
                .field("content_type", content_type)
                .finish_non_exhaustive(),
        }
    }
}

/// Answer a playback request for `resource_id`.
///
/// Ranged requests are served at most [`CHUNK_CAP`](super::range::CHUNK_CAP)
/// bytes at a time. Requests without a usable `Range` header get the whole
/// resource in one `200` response, uncapped.
///
/// Returns `Err` only when the store fails to open a resource it just
/// reported as present, for a reason other than the file having vanished.
pub async fn handle_stream_request(
    resource_id: &str,
    range_header: Option<&str>,
    store: &dyn MediaStore,
    resolver: &dyn ContentTypeResolver,
) -> Result<StreamOutcome> {
    if !store.exists(resource_id).await {
        tracing::debug!(resource_id, "Stream requested for unknown resource");
        return Ok(StreamOutcome::not_found(resource_id));
    }

    let total = match store.size(resource_id).await {
        Ok(size) => size,
        Err(e) => {
            tracing::debug!(resource_id, error = %e, "Failed to stat resource");
            return Ok(StreamOutcome::not_found(resource_id));
        }
    };

    let content_type = resolver.resolve(resource_id);

    let range = range_header.and_then(parse_range_header);
    if range.is_none() {
        if let Some(raw) = range_header {
            tracing::debug!(resource_id, range = raw, "Ignoring unusable Range header");
        }
    }

    match range {
        Some(range) => {
            let Some(window) = ResponseWindow::fit(range, total) else {
                tracing::debug!(
                    resource_id,
                    start = range.start,
                    total,
                    "Range start past end of resource"
                );
                return Ok(StreamOutcome::RangeNotSatisfiable { total });
            };

            let body = match open(store, resource_id, window.start, window.end).await? {
                Some(body) => body,
                None => return Ok(StreamOutcome::not_found(resource_id)),
            };

            tracing::trace!(
                resource_id,
                start = window.start,
                end = window.end,
                total,
                "Serving partial content"
            );

            Ok(StreamOutcome::Partial {
                resource_id: resource_id.to_string(),
                window,
                content_type,
                body,
            })
        }
        None => {
            let body: ByteStream = if total == 0 {
                Box::pin(futures::stream::empty())
            } else {
                match open(store, resource_id, 0, total - 1).await? {
                    Some(body) => body,
                    None => return Ok(StreamOutcome::not_found(resource_id)),
                }
            };

            tracing::trace!(resource_id, total, "Serving full content");

            Ok(StreamOutcome::Full {
                resource_id: resource_id.to_string(),
                total,
                content_type,
                body,
            })
        }
    }
}

/// Open a window, mapping a vanished file to `None`.
async fn open(
    store: &dyn MediaStore,
    resource_id: &str,
    start: u64,
    end: u64,
) -> Result<Option<ByteStream>> {
    match store.open_range(resource_id, start, end).await {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.is_not_found() => {
            tracing::debug!(resource_id, "Resource disappeared before it could be opened");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Wrap a body so that read failures after the headers went out are logged.
///
/// Such failures cannot change the status any more; the connection is simply
/// cut short.
fn logged_body(resource_id: String, body: ByteStream) -> Body {
    Body::from_stream(body.inspect_err(move |e| {
        tracing::warn!(resource_id = %resource_id, error = %e, "Stream aborted mid-body");
    }))
}

impl IntoResponse for StreamOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound { resource_id } => {
                AppError::from(Error::not_found(format!("track {resource_id}"))).into_response()
            }
            Self::RangeNotSatisfiable { total } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, unsatisfiable_content_range(total))],
                Body::empty(),
            )
                .into_response(),
            Self::Partial {
                resource_id,
                window,
                content_type,
                body,
            } => (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_RANGE, window.content_range()),
                    (header::CONTENT_LENGTH, window.len().to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                logged_body(resource_id, body),
            )
                .into_response(),
            Self::Full {
                resource_id,
                total,
                content_type,
                body,
            } => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_LENGTH, total.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                logged_body(resource_id, body),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::content_type::GuessContentType;
    use crate::streaming::range::CHUNK_CAP;
    use crate::streaming::store::{MemoryMediaStore, READ_BUFFER_SIZE};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    const MB: usize = 1_000_000;

    fn store_with(id: &str, len: usize) -> (MemoryMediaStore, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let store = MemoryMediaStore::new();
        store.insert(id, data.clone());
        (store, data)
    }

    async fn outcome(store: &dyn MediaStore, id: &str, range: Option<&str>) -> StreamOutcome {
        handle_stream_request(id, range, store, &GuessContentType)
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn header_value<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
        response.headers().get(name).map(|v| v.to_str().unwrap())
    }

    #[tokio::test]
    async fn open_range_is_capped() {
        let (store, data) = store_with("song.mp3", MB);
        let out = outcome(&store, "song.mp3", Some("bytes=0-")).await;
        assert_matches!(&out, StreamOutcome::Partial { window, .. } if window.end == 524_287);

        let response = out.into_response();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header_value(&response, header::CONTENT_RANGE),
            Some("bytes 0-524287/1000000")
        );
        assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("524288"));
        assert_eq!(header_value(&response, header::ACCEPT_RANGES), Some("bytes"));
        assert_eq!(header_value(&response, header::CONTENT_TYPE), Some("audio/mpeg"));

        let body = body_bytes(response).await;
        assert_eq!(body.len(), CHUNK_CAP as usize);
        assert_eq!(&body[..], &data[..CHUNK_CAP as usize]);
    }

    #[tokio::test]
    async fn explicit_end_under_cap() {
        let (store, data) = store_with("song.mp3", MB);
        let response = outcome(&store, "song.mp3", Some("bytes=900000-950000"))
            .await
            .into_response();
        assert_eq!(
            header_value(&response, header::CONTENT_RANGE),
            Some("bytes 900000-950000/1000000")
        );
        assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("50001"));
        assert_eq!(&body_bytes(response).await[..], &data[900_000..=950_000]);
    }

    #[tokio::test]
    async fn last_byte() {
        let (store, data) = store_with("song.mp3", MB);
        let response = outcome(&store, "song.mp3", Some("bytes=999999-"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header_value(&response, header::CONTENT_RANGE),
            Some("bytes 999999-999999/1000000")
        );
        assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("1"));
        assert_eq!(&body_bytes(response).await[..], &data[999_999..]);
    }

    #[tokio::test]
    async fn start_past_end_is_416() {
        let (store, _) = store_with("song.mp3", MB);
        let out = outcome(&store, "song.mp3", Some("bytes=1000000-")).await;
        assert_matches!(out, StreamOutcome::RangeNotSatisfiable { total: 1_000_000 });

        let response = out.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            header_value(&response, header::CONTENT_RANGE),
            Some("bytes */1000000")
        );
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn overflowing_start_is_416() {
        let (store, _) = store_with("song.mp3", 1000);
        let out = outcome(&store, "song.mp3", Some("bytes=99999999999999999999-")).await;
        assert_matches!(out, StreamOutcome::RangeNotSatisfiable { total: 1000 });

        let response = out.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(header_value(&response, header::CONTENT_RANGE), Some("bytes */1000"));
    }

    #[tokio::test]
    async fn missing_resource_is_404() {
        let store = MemoryMediaStore::new();
        let out = outcome(&store, "ghost.mp3", Some("bytes=0-")).await;
        assert_matches!(&out, StreamOutcome::NotFound { resource_id } if resource_id == "ghost.mp3");

        let response = out.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
    }

    #[tokio::test]
    async fn no_range_serves_whole_file_uncapped() {
        let (store, data) = store_with("long.flac", 2 * MB);
        let out = outcome(&store, "long.flac", None).await;
        assert_eq!(out.status(), StatusCode::OK);
        assert_eq!(out.content_length(), 2 * MB as u64);

        let response = out.into_response();
        assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("2000000"));
        assert_eq!(header_value(&response, header::ACCEPT_RANGES), Some("bytes"));
        assert_eq!(header_value(&response, header::CONTENT_TYPE), Some("audio/flac"));
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
        assert_eq!(&body_bytes(response).await[..], &data[..]);
    }

    #[tokio::test]
    async fn malformed_range_falls_back_to_full() {
        let (store, _) = store_with("song.mp3", 4096);
        for raw in ["items=0-5", "bytes=abc-", "bytes=10-5", "bytes=5", "bytes=0-1,3-4"] {
            let out = outcome(&store, "song.mp3", Some(raw)).await;
            assert_matches!(out, StreamOutcome::Full { total: 4096, .. }, "header {raw}");
        }
    }

    #[tokio::test]
    async fn small_file_served_in_one_response() {
        let (store, data) = store_with("short.mp3", 10_000);
        let response = outcome(&store, "short.mp3", Some("bytes=0-"))
            .await
            .into_response();
        assert_eq!(
            header_value(&response, header::CONTENT_RANGE),
            Some("bytes 0-9999/10000")
        );
        assert_eq!(&body_bytes(response).await[..], &data[..]);
    }

    #[tokio::test]
    async fn empty_resource() {
        let store = MemoryMediaStore::new();
        store.insert("silence.mp3", Bytes::new());

        let out = outcome(&store, "silence.mp3", None).await;
        assert_matches!(out, StreamOutcome::Full { total: 0, .. });
        let response = out.into_response();
        assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("0"));
        assert!(body_bytes(response).await.is_empty());

        let out = outcome(&store, "silence.mp3", Some("bytes=0-")).await;
        assert_matches!(out, StreamOutcome::RangeNotSatisfiable { total: 0 });
    }

    #[tokio::test]
    async fn repeated_request_is_identical() {
        let (store, _) = store_with("song.mp3", MB);
        let first = body_bytes(
            outcome(&store, "song.mp3", Some("bytes=300000-"))
                .await
                .into_response(),
        )
        .await;
        let second = body_bytes(
            outcome(&store, "song.mp3", Some("bytes=300000-"))
                .await
                .into_response(),
        )
        .await;
        assert_eq!(first, second);
        assert_eq!(first.len(), CHUNK_CAP as usize);
    }

    #[tokio::test]
    async fn successive_chunks_cover_the_file() {
        let (store, data) = store_with("song.mp3", MB);
        let mut assembled = Vec::new();
        let mut start = 0u64;
        loop {
            let range = format!("bytes={start}-");
            let out = outcome(&store, "song.mp3", Some(range.as_str())).await;
            let StreamOutcome::Partial { window, .. } = &out else {
                panic!("expected partial content, got {out:?}");
            };
            let next = window.end + 1;
            assembled.extend_from_slice(&body_bytes(out.into_response()).await);
            if next >= MB as u64 {
                break;
            }
            start = next;
        }
        assert_eq!(assembled, data);
    }

    /// Store whose size lookup always fails.
    struct BrokenStat(MemoryMediaStore);

    #[async_trait]
    impl MediaStore for BrokenStat {
        async fn exists(&self, resource_id: &str) -> bool {
            self.0.exists(resource_id).await
        }

        async fn size(&self, _resource_id: &str) -> Result<u64> {
            Err(Error::internal("stat failed"))
        }

        async fn open_range(&self, resource_id: &str, start: u64, end: u64) -> Result<ByteStream> {
            self.0.open_range(resource_id, start, end).await
        }
    }

    #[tokio::test]
    async fn failed_stat_is_not_found() {
        let (inner, _) = store_with("song.mp3", 100);
        let store = BrokenStat(inner);
        let out = outcome(&store, "song.mp3", None).await;
        assert_matches!(out, StreamOutcome::NotFound { .. });
    }

    /// Store whose reads fail after the first piece.
    struct FailingRead(MemoryMediaStore);

    #[async_trait]
    impl MediaStore for FailingRead {
        async fn exists(&self, resource_id: &str) -> bool {
            self.0.exists(resource_id).await
        }

        async fn size(&self, resource_id: &str) -> Result<u64> {
            self.0.size(resource_id).await
        }

        async fn open_range(&self, _resource_id: &str, _start: u64, _end: u64) -> Result<ByteStream> {
            let pieces: Vec<std::io::Result<Bytes>> = vec![
                Ok(Bytes::from_static(b"abc")),
                Err(std::io::Error::other("disk went away")),
            ];
            Ok(Box::pin(futures::stream::iter(pieces)))
        }
    }

    #[tokio::test]
    async fn mid_stream_failure_aborts_body() {
        let (inner, _) = store_with("song.mp3", 100);
        let store = FailingRead(inner);
        let response = outcome(&store, "song.mp3", Some("bytes=0-"))
            .await
            .into_response();
        // Headers are already committed.
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert!(response.into_body().collect().await.is_err());
    }

    /// Sets its flag when dropped, standing in for an open file handle.
    struct HandleGuard(Arc<AtomicBool>);

    impl Drop for HandleGuard {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Store serving endless buffer-sized pieces while counting reads.
    #[derive(Default)]
    struct TrackedReads {
        released: Arc<AtomicBool>,
        reads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MediaStore for TrackedReads {
        async fn exists(&self, _resource_id: &str) -> bool {
            true
        }

        async fn size(&self, _resource_id: &str) -> Result<u64> {
            Ok(10 * READ_BUFFER_SIZE as u64)
        }

        async fn open_range(&self, _resource_id: &str, _start: u64, _end: u64) -> Result<ByteStream> {
            let guard = HandleGuard(self.released.clone());
            let reads = self.reads.clone();
            let stream = futures::stream::unfold(guard, move |guard| {
                reads.fetch_add(1, Ordering::SeqCst);
                async move {
                    let piece = Bytes::from(vec![0u8; READ_BUFFER_SIZE]);
                    Some((Ok::<_, std::io::Error>(piece), guard))
                }
            });
            Ok(Box::pin(stream))
        }
    }

    #[tokio::test]
    async fn dropped_body_stops_reads_and_releases_handle() {
        let store = TrackedReads::default();
        let response = outcome(&store, "song.mp3", Some("bytes=0-"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

        let mut body = response.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap().len(), READ_BUFFER_SIZE);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert!(!store.released.load(Ordering::SeqCst));

        // Client went away.
        drop(body);
        assert!(store.released.load(Ordering::SeqCst));
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }
}
