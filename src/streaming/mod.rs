//! Track streaming.
//!
//! Serves stored audio files with HTTP range request support. Ranged
//! responses are capped at [`CHUNK_CAP`] bytes so players stream a track
//! progressively instead of pulling it in one response.
//!
//! # Routes
//!
//! - `GET /api/tracks/stream/{resource_id}` - Range-aware track streaming

mod content_type;
mod range;
mod responder;
mod store;

pub use content_type::{ContentTypeResolver, GuessContentType, DEFAULT_AUDIO_TYPE};
pub use range::{parse_range_header, ByteRange, ResponseWindow, CHUNK_CAP};
pub use responder::{handle_stream_request, StreamOutcome};
pub use store::{ByteStream, FsMediaStore, MediaStore, MemoryMediaStore, READ_BUFFER_SIZE};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    routing::get,
    Router,
};

use crate::error::AppError;
use crate::server::AppContext;

/// Stream a stored track, honoring the `Range` header.
pub async fn stream_track(
    State(ctx): State<AppContext>,
    Path(resource_id): Path<String>,
    headers: HeaderMap,
) -> Result<StreamOutcome, AppError> {
    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    Ok(handle_stream_request(
        &resource_id,
        range_header,
        ctx.store.as_ref(),
        ctx.content_types.as_ref(),
    )
    .await?)
}

/// Create the track streaming router.
pub fn tracks_router() -> Router<AppContext> {
    Router::new().route("/stream/:resource_id", get(stream_track))
}
