//! HTTP `Range` header parsing and chunk-capped window selection.
//!
//! Ranged responses never carry more than [`CHUNK_CAP`] bytes, whatever the
//! client asked for. A player therefore pulls a long track as a series of
//! successive range requests, each answered with a self-consistent
//! `Content-Range`.

use std::num::IntErrorKind;

/// Maximum number of bytes served in a single ranged response.
pub const CHUNK_CAP: u64 = 512 * 1024;

/// A byte range as requested by the client, before it is fitted to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive end; `None` for open-ended ranges like `bytes=500-`.
    pub end: Option<u64>,
}

/// Parse a `Range: bytes=START-END` header value.
///
/// Parsing is permissive: anything that is not a single well-formed range
/// yields `None` and the request is served as if no range had been sent.
/// An empty start token means `0`. Numeric tokens too large for `u64`
/// saturate, so an overflowing start is still judged as out of bounds.
/// Reversed ranges are rejected here, while out-of-bounds starts are left for
/// [`ResponseWindow::fit`] to judge.
pub fn parse_range_header(value: &str) -> Option<ByteRange> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start_str, end_str) = spec.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    let start: u64 = if start_str.is_empty() {
        0
    } else {
        parse_offset(start_str)?
    };
    let end: Option<u64> = if end_str.is_empty() {
        None
    } else {
        Some(parse_offset(end_str)?)
    };

    if matches!(end, Some(end) if end < start) {
        return None;
    }

    Some(ByteRange { start, end })
}

/// Parse one offset of a range, saturating at `u64::MAX` on overflow.
fn parse_offset(token: &str) -> Option<u64> {
    match token.parse::<u64>() {
        Ok(offset) => Some(offset),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => Some(u64::MAX),
        Err(_) => None,
    }
}

/// The byte window actually served for a ranged request.
///
/// Always satisfies `start <= end < total` and `len() <= CHUNK_CAP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseWindow {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    pub total: u64,
}

impl ResponseWindow {
    /// Fit a requested range to a resource of `total` bytes.
    ///
    /// The end is the smallest of the requested end, the chunk cap and the
    /// last byte of the resource. Returns `None` when the start lies past the
    /// end of the resource (including any range on an empty resource) or the
    /// range is reversed.
    pub fn fit(range: ByteRange, total: u64) -> Option<Self> {
        if range.start >= total || matches!(range.end, Some(end) if end < range.start) {
            return None;
        }
        let last = total - 1;
        let capped = range.start.saturating_add(CHUNK_CAP - 1);
        let end = range.end.unwrap_or(last).min(capped).min(last);

        Some(Self {
            start: range.start,
            end,
            total,
        })
    }

    /// Number of bytes in the window.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for this window.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// `Content-Range` header value for a 416 response.
pub fn unsatisfiable_content_range(total: u64) -> String {
    format!("bytes */{total}")
}
