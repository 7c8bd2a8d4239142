//! Path utilities for stored media files.
//!
//! Resource ids are the stored filenames of uploaded tracks. They are resolved
//! against a storage root, so they must be a single plain path component.

use std::path::Path;

use crate::{Error, Result};

/// List of supported audio file extensions.
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "aac", "flac", "wav", "ogg", "oga", "opus", "weba", "webm",
];

/// Check if a path has an audio file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tunestream_common::paths::is_audio_file;
///
/// assert!(is_audio_file(Path::new("song.mp3")));
/// assert!(is_audio_file(Path::new("/data/music/song.FLAC")));
/// assert!(!is_audio_file(Path::new("cover.jpg")));
/// ```
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Get the list of audio file extensions.
#[must_use]
pub fn audio_extensions() -> &'static [&'static str] {
    AUDIO_EXTENSIONS
}

/// Validate that a resource id is a plain filename.
///
/// Rejects empty ids, path separators, parent references and hidden files so
/// the id can be joined onto a storage root without escaping it.
///
/// # Examples
///
/// ```
/// use tunestream_common::paths::validate_resource_id;
///
/// assert!(validate_resource_id("1700000000000-42.mp3").is_ok());
/// assert!(validate_resource_id("../etc/passwd").is_err());
/// ```
pub fn validate_resource_id(resource_id: &str) -> Result<()> {
    if resource_id.is_empty()
        || resource_id.contains('/')
        || resource_id.contains('\\')
        || resource_id.contains("..")
        || resource_id.contains('\0')
        || resource_id.starts_with('.')
    {
        return Err(Error::invalid_input(format!(
            "invalid resource id: {resource_id:?}"
        )));
    }
    Ok(())
}
