//! MIME type resolution for stored tracks.

/// Content type used when the extension is unknown.
pub const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

/// Maps a resource id (a stored filename) to a MIME type.
pub trait ContentTypeResolver: Send + Sync {
    fn resolve(&self, resource_id: &str) -> String;
}

/// Resolver backed by `mime_guess`, falling back to [`DEFAULT_AUDIO_TYPE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GuessContentType;

impl ContentTypeResolver for GuessContentType {
    fn resolve(&self, resource_id: &str) -> String {
        mime_guess::from_path(resource_id)
            .first_raw()
            .unwrap_or(DEFAULT_AUDIO_TYPE)
            .to_string()
    }
}
