//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which lays out a temporary music directory, a
//! default config pointing at it, and the full Axum router.

use std::path::Path;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use tunestream::config::Config;
use tunestream::server::{create_router, AppContext};

/// Test harness wrapping a temporary storage root and a configured router.
pub struct TestHarness {
    pub dir: tempfile::TempDir,
    pub config: Config,
}

impl TestHarness {
    /// Create a harness with empty `music/` and `covers/` directories.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let music = dir.path().join("music");
        let covers = dir.path().join("covers");
        std::fs::create_dir(&music).unwrap();
        std::fs::create_dir(&covers).unwrap();

        let mut config = Config::default();
        config.storage.music_dir = music;
        config.storage.covers_dir = covers;

        Self { dir, config }
    }

    pub fn music_dir(&self) -> &Path {
        &self.config.storage.music_dir
    }

    pub fn covers_dir(&self) -> &Path {
        &self.config.storage.covers_dir
    }

    /// Write a track of `len` patterned bytes and return its contents.
    pub fn add_track(&self, name: &str, len: usize) -> Vec<u8> {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(self.music_dir().join(name), &data).unwrap();
        data
    }

    pub fn router(&self) -> Router {
        create_router(AppContext::new(self.config.clone()))
    }

    /// Send a GET request with an optional `Range` header.
    pub async fn get(&self, uri: &str, range: Option<&str>) -> Response<Body> {
        let mut request = Request::get(uri);
        if let Some(range) = range {
            request = request.header("range", range);
        }
        self.router()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

/// Collect a response body.
pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// Read a header as a string.
pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).map(|v| v.to_str().unwrap())
}
