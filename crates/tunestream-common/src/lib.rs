//! Tunestream-Common: Shared error type and path utilities.
//!
//! This crate provides common functionality used across tunestream:
//!
//! - **Error Handling**: Common error types and result aliases
//! - **Path Utilities**: Resource id validation and audio file detection
//!
//! # Examples
//!
//! ```
//! use tunestream_common::{Error, Result};
//! use tunestream_common::paths::{is_audio_file, validate_resource_id};
//! use std::path::Path;
//!
//! assert!(is_audio_file(Path::new("1700000000000-42.mp3")));
//! assert!(validate_resource_id("1700000000000-42.mp3").is_ok());
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("track"))
//! }
//! ```

pub mod error;
pub mod paths;

pub use error::{Error, Result};
