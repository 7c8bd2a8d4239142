//! Tunestream - progressive audio streaming server
//!
//! This library crate exposes the streaming core and HTTP server for
//! integration testing.

pub mod config;
pub mod error;
pub mod server;
pub mod streaming;
