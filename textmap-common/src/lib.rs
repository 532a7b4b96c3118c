//! # Textmap Common Library
//!
//! Shared code for the textmap services including:
//! - Database schema, pool initialization, and durable models
//! - Error types
//! - Artifact codec (JSON -> DEFLATE -> base64)
//! - Keyed flag store (stop signals, rate-limit counters)
//! - Configuration loading

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod flags;

pub use error::{Error, Result};
