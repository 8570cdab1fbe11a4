//! # Trackwire Common Library
//!
//! Shared code for the trackwire distribution backend:
//! - Domain enums (code kinds, platforms, per-platform statuses)
//! - Event types (TrackwireEvent enum) and the EventBus
//! - Database initialization and schema
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use types::{CodeKind, Platform, PlatformStatus};
