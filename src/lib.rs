//! Third-party API resolution core library.
//!
//! When a site cannot be extracted directly, this library resolves its media
//! through paid third-party APIs and normalizes the answers into one
//! canonical shape.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Layered configuration (explicit values, environment, defaults)
//! - [`media`] - Canonical media model and MIME/codec normalization
//! - [`third_api`] - Classifier, frequency guard, retry driver, provider
//!   adapters and the dispatcher

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod media;
pub mod third_api;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, ThirdApiConfig};
pub use media::{
    CanonicalMedia, CodecAssignment, Codecs, Extraction, FormatDescriptor, FormatRole, MediaKind,
    Playlist, normalize_mime,
};
pub use third_api::{
    Dispatcher, FrequencyGuard, Provider, ResolveInput, RetryDriver, RetryVerdict,
    RoutingPolicy, ThirdApiError, build_default_dispatcher, classify,
};
