//! host-sentry: a host security scan engine.
//!
//! This crate walks filesystem trees computing content hashes against a
//! signature registry, probes local TCP ports for exposure, collects OS
//! security-posture facts, aggregates the results with progress reporting,
//! and submits the aggregate to a remote collector over an authenticated
//! HTTP call.

pub mod core;
pub mod detection;
pub mod scanner;
pub mod submit;
pub mod utils;

// Re-export commonly used types
pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
pub use crate::core::types::*;
