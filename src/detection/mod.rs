//! Signature and advisory registries backing the scan engine.
//!
//! Both tables are loaded once at startup and are immutable afterwards, so
//! they are safe to share across scanner workers without locking.

pub mod advisories;
pub mod registry;

pub use advisories::VulnerabilityAdvisories;
pub use registry::{Signature, SignatureFile, SignatureRegistry};
