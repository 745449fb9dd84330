//! Dashview Common Utilities
//!
//! Shared infrastructure for all Dashview crates:
//! - Error types and result aliases
//! - Export clock, frame pacing, and progress throttling
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
