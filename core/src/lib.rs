//! # Kiln Core
//!
//! Shared utilities for the Kiln material compiler: stable hashing for
//! cache keys and optional Tracy instrumentation.

pub mod hash;
pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup.
pub fn init() {
    log::info!("Kiln Core v{} initialized", VERSION);
}
