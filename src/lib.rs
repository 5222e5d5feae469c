// Gantry - a metadata-driven HTTP controller framework for Rust
//
// This library provides a registration-based approach to building HTTP
// applications with dependency injection, controller metadata, route
// resolution and pluggable server adapters.

// Re-export core functionality
pub use gantry_core::*;

// Re-export optional crates
#[cfg(feature = "openapi")]
pub use gantry_openapi;
