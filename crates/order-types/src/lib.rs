//! Common types module for the order persistence system.
//!
//! This module defines the core data types shared by the storage layer, the
//! order engine and the HTTP service. Keeping them in one crate ensures the
//! stored encoding and the wire encoding stay identical.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Order entity types and lifecycle transitions.
pub mod order;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Storage key derivation for orders and the order index.
pub mod storage;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use validation::*;
