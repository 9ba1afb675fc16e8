//! Common types for the courier order lifecycle service.
//!
//! This crate defines the data model shared by every other crate in the
//! workspace: orders and their line items, the status vocabulary, audit
//! records, principals, API request/response shapes and the configuration
//! validation framework used by pluggable backends.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Event types published after state changes are committed.
pub mod events;
/// Order types: orders, line items, statuses and transition records.
pub mod order;
/// Authenticated principals and their roles.
pub mod principal;
/// Implementation registry trait for pluggable backends.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// Small helpers shared across crates.
pub mod utils;
/// Configuration validation types for backend configuration tables.
pub mod validation;

pub use api::*;
pub use events::*;
pub use order::*;
pub use principal::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use utils::current_timestamp;
pub use validation::*;
