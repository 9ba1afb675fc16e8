//! Utility functions used across the courier crates.

pub mod helpers;

pub use helpers::current_timestamp;
