//! Common types and utilities for the ICN forwarding node.
//!
//! This crate provides the pieces shared by the forwarder and the
//! command line: hierarchical names, the Interest/Content/Nack packets,
//! face identifiers, the error type and the forwarding counters.

pub mod error;
pub mod metrics;
pub mod ndn;
pub mod types;

/// Reexport of common types
pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
