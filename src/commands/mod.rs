//! Command implementations for the ICN CLI

pub mod config;
pub mod simulate;
