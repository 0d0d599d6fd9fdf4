//! Shared domain types for formscout.
//!
//! This crate contains the core domain types used across the formscout
//! retrieval pipeline: records, sources, query results, and their
//! associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod query;
pub mod record;
pub mod source;
