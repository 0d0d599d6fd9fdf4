//! Infrastructure layer for formscout.
//!
//! Contains implementations of the traits defined in `formscout-core`:
//! the LanceDB record store with engine-side similarity search, the
//! fastembed local embedder, and the SQLite source registry.

pub mod config;
pub mod sqlite;
pub mod vector;
