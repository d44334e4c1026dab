//! Storage module for persistent data storage
//!
//! Provides the SQLite-based manifest that tracks every discovered file.

mod manifest;

pub use manifest::ManifestDb;
