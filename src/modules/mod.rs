//! Modules layer - adapters for external services
//!
//! Object storage lives here; the metadata store belongs to the files feature.

pub mod storage;
