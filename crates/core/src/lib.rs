//! Shared primitives for the careerline backend.
//!
//! This crate has no internal dependencies so the queue, database, API and
//! worker crates can all build on it.

pub mod api_keys;
pub mod error;
pub mod language;
pub mod storage;
pub mod types;
