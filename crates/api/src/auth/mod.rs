//! Token handling for user-facing endpoints.

pub mod jwt;
