//! Request authentication extractors.
//!
//! - [`auth::AuthUser`] -- the end user, from a JWT Bearer token.
//! - [`api_key::InternalCaller`] -- a worker, from the shared `X-API-Key`.

pub mod api_key;
pub mod auth;
