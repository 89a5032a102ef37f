//! Shared-secret authentication for internal (worker → API) endpoints.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use careerline_core::api_keys::{verify_api_key, API_KEY_HEADER};
use careerline_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Proof that the request carried the internal API key.
///
/// Add it as the first extractor of internal handlers; requests without a
/// matching `X-API-Key` header are rejected with 401 before the body is read.
#[derive(Debug, Clone, Copy)]
pub struct InternalCaller;

impl FromRequestParts<AppState> for InternalCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !verify_api_key(presented, &state.config.internal_api_key_hash) {
            tracing::warn!(path = %parts.uri.path(), "Rejected internal call with invalid API key");
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid or missing API key".into(),
            )));
        }

        Ok(InternalCaller)
    }
}
