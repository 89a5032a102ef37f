//! Bearer token verification.
//!
//! Users authenticate against the identity service, which signs HS256
//! access tokens with a secret shared with this server. The API only
//! verifies them; [`issue_access_token`] exists for tests and local tooling.

use careerline_core::types::DbId;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Owning user's id.
    pub sub: DbId,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_mins: i64,
    /// When set, tokens must carry this `iss` claim.
    pub issuer: Option<String>,
}

impl JwtConfig {
    /// Reads `JWT_SECRET` (required), `JWT_ACCESS_EXPIRY_MINS` (default 15)
    /// and `JWT_ISSUER` (optional).
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is missing or empty, or the expiry is not an
    /// integer.
    pub fn from_env() -> Self {
        let secret = std::env::var("JWT_SECRET").unwrap_or_default();
        assert!(!secret.is_empty(), "JWT_SECRET must be set and non-empty");

        let access_token_expiry_mins = match std::env::var("JWT_ACCESS_EXPIRY_MINS") {
            Ok(raw) => raw
                .parse()
                .expect("JWT_ACCESS_EXPIRY_MINS must be an integer"),
            Err(_) => DEFAULT_ACCESS_EXPIRY_MINS,
        };

        let issuer = std::env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty());

        Self {
            secret,
            access_token_expiry_mins,
            issuer,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }
}

/// Sign a token for `user_id` that expires after the configured lifetime.
pub fn issue_access_token(
    user_id: DbId,
    role: &str,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let iat = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role: role.to_owned(),
        exp: iat + config.access_token_expiry_mins * 60,
        iat,
        iss: config.issuer.clone(),
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Check signature, expiry and (if configured) issuer.
pub fn verify_access_token(
    token: &str,
    config: &JwtConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &config.validation(),
    )
    .map(|data| data.claims)
}
