use careerline_core::api_keys::hash_api_key;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the secrets have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Root directory for uploaded resumes (default: `storage/resumes`).
    pub storage_dir: String,
    /// SHA-256 hex digest of the key workers present in `X-API-Key`.
    /// Only the digest is kept in memory.
    pub internal_api_key_hash: String,
    /// Capacity of the resume-link retry outbox (default: `256`).
    pub link_outbox_capacity: usize,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `STORAGE_DIR`          | `storage/resumes`          |
    /// | `INTERNAL_API_KEY`     | **required**               |
    /// | `LINK_OUTBOX_CAPACITY` | `256`                      |
    ///
    /// # Panics
    ///
    /// Panics on malformed values or a missing `INTERNAL_API_KEY`; startup
    /// misconfiguration should fail fast.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let storage_dir =
            std::env::var("STORAGE_DIR").unwrap_or_else(|_| "storage/resumes".into());

        let internal_api_key = std::env::var("INTERNAL_API_KEY")
            .expect("INTERNAL_API_KEY must be set in the environment");
        assert!(
            !internal_api_key.trim().is_empty(),
            "INTERNAL_API_KEY must not be empty"
        );

        let link_outbox_capacity: usize = std::env::var("LINK_OUTBOX_CAPACITY")
            .unwrap_or_else(|_| "256".into())
            .parse()
            .expect("LINK_OUTBOX_CAPACITY must be a valid usize");

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            storage_dir,
            internal_api_key_hash: hash_api_key(internal_api_key.trim()),
            link_outbox_capacity: link_outbox_capacity.max(1),
            jwt,
        }
    }
}
