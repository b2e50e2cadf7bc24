use anyhow::Result;
use std::env;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    pub db_path: String,
    /// When set to a postgres:// URL, the PostgreSQL backend is used
    /// (requires the `postgres` cargo feature).
    pub database_url: Option<String>,
    /// Per-agency secret used to HMAC fan identifiers at import.
    pub hash_salt: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only db_path has a default — the hash salt is required for
    /// anything that imports fan records.
    pub fn load() -> Result<Self> {
        Ok(Self {
            db_path: env::var("PRISM_DB_PATH").unwrap_or_else(|_| "./prism.db".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            hash_salt: env::var("PRISM_HASH_SALT").unwrap_or_default(),
        })
    }

    /// Check that the agency hash salt is configured.
    /// Call this before any operation that ingests fan identifiers.
    pub fn require_salt(&self) -> Result<()> {
        if self.hash_salt.is_empty() {
            anyhow::bail!(
                "PRISM_HASH_SALT not set. Add it to your .env file.\n\
                 Fan identifiers are HMAC-hashed with this salt before storage."
            );
        }
        Ok(())
    }
}
