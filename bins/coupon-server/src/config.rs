//! Server configuration loaded from environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Secret fallbacks used when the operator supplies nothing. `main`
/// warns loudly when either is in effect.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
pub const DEFAULT_TOKEN_SECRET: &str = "default_secret_key";

#[derive(Clone, Debug)]
pub struct Config {
    /// Address to bind the HTTP server.
    pub bind_addr: String,
    /// Root directory for persistent data.
    pub data_dir: PathBuf,
    /// Cooldown between claims per network address, in seconds.
    pub cooldown_secs: u64,
    /// Username for the bootstrap administrator.
    pub admin_username: String,
    /// Secret for the bootstrap administrator.
    pub admin_password: String,
    /// Secret the credential signing key is derived from.
    pub token_secret: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            std::env::var("COUPON_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("COUPON_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("coupondrop")
            });

        let cooldown_secs: u64 = std::env::var("COUPON_COOLDOWN_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .context("COUPON_COOLDOWN_SECS must be a positive integer")?;

        let admin_username =
            std::env::var("COUPON_ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let admin_password = std::env::var("COUPON_ADMIN_PASSWORD")
            .unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_string());
        let token_secret = std::env::var("COUPON_TOKEN_SECRET")
            .unwrap_or_else(|_| DEFAULT_TOKEN_SECRET.to_string());

        Ok(Config {
            bind_addr,
            data_dir,
            cooldown_secs,
            admin_username,
            admin_password,
            token_secret,
        })
    }

    /// Path to the RocksDB data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("coupondata")
    }

    /// Claim cooldown as a duration.
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }
}
