use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub server_port: u16,
    pub login_attempts_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables, applying defaults where appropriate.
    ///
    /// Without `DATABASE_URL` the service runs on the in-memory store.
    ///
    /// # Errors
    /// Returns an error if `JWT_SECRET` is missing or empty.
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        anyhow::ensure!(!jwt_secret.is_empty(), "JWT_SECRET must not be empty");
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty());
        let server_port = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);
        let login_attempts_per_minute = std::env::var("LOGIN_ATTEMPTS_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(10);

        Ok(Self {
            database_url,
            jwt_secret,
            server_port,
            login_attempts_per_minute,
        })
    }
}
