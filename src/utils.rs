use crate::{
    config::Config,
    errors::{AppError, AppResult},
    models::{Claims, User},
};
use anyhow::anyhow;
use argon2::password_hash::rand_core::OsRng;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::Utc;
use governor::{RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

/// Session lifetime: one day.
pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

pub type KeyedRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Hash a plaintext password using Argon2.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

/// Verify a plaintext password against a stored hash.
///
/// # Errors
/// Returns an error if the hash format is invalid.
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(anyhow!(e.to_string())))?;
    let argon2 = Argon2::default();
    Ok(argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Issue a session token for `user`, valid for [`TOKEN_TTL_SECS`] from now.
///
/// # Errors
/// Returns an error if token encoding fails.
pub fn issue_token(user: &User, config: &Config) -> AppResult<String> {
    issue_token_at(user, config, Utc::now().timestamp())
}

/// Issue a session token as if the current time were `now` (unix seconds).
///
/// # Errors
/// Returns an error if token encoding fails.
pub fn issue_token_at(user: &User, config: &Config, now: i64) -> AppResult<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        iat: now,
        exp: now + TOKEN_TTL_SECS,
    };

    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), &claims, &key).map_err(|e| AppError::Internal(e.into()))
}

/// Decode and validate a session token against the current time.
///
/// # Errors
/// Returns Unauthorized if the token is malformed, badly signed or expired.
pub fn decode_jwt(token: &str, config: &Config) -> AppResult<Claims> {
    decode_jwt_at(token, config, Utc::now().timestamp())
}

/// Decode and validate a session token, treating `now` as the current time.
///
/// The token is rejected once `now` reaches `exp`; there is no leeway.
///
/// # Errors
/// Returns Unauthorized if the token is malformed, badly signed or expired.
pub fn decode_jwt_at(token: &str, config: &Config, now: i64) -> AppResult<Claims> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is checked below against the caller's clock.
    validation.validate_exp = false;
    validation.leeway = 0;

    let data = decode::<Claims>(token, &key, &validation).map_err(|_| AppError::Unauthorized)?;
    if now >= data.claims.exp {
        return Err(AppError::Unauthorized);
    }
    Ok(data.claims)
}

/// Build a keyed rate limiter allowing `per_minute` hits per key.
///
/// # Must Use
/// The returned rate limiter should be stored; dropping it loses rate limiting state.
#[must_use]
pub fn build_rate_limiter(per_minute: u32) -> Arc<KeyedRateLimiter> {
    let quota = governor::Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::keyed(quota))
}

/// Periodically forget keys whose quota has fully replenished, so addresses
/// seen once do not stay in the limiter forever.
pub fn spawn_limiter_pruning(limiter: Arc<KeyedRateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            limiter.retain_recent();
            limiter.shrink_to_fit();
            tracing::debug!(keys = limiter.len(), "login limiter pruned");
        }
    })
}
