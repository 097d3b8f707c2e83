//! Registration and credential checks on top of the user store.

use std::sync::OnceLock;

use crate::{
    errors::{AppError, AppResult},
    models::{Role, User},
    repository::UserRepository,
    utils::{hash_password, verify_password},
};

/// Hash verified when the email is unknown, so both failure paths cost one
/// argon2 verification.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("not-a-real-password").ok())
        .as_deref()
}

/// Run argon2 work on the blocking pool.
async fn off_runtime<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
}

/// Create a user with the default role.
///
/// # Errors
/// Returns `DuplicateEmail` if the email exists, or hashing/store errors.
pub async fn register(users: &dyn UserRepository, email: &str, password: &str) -> AppResult<User> {
    if users.find_by_email(email).await?.is_some() {
        return Err(AppError::DuplicateEmail);
    }
    let password = password.to_owned();
    let password_hash = off_runtime(move || hash_password(&password)).await?;
    let user = users.insert_user(email, &password_hash, Role::default()).await?;
    tracing::info!(user_id = user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Check credentials. Unknown email and wrong password yield the same error.
///
/// # Errors
/// Returns `InvalidCredentials` on any mismatch, or store errors.
pub async fn authenticate(users: &dyn UserRepository, email: &str, password: &str) -> AppResult<User> {
    let attempt = password.to_owned();
    let Some(user) = users.find_by_email(email).await? else {
        let _ = off_runtime(move || match dummy_hash() {
            Some(hash) => verify_password(&attempt, hash),
            None => Ok(false),
        })
        .await;
        tracing::warn!(%email, "login rejected");
        return Err(AppError::InvalidCredentials);
    };

    let stored = user.password_hash.clone();
    if !off_runtime(move || verify_password(&attempt, &stored)).await? {
        tracing::warn!(%email, "login rejected");
        return Err(AppError::InvalidCredentials);
    }

    tracing::info!(user_id = user.id, %email, "user authenticated");
    Ok(user)
}
