use crate::{
    Config,
    repository::{BookRepository, MemoryStore, UserRepository},
    utils::{KeyedRateLimiter, build_rate_limiter},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub books: Arc<dyn BookRepository>,
    pub config: Config,
    pub login_limiter: Arc<KeyedRateLimiter>,
}

impl AppState {
    /// Build state over a single store that serves both repositories.
    #[must_use]
    pub fn new<S>(store: Arc<S>, config: Config) -> Self
    where
        S: UserRepository + BookRepository + 'static,
    {
        let login_limiter = build_rate_limiter(config.login_attempts_per_minute);
        Self {
            users: store.clone(),
            books: store,
            config,
            login_limiter,
        }
    }

    #[must_use]
    pub fn in_memory(config: Config) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }
}
