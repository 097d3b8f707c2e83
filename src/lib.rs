#![recursion_limit = "256"]

pub mod app;
pub mod app_state;
pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware_auth;
pub mod models;
pub mod openapi;
pub mod pg_store;
pub mod query;
pub mod repository;
pub mod utils;

pub use app::{build_app, serve};
pub use app_state::AppState;
pub use config::Config;
pub use errors::*;
pub use models::*;
pub use utils::*;
