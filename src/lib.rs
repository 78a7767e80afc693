//! Maktaba school library server
//!
//! REST JSON API for a school library: book catalog and categories,
//! borrowing with per-role policies and fines, user accounts, per-user
//! preferences and a live change feed. Every list endpoint is driven by the
//! declarative search engine in [`query`].

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
