//! Car Portal
//!
//! Dealership inventory server: car records with photo and video
//! attachments, OTP-verified registration, role-based access and a
//! dashboard whose daily counts follow the browser's calendar.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
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
