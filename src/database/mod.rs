// Database module for ask-ai
// Provides SQLite persistence for settings, API endpoints and prompt templates

pub mod manager;
pub mod migrations;
pub mod models;
pub mod settings_repo;
pub mod endpoint_repo;
pub mod template_repo;

pub use manager::DatabaseManager;
pub use models::*;
