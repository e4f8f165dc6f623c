pub mod config;
pub mod models;
pub mod service;

pub use config::{ConfigError, LlmConfig, ServiceConfig};
pub use service::{AppState, build_router, create_app};
