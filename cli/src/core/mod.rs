//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod render;
pub mod shutdown;

pub use crate::app::CoreApp;
pub use cli::{CliConfig, Commands};
pub use config::{ApiConfig, AppConfig};
pub use shutdown::ShutdownService;
