//! 配置管理模块

pub mod engine_config;
pub mod env;
pub mod log;
pub mod shutdown_manager;

pub use engine_config::*;
pub use shutdown_manager::{ShutdownConfig, ShutdownManager};
