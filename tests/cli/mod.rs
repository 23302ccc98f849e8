//! CLI Integration Test Modules

pub mod commands;
pub mod errors;
pub mod toml_config;
