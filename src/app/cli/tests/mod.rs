//! Tests for the CLI module
//!
//! Argument parsing, the TOML configuration file, JSON command payloads,
//! output rendering and command execution against temporary roots.

pub mod config_tests;
