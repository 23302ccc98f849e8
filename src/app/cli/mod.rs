//! Command line interface
//!
//! Argument parsing, the optional TOML configuration file, JSON command
//! payloads, output rendering and command execution. All queue logic lives
//! in the broker and queue modules.

pub mod args;
pub mod commands;
pub mod config;
pub mod display;
pub mod json_payload;

#[cfg(test)]
mod tests;
