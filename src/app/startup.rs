//! Application startup: parse arguments, load configuration, start logging
//! and run the command

use std::io::IsTerminal;

use clap::{CommandFactory, FromArgMatches};

use crate::app::cli::args::Cli;
use crate::app::cli::commands::{execute, Output, RunContext};
use crate::app::cli::config::CliConfig;
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::init_logging;
use crate::core::styles::palette_to_clap;

/// Logging and output settings after merging the command line over the config file
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub log_file: Option<String>,
    pub color: bool,
    pub context: RunContext,
}

/// Command line values win over the configuration file; colour falls back
/// to whether stdout is a terminal
pub fn resolve_options(cli: &Cli, config: &CliConfig, stdout_is_terminal: bool) -> ResolvedOptions {
    let log_file = match &cli.log_file {
        Some(path) if path.as_os_str() == "none" || path.as_os_str() == "-" => None,
        Some(path) => Some(path.clone()),
        None => config.log_file.clone(),
    };
    ResolvedOptions {
        log_level: cli.requested_log_level().or_else(|| config.log_level.clone()),
        log_format: cli.log_format.clone().or_else(|| config.log_format.clone()),
        log_file: log_file.map(|p| p.to_string_lossy().to_string()),
        color: cli
            .color_choice()
            .or(config.color)
            .unwrap_or(stdout_is_terminal),
        context: RunContext {
            format: config.format,
        },
    }
}

/// Run the binary and exit with its status
pub fn startup() {
    let is_terminal = std::io::stdout().is_terminal();
    let help_color = is_terminal && !std::env::args().any(|a| a == "--no-color");

    let matches = Cli::command()
        .styles(palette_to_clap(help_color))
        .get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    std::process::exit(run(&cli, is_terminal));
}

/// Run a parsed command line; returns the process exit status
pub fn run(cli: &Cli, stdout_is_terminal: bool) -> i32 {
    let config = match CliConfig::load(cli.config_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let options = resolve_options(cli, &config, stdout_is_terminal);

    if let Err(e) = init_logging(
        options.log_level.as_deref(),
        options.log_format.as_deref(),
        options.log_file.as_deref(),
        options.color,
    ) {
        eprintln!("Error: failed to start logging: {}", e);
        return 1;
    }
    log::debug!("Options: {:?}", options);

    let stdout = std::io::stdout();
    let mut out = Output::new(stdout.lock(), cli.silent, options.color);
    match execute(&cli.command, &options.context, &mut out) {
        Ok(0) => 0,
        Ok(failures) => {
            log::warn!("{}: {} item(s) failed", cli.command.name(), failures);
            1
        }
        Err(e) => {
            log_error_with_context(&e, &format!("Running {}", cli.command.name()));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cli::display::OutputFormat;
    use clap::Parser;
    use std::path::PathBuf;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ddmq").chain(args.iter().copied())).unwrap()
    }

    fn config() -> CliConfig {
        CliConfig {
            log_level: Some("error".to_string()),
            log_format: Some("ext".to_string()),
            log_file: Some(PathBuf::from("/tmp/ddmq.log")),
            color: Some(true),
            format: Some(OutputFormat::Yaml),
        }
    }

    #[test]
    fn test_config_file_fills_unset_options() {
        let options = resolve_options(&cli(&["view", "/r"]), &config(), false);
        assert_eq!(options.log_level.as_deref(), Some("error"));
        assert_eq!(options.log_format.as_deref(), Some("ext"));
        assert_eq!(options.log_file.as_deref(), Some("/tmp/ddmq.log"));
        assert!(options.color);
        assert_eq!(options.context.format, Some(OutputFormat::Yaml));
    }

    #[test]
    fn test_command_line_wins_over_config_file() {
        let options = resolve_options(
            &cli(&["-v", "--log-format", "json", "--log-file", "none", "--no-color", "view", "/r"]),
            &config(),
            true,
        );
        assert_eq!(options.log_level.as_deref(), Some("info"));
        assert_eq!(options.log_format.as_deref(), Some("json"));
        assert_eq!(options.log_file, None);
        assert!(!options.color);
    }

    #[test]
    fn test_color_follows_terminal_when_unset() {
        let empty = CliConfig::default();
        assert!(resolve_options(&cli(&["view", "/r"]), &empty, true).color);
        assert!(!resolve_options(&cli(&["view", "/r"]), &empty, false).color);
    }
}
