//! Command line arguments
//!
//! Global flags may appear before or after the command name. Queue lists,
//! claim handles and message file names accept comma separated values and may
//! be repeated.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::cli::display::OutputFormat;
use crate::core::validation::{validate_positive_int, validate_timeout};
use crate::queue::Settings;

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "ddmq")]
#[command(about = "Serverless, file based message queue")]
#[command(version, long_version = crate::core::version::version_banner())]
#[command(after_help = " * comma separated list, may be repeated")]
pub struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Verbose output (log level info)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Debug output (log level debug)
    #[arg(short = 'd', long = "debug", global = true)]
    pub debug: bool,

    /// Log level
    #[arg(long = "log-level", value_name = "LEVEL", global = true,
          value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", global = true,
          value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(long = "log-file", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Force colored output
    #[arg(long = "color", global = true, overrides_with = "no_color")]
    pub color: bool,

    /// Disable colored output
    #[arg(long = "no-color", global = true, overrides_with = "color")]
    pub no_color: bool,

    /// Silent mode: only print requested data
    #[arg(short = 's', long = "silent", global = true)]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// `Some(true)` for --color, `Some(false)` for --no-color, `None` to auto-detect
    pub fn color_choice(&self) -> Option<bool> {
        match (self.color, self.no_color) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    /// Level implied by the command line alone; an explicit --log-level wins over -d and -v
    pub fn requested_log_level(&self) -> Option<String> {
        if let Some(level) = &self.log_level {
            Some(level.clone())
        } else if self.debug {
            Some("debug".to_string())
        } else if self.verbose {
            Some("info".to_string())
        } else {
            None
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// View queues and the number of messages in them
    View(ViewArgs),
    /// Create queues
    Create(CreateArgs),
    /// Delete queues
    Delete(DeleteArgs),
    /// Publish a message to a queue
    Publish(PublishArgs),
    /// Claim messages from a queue
    Consume(ConsumeArgs),
    /// Acknowledge claimed messages
    Ack(HandleArgs),
    /// Negatively acknowledge claimed messages
    Nack(NackArgs),
    /// Delete messages by file name
    #[command(name = "del-msg", alias = "del_msg")]
    DelMsg(HandleArgs),
    /// Remove all messages from queues
    Purge(QueueListArgs),
    /// Recover expired claims in queues
    Clean(QueueListArgs),
    /// Run a command described by a JSON object
    Json(JsonArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::View(_) => "view",
            Command::Create(_) => "create",
            Command::Delete(_) => "delete",
            Command::Publish(_) => "publish",
            Command::Consume(_) => "consume",
            Command::Ack(_) => "ack",
            Command::Nack(_) => "nack",
            Command::DelMsg(_) => "del-msg",
            Command::Purge(_) => "purge",
            Command::Clean(_) => "clean",
            Command::Json(_) => "json",
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ViewArgs {
    /// The queue root directory
    pub root: PathBuf,

    /// Queues to view* (default: all)
    #[arg(value_name = "QUEUES")]
    pub queues: Vec<String>,

    /// Initialise the root directory if needed
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Only print queue names
    #[arg(short = 'n', long = "names-only")]
    pub names_only: bool,

    /// Output format
    #[arg(long = "format", value_enum)]
    pub format: Option<OutputFormat>,
}

/// Queue settings accepted by `create` and `publish`
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct SettingsArgs {
    /// Message priority (lower is delivered first)
    #[arg(short = 'p', long = "priority", value_name = "N")]
    pub priority: Option<u32>,

    /// Seconds a claim may be held before it expires
    #[arg(short = 't', long = "timeout", value_name = "SECONDS", value_parser = validate_timeout)]
    pub timeout: Option<u64>,

    /// Requeue on nack or expiry instead of deleting
    #[arg(short = 'r', long = "requeue")]
    pub requeue: bool,

    /// Priority of requeued messages (implies --requeue)
    #[arg(long = "requeue-prio", alias = "requeue_prio", value_name = "N")]
    pub requeue_prio: Option<u32>,

    /// Times a message may be requeued ('none' for unlimited)
    #[arg(short = 'l', long = "requeue-limit", alias = "requeue_limit",
          value_name = "N|none", value_parser = parse_requeue_limit)]
    pub requeue_limit: Option<RequeueLimit>,

    /// Seconds between implicit clean passes
    #[arg(long = "clean-interval", value_name = "SECONDS")]
    pub clean_interval: Option<u64>,
}

impl SettingsArgs {
    pub fn to_settings(&self) -> Settings {
        Settings {
            message_timeout: self.timeout,
            default_priority: self.priority,
            requeue: (self.requeue || self.requeue_prio.is_some()).then_some(true),
            requeue_prio: self.requeue_prio,
            requeue_limit: self.requeue_limit.map(|limit| limit.0),
            clean_interval: self.clean_interval,
            cleaned: None,
        }
    }
}

/// Requeue limit from the command line; `None` inside means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueLimit(pub Option<u32>);

pub fn parse_requeue_limit(value: &str) -> Result<RequeueLimit, String> {
    if value.eq_ignore_ascii_case("none") || value.eq_ignore_ascii_case("null") {
        return Ok(RequeueLimit(None));
    }
    value
        .parse::<u32>()
        .map(|n| RequeueLimit(Some(n)))
        .map_err(|_| format!("'{}' is not a requeue limit (a number or 'none')", value))
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct CreateArgs {
    /// The queue root directory
    pub root: PathBuf,

    /// Queues to create*
    #[arg(value_name = "QUEUES", required = true)]
    pub queues: Vec<String>,

    /// Initialise the root directory if needed
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct DeleteArgs {
    /// The queue root directory
    pub root: PathBuf,

    /// Queues to delete*
    #[arg(value_name = "QUEUES", required = true)]
    pub queues: Vec<String>,

    /// Delete queues that still hold messages
    #[arg(short = 'f', long = "force")]
    pub force: bool,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct PublishArgs {
    /// The queue root directory
    pub root: PathBuf,

    /// Queue to publish to
    pub queue: String,

    /// Message text
    pub message: String,

    /// Initialise the root directory and queue if needed
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Do not clean the queue first
    #[arg(short = 'C', long = "skip-cleaning", alias = "skip_cleaning")]
    pub skip_cleaning: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ConsumeArgs {
    /// The queue root directory
    pub root: PathBuf,

    /// Queue to consume from
    pub queue: String,

    /// Initialise the root directory and queue if needed
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Number of messages to claim
    #[arg(short = 'n', long = "count", value_name = "N", default_value = "1",
          value_parser = validate_positive_int)]
    pub count: usize,

    /// Override the claim timeout of the claimed messages
    #[arg(short = 't', long = "timeout", value_name = "SECONDS", value_parser = validate_timeout)]
    pub timeout: Option<u64>,

    /// Do not clean the queue first
    #[arg(short = 'C', long = "skip-cleaning", alias = "skip_cleaning")]
    pub skip_cleaning: bool,

    /// Output format (default json)
    #[arg(long = "format", value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct HandleArgs {
    /// The queue root directory
    pub root: PathBuf,

    /// Queue the messages are in
    pub queue: String,

    /// Message file names*
    #[arg(value_name = "MSG_FILES", required = true)]
    pub files: Vec<String>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct NackArgs {
    #[command(flatten)]
    pub handles: HandleArgs,

    /// Requeue the messages whatever their own policy says
    #[arg(short = 'r', long = "requeue")]
    pub requeue: bool,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct QueueListArgs {
    /// The queue root directory
    pub root: PathBuf,

    /// Queues*
    #[arg(value_name = "QUEUES", required = true)]
    pub queues: Vec<String>,

    /// Initialise the root directory if needed
    #[arg(short = 'f', long = "force")]
    pub force: bool,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct JsonArgs {
    /// JSON object with a "cmd" field and the command's options
    #[arg(value_name = "JSON")]
    pub payload: String,
}
