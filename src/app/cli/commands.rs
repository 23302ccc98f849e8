//! Command execution
//!
//! Each command opens a [`Broker`] on its root, runs the operation for every
//! queue or handle named, and reports per-item results. Per-item failures are
//! reported and counted but do not stop the remaining items; errors that make
//! the whole command meaningless (missing root, bad settings) are returned.

use std::io::Write;
use std::path::Path;

use crate::app::cli::args::{
    Cli, Command, ConsumeArgs, CreateArgs, DeleteArgs, HandleArgs, NackArgs, PublishArgs,
    QueueListArgs, ViewArgs,
};
use crate::app::cli::display::{render_delivery, render_message, render_view, OutputFormat};
use crate::app::cli::json_payload::parse_payload;
use crate::app::error::AppResult;
use crate::broker::{Broker, CallOptions};
use crate::core::validation::{is_valid_queue_name, split_list};
use crate::queue::{ClaimHandle, NackOutcome, QueueError, Settings, WORK_DIR};

/// Where command output goes
///
/// `info` lines are progress and summaries, suppressed in silent mode;
/// `data` lines are the requested result and always written.
pub struct Output<W: Write> {
    writer: W,
    silent: bool,
    color: bool,
}

impl<W: Write> Output<W> {
    pub fn new(writer: W, silent: bool, color: bool) -> Self {
        Self {
            writer,
            silent,
            color,
        }
    }

    pub fn info(&mut self, line: &str) -> AppResult<()> {
        if !self.silent {
            writeln!(self.writer, "{}", line)?;
        }
        Ok(())
    }

    pub fn data(&mut self, text: &str) -> AppResult<()> {
        writeln!(self.writer, "{}", text)?;
        Ok(())
    }

    pub fn color(&self) -> bool {
        self.color
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Defaults that come from the configuration file rather than the command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    pub format: Option<OutputFormat>,
}

/// Run one command. Returns the number of items that failed.
pub fn execute<W: Write>(command: &Command, ctx: &RunContext, out: &mut Output<W>) -> AppResult<usize> {
    log::info!("Running {}", command.name());
    match command {
        Command::View(args) => view(args, ctx, out),
        Command::Create(args) => create(args, out),
        Command::Delete(args) => delete(args, out),
        Command::Publish(args) => publish(args, ctx, out),
        Command::Consume(args) => consume(args, ctx, out),
        Command::Ack(args) => ack(args, out),
        Command::Nack(args) => nack(args, out),
        Command::DelMsg(args) => del_msg(args, out),
        Command::Purge(args) => purge(args, out),
        Command::Clean(args) => clean(args, out),
        Command::Json(args) => {
            let inner = parse_payload(&args.payload)?;
            json(&inner, ctx, out)
        }
    }
}

fn json<W: Write>(inner: &Cli, ctx: &RunContext, out: &mut Output<W>) -> AppResult<usize> {
    if let Some(level) = inner.requested_log_level() {
        if let Err(e) = crate::core::logging::set_log_level(&level) {
            log::warn!("Could not change log level to {}: {}", level, e);
        }
    }
    let silent = out.silent;
    out.silent |= inner.silent;
    let result = execute(&inner.command, ctx, out);
    out.silent = silent;
    result
}

fn open_broker(root: &Path, init: bool) -> AppResult<Broker> {
    let broker = if init {
        Broker::open_or_init(root)?
    } else {
        Broker::open(root)?
    };
    Ok(broker)
}

fn view<W: Write>(args: &ViewArgs, ctx: &RunContext, out: &mut Output<W>) -> AppResult<usize> {
    let broker = open_broker(&args.root, args.force)?;
    let mut failures = 0;

    let mut names = split_list(&args.queues);
    if !names.is_empty() {
        names.retain(|name| {
            let exists = broker.queue_exists(name);
            if !exists {
                log::warn!("Requested queue does not exist: {}", name);
                failures += 1;
            }
            exists
        });
        if names.is_empty() {
            return Ok(failures);
        }
    }

    let stats = broker.view(&names)?;
    let format = args.format.or(ctx.format).unwrap_or(OutputFormat::Plain);
    let text = render_view(&stats, args.names_only, format, out.color())?;
    if !text.is_empty() {
        out.data(&text)?;
    }
    Ok(failures)
}

fn create<W: Write>(args: &CreateArgs, out: &mut Output<W>) -> AppResult<usize> {
    let broker = open_broker(&args.root, args.force)?;
    let settings = args.settings.to_settings();
    settings.validate()?;

    let mut created = 0;
    let mut failures = 0;
    for queue in split_list(&args.queues) {
        match broker.create_queue(&queue, &settings) {
            Ok(()) => {
                created += 1;
                out.info(&format!("Created new queue: {}", queue))?;
            }
            Err(QueueError::QueueAlreadyExists { .. }) => {
                out.info(&format!("Already existing: {}", queue))?;
            }
            Err(QueueError::InvalidQueueName { .. }) => {
                failures += 1;
                out.info(&format!("Skipping {}, invalid name", queue))?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    out.info(&format!("Created {} new queues", created))?;
    Ok(failures)
}

fn delete<W: Write>(args: &DeleteArgs, out: &mut Output<W>) -> AppResult<usize> {
    let broker = Broker::open(&args.root)?;

    let mut deleted = 0;
    let mut failures = 0;
    for queue in split_list(&args.queues) {
        match broker.delete_queue(&queue, args.force) {
            Ok(_) => {
                deleted += 1;
                out.info(&format!("Deleted queue: {}", queue))?;
            }
            Err(QueueError::InvalidQueueName { .. }) => {
                failures += 1;
                out.info(&format!("Skipping {}, invalid name", queue))?;
            }
            Err(QueueError::QueueNotFound { .. }) => {
                failures += 1;
                out.info(&format!("Queue not existing: {}", queue))?;
            }
            Err(e @ (QueueError::QueueNotEmpty { .. } | QueueError::ForeignEntries { .. })) => {
                failures += 1;
                out.info(&format!("{} (use -f to delete anyway)", e))?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    out.info(&format!("Deleted {} queues", deleted))?;
    Ok(failures)
}

fn publish<W: Write>(args: &PublishArgs, ctx: &RunContext, out: &mut Output<W>) -> AppResult<usize> {
    let broker = open_broker(&args.root, args.force)?;
    let options = CallOptions::default()
        .with_overrides(args.settings.to_settings())
        .skip_cleaning(args.skip_cleaning)
        .create_queue(args.force);

    let message = broker.publish(&args.queue, &args.message, &options)?;
    let format = ctx.format.unwrap_or(OutputFormat::Plain);
    out.info(&format!(
        "Published to {}: {}",
        args.queue,
        render_message(&message, format)?
    ))?;
    Ok(0)
}

fn consume<W: Write>(args: &ConsumeArgs, ctx: &RunContext, out: &mut Output<W>) -> AppResult<usize> {
    let broker = open_broker(&args.root, args.force)?;
    if args.force && !broker.queue_exists(&args.queue) {
        match broker.create_queue(&args.queue, &Settings::default()) {
            Ok(()) | Err(QueueError::QueueAlreadyExists { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let overrides = Settings {
        message_timeout: args.timeout,
        ..Settings::default()
    };
    let options = CallOptions::default()
        .with_overrides(overrides)
        .skip_cleaning(args.skip_cleaning);
    let deliveries = broker.consume(&args.queue, args.count, &options)?;

    if deliveries.is_empty() {
        out.info(&format!("No more messages in {}", args.queue))?;
        return Ok(0);
    }
    let format = args.format.or(ctx.format).unwrap_or(OutputFormat::Json);
    for delivery in &deliveries {
        out.data(&render_delivery(delivery, format, out.color())?)?;
    }
    Ok(0)
}

/// Accept either a bare file name or a path ending in one
fn handle_name(file: &str) -> &str {
    Path::new(file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(file)
}

fn work_path(broker: &Broker, queue: &str, file: &str) -> String {
    broker
        .queue_dir(queue)
        .join(WORK_DIR)
        .join(file)
        .display()
        .to_string()
}

fn ack<W: Write>(args: &HandleArgs, out: &mut Output<W>) -> AppResult<usize> {
    let broker = Broker::open(&args.root)?;
    let mut failures = 0;
    for file in split_list(&args.files) {
        let name = handle_name(&file);
        let path = work_path(&broker, &args.queue, name);
        let acked = match name.parse::<ClaimHandle>() {
            Ok(handle) => broker.ack(&args.queue, &handle)?,
            Err(e) => {
                log::warn!("{}", e);
                false
            }
        };
        if acked {
            out.data(&format!("acked {}", path))?;
        } else {
            failures += 1;
            out.data(&format!("failed ack {}", path))?;
        }
    }
    Ok(failures)
}

fn nack<W: Write>(args: &NackArgs, out: &mut Output<W>) -> AppResult<usize> {
    let handles = &args.handles;
    let broker = Broker::open(&handles.root)?;
    let overrides = if args.requeue {
        Settings::new().with_requeue(true)
    } else {
        Settings::new()
    };

    let mut failures = 0;
    for file in split_list(&handles.files) {
        let name = handle_name(&file);
        let path = work_path(&broker, &handles.queue, name);
        let outcome = match name.parse::<ClaimHandle>() {
            Ok(handle) => broker.nack(&handles.queue, &handle, &overrides)?,
            Err(e) => {
                log::warn!("{}", e);
                NackOutcome::Vanished
            }
        };
        match outcome {
            NackOutcome::Requeued(pending) => {
                out.data(&format!("nacked {} (requeued as {})", path, pending))?
            }
            NackOutcome::Deleted => out.data(&format!("nacked {} (deleted)", path))?,
            NackOutcome::Dropped => {
                out.data(&format!("nacked {} (dropped, requeue limit reached)", path))?
            }
            NackOutcome::Vanished => {
                failures += 1;
                out.data(&format!("failed nack {}", path))?
            }
        }
    }
    Ok(failures)
}

fn del_msg<W: Write>(args: &HandleArgs, out: &mut Output<W>) -> AppResult<usize> {
    let broker = Broker::open(&args.root)?;
    let mut deleted = 0;
    let mut failures = 0;
    for file in split_list(&args.files) {
        let name = handle_name(&file);
        match broker.delete_message(&args.queue, name) {
            Ok(true) => {
                deleted += 1;
                out.info(&format!("Deleted {}", name))?;
            }
            Ok(false) => {
                failures += 1;
                out.info(&format!("Skipping {}, file does not exist", name))?;
            }
            Err(QueueError::InvalidMessageName { .. }) => {
                failures += 1;
                out.info(&format!("Skipping {}, not a message file", name))?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    out.info(&format!("Deleted {} messages", deleted))?;
    Ok(failures)
}

/// Split the queue list and report names that cannot be used
fn usable_queues<W: Write>(
    broker: &Broker,
    queues: &[String],
    out: &mut Output<W>,
    failures: &mut usize,
) -> AppResult<Vec<String>> {
    let mut usable = Vec::new();
    for queue in split_list(queues) {
        if !is_valid_queue_name(&queue) {
            *failures += 1;
            out.info(&format!("Skipping {}, invalid name", queue))?;
        } else if !broker.queue_exists(&queue) {
            *failures += 1;
            out.info(&format!(
                "Queue does not exist: {}",
                broker.queue_dir(&queue).display()
            ))?;
        } else {
            usable.push(queue);
        }
    }
    Ok(usable)
}

fn purge<W: Write>(args: &QueueListArgs, out: &mut Output<W>) -> AppResult<usize> {
    let broker = open_broker(&args.root, args.force)?;
    let mut failures = 0;
    let queues = usable_queues(&broker, &args.queues, out, &mut failures)?;
    for queue in &queues {
        let report = broker.purge(queue)?;
        out.info(&format!(
            "Purged queue: {}\t({} messages in queue, {} messages in work)",
            queue, report.pending, report.in_flight
        ))?;
    }
    out.info(&format!("Purged {} queues", queues.len()))?;
    Ok(failures)
}

fn clean<W: Write>(args: &QueueListArgs, out: &mut Output<W>) -> AppResult<usize> {
    let broker = open_broker(&args.root, args.force)?;
    let mut failures = 0;
    let queues = usable_queues(&broker, &args.queues, out, &mut failures)?;
    for queue in &queues {
        let report = broker.clean(queue)?;
        out.info(&format!(
            "Cleaned queue: {}\t({} requeued, {} dropped, {} corrupt)",
            queue, report.requeued, report.dropped, report.corrupt
        ))?;
    }
    out.info(&format!("Cleaned {} queues", queues.len()))?;
    Ok(failures)
}
