//! Output rendering
//!
//! Every function here is a pure projection of a result into text; nothing
//! prints.

use prettytable::{format, Cell, Row, Table};
use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::app::error::AppResult;
use crate::broker::QueueStats;
use crate::core::styles::StyleRole;
use crate::queue::{Delivery, Message};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    /// Tables and plain text
    Plain,
    /// One JSON document
    Json,
    /// One YAML document
    Yaml,
}

impl OutputFormat {
    pub fn names() -> impl Iterator<Item = String> {
        OutputFormat::iter().map(|f| f.to_string())
    }
}

/// Queue listing as a table
pub fn view_table(stats: &[QueueStats], names_only: bool, color: bool) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

    let header = |text: &str| Cell::new(&StyleRole::Header.paint(text, color));
    if names_only {
        table.set_titles(Row::new(vec![header("queue")]));
    } else {
        table.set_titles(Row::new(vec![
            header("queue"),
            header("pending"),
            header("in flight"),
        ]));
    }

    for queue in stats {
        let name = Cell::new(&StyleRole::QueueName.paint(&queue.name, color));
        if names_only {
            table.add_row(Row::new(vec![name]));
        } else {
            table.add_row(Row::new(vec![
                name,
                Cell::new(&StyleRole::Pending.paint(&queue.pending.to_string(), color)),
                Cell::new(&StyleRole::InFlight.paint(&queue.in_flight.to_string(), color)),
            ]));
        }
    }
    table
}

pub fn render_view(
    stats: &[QueueStats],
    names_only: bool,
    format: OutputFormat,
    color: bool,
) -> AppResult<String> {
    let names: Vec<&str> = stats.iter().map(|s| s.name.as_str()).collect();
    let text = match (format, names_only) {
        (OutputFormat::Plain, true) => names.join("\n"),
        (OutputFormat::Plain, false) => view_table(stats, false, color).to_string(),
        (OutputFormat::Json, true) => serde_json::to_string(&names)?,
        (OutputFormat::Json, false) => serde_json::to_string(stats)?,
        (OutputFormat::Yaml, true) => serde_yaml::to_string(&names)?,
        (OutputFormat::Yaml, false) => serde_yaml::to_string(stats)?,
    };
    Ok(text.trim_end().to_string())
}

/// A claimed message as shown to the consumer: the message plus the handle
/// needed to ack or nack it
#[derive(Debug, Serialize)]
struct DeliveryView<'a> {
    handle: String,
    #[serde(flatten)]
    message: &'a Message,
}

pub fn render_delivery(delivery: &Delivery, format: OutputFormat, color: bool) -> AppResult<String> {
    let view = DeliveryView {
        handle: delivery.handle.to_string(),
        message: &delivery.message,
    };
    let text = match format {
        OutputFormat::Plain => format!(
            "{}\t{}",
            StyleRole::Handle.paint(delivery.handle.file_name(), color),
            delivery.message.payload
        ),
        OutputFormat::Json => serde_json::to_string(&view)?,
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(&view)?),
    };
    Ok(text.trim_end().to_string())
}

pub fn render_message(message: &Message, format: OutputFormat) -> AppResult<String> {
    let text = match format {
        OutputFormat::Plain => format!(
            "{} (priority {}, timeout {}s)",
            message.pending_name(),
            message.priority,
            message.message_timeout
        ),
        OutputFormat::Json => serde_json::to_string(message)?,
        OutputFormat::Yaml => serde_yaml::to_string(message)?,
    };
    Ok(text.trim_end().to_string())
}
