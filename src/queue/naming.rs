//! Message filename encoding
//!
//! The filename of a message is the ordering mechanism of the queue:
//!
//! ```text
//! pending:    <priority>.<sequence>.ddmq<id>
//! in flight:  <claimed_at>.<priority>.<sequence>.ddmq<id>
//! ```
//!
//! Numeric fields are zero padded so that a plain lexicographic sort of a
//! pending directory equals delivery order (priority ascending, then
//! sequence ascending). Parsing accepts unpadded fields as written by older
//! deployments, and ordering is always computed from the parsed numbers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::queue::error::QueueError;
use crate::queue::store::is_hidden;

pub const PRIORITY_WIDTH: usize = 10;
pub const SEQUENCE_WIDTH: usize = 20;
pub const CLAIM_WIDTH: usize = 10;

/// Marker between the numeric prefix and the unique id
pub const ID_MARKER: &str = "ddmq";

static PENDING_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.(\d+)\.ddmq([A-Za-z0-9]+)$").expect("pending name pattern"));

static CLAIMED_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)\.ddmq([A-Za-z0-9]+)$").expect("claimed name pattern")
});

// Anything ddmq ever wrote as a message, parseable or not
static MESSAGE_GLOB: Lazy<glob::Pattern> =
    Lazy::new(|| glob::Pattern::new("*.ddmq*").expect("message glob"));

/// True for files that belong to the queue as messages (used by purge and counts)
pub fn is_message_file(name: &str) -> bool {
    !is_hidden(name) && MESSAGE_GLOB.matches(name)
}

/// Ordering fields and id of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingName {
    pub priority: u32,
    pub sequence: u64,
    pub id: String,
}

impl PendingName {
    pub fn new(priority: u32, sequence: u64, id: impl Into<String>) -> Self {
        Self {
            priority,
            sequence,
            id: id.into(),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let caps = PENDING_NAME.captures(name)?;
        Some(Self {
            priority: caps[1].parse().ok()?,
            sequence: caps[2].parse().ok()?,
            id: caps[3].to_string(),
        })
    }
}

impl Ord for PendingName {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.sequence, &self.id).cmp(&(other.priority, other.sequence, &other.id))
    }
}

impl PartialOrd for PendingName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PendingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0pw$}.{:0sw$}.{}{}",
            self.priority,
            self.sequence,
            ID_MARKER,
            self.id,
            pw = PRIORITY_WIDTH,
            sw = SEQUENCE_WIDTH
        )
    }
}

/// A file found in the pending directory: parsed fields plus the name as it is on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub name: PendingName,
    pub file_name: String,
}

impl PendingFile {
    pub fn parse(file_name: &str) -> Option<Self> {
        PendingName::parse(file_name).map(|name| Self {
            name,
            file_name: file_name.to_string(),
        })
    }
}

impl From<PendingName> for PendingFile {
    fn from(name: PendingName) -> Self {
        let file_name = name.to_string();
        Self { name, file_name }
    }
}

impl Ord for PendingFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.file_name.cmp(&other.file_name))
    }
}

impl PartialOrd for PendingFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Opaque handle for a claimed message: its filename in the work directory.
///
/// The claim timestamp leads the name, so the age of a claim is known from a
/// directory listing alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimHandle {
    pub claimed_at: i64,
    pub name: PendingName,
    file_name: String,
}

impl ClaimHandle {
    /// The handle a pending file gets when it is claimed at `claimed_at`
    pub fn claim(pending: &PendingFile, claimed_at: i64) -> Self {
        Self {
            claimed_at,
            name: pending.name.clone(),
            file_name: format!("{:0cw$}.{}", claimed_at, pending.file_name, cw = CLAIM_WIDTH),
        }
    }

    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = CLAIMED_NAME.captures(file_name)?;
        Some(Self {
            claimed_at: caps[1].parse().ok()?,
            name: PendingName {
                priority: caps[2].parse().ok()?,
                sequence: caps[3].parse().ok()?,
                id: caps[4].to_string(),
            },
            file_name: file_name.to_string(),
        })
    }

    pub fn id(&self) -> &str {
        &self.name.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Seconds the claim has been held at `now` (never negative)
    pub fn age(&self, now: i64) -> u64 {
        u64::try_from(now - self.claimed_at).unwrap_or(0)
    }
}

impl fmt::Display for ClaimHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

impl FromStr for ClaimHandle {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClaimHandle::parse(s).ok_or_else(|| QueueError::InvalidClaimHandle {
            handle: s.to_string(),
        })
    }
}

/// A message filename classified by the directory it belongs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFile {
    Pending(PendingFile),
    InFlight(ClaimHandle),
}

impl MessageFile {
    /// Classify a bare filename; anything that is not a message name yields `None`
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(handle) = ClaimHandle::parse(name) {
            Some(MessageFile::InFlight(handle))
        } else {
            PendingFile::parse(name).map(MessageFile::Pending)
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            MessageFile::Pending(pending) => &pending.file_name,
            MessageFile::InFlight(handle) => handle.file_name(),
        }
    }
}
