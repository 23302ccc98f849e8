//! Message type and its on-disk codec
//!
//! A message file is a self-describing JSON record holding the full message
//! state. Where the message currently *is* (pending or in flight) is never
//! stored: it is whichever directory the file sits in.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::queue::config::{EffectiveConfig, DEFAULT_MESSAGE_TIMEOUT};
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::naming::{ClaimHandle, PendingName};

/// A single unit of work
///
/// Field names follow the persisted format. See [`Message::decode`] for the
/// older body shapes that are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: String,
    pub queue: String,
    pub priority: u32,
    pub sequence: u64,
    pub payload: String,
    pub requeue_counter: u32,
    pub requeue_limit: Option<u32>,
    pub requeue: bool,
    pub requeue_prio: u32,
    pub message_timeout: u64,
}

/// A body as it is found on disk, before defaults are filled in
#[derive(Deserialize)]
struct StoredMessage {
    id: String,
    queue: String,
    priority: u32,
    #[serde(alias = "queue_number")]
    sequence: u64,
    #[serde(alias = "message", default)]
    payload: Option<String>,
    #[serde(default)]
    requeue_counter: Option<u32>,
    #[serde(default)]
    requeue_limit: Option<u32>,
    #[serde(default)]
    requeue: Option<RequeueField>,
    #[serde(default)]
    requeue_prio: Option<u32>,
    #[serde(alias = "timeout", default)]
    message_timeout: Option<u64>,
}

/// `requeue` is a flag, or in older bodies the requeue priority itself
#[derive(Deserialize)]
#[serde(untagged)]
enum RequeueField {
    Flag(bool),
    Priority(u32),
}

impl StoredMessage {
    fn into_message(self, fallback_timeout: u64) -> Message {
        let (requeue, legacy_prio) = match self.requeue {
            Some(RequeueField::Flag(flag)) => (flag, None),
            Some(RequeueField::Priority(prio)) => (true, Some(prio)),
            None => (false, None),
        };
        Message {
            id: self.id,
            queue: self.queue,
            priority: self.priority,
            sequence: self.sequence,
            payload: self.payload.unwrap_or_default(),
            requeue_counter: self.requeue_counter.unwrap_or(0),
            requeue_limit: self.requeue_limit,
            requeue,
            requeue_prio: self.requeue_prio.or(legacy_prio).unwrap_or(0),
            message_timeout: self.message_timeout.unwrap_or(fallback_timeout),
        }
    }
}

impl Message {
    /// Build a fresh message with the policy fields taken from `config`
    pub fn new(
        queue: impl Into<String>,
        id: impl Into<String>,
        sequence: u64,
        payload: impl Into<String>,
        config: &EffectiveConfig,
    ) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
            priority: config.default_priority,
            sequence,
            payload: payload.into(),
            requeue_counter: 0,
            requeue_limit: config.requeue_limit,
            requeue: config.requeue,
            requeue_prio: config.requeue_prio,
            message_timeout: config.message_timeout,
        }
    }

    /// Filename this message is stored under while pending
    pub fn pending_name(&self) -> PendingName {
        PendingName::new(self.priority, self.sequence, self.id.clone())
    }

    /// True once `requeue_counter` has gone past the configured cap
    pub fn requeue_limit_exceeded(&self) -> bool {
        self.requeue_limit
            .is_some_and(|limit| self.requeue_counter > limit)
    }

    /// Serialize the full message state
    pub fn encode(&self) -> QueueResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| QueueError::CorruptMessage {
            path: Path::new(&self.id).to_path_buf(),
            reason: format!("failed to serialize message: {}", e),
        })
    }

    /// Parse a message body read from `path`, using the built-in message
    /// timeout for bodies that do not record one
    pub fn decode(bytes: &[u8], path: &Path) -> QueueResult<Self> {
        Self::decode_with_timeout(bytes, path, DEFAULT_MESSAGE_TIMEOUT)
    }

    /// Parse a message body read from `path`.
    ///
    /// Older bodies are accepted: `message`, `queue_number` and `timeout` for
    /// the payload, sequence and timeout fields, `null` for any of the
    /// requeue fields, and an integer `requeue` meaning "requeue with this
    /// priority". A body without a timeout gets `fallback_timeout`.
    pub fn decode_with_timeout(bytes: &[u8], path: &Path, fallback_timeout: u64) -> QueueResult<Self> {
        let stored: StoredMessage =
            serde_json::from_slice(bytes).map_err(|e| QueueError::CorruptMessage {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if stored.id.is_empty() {
            return Err(QueueError::CorruptMessage {
                path: path.to_path_buf(),
                reason: "message id is empty".to_string(),
            });
        }
        Ok(stored.into_message(fallback_timeout))
    }
}

/// A message claimed by a consumer, together with the handle needed to ack or nack it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: Message,
    pub handle: ClaimHandle,
}
