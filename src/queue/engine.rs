//! Queue Engine
//!
//! Implements the message lifecycle for a single queue directory:
//!
//! ```text
//! publish ──> Pending ──consume──> InFlight ──ack──────────> (deleted)
//!                ^                    │
//!                │                    ├──nack/clean, requeue──> Pending (counter + 1)
//!                └────────────────────┤
//!                                     └──nack/clean, no requeue or over limit──> (deleted)
//! ```
//!
//! The engine holds no queue state in memory. Every operation lists the
//! directories again, and every transition is a single rename or delete, so
//! whichever process gets its rename in first wins and everyone else moves
//! on to the next candidate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::retry::{retry_contended, RetryPolicy};
use crate::core::time::Clock;
use crate::queue::config::{EffectiveConfig, Settings, DEFAULT_MESSAGE_TIMEOUT};
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::message::{Delivery, Message};
use crate::queue::naming::{is_message_file, ClaimHandle, MessageFile, PendingFile, PendingName};
use crate::queue::sequence::{SequenceAllocator, COUNTER_PREFIX};
use crate::queue::store::{is_hidden, DirectoryStore, StoreResult, TEMP_PREFIX};

/// Name of the in-flight subdirectory of a queue
pub const WORK_DIR: &str = "work";

/// Name of the settings file in the root and in each queue directory
pub const SETTINGS_FILE: &str = "ddmq.yaml";

/// Hidden file holding the epoch of the last clean pass
pub const CLEAN_MARKER: &str = ".cleaned";

/// Passes over the pending directory a consume makes when it loses races
const CLAIM_ROUNDS: usize = 3;

/// Attempts at finding an unused message id
const ID_ATTEMPTS: usize = 5;

/// What happens to a message that is negatively acknowledged or expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeuePolicy {
    pub requeue: bool,
    pub requeue_prio: u32,
    pub requeue_limit: Option<u32>,
}

impl RequeuePolicy {
    /// The policy stored in the message body at publish time
    pub fn of(message: &Message) -> Self {
        Self {
            requeue: message.requeue,
            requeue_prio: message.requeue_prio,
            requeue_limit: message.requeue_limit,
        }
    }

    /// Apply per-call overrides
    pub fn overlay(self, overrides: &Settings) -> Self {
        Self {
            requeue: overrides.requeue.unwrap_or(self.requeue),
            requeue_prio: overrides.requeue_prio.unwrap_or(self.requeue_prio),
            requeue_limit: overrides.requeue_limit.unwrap_or(self.requeue_limit),
        }
    }
}

/// Result of settling an in-flight message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// Back in pending under this name
    Requeued(PendingName),
    /// Removed because requeueing is off
    Deleted,
    /// Removed because the requeue limit was exceeded
    Dropped,
    /// The in-flight file was already gone (acked, cleaned or nacked elsewhere)
    Vanished,
}

/// Summary of one clean pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub requeued: usize,
    pub dropped: usize,
    /// In-flight files that could not be decoded and were left in place
    pub corrupt: usize,
}

impl CleanReport {
    /// Expired claims that were dealt with, whichever way
    pub fn recovered(&self) -> usize {
        self.requeued + self.dropped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub pending: usize,
    pub in_flight: usize,
}

impl PurgeReport {
    pub fn total(&self) -> usize {
        self.pending + self.in_flight
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
}

/// Message files of a queue in delivery order, without their bodies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageListing {
    pub pending: Vec<PendingFile>,
    pub in_flight: Vec<ClaimHandle>,
}

enum Claim {
    Won(Box<Delivery>),
    Lost,
    Skipped,
}

/// Lifecycle operations on one queue directory
pub struct QueueEngine {
    name: String,
    dir: PathBuf,
    work_dir: PathBuf,
    store: DirectoryStore,
    sequence: SequenceAllocator,
    clock: Arc<dyn Clock>,
    fallback_timeout: u64,
}

impl std::fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEngine")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .finish()
    }
}

impl QueueEngine {
    /// Attach to an existing queue directory, creating the in-flight
    /// directory if an older layout lacks it.
    ///
    /// A directory is only a queue if it has a `ddmq.yaml`; anything else is
    /// `QueueNotFound` and is left untouched.
    pub fn open(
        name: impl Into<String>,
        dir: &Path,
        store: DirectoryStore,
        clock: Arc<dyn Clock>,
    ) -> QueueResult<Self> {
        let name = name.into();
        if !is_queue_dir(&store, dir) {
            return Err(QueueError::QueueNotFound { queue: name });
        }
        let work_dir = dir.join(WORK_DIR);
        if !store.is_dir(&work_dir) {
            store.create_dir_all(&work_dir)?;
        }
        let sequence = SequenceAllocator::new(name.clone(), dir, &work_dir, store);
        Ok(Self {
            name,
            dir: dir.to_path_buf(),
            work_dir,
            store,
            sequence,
            clock,
            fallback_timeout: DEFAULT_MESSAGE_TIMEOUT,
        })
    }

    /// Timeout used for message bodies that do not record their own
    pub fn with_fallback_timeout(mut self, timeout: u64) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    /// Enqueue `payload` with the policy fields of `config`.
    ///
    /// The body is complete on disk before the file appears under its final
    /// name. A colliding id is replaced by a fresh one.
    pub fn publish(&self, payload: &str, config: &EffectiveConfig) -> QueueResult<Message> {
        let sequence = self.sequence.next()?;

        let published = retry_contended("publish", &RetryPolicy::immediate(ID_ATTEMPTS), |_| {
            let id = uuid::Uuid::new_v4().simple().to_string();
            let message = Message::new(self.name.clone(), id, sequence, payload, config);
            let path = self.dir.join(message.pending_name().to_string());
            match self.store.create_exclusive(&path, &message.encode()?) {
                Ok(()) => Ok(Some(message)),
                Err(e) if e.is_already_exists() => {
                    log::debug!("Message id {} already taken in {}", message.id, self.name);
                    Ok(None)
                }
                Err(e) => Err(QueueError::from(e)),
            }
        })?;

        let message = published.ok_or_else(|| {
            QueueError::from(crate::queue::store::StoreError::AlreadyExists {
                path: self.dir.clone(),
            })
        })?;
        log::info!(
            "Published {} to {} (priority {}, sequence {})",
            message.id,
            self.name,
            message.priority,
            message.sequence
        );
        Ok(message)
    }

    /// Claim up to `count` messages in delivery order.
    ///
    /// An empty result means nothing was available. `timeout_override`
    /// replaces the message timeout recorded in each claimed message.
    pub fn consume(&self, count: usize, timeout_override: Option<u64>) -> QueueResult<Vec<Delivery>> {
        let mut deliveries = Vec::new();
        if count == 0 {
            return Ok(deliveries);
        }

        for round in 0..CLAIM_ROUNDS {
            let candidates = self.pending_files()?;
            let mut lost_any = false;

            for file in &candidates {
                if deliveries.len() == count {
                    break;
                }
                match self.claim(file, timeout_override)? {
                    Claim::Won(delivery) => deliveries.push(*delivery),
                    Claim::Lost => lost_any = true,
                    Claim::Skipped => {}
                }
            }

            if deliveries.len() == count || !lost_any {
                break;
            }
            log::debug!("Consume on {} lost races in round {}, listing again", self.name, round + 1);
        }

        log::info!("Consumed {} message(s) from {}", deliveries.len(), self.name);
        Ok(deliveries)
    }

    fn claim(&self, file: &PendingFile, timeout_override: Option<u64>) -> QueueResult<Claim> {
        let handle = ClaimHandle::claim(file, self.clock.now());
        let pending_path = self.dir.join(&file.file_name);
        let claimed_path = self.work_dir.join(handle.file_name());

        match self.store.rename(&pending_path, &claimed_path) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                log::debug!("{} was claimed by another consumer", file.file_name);
                return Ok(Claim::Lost);
            }
            Err(e) => return Err(e.into()),
        }

        let bytes = match self.store.read(&claimed_path) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(Claim::Lost),
            Err(e) => return Err(e.into()),
        };

        let mut message = match self.decode(&bytes, &claimed_path) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Skipping unreadable message: {}", e);
                if let Err(e) = self.store.rename(&claimed_path, &pending_path) {
                    log::warn!("Could not return {} to pending: {}", file.file_name, e);
                }
                return Ok(Claim::Skipped);
            }
        };

        if let Some(timeout) = timeout_override {
            if timeout != message.message_timeout {
                message.message_timeout = timeout;
                self.store.replace(&claimed_path, &message.encode()?)?;
            }
        }

        Ok(Claim::Won(Box::new(Delivery { message, handle })))
    }

    /// Finish a claim. Returns false if the claim was already gone.
    pub fn ack(&self, handle: &ClaimHandle) -> QueueResult<bool> {
        let removed = self.remove_if_present(&self.work_dir.join(handle.file_name()))?;
        if removed {
            log::info!("Acknowledged {} on {}", handle.id(), self.name);
        } else {
            log::debug!("Ack of {} on {}: claim already gone", handle.id(), self.name);
        }
        Ok(removed)
    }

    /// Give a claimed message back, or drop it, according to its requeue
    /// policy with `overrides` applied.
    pub fn nack(&self, handle: &ClaimHandle, overrides: &Settings) -> QueueResult<NackOutcome> {
        overrides.validate()?;
        let path = self.work_dir.join(handle.file_name());
        let message = match self.store.read(&path) {
            Ok(bytes) => self.decode(&bytes, &path)?,
            Err(e) if e.is_not_found() => return Ok(NackOutcome::Vanished),
            Err(e) => return Err(e.into()),
        };

        let policy = RequeuePolicy::of(&message).overlay(overrides);
        let outcome = self.settle(handle, message, &policy)?;
        log::info!("Nack of {} on {}: {:?}", handle.id(), self.name, outcome);
        Ok(outcome)
    }

    /// Requeue or drop every claim older than its message timeout.
    ///
    /// Safe to run from several processes at once: a claim that is acked or
    /// recovered by someone else in the meantime is skipped.
    pub fn clean(&self) -> QueueResult<CleanReport> {
        let now = self.clock.now();
        let mut report = CleanReport::default();

        for name in self.list_or_empty(&self.work_dir)? {
            if is_hidden(&name) {
                continue;
            }
            let Some(handle) = ClaimHandle::parse(&name) else {
                log::warn!("Ignoring unrecognised file {} in {}", name, self.work_dir.display());
                continue;
            };

            let path = self.work_dir.join(&name);
            let bytes = match self.store.read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            let message = match self.decode(&bytes, &path) {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("Leaving unreadable in-flight message in place: {}", e);
                    report.corrupt += 1;
                    continue;
                }
            };

            if handle.age(now) <= message.message_timeout {
                continue;
            }
            log::debug!(
                "Claim {} expired ({}s old, timeout {}s)",
                name,
                handle.age(now),
                message.message_timeout
            );

            let policy = RequeuePolicy::of(&message);
            match self.settle(&handle, message, &policy)? {
                NackOutcome::Requeued(_) => report.requeued += 1,
                NackOutcome::Deleted | NackOutcome::Dropped => report.dropped += 1,
                NackOutcome::Vanished => {}
            }
        }

        if report.recovered() > 0 || report.corrupt > 0 {
            log::info!(
                "Cleaned {}: {} requeued, {} dropped, {} unreadable",
                self.name,
                report.requeued,
                report.dropped,
                report.corrupt
            );
        }
        Ok(report)
    }

    /// Move an in-flight message back to pending, or delete it.
    ///
    /// The requeued copy first takes a fresh in-flight name, which nobody else
    /// can know, so its body can be rewritten before it becomes visible in
    /// pending. A crash part way leaves an in-flight file that a later clean
    /// recovers.
    fn settle(
        &self,
        handle: &ClaimHandle,
        mut message: Message,
        policy: &RequeuePolicy,
    ) -> QueueResult<NackOutcome> {
        let in_flight = self.work_dir.join(handle.file_name());

        if !policy.requeue {
            return self.remove_settled(&in_flight, NackOutcome::Deleted);
        }

        message.requeue = true;
        message.requeue_prio = policy.requeue_prio;
        message.requeue_limit = policy.requeue_limit;
        message.requeue_counter = message.requeue_counter.saturating_add(1);
        if message.requeue_limit_exceeded() {
            log::info!(
                "Dropping {} from {}: requeued {} times",
                message.id,
                self.name,
                message.requeue_counter - 1
            );
            return self.remove_settled(&in_flight, NackOutcome::Dropped);
        }

        message.priority = policy.requeue_prio;
        message.sequence = self.sequence.next()?;
        let target = message.pending_name();
        let staging = ClaimHandle::claim(&PendingFile::from(target.clone()), self.clock.now());
        let staging_path = self.work_dir.join(staging.file_name());

        match self.store.rename(&in_flight, &staging_path) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(NackOutcome::Vanished),
            Err(e) => return Err(e.into()),
        }
        self.store.replace(&staging_path, &message.encode()?)?;
        self.store
            .rename(&staging_path, &self.dir.join(target.to_string()))?;

        Ok(NackOutcome::Requeued(target))
    }

    fn remove_settled(&self, path: &Path, outcome: NackOutcome) -> QueueResult<NackOutcome> {
        if self.remove_if_present(path)? {
            Ok(outcome)
        } else {
            Ok(NackOutcome::Vanished)
        }
    }

    /// Delete every message, pending and in flight. Best effort per file.
    pub fn purge(&self) -> QueueResult<PurgeReport> {
        let report = PurgeReport {
            pending: self.remove_messages_in(&self.dir)?,
            in_flight: self.remove_messages_in(&self.work_dir)?,
        };
        log::info!(
            "Purged {}: {} pending, {} in flight",
            self.name,
            report.pending,
            report.in_flight
        );
        Ok(report)
    }

    fn remove_messages_in(&self, dir: &Path) -> QueueResult<usize> {
        let mut removed = 0;
        for name in self.list_or_empty(dir)? {
            if is_message_file(&name) && self.remove_if_present(&dir.join(&name))? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn counts(&self) -> QueueResult<QueueCounts> {
        let count = |dir: &Path| -> QueueResult<usize> {
            Ok(self
                .list_or_empty(dir)?
                .iter()
                .filter(|name| is_message_file(name))
                .count())
        };
        Ok(QueueCounts {
            pending: count(&self.dir)?,
            in_flight: count(&self.work_dir)?,
        })
    }

    /// Current message files in delivery order, without claiming anything
    pub fn list_messages(&self) -> QueueResult<MessageListing> {
        let mut in_flight: Vec<ClaimHandle> = self
            .list_or_empty(&self.work_dir)?
            .iter()
            .filter_map(|name| ClaimHandle::parse(name))
            .collect();
        in_flight.sort_by(|a, b| (a.claimed_at, &a.name).cmp(&(b.claimed_at, &b.name)));

        Ok(MessageListing {
            pending: self.pending_files()?,
            in_flight,
        })
    }

    /// Remove one message by its pending or in-flight file name.
    /// Returns false if it was not there.
    pub fn delete_message(&self, file_name: &str) -> QueueResult<bool> {
        let path = match MessageFile::parse(file_name) {
            Some(MessageFile::Pending(file)) => self.dir.join(file.file_name),
            Some(MessageFile::InFlight(handle)) => self.work_dir.join(handle.file_name()),
            None => {
                return Err(QueueError::InvalidMessageName {
                    name: file_name.to_string(),
                })
            }
        };
        let removed = self.remove_if_present(&path)?;
        if removed {
            log::info!("Deleted message {} from {}", file_name, self.name);
        }
        Ok(removed)
    }

    /// Read the body of a message without claiming it
    pub fn read_message(&self, file: &MessageFile) -> QueueResult<Option<Message>> {
        let path = match file {
            MessageFile::Pending(file) => self.dir.join(&file.file_name),
            MessageFile::InFlight(handle) => self.work_dir.join(handle.file_name()),
        };
        match self.store.read(&path) {
            Ok(bytes) => self.decode(&bytes, &path).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Epoch of the last clean pass, if one was recorded
    pub fn last_cleaned(&self) -> QueueResult<Option<i64>> {
        let path = self.dir.join(CLEAN_MARKER);
        let bytes = match self.store.read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let text = String::from_utf8_lossy(&bytes);
        match text.trim().parse() {
            Ok(epoch) => Ok(Some(epoch)),
            Err(_) => {
                log::warn!("Ignoring unreadable {} in {}", CLEAN_MARKER, self.name);
                Ok(None)
            }
        }
    }

    /// Record `now` as the time of the last clean pass
    pub fn mark_cleaned(&self, now: i64) -> QueueResult<()> {
        self.store
            .replace(&self.dir.join(CLEAN_MARKER), now.to_string().as_bytes())?;
        Ok(())
    }

    /// Entries of the queue directory (and of `work/`) that ddmq did not put there
    pub fn foreign_entries(&self) -> QueueResult<Vec<String>> {
        let mut foreign: Vec<String> = self
            .store
            .list_entries(&self.dir)?
            .into_iter()
            .filter(|name| !is_own_entry(name) && name != WORK_DIR)
            .collect();
        for name in self.entries_or_empty(&self.work_dir)? {
            if !is_message_file(&name) && !name.starts_with(TEMP_PREFIX) {
                foreign.push(format!("{}/{}", WORK_DIR, name));
            }
        }
        foreign.sort();
        Ok(foreign)
    }

    /// Remove an empty queue: its bookkeeping files, `work/`, the settings
    /// file and finally the directory itself.
    ///
    /// Fails without removing anything while messages or foreign entries
    /// are present. A message published in the meantime makes the final
    /// directory removal fail.
    pub fn remove_empty(&self) -> QueueResult<()> {
        let counts = self.counts()?;
        if counts.pending > 0 || counts.in_flight > 0 {
            return Err(QueueError::QueueNotEmpty {
                queue: self.name.clone(),
                pending: counts.pending,
                in_flight: counts.in_flight,
            });
        }
        let foreign = self.foreign_entries()?;
        if !foreign.is_empty() {
            return Err(QueueError::ForeignEntries {
                queue: self.name.clone(),
                entries: foreign,
            });
        }

        for name in self.entries_or_empty(&self.work_dir)? {
            if name.starts_with(TEMP_PREFIX) {
                self.remove_if_present(&self.work_dir.join(name))?;
            }
        }
        self.remove_dir_checked(&self.work_dir)?;
        for name in self.store.list(&self.dir)? {
            if is_hidden(&name) && is_own_entry(&name) {
                self.remove_if_present(&self.dir.join(name))?;
            }
        }
        self.remove_if_present(&self.settings_path())?;
        self.remove_dir_checked(&self.dir)
    }

    fn remove_dir_checked(&self, dir: &Path) -> QueueResult<()> {
        match self.store.remove_dir(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => {
                let counts = self.counts()?;
                if counts.pending > 0 || counts.in_flight > 0 {
                    Err(QueueError::QueueNotEmpty {
                        queue: self.name.clone(),
                        pending: counts.pending,
                        in_flight: counts.in_flight,
                    })
                } else {
                    Err(e.into())
                }
            }
        }
    }

    fn decode(&self, bytes: &[u8], path: &Path) -> QueueResult<Message> {
        Message::decode_with_timeout(bytes, path, self.fallback_timeout)
    }

    fn pending_files(&self) -> QueueResult<Vec<PendingFile>> {
        let mut files = Vec::new();
        for name in self.store.list(&self.dir)? {
            if is_hidden(&name) {
                continue;
            }
            match PendingFile::parse(&name) {
                Some(file) => files.push(file),
                None if is_message_file(&name) => {
                    log::warn!("Ignoring malformed message file name {} in {}", name, self.name)
                }
                None => {}
            }
        }
        files.sort();
        Ok(files)
    }

    fn list_or_empty(&self, dir: &Path) -> StoreResult<Vec<String>> {
        match self.store.list(dir) {
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    fn entries_or_empty(&self, dir: &Path) -> StoreResult<Vec<String>> {
        match self.store.list_entries(dir) {
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    fn remove_if_present(&self, path: &Path) -> QueueResult<bool> {
        match self.store.delete(path) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// True if `dir` is a queue directory (it carries a settings file)
pub fn is_queue_dir(store: &DirectoryStore, dir: &Path) -> bool {
    store.is_dir(dir) && store.exists(&dir.join(SETTINGS_FILE))
}

/// Files ddmq keeps directly in a queue directory
fn is_own_entry(name: &str) -> bool {
    name == SETTINGS_FILE
        || name == CLEAN_MARKER
        || name.starts_with(COUNTER_PREFIX)
        || name.starts_with(TEMP_PREFIX)
        || is_message_file(name)
}
