//! Per-queue sequence allocator
//!
//! The counter is a hidden empty file `.sequence.<n>` in the queue directory.
//! Allocating the next number hard-links the highest counter `n` to
//! `.sequence.<n+1>`: the link fails if the target already exists, so exactly
//! one process owns each value. The winner then removes the lower counters,
//! oldest first.
//!
//! A queue without a counter is bootstrapped from the highest sequence found
//! among its message files. Only the process that creates the guard file
//! `.sequence.origin` may bootstrap, and the guard is never removed, so a
//! counter that has been pruned can not be created a second time. Everyone
//! else waits for the first counter to appear. A guard that has had no
//! counter next to it for longer than the bootstrap grace is taken over
//! (a crash between the two creates, or counters removed by hand); two
//! processes taking over at the same moment is the one case where a value
//! could be handed out twice.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::core::retry::{retry_contended, RetryPolicy};
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::naming::MessageFile;
use crate::queue::store::{DirectoryStore, TEMP_PREFIX};

pub const COUNTER_PREFIX: &str = ".sequence.";

/// Created once by the process that bootstraps the counter
pub const BOOTSTRAP_GUARD: &str = ".sequence.origin";

/// Age after which a guard without any counter is considered abandoned
const BOOTSTRAP_GRACE: Duration = Duration::from_secs(1);

const MAX_ATTEMPTS: usize = 200;

/// Default contention policy: many quick retries with a short growing pause
pub fn contention_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: MAX_ATTEMPTS,
        delay: Duration::from_micros(200),
        max_delay: Duration::from_millis(10),
    }
}

fn counter_value(name: &str) -> Option<u64> {
    name.strip_prefix(COUNTER_PREFIX)?.parse().ok()
}

/// Allocates strictly increasing, never reused sequence numbers for one queue
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    queue: String,
    dir: PathBuf,
    work_dir: PathBuf,
    store: DirectoryStore,
    policy: RetryPolicy,
    bootstrap_grace: Duration,
}

impl SequenceAllocator {
    pub fn new(queue: impl Into<String>, dir: &Path, work_dir: &Path, store: DirectoryStore) -> Self {
        Self {
            queue: queue.into(),
            dir: dir.to_path_buf(),
            work_dir: work_dir.to_path_buf(),
            store,
            policy: contention_policy(),
            bootstrap_grace: BOOTSTRAP_GRACE,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_bootstrap_grace(mut self, grace: Duration) -> Self {
        self.bootstrap_grace = grace;
        self
    }

    /// Take the next sequence number
    pub fn next(&self) -> QueueResult<u64> {
        let allocated = retry_contended("sequence allocation", &self.policy, |_| self.try_advance())?;
        allocated.ok_or_else(|| QueueError::SequenceContention {
            queue: self.queue.clone(),
            attempts: self.policy.max_attempts,
        })
    }

    /// Highest counter currently present, if any
    pub fn current(&self) -> QueueResult<Option<u64>> {
        Ok(self.counters()?.last().copied())
    }

    fn try_advance(&self) -> QueueResult<Option<u64>> {
        let counters = self.counters()?;
        let current = match counters.last() {
            Some(&n) => n,
            None => match self.bootstrap()? {
                Some(n) => n,
                None => return Ok(None),
            },
        };

        let next = current + 1;
        match self
            .store
            .link_exclusive(&self.counter_path(current), &self.counter_path(next))
        {
            Ok(()) => {
                self.prune_below(next, &counters);
                Ok(Some(next))
            }
            Err(e) if e.is_not_found() || e.is_already_exists() => {
                log::debug!("Lost sequence race in {} at {}", self.queue, next);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create the first counter. `None` means another process is doing it.
    fn bootstrap(&self) -> QueueResult<Option<u64>> {
        let guard = self.dir.join(BOOTSTRAP_GUARD);
        match self.store.create_exclusive(&guard, b"") {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                if self.guard_abandoned(&guard)? {
                    self.take_over_guard(&guard)?;
                }
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        // a counter may have appeared while the guard was being created
        if !self.counters()?.is_empty() {
            return Ok(None);
        }
        let base = self.highest_message_sequence()?;
        match self.store.create_exclusive(&self.counter_path(base), b"") {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        log::debug!("Initialised sequence counter for {} at {}", self.queue, base);
        Ok(Some(base))
    }

    fn guard_abandoned(&self, guard: &Path) -> QueueResult<bool> {
        if !self.counters()?.is_empty() {
            return Ok(false);
        }
        let modified = match self.store.modified(guard) {
            Ok(modified) => modified,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        Ok(age > self.bootstrap_grace)
    }

    /// Move the guard out of the way; only the process whose rename wins removes it
    fn take_over_guard(&self, guard: &Path) -> QueueResult<()> {
        let retired = self
            .dir
            .join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4().simple()));
        match self.store.rename(guard, &retired) {
            Ok(()) => {
                log::warn!(
                    "Sequence counter of {} is missing, bootstrapping it again",
                    self.queue
                );
                if let Err(e) = self.store.delete(&retired) {
                    log::debug!("Could not remove {}: {}", retired.display(), e);
                }
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn highest_message_sequence(&self) -> QueueResult<u64> {
        let mut highest = 0;
        for dir in [&self.dir, &self.work_dir] {
            let names = match self.store.list(dir) {
                Ok(names) => names,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            for name in names {
                let sequence = match MessageFile::parse(&name) {
                    Some(MessageFile::Pending(file)) => file.name.sequence,
                    Some(MessageFile::InFlight(handle)) => handle.name.sequence,
                    None => continue,
                };
                highest = highest.max(sequence);
            }
        }
        Ok(highest)
    }

    fn counters(&self) -> QueueResult<Vec<u64>> {
        let mut values: Vec<u64> = self
            .store
            .list(&self.dir)?
            .iter()
            .filter_map(|name| counter_value(name))
            .collect();
        values.sort_unstable();
        Ok(values)
    }

    fn prune_below(&self, owned: u64, seen: &[u64]) {
        for &stale in seen.iter().filter(|&&n| n < owned) {
            self.remove_counter(stale);
        }
    }

    fn remove_counter(&self, value: u64) {
        match self.store.delete(&self.counter_path(value)) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => log::warn!("Could not remove sequence counter {}: {}", value, e),
        }
    }

    fn counter_path(&self, value: u64) -> PathBuf {
        self.dir.join(format!("{}{}", COUNTER_PREFIX, value))
    }
}
