//! Broker
//!
//! Entry point for everything that addresses queues by name under a root
//! directory. The broker keeps no state of its own: the queues are the
//! subdirectories that carry a `ddmq.yaml`, and settings are read from disk
//! on every call and cascaded defaults → root → queue → call overrides.
//!
//! Publish and consume run a clean pass on the queue first, at most once per
//! `clean_interval` seconds, so abandoned claims are recovered without any
//! separate process.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use ddmq::broker::{Broker, CallOptions};
//! use ddmq::queue::Settings;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = Broker::open_or_init("/srv/ddmq")?;
//! broker.create_queue("jobs", &Settings::new().with_message_timeout(30))?;
//!
//! let message = broker.publish("jobs", "resize image 42", &CallOptions::default())?;
//! println!("published {}", message.id);
//!
//! for delivery in broker.consume("jobs", 1, &CallOptions::default())? {
//!     broker.ack("jobs", &delivery.handle)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::core::time::{Clock, SystemClock};
use crate::core::version;
use crate::core::validation::{is_valid_queue_name, validate_queue_name};
use crate::queue::config::{resolve, EffectiveConfig, Settings};
use crate::queue::engine::{
    is_queue_dir, CleanReport, MessageListing, NackOutcome, PurgeReport, QueueCounts, QueueEngine,
    SETTINGS_FILE, WORK_DIR,
};
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::message::{Delivery, Message};
use crate::queue::naming::ClaimHandle;
use crate::queue::store::{DirectoryStore, TEMP_PREFIX};

/// Root settings key holding the on-disk layout version
pub const KEY_LAYOUT_VERSION: &str = "layout_version";

/// Per-call options for publish and consume
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Highest-precedence settings layer
    pub overrides: Settings,
    /// Do not run the implicit clean pass
    pub skip_cleaning: bool,
    /// Create the queue if it does not exist (publish only)
    pub create_queue: bool,
}

impl CallOptions {
    pub fn with_overrides(mut self, overrides: Settings) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn skip_cleaning(mut self, skip: bool) -> Self {
        self.skip_cleaning = skip;
        self
    }

    pub fn create_queue(mut self, create: bool) -> Self {
        self.create_queue = create;
        self
    }
}

/// Message counts of one queue, as shown by `view`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub pending: usize,
    pub in_flight: usize,
}

pub struct Broker {
    root: PathBuf,
    store: DirectoryStore,
    clock: Arc<dyn Clock>,
    defaults: EffectiveConfig,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker").field("root", &self.root).finish()
    }
}

impl Broker {
    /// Open an initialised root (one that has a `ddmq.yaml`)
    pub fn open(root: impl AsRef<Path>) -> QueueResult<Self> {
        let root = root.as_ref().to_path_buf();
        let store = DirectoryStore::new();
        if !store.exists(&root.join(SETTINGS_FILE)) {
            return Err(QueueError::RootNotFound { root });
        }
        let broker = Self::new(root, store);
        match broker.layout_version() {
            Ok(Some(found)) if found > version::layout_version() => log::warn!(
                "{} was created with layout v{}, this build writes v{}",
                broker.root.display(),
                found,
                version::layout_version()
            ),
            Ok(_) => {}
            // reported by the operation that needs the root settings
            Err(e) => log::debug!("Could not read layout version: {}", e),
        }
        Ok(broker)
    }

    /// Open `root`, creating the directory and its settings file if needed.
    /// A new settings file records the layout version.
    pub fn open_or_init(root: impl AsRef<Path>) -> QueueResult<Self> {
        let root = root.as_ref().to_path_buf();
        let store = DirectoryStore::new();
        if !store.is_dir(&root) {
            log::info!("Initialising root {}", root.display());
            store.create_dir_all(&root)?;
        }
        let mut initial = serde_yaml::Mapping::new();
        initial.insert(KEY_LAYOUT_VERSION.into(), version::layout_version().into());
        settings::create_if_missing(&store, &root.join(SETTINGS_FILE), &initial)?;
        Self::open(root)
    }

    /// Layout version recorded in the root settings file, if any
    pub fn layout_version(&self) -> QueueResult<Option<u32>> {
        let path = self.root.join(SETTINGS_FILE);
        match settings::read_value(&self.store, &path, KEY_LAYOUT_VERSION)? {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| {
                    QueueError::config(format!(
                        "{}: {} must be a non-negative integer",
                        path.display(),
                        KEY_LAYOUT_VERSION
                    ))
                }),
        }
    }

    fn new(root: PathBuf, store: DirectoryStore) -> Self {
        Self {
            root,
            store,
            clock: Arc::new(SystemClock),
            defaults: EffectiveConfig::default(),
        }
    }

    /// Replace the time source (tests and simulations)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn queue_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// True if `name` is a directory under the root carrying a `ddmq.yaml`
    pub fn queue_exists(&self, name: &str) -> bool {
        is_valid_queue_name(name) && is_queue_dir(&self.store, &self.queue_dir(name))
    }

    /// Names of all queues under the root, sorted. Other directories are ignored.
    pub fn list_queues(&self) -> QueueResult<Vec<String>> {
        let mut names: Vec<String> = self
            .store
            .list_dirs(&self.root)?
            .into_iter()
            .filter(|name| self.queue_exists(name))
            .collect();
        names.sort();
        Ok(names)
    }

    /// The engine for an existing queue
    pub fn engine(&self, name: &str) -> QueueResult<QueueEngine> {
        validate_queue_name(name)?;
        QueueEngine::open(name, &self.queue_dir(name), self.store, Arc::clone(&self.clock))
    }

    /// The engine for a queue, reading message bodies with `config`'s timeout as fallback
    fn configured_engine(&self, name: &str, config: &EffectiveConfig) -> QueueResult<QueueEngine> {
        Ok(self.engine(name)?.with_fallback_timeout(config.message_timeout))
    }

    pub fn root_settings(&self) -> QueueResult<Settings> {
        settings::load(&self.store, &self.root.join(SETTINGS_FILE))
    }

    pub fn queue_settings(&self, name: &str) -> QueueResult<Settings> {
        validate_queue_name(name)?;
        settings::load(&self.store, &self.queue_dir(name).join(SETTINGS_FILE))
    }

    /// Resolve the cascade for one call on `queue`
    pub fn effective_config(&self, queue: &str, overrides: &Settings) -> QueueResult<EffectiveConfig> {
        resolve(
            &self.defaults,
            &self.root_settings()?,
            &self.queue_settings(queue)?,
            overrides,
        )
    }

    /// Create a queue directory with its `work/` directory and settings file.
    ///
    /// The queue is assembled under a hidden name and renamed into place, so
    /// it never exists without its settings file.
    pub fn create_queue(&self, name: &str, settings: &Settings) -> QueueResult<()> {
        validate_queue_name(name)?;
        settings.validate()?;
        let dir = self.queue_dir(name);
        if self.store.exists(&dir) {
            return Err(QueueError::QueueAlreadyExists {
                queue: name.to_string(),
            });
        }
        if !self.store.is_dir(&self.root) {
            return Err(QueueError::RootNotFound {
                root: self.root.clone(),
            });
        }

        let staging = self
            .root
            .join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4().simple()));
        let assembled = self.assemble_queue(&staging, settings);
        let placed = assembled
            .and_then(|()| self.store.rename(&staging, &dir).map_err(QueueError::from));
        if let Err(e) = placed {
            if let Err(cleanup) = self.store.remove_dir_all(&staging) {
                log::debug!("Could not remove {}: {}", staging.display(), cleanup);
            }
            return Err(if is_queue_dir(&self.store, &dir) {
                QueueError::QueueAlreadyExists {
                    queue: name.to_string(),
                }
            } else {
                e
            });
        }
        log::info!("Created queue {}", name);
        Ok(())
    }

    fn assemble_queue(&self, staging: &Path, settings: &Settings) -> QueueResult<()> {
        self.store.create_dir_all(&staging.join(WORK_DIR))?;
        let path = staging.join(SETTINGS_FILE);
        if settings.is_empty() {
            settings::ensure_exists(&self.store, &path)
        } else {
            settings::merge_into(&self.store, &path, settings)
        }
    }

    /// Remove a queue. Returns what the queue held.
    ///
    /// Without `force` only an empty queue holding nothing but ddmq's own
    /// files is removed; with `force` the whole directory goes.
    pub fn delete_queue(&self, name: &str, force: bool) -> QueueResult<QueueCounts> {
        let engine = self.engine(name)?;
        let counts = engine.counts()?;
        if force {
            self.store.remove_dir_all(engine.dir())?;
        } else {
            engine.remove_empty()?;
        }
        log::info!("Deleted queue {}", name);
        Ok(counts)
    }

    /// Merge settings into a queue's `ddmq.yaml`
    pub fn update_queue_settings(&self, name: &str, update: &Settings) -> QueueResult<()> {
        let engine = self.engine(name)?;
        settings::merge_into(&self.store, &engine.settings_path(), update)
    }

    pub fn publish(&self, queue: &str, payload: &str, options: &CallOptions) -> QueueResult<Message> {
        validate_queue_name(queue)?;
        if options.create_queue && !self.queue_exists(queue) {
            match self.create_queue(queue, &Settings::default()) {
                Ok(()) | Err(QueueError::QueueAlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let config = self.effective_config(queue, &options.overrides)?;
        let engine = self.configured_engine(queue, &config)?;
        if !options.skip_cleaning {
            self.clean_if_due(&engine, &config)?;
        }
        engine.publish(payload, &config)
    }

    /// Claim up to `count` messages. A `message_timeout` override replaces
    /// the timeout recorded in each claimed message.
    pub fn consume(&self, queue: &str, count: usize, options: &CallOptions) -> QueueResult<Vec<Delivery>> {
        let config = self.effective_config(queue, &options.overrides)?;
        let engine = self.configured_engine(queue, &config)?;
        if !options.skip_cleaning {
            self.clean_if_due(&engine, &config)?;
        }
        engine.consume(count, options.overrides.message_timeout)
    }

    pub fn ack(&self, queue: &str, handle: &ClaimHandle) -> QueueResult<bool> {
        self.engine(queue)?.ack(handle)
    }

    pub fn nack(&self, queue: &str, handle: &ClaimHandle, overrides: &Settings) -> QueueResult<NackOutcome> {
        let config = self.effective_config(queue, overrides)?;
        self.configured_engine(queue, &config)?.nack(handle, overrides)
    }

    /// Run a clean pass now, regardless of `clean_interval`
    pub fn clean(&self, queue: &str) -> QueueResult<CleanReport> {
        let config = self.effective_config(queue, &Settings::default())?;
        let engine = self.configured_engine(queue, &config)?;
        let now = self.clock.now();
        let report = engine.clean()?;
        engine.mark_cleaned(now)?;
        Ok(report)
    }

    /// Epoch of the last clean pass on `queue`, if any
    pub fn last_cleaned(&self, queue: &str) -> QueueResult<Option<i64>> {
        let engine = self.engine(queue)?;
        self.recorded_clean(&engine)
    }

    pub fn purge(&self, queue: &str) -> QueueResult<PurgeReport> {
        self.engine(queue)?.purge()
    }

    /// Counts for the named queues, or for every queue when `filter` is empty
    pub fn view(&self, filter: &[String]) -> QueueResult<Vec<QueueStats>> {
        let names = if filter.is_empty() {
            self.list_queues()?
        } else {
            filter.to_vec()
        };

        names
            .into_iter()
            .map(|name| {
                let counts = self.engine(&name)?.counts()?;
                Ok(QueueStats {
                    name,
                    pending: counts.pending,
                    in_flight: counts.in_flight,
                })
            })
            .collect()
    }

    pub fn list_messages(&self, queue: &str) -> QueueResult<MessageListing> {
        self.engine(queue)?.list_messages()
    }

    pub fn delete_message(&self, queue: &str, file_name: &str) -> QueueResult<bool> {
        self.engine(queue)?.delete_message(file_name)
    }

    /// Run the implicit clean pass if `clean_interval` has elapsed
    fn clean_if_due(&self, engine: &QueueEngine, config: &EffectiveConfig) -> QueueResult<Option<CleanReport>> {
        let now = self.clock.now();
        let last = self.recorded_clean(engine)?;
        let interval = i64::try_from(config.clean_interval).unwrap_or(i64::MAX);
        if last.is_some_and(|last| now.saturating_sub(last) < interval) {
            return Ok(None);
        }

        let report = engine.clean()?;
        engine.mark_cleaned(now)?;
        Ok(Some(report))
    }

    /// The clean marker, or the `cleaned` key older deployments kept in the
    /// queue's settings file
    fn recorded_clean(&self, engine: &QueueEngine) -> QueueResult<Option<i64>> {
        match engine.last_cleaned()? {
            Some(epoch) => Ok(Some(epoch)),
            None => Ok(self.queue_settings(engine.name())?.cleaned),
        }
    }
}
