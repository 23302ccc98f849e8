//! Filesystem Queue Core
//!
//! A queue is a directory. Pending messages are files directly inside it, and
//! claimed (in-flight) messages live in its `work` subdirectory:
//!
//! ```text
//! <root>/
//! ├── ddmq.yaml                         root settings
//! └── jobs/
//!     ├── ddmq.yaml                     queue settings (marks the directory as a queue)
//!     ├── .sequence.42                  sequence counter
//!     ├── .sequence.origin              sequence bootstrap guard
//!     ├── .cleaned                      epoch of the last clean pass
//!     ├── 0000000001.00000000000000000041.ddmq<id>     pending
//!     └── work/
//!         └── 1700000000.0000000999.00000000000000000040.ddmq<id>   in flight
//! ```
//!
//! There is no broker process and no lock. Publishers and consumers are
//! independent processes; every state change is an exclusive create, a
//! rename or a delete, and when two processes race for the same file the
//! one whose rename lands first wins.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ddmq::core::time::SystemClock;
//! use ddmq::queue::{DirectoryStore, EffectiveConfig, QueueEngine};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = QueueEngine::open(
//!     "jobs",
//!     std::path::Path::new("/srv/ddmq/jobs"),
//!     DirectoryStore::new(),
//!     Arc::new(SystemClock),
//! )?;
//!
//! engine.publish("resize image 42", &EffectiveConfig::default())?;
//!
//! for delivery in engine.consume(1, None)? {
//!     println!("{}", delivery.message.payload);
//!     engine.ack(&delivery.handle)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod naming;
pub mod sequence;
pub mod store;

pub use config::{resolve, EffectiveConfig, Settings};
pub use engine::{
    CleanReport, MessageListing, NackOutcome, PurgeReport, QueueCounts, QueueEngine,
    RequeuePolicy, CLEAN_MARKER, SETTINGS_FILE, WORK_DIR,
};
pub use error::{QueueError, QueueResult};
pub use message::{Delivery, Message};
pub use naming::{ClaimHandle, MessageFile, PendingFile, PendingName};
pub use store::{DirectoryStore, StoreError};

#[cfg(test)]
mod tests;
