//! # git-storage
//!
//! An embeddable key-value store that persists its entire state into a Git
//! repository and converges across independent writers through that
//! repository. Clients get a Redis-like surface (scalars, deletions, lists,
//! scans); durability comes from the local working copy; cross-node
//! consistency comes from periodic record-by-record merges against the
//! remote branch followed by a force-push of the merged snapshot. Every
//! participant is simultaneously a reader, a writer, and a merger.
//!
//! ```no_run
//! use git_storage::{Config, Store};
//!
//! # fn main() -> Result<(), git_storage::Error> {
//! let mut config = Config::default();
//! config.repo_url = Some("https://example.com/state.git".to_string());
//! config.token = Some("s3cret".to_string());
//!
//! let store = Store::open(config)?;
//! store.set("greeting", "hello")?;
//! store.rpush("todos", vec!["write docs"])?;
//! let report = store.sync("manual");
//! assert!(report.success || report.error.is_some());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod git;
pub mod merge;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the public surface at the crate root.
pub use crate::config::{
    Config, ConfigLayer, HistoryConfig, HistoryConfigOverride, LoggingConfig,
    LoggingConfigOverride,
};
pub use crate::core::{
    ConflictLoser, CoreError, KeyPattern, Record, RecordId, Value, ValueType, WallClock,
};
pub use crate::git::{SyncError, Transience};
pub use crate::store::{ScanCursor, ScanPage, Store};
pub use crate::sync::{
    EventSubscription, SyncEvent, SyncEventKind, SyncReport, SyncState, SyncStatus,
};
