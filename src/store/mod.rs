//! The embeddable store: Redis-like surface over the bucket files.
//!
//! One instance owns its working directory exclusively. Mutations are
//! serialized against sync rounds through a single operation lock; the
//! background worker drains scheduler triggers and runs syncs with the
//! same single-flight gate as manual calls.

pub mod bucket;
mod lists;

use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::config::{Config, ConfigLayer};
use crate::core::keys::bucket_of;
use crate::core::{KeyPattern, Record, Value, ValueType, WallClock};
use crate::sync::{
    EventBus, EventSubscription, StatusInner, SyncReport, SyncScheduler, SyncStatus, SyncTrigger,
};
use crate::Result;

use bucket::{BucketStore, BucketTxn};

pub(crate) struct StoreInner {
    pub(crate) buckets: BucketStore,
    pub(crate) config: RwLock<Config>,
    pub(crate) status: Mutex<StatusInner>,
    pub(crate) in_flight: AtomicBool,
    pub(crate) bus: EventBus,
    pub(crate) scheduler: SyncScheduler,
    /// Serializes bucket read-modify-write sequences against sync rounds.
    pub(crate) op_lock: Mutex<()>,
}

impl StoreInner {
    pub(crate) fn lock_ops(&self) -> std::sync::MutexGuard<'_, ()> {
        self.op_lock.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub(crate) fn config_snapshot(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    fn record(&self, key: &str) -> Option<Record> {
        let mut records = self.buckets.read(&bucket_of(key));
        records.remove(key)
    }

    fn live_record(&self, key: &str) -> Option<Record> {
        self.record(key).filter(Record::is_live)
    }

    /// All records across every shard, keyed by user key.
    fn all_records(&self) -> BTreeMap<String, Record> {
        let mut all = BTreeMap::new();
        for bucket in self.buckets.list_buckets() {
            all.extend(self.buckets.read(&bucket));
        }
        all
    }

    pub(crate) fn after_mutation(&self, reason: &str) {
        let config = self.config.read().unwrap_or_else(|err| err.into_inner());
        if config.auto_sync && config.sync_on_change {
            self.scheduler
                .schedule_debounced(reason, Duration::from_millis(config.debounce_ms));
        }
    }
}

/// Opaque resumption token for [`Store::scan`].
///
/// The token pins the round to the last key handed out, not to a position
/// in a recomputed listing, so keys inserted or deleted between pages can
/// never shift a later page onto keys the round already returned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanCursor(CursorState);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum CursorState {
    #[default]
    Start,
    After(String),
    Done,
}

impl ScanCursor {
    /// Beginning of a fresh scan round.
    pub fn start() -> Self {
        Self(CursorState::Start)
    }

    /// True once the round has returned its final page (the wire
    /// protocol's "cursor is 0 again"). Scanning a done cursor yields an
    /// empty page instead of restarting.
    pub fn is_done(&self) -> bool {
        matches!(self.0, CursorState::Done)
    }
}

/// One page of a [`Store::scan`] round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanPage {
    pub cursor: ScanCursor,
    pub keys: Vec<String>,
}

/// Handle to an open store. Cheap to clone; all clones share the same
/// working directory, scheduler, and sync state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Open (or create) the store at `config.data_dir` and start the
    /// background sync worker.
    pub fn open(config: Config) -> Result<Store> {
        fs::create_dir_all(&config.data_dir)?;

        let (trigger_tx, trigger_rx) = crossbeam::channel::unbounded();
        let scheduler = SyncScheduler::new(trigger_tx);
        let interval = interval_of(&config);

        let inner = Arc::new(StoreInner {
            buckets: BucketStore::new(&config.data_dir),
            config: RwLock::new(config),
            status: Mutex::new(StatusInner::default()),
            in_flight: AtomicBool::new(false),
            bus: EventBus::new(),
            scheduler,
            op_lock: Mutex::new(()),
        });
        inner.scheduler.set_interval(interval);
        spawn_worker(trigger_rx, Arc::downgrade(&inner));

        tracing::debug!(
            data_dir = %inner.buckets.root().display(),
            "store opened"
        );
        Ok(Store { inner })
    }

    // ------------------------------------------------------------------
    // Scalars
    // ------------------------------------------------------------------

    /// Decoded value for a live key.
    pub fn get(&self, key: &str) -> Option<Value> {
        let _guard = self.inner.lock_ops();
        self.inner
            .live_record(key)
            .map(|record| Value::decode(record.value_type, &record.value))
    }

    /// Write a value. First writes mint a record id; later writes keep id
    /// and creation time, and revive tombstoned keys.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let value_type = value.infer_type();
        let encoded = value.encode();
        {
            let _guard = self.inner.lock_ops();
            let now = WallClock::now();
            let mut txn = BucketTxn::new(&self.inner.buckets);
            let updated = txn.modify(key, |record| {
                record.update(value_type, encoded.clone(), now);
            });
            if !updated {
                txn.put(Record::create(key, value_type, encoded, now));
            }
            txn.commit()?;
        }
        self.inner.after_mutation("set");
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        let _guard = self.inner.lock_ops();
        self.inner.live_record(key).is_some()
    }

    /// Tombstone a live key. Returns whether anything was deleted. The
    /// record stays on disk so the delete can win (or lose) later merges.
    pub fn del(&self, key: &str) -> Result<bool> {
        let deleted = {
            let _guard = self.inner.lock_ops();
            let now = WallClock::now();
            let mut txn = BucketTxn::new(&self.inner.buckets);
            let mut deleted = false;
            txn.modify(key, |record| {
                if record.is_live() {
                    record.delete(now);
                    deleted = true;
                }
            });
            if deleted {
                txn.commit()?;
            }
            deleted
        };
        if deleted {
            self.inner.after_mutation("del");
        }
        Ok(deleted)
    }

    /// Type tag of a live key. List meta keys report `list`; list items
    /// report their payload's type.
    pub fn value_type(&self, key: &str) -> Option<ValueType> {
        let _guard = self.inner.lock_ops();
        self.inner.live_record(key).map(|record| record.value_type)
    }

    /// Full record for a live key, timestamps and markers included.
    pub fn meta(&self, key: &str) -> Option<Record> {
        let _guard = self.inner.lock_ops();
        self.inner.live_record(key)
    }

    // ------------------------------------------------------------------
    // Batch
    // ------------------------------------------------------------------

    pub fn mget(&self, keys: &[&str]) -> Vec<Option<Value>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    pub fn mset<K, V, I>(&self, entries: I) -> Result<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.set(key.as_ref(), value)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------

    /// All live keys, sorted; optionally filtered by a glob pattern
    /// (`*` and `?`).
    pub fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let matcher = match pattern {
            Some(source) => Some(KeyPattern::new(source)?),
            None => None,
        };
        let _guard = self.inner.lock_ops();
        let keys = self
            .inner
            .all_records()
            .into_iter()
            .filter(|(_, record)| record.is_live())
            .map(|(key, _)| key)
            .filter(|key| matcher.as_ref().map(|m| m.matches(key)).unwrap_or(true))
            .collect();
        Ok(keys)
    }

    /// Cursor pagination over the sorted live key space. Each page resumes
    /// strictly after the last key of the previous one, so no key is
    /// returned twice within a round; keys inserted mid-scan may or may
    /// not appear depending on where they sort.
    pub fn scan(&self, cursor: ScanCursor, pattern: &str, count: usize) -> Result<ScanPage> {
        let resume_after = match cursor.0 {
            CursorState::Start => None,
            CursorState::After(last) => Some(last),
            CursorState::Done => {
                return Ok(ScanPage {
                    cursor: ScanCursor(CursorState::Done),
                    keys: Vec::new(),
                })
            }
        };

        let limit = count.max(1);
        let mut page: Vec<String> = self
            .keys(Some(pattern))?
            .into_iter()
            .filter(|key| {
                resume_after
                    .as_deref()
                    .map_or(true, |last| key.as_str() > last)
            })
            .take(limit + 1)
            .collect();

        // The sentinel extra key only tells us the round continues.
        let cursor = if page.len() > limit {
            page.truncate(limit);
            match page.last() {
                Some(last) => ScanCursor(CursorState::After(last.clone())),
                None => ScanCursor(CursorState::Done),
            }
        } else {
            ScanCursor(CursorState::Done)
        };
        Ok(ScanPage { cursor, keys: page })
    }

    /// Offset pagination over live keys with a fixed prefix.
    pub fn list_keys(&self, prefix: &str, limit: usize, offset: usize) -> Vec<String> {
        let _guard = self.inner.lock_ops();
        self.inner
            .all_records()
            .into_iter()
            .filter(|(key, record)| record.is_live() && key.starts_with(prefix))
            .map(|(key, _)| key)
            .skip(offset)
            .take(limit)
            .collect()
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    /// Run a sync round now. Never panics or returns `Err`; failures come
    /// back in the report and on the event bus.
    pub fn sync(&self, reason: &str) -> SyncReport {
        crate::sync::run_sync(&self.inner, reason)
    }

    pub fn status(&self) -> SyncStatus {
        let status = self
            .inner
            .status
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        SyncStatus {
            state: status.state,
            in_flight: self
                .inner
                .in_flight
                .load(std::sync::atomic::Ordering::SeqCst),
            last_at: status.last_at,
            last_error: status.last_error.clone(),
        }
    }

    /// Apply a partial reconfiguration; rebuilds the periodic trigger and
    /// drops any pending debounce when change-triggered sync is off.
    pub fn set_config(&self, layer: ConfigLayer) {
        let (interval, on_change) = {
            let mut config = self
                .inner
                .config
                .write()
                .unwrap_or_else(|err| err.into_inner());
            layer.apply_to(&mut config);
            (
                interval_of(&config),
                config.auto_sync && config.sync_on_change,
            )
        };
        self.inner.scheduler.set_interval(interval);
        if !on_change {
            self.inner.scheduler.cancel_debounce();
        }
    }

    pub fn config(&self) -> Config {
        self.inner.config_snapshot()
    }

    /// Subscribe to sync lifecycle events. Dropping the subscription
    /// unsubscribes.
    pub fn subscribe(&self) -> EventSubscription {
        self.inner.bus.subscribe()
    }
}

fn interval_of(config: &Config) -> Option<Duration> {
    if config.auto_sync && config.sync_interval_minutes > 0 {
        Some(Duration::from_secs(config.sync_interval_minutes * 60))
    } else {
        None
    }
}

/// Background worker: drains scheduler triggers for as long as the store
/// is alive. Reports are dropped (the sync path already logs and emits
/// events); the weak handle keeps the worker from pinning the store.
fn spawn_worker(triggers: Receiver<SyncTrigger>, inner: Weak<StoreInner>) {
    std::thread::spawn(move || {
        while let Ok(trigger) = triggers.recv() {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            crate::sync::run_sync(&inner, &trigger.reason);
        }
    });
}
