//! Sharded bucket files.
//!
//! Each of the 256 shards is one JSON object (key to record) under
//! `data/<2-hex>.json`, pretty-printed so diffs and merges stay reviewable.
//! The whole file is rewritten on every write; per-key atomicity beyond that
//! is unnecessary because a shard's key set is disjoint from every other
//! shard's.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::Record;

/// Snapshot of the write counters feeding history compaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteCounters {
    pub writes: u64,
    pub bytes: u64,
}

pub struct BucketStore {
    root: PathBuf,
    write_count: AtomicU64,
    write_bytes: AtomicU64,
}

impl BucketStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_count: AtomicU64::new(0),
            write_bytes: AtomicU64::new(0),
        }
    }

    /// Root of the working copy (the directory holding `.git` and `data/`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.bucket_dir().join(format!("{bucket}.json"))
    }

    /// Read one shard. Absent files are empty; unparseable files are
    /// treated as empty too, with a warning, so a single corrupt shard
    /// cannot take the store down.
    pub fn read(&self, bucket: &str) -> BTreeMap<String, Record> {
        let path = self.bucket_path(bucket);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(bucket, error = %err, "corrupt bucket file, treating as empty");
                BTreeMap::new()
            }
        }
    }

    /// Rewrite one shard in full and advance the write counters.
    pub fn write(&self, bucket: &str, records: &BTreeMap<String, Record>) -> io::Result<()> {
        fs::create_dir_all(self.bucket_dir())?;
        let serialized = serde_json::to_vec_pretty(records)?;
        fs::write(self.bucket_path(bucket), &serialized)?;
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.write_bytes
            .fetch_add(serialized.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Flat listing of shard names present on disk (extension stripped).
    pub fn list_buckets(&self) -> Vec<String> {
        let mut buckets = Vec::new();
        let entries = match fs::read_dir(self.bucket_dir()) {
            Ok(entries) => entries,
            Err(_) => return buckets,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if let Some(name) = name.to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    buckets.push(stem.to_string());
                }
            }
        }
        buckets.sort();
        buckets
    }

    pub fn counters(&self) -> WriteCounters {
        WriteCounters {
            writes: self.write_count.load(Ordering::Relaxed),
            bytes: self.write_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn reset_counters(&self) {
        self.write_count.store(0, Ordering::Relaxed);
        self.write_bytes.store(0, Ordering::Relaxed);
    }
}

/// Read-modify-write over several shards with one write per dirty shard.
///
/// List operations touch the meta shard plus one shard per item; batching
/// through a transaction keeps the on-disk write count proportional to the
/// shards touched instead of the records touched.
pub(crate) struct BucketTxn<'a> {
    store: &'a BucketStore,
    shards: BTreeMap<String, BTreeMap<String, Record>>,
    dirty: std::collections::BTreeSet<String>,
}

impl<'a> BucketTxn<'a> {
    pub fn new(store: &'a BucketStore) -> Self {
        Self {
            store,
            shards: BTreeMap::new(),
            dirty: std::collections::BTreeSet::new(),
        }
    }

    fn shard_mut(&mut self, bucket: &str) -> &mut BTreeMap<String, Record> {
        if !self.shards.contains_key(bucket) {
            let loaded = self.store.read(bucket);
            self.shards.insert(bucket.to_string(), loaded);
        }
        self.shards.get_mut(bucket).expect("shard just loaded")
    }

    pub fn record(&mut self, key: &str) -> Option<Record> {
        let bucket = crate::core::keys::bucket_of(key);
        self.shard_mut(&bucket).get(key).cloned()
    }

    pub fn put(&mut self, record: Record) {
        let bucket = crate::core::keys::bucket_of(&record.key);
        let key = record.key.clone();
        self.shard_mut(&bucket).insert(key, record);
        self.dirty.insert(bucket);
    }

    /// Mutate an existing record in place. Returns false if the key has no
    /// record at all (live or tombstoned).
    pub fn modify(&mut self, key: &str, f: impl FnOnce(&mut Record)) -> bool {
        let bucket = crate::core::keys::bucket_of(key);
        let shard = self.shard_mut(&bucket);
        match shard.get_mut(key) {
            Some(record) => {
                f(record);
                self.dirty.insert(bucket);
                true
            }
            None => false,
        }
    }

    pub fn commit(self) -> io::Result<()> {
        for bucket in &self.dirty {
            self.store.write(bucket, &self.shards[bucket])?;
        }
        Ok(())
    }
}
