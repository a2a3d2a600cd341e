//! Merge-and-sync coordination.
//!
//! One sync round: ensure repo and branch, fetch the remote branch, merge
//! every bucket in union(local, remote) record-by-record, re-add list merge
//! losers, reconcile list orders, stage, commit, force-push. At most one
//! round runs per instance at any time; a second caller gets an immediate
//! "sync already in flight" report instead of queueing.

pub mod compact;
pub mod events;
pub mod scheduler;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use serde::Serialize;

use crate::config::Config;
use crate::core::keys::parse_list_item;
use crate::core::{Record, WallClock};
use crate::git::{RepoSpec, SyncError};
use crate::merge::{apply_losers, merge_list_item, merge_scalar, normalize_lists, PendingLoser};
use crate::store::StoreInner;

pub use events::{EventBus, EventSubscription, SyncEvent, SyncEventKind};
pub use scheduler::{SyncScheduler, SyncTrigger};

/// Coordinator state machine: `Idle -> Syncing -> (Idle | Error)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Syncing,
    Error,
}

/// Outcome of one `sync()` call. Failures are data, not panics: the
/// coordinator never throws past this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub success: bool,
    pub error: Option<String>,
}

impl SyncReport {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Snapshot returned by `Store::status`.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncStatus {
    pub state: SyncState,
    pub in_flight: bool,
    pub last_at: Option<WallClock>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub(crate) struct StatusInner {
    pub state: SyncState,
    pub last_at: Option<WallClock>,
    pub last_error: Option<String>,
}

impl Default for StatusInner {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            last_at: None,
            last_error: None,
        }
    }
}

pub(crate) fn repo_spec(config: &Config) -> RepoSpec {
    RepoSpec {
        workdir: config.data_dir.clone(),
        branch: config.branch.clone(),
        remote_url: config.repo_url.clone(),
        username: config.username.clone(),
        token: config.token.clone(),
    }
}

/// Single-flight entry point for every trigger (manual, debounce,
/// interval). Errors are folded into the report and the `sync:error`
/// event; only the in-flight short-circuit skips events and state.
pub(crate) fn run_sync(inner: &StoreInner, reason: &str) -> SyncReport {
    if inner.in_flight.swap(true, Ordering::SeqCst) {
        return SyncReport::failed(SyncError::AlreadyInFlight.to_string());
    }

    let config = inner
        .config
        .read()
        .unwrap_or_else(|err| err.into_inner())
        .clone();

    transition(inner, SyncState::Syncing, None, None);
    emit(inner, SyncEventKind::Start, reason, SyncState::Syncing);
    tracing::info!(reason, "sync started");

    let spec = repo_spec(&config);
    let result = match pipeline(inner, &spec, reason) {
        // The remote branch does not exist yet anywhere in the pipeline:
        // bootstrap it from the local state.
        Err(err) if err.is_remote_branch_absent() => bootstrap(inner, &spec, reason),
        other => other,
    }
    .and_then(|()| compact::maybe_compact(&inner.buckets, &spec, &config.history).map(|_| ()));

    let report = match result {
        Ok(()) => {
            transition(inner, SyncState::Idle, Some(WallClock::now()), None);
            emit(inner, SyncEventKind::Finish, reason, SyncState::Idle);
            tracing::info!(reason, "sync finished");
            SyncReport::ok()
        }
        Err(err) => {
            let message = err.to_string();
            tracing::warn!(
                reason,
                error = %message,
                retryable = err.transience().is_retryable(),
                "sync failed"
            );
            transition(inner, SyncState::Error, None, Some(message.clone()));
            emit(inner, SyncEventKind::Error, reason, SyncState::Error);
            SyncReport::failed(message)
        }
    };

    inner.in_flight.store(false, Ordering::SeqCst);
    report
}

fn transition(
    inner: &StoreInner,
    state: SyncState,
    last_at: Option<WallClock>,
    last_error: Option<String>,
) {
    let mut status = inner.status.lock().unwrap_or_else(|err| err.into_inner());
    status.state = state;
    if last_at.is_some() {
        status.last_at = last_at;
    }
    status.last_error = last_error;
}

fn emit(inner: &StoreInner, kind: SyncEventKind, reason: &str, state: SyncState) {
    inner.bus.publish(SyncEvent {
        kind,
        at: WallClock::now(),
        reason: reason.to_string(),
        state,
    });
}

fn pipeline(inner: &StoreInner, spec: &RepoSpec, reason: &str) -> Result<(), SyncError> {
    let repo = spec.ensure_open()?;
    spec.ensure_branch(&repo)?;

    match spec.fetch(&repo) {
        Ok(()) => {}
        // The remote branch simply doesn't exist yet; merge proceeds
        // against an empty remote and push will create it.
        Err(err) if err.is_remote_branch_absent() => {}
        Err(err) => return Err(err),
    }

    {
        let _guard = inner.op_lock.lock().unwrap_or_else(|err| err.into_inner());
        merge_remote(inner, spec, &repo)?;
        if spec.stage_all(&repo)? {
            spec.commit(&repo, &format!("sync: {reason}"))?;
        }
    }
    spec.push(&repo)
}

/// Remote-branch-absent recovery: commit and force-push the local state
/// as-is to create the branch.
fn bootstrap(inner: &StoreInner, spec: &RepoSpec, reason: &str) -> Result<(), SyncError> {
    let repo = spec.ensure_open()?;
    spec.ensure_branch(&repo)?;
    {
        let _guard = inner.op_lock.lock().unwrap_or_else(|err| err.into_inner());
        if spec.stage_all(&repo)? {
            spec.commit(&repo, &format!("sync: {reason}"))?;
        }
    }
    spec.push(&repo)
}

/// Steps 4-7: merge union(local, remote) bucket by bucket against the
/// base snapshot at the local HEAD commit, then run both normalizer
/// phases over the merged working tree. Buckets the merge leaves
/// untouched are not rewritten.
fn merge_remote(
    inner: &StoreInner,
    spec: &RepoSpec,
    repo: &git2::Repository,
) -> Result<(), SyncError> {
    let mut buckets: BTreeSet<String> = inner.buckets.list_buckets().into_iter().collect();
    buckets.extend(spec.list_remote_buckets(repo, "data"));

    let mut losers: Vec<PendingLoser> = Vec::new();
    for bucket in &buckets {
        let local = inner.buckets.read(bucket);
        let remote = parse_bucket(spec.read_remote_file(repo, &bucket_path(bucket)), bucket);
        let base = parse_bucket(spec.read_head_file(repo, &bucket_path(bucket)), bucket);

        let keys: BTreeSet<&String> = local.keys().chain(remote.keys()).collect();
        let mut merged: BTreeMap<String, Record> = BTreeMap::new();
        for key in keys {
            let ours = local.get(key);
            let theirs = remote.get(key);
            let ancestor = base.get(key);
            match parse_list_item(key) {
                Some(item) => {
                    let outcome = merge_list_item(ours, theirs, ancestor);
                    if let Some(winner) = outcome.winner {
                        merged.insert(key.clone(), winner);
                    }
                    if let Some(defeated) = outcome.loser {
                        losers.push(PendingLoser {
                            list: item.list.to_string(),
                            winner_item_id: item.item_id.to_string(),
                            record: defeated,
                        });
                    }
                }
                None => {
                    if let Some(winner) = merge_scalar(ours, theirs, ancestor) {
                        merged.insert(key.clone(), winner);
                    }
                }
            }
        }
        if merged != local {
            inner.buckets.write(bucket, &merged)?;
        }
    }

    apply_losers(&inner.buckets, losers)?;
    normalize_lists(&inner.buckets)?;
    Ok(())
}

fn bucket_path(bucket: &str) -> PathBuf {
    PathBuf::from("data").join(format!("{bucket}.json"))
}

/// Parse one side of a bucket; empty on any failure, mirroring the local
/// corrupt-shard policy.
fn parse_bucket(bytes: Option<Vec<u8>>, bucket: &str) -> BTreeMap<String, Record> {
    let Some(bytes) = bytes else {
        return BTreeMap::new();
    };
    match serde_json::from_slice(&bytes) {
        Ok(records) => records,
        Err(err) => {
            tracing::warn!(bucket, error = %err, "corrupt bucket snapshot, treating as empty");
            BTreeMap::new()
        }
    }
}
