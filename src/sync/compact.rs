//! History compaction.
//!
//! Mutation volume grows the `.git` object store without bound, so once the
//! accumulated write counters cross a threshold the whole history is
//! flattened: drop `.git`, re-init, commit the current merged snapshot as a
//! single orphan commit, force-push. The working tree (the actual data) is
//! untouched.

use crate::config::HistoryConfig;
use crate::git::{RepoSpec, SyncError};
use crate::store::bucket::BucketStore;

/// Run compaction if thresholds are crossed. Returns whether it ran.
/// Skipped without a remote: there is nothing to push and local history is
/// reset on the next compaction with one anyway.
pub fn maybe_compact(
    buckets: &BucketStore,
    spec: &RepoSpec,
    history: &HistoryConfig,
) -> Result<bool, SyncError> {
    if !history.enabled || spec.remote_url.is_none() {
        return Ok(false);
    }
    let counters = buckets.counters();
    if counters.writes < history.write_count_threshold
        && counters.bytes < history.write_bytes_threshold
    {
        return Ok(false);
    }

    tracing::info!(
        writes = counters.writes,
        bytes = counters.bytes,
        "write thresholds crossed, compacting history"
    );

    let repo = spec.reinit()?;
    spec.ensure_branch(&repo)?;
    if spec.stage_all(&repo)? {
        spec.commit(&repo, "compact history")?;
    }
    spec.push(&repo)?;
    buckets.reset_counters();
    Ok(true)
}
