//! Three-way record merge.
//!
//! Each sync round merges (local working tree, remote branch) against the
//! base snapshot at the local HEAD commit — the state as of the last
//! successful sync. The base is what separates a genuinely concurrent edit
//! from a stale copy: a side that still equals the base simply loses to the
//! other side, with no conflict surfaced. Only pairs where both sides moved
//! reach the conflict rules:
//!
//! - scalars resolve by last-write-wins (`updated_at`, then lexicographic
//!   id, ties preferring the `>=` id); tombstones participate like any
//!   other write, so a newer delete beats a concurrent update
//! - list items prefer the live side over a tombstone regardless of
//!   timestamps, and a live-vs-live defeat surfaces the loser for
//!   re-insertion instead of dropping it
//!
//! A key absent on one side is adopted from the other: records are never
//! physically removed (deletes are tombstones), so absence means "never
//! seen there", not deletion. The outcome is a pure function of the three
//! inputs, and `merge(merge(l, r), r)` equals `merge(l, r)`.

pub mod normalize;

use crate::core::Record;

pub use normalize::{apply_losers, normalize_lists, reconcile_order, PendingLoser};

/// True when `a` beats `b`: strictly newer `updated_at`, or on a tie the
/// lexicographically greater-or-equal id.
fn wins(a: &Record, b: &Record) -> bool {
    if a.updated_at != b.updated_at {
        return a.updated_at > b.updated_at;
    }
    a.id >= b.id
}

/// How a present pair relates to the base snapshot.
enum Resolution {
    Local,
    Remote,
    Concurrent,
}

fn classify(local: &Record, remote: &Record, base: Option<&Record>) -> Resolution {
    if local == remote {
        return Resolution::Local;
    }
    // A side still equal to the base has not moved since the last sync:
    // the other side wins outright, nothing concurrent happened.
    if base.is_some_and(|b| remote == b) {
        return Resolution::Local;
    }
    if base.is_some_and(|b| local == b) {
        return Resolution::Remote;
    }
    Resolution::Concurrent
}

/// Three-way merge for ordinary records.
pub fn merge_scalar(
    local: Option<&Record>,
    remote: Option<&Record>,
    base: Option<&Record>,
) -> Option<Record> {
    let (l, r) = match (local, remote) {
        (None, None) => return None,
        (Some(l), None) => return Some(l.clone()),
        (None, Some(r)) => return Some(r.clone()),
        (Some(l), Some(r)) => (l, r),
    };
    match classify(l, r, base) {
        Resolution::Local => Some(l.clone()),
        Resolution::Remote => Some(r.clone()),
        Resolution::Concurrent => {
            if wins(l, r) {
                Some(l.clone())
            } else {
                Some(r.clone())
            }
        }
    }
}

/// Outcome of merging the two sides of one list item key.
#[derive(Clone, Debug, Default)]
pub struct ItemMerge {
    pub winner: Option<Record>,
    /// Defeated concurrent record, queued for re-insertion as a fresh item.
    pub loser: Option<Record>,
}

impl ItemMerge {
    fn winner(record: &Record) -> Self {
        ItemMerge {
            winner: Some(record.clone()),
            loser: None,
        }
    }
}

/// Three-way merge for list item records. Stale sides lose silently; only
/// concurrent edits can surface a loser or let an update override a
/// delete.
pub fn merge_list_item(
    local: Option<&Record>,
    remote: Option<&Record>,
    base: Option<&Record>,
) -> ItemMerge {
    let (l, r) = match (local, remote) {
        (None, None) => return ItemMerge::default(),
        (Some(one), None) | (None, Some(one)) => return ItemMerge::winner(one),
        (Some(l), Some(r)) => (l, r),
    };

    match classify(l, r, base) {
        Resolution::Local => ItemMerge::winner(l),
        Resolution::Remote => ItemMerge::winner(r),
        Resolution::Concurrent => match (l.is_live(), r.is_live()) {
            // Concurrent update-vs-delete prefers the update.
            (true, false) => ItemMerge::winner(l),
            (false, true) => ItemMerge::winner(r),
            (false, false) => ItemMerge {
                winner: merge_scalar(Some(l), Some(r), base),
                loser: None,
            },
            (true, true) => {
                let (winner, defeated) = if wins(l, r) { (l, r) } else { (r, l) };
                // Identical (updated_at, id) pairs are the same write seen
                // twice; only a genuinely distinct record is preserved.
                let loser =
                    if winner.updated_at == defeated.updated_at && winner.id == defeated.id {
                        None
                    } else {
                        Some(defeated.clone())
                    };
                ItemMerge {
                    winner: Some(winner.clone()),
                    loser,
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::{RecordId, ValueType, WallClock};

    fn record(id: &str, updated_at: u64, live: bool) -> Record {
        let mut r = Record::create(
            "k",
            ValueType::String,
            serde_json::Value::String("v".into()),
            WallClock(updated_at),
        );
        r.id = RecordId::new(id);
        r.created_at = WallClock(1);
        if !live {
            r.deleted_at = Some(WallClock(updated_at));
        }
        r
    }

    fn valued(id: &str, updated_at: u64, value: &str) -> Record {
        let mut r = record(id, updated_at, true);
        r.value = serde_json::Value::String(value.into());
        r
    }

    #[test]
    fn concurrent_newer_timestamp_wins() {
        let old = record("aaa", 100, true);
        let new = record("bbb", 200, true);
        let merged = merge_scalar(Some(&old), Some(&new), None).unwrap();
        assert_eq!(merged.id, new.id);
        // Symmetric.
        let merged = merge_scalar(Some(&new), Some(&old), None).unwrap();
        assert_eq!(merged.id, new.id);
    }

    #[test]
    fn concurrent_ties_break_on_id() {
        let a = record("aaa", 100, true);
        let b = record("bbb", 100, true);
        assert_eq!(merge_scalar(Some(&a), Some(&b), None).unwrap().id, b.id);
        assert_eq!(merge_scalar(Some(&b), Some(&a), None).unwrap().id, b.id);
    }

    #[test]
    fn one_side_absent_is_adopted() {
        let a = record("aaa", 100, true);
        assert_eq!(merge_scalar(Some(&a), None, None).unwrap().id, a.id);
        assert_eq!(merge_scalar(None, Some(&a), None).unwrap().id, a.id);
        assert!(merge_scalar(None, None, None).is_none());
    }

    #[test]
    fn unchanged_remote_loses_even_with_newer_stamp_elsewhere() {
        // Local moved on from the base; the remote still carries the base
        // copy and must lose without a fight.
        let base = valued("aaa", 100, "draft");
        let local = valued("aaa", 50, "edited");
        let merged = merge_scalar(Some(&local), Some(&base), Some(&base)).unwrap();
        assert_eq!(merged.value, local.value);
    }

    #[test]
    fn unchanged_local_adopts_remote() {
        let base = valued("aaa", 100, "draft");
        let remote = valued("aaa", 200, "theirs");
        let merged = merge_scalar(Some(&base), Some(&remote), Some(&base)).unwrap();
        assert_eq!(merged.value, remote.value);
    }

    #[test]
    fn concurrent_newer_tombstone_beats_live_scalar() {
        let base = valued("aaa", 100, "draft");
        let live = valued("aaa", 200, "update");
        let mut tomb = base.clone();
        tomb.delete(WallClock(300));
        let merged = merge_scalar(Some(&live), Some(&tomb), Some(&base)).unwrap();
        assert!(!merged.is_live());
    }

    #[test]
    fn merge_is_idempotent() {
        let a = record("aaa", 100, true);
        let b = record("bbb", 200, false);
        let once = merge_scalar(Some(&a), Some(&b), None).unwrap();
        let twice = merge_scalar(Some(&once), Some(&b), None).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn concurrent_live_item_beats_newer_tombstone() {
        let base = valued("aaa", 1_000, "draft");
        let mut live = base.clone();
        live.update(
            ValueType::String,
            serde_json::Value::String("update".into()),
            WallClock(2_000),
        );
        let mut tomb = base.clone();
        tomb.delete(WallClock(3_000));

        let merged = merge_list_item(Some(&live), Some(&tomb), Some(&base));
        assert!(merged.winner.unwrap().is_live());
        assert!(merged.loser.is_none());

        // Symmetric: the delete on the local side loses the same way.
        let merged = merge_list_item(Some(&tomb), Some(&live), Some(&base));
        assert!(merged.winner.unwrap().is_live());
        assert!(merged.loser.is_none());
    }

    #[test]
    fn stale_remote_item_does_not_resurrect_a_local_delete() {
        let base = valued("aaa", 1_000, "draft");
        let mut tomb = base.clone();
        tomb.delete(WallClock(3_000));

        let merged = merge_list_item(Some(&tomb), Some(&base), Some(&base));
        assert!(!merged.winner.unwrap().is_live());
        assert!(merged.loser.is_none());
    }

    #[test]
    fn concurrent_live_items_surface_the_loser() {
        let base = valued("aaa", 1_000, "draft");
        let mut ours = base.clone();
        ours.update(
            ValueType::String,
            serde_json::Value::String("ours".into()),
            WallClock(2_000),
        );
        let mut theirs = base.clone();
        theirs.update(
            ValueType::String,
            serde_json::Value::String("theirs".into()),
            WallClock(2_500),
        );

        let merged = merge_list_item(Some(&ours), Some(&theirs), Some(&base));
        assert_eq!(merged.winner.as_ref().unwrap().value, theirs.value);
        assert_eq!(merged.loser.unwrap().value, ours.value);
    }

    #[test]
    fn stale_remote_copy_is_not_a_loser() {
        // The remote still holds the base copy of an item we edited:
        // adopting our edit must not re-add the old value as a conflict.
        let base = valued("aaa", 1_000, "draft");
        let mut ours = base.clone();
        ours.update(
            ValueType::String,
            serde_json::Value::String("ours".into()),
            WallClock(2_000),
        );

        let merged = merge_list_item(Some(&ours), Some(&base), Some(&base));
        assert_eq!(merged.winner.unwrap().value, ours.value);
        assert!(merged.loser.is_none());
    }

    #[test]
    fn identical_stamp_and_id_produces_no_loser() {
        let a = record("aaa", 2_000, true);
        let b = record("aaa", 2_000, true);
        let merged = merge_list_item(Some(&a), Some(&b), None);
        assert!(merged.winner.is_some());
        assert!(merged.loser.is_none());
    }

    #[test]
    fn independently_created_twins_with_distinct_ids_conflict() {
        // No base: both replicas minted the same logical item themselves.
        let a = valued("aaa", 2_000, "same");
        let b = valued("bbb", 2_000, "same");
        let merged = merge_list_item(Some(&a), Some(&b), None);
        assert_eq!(merged.winner.unwrap().id, b.id);
        // Content equality is not checked; the defeated twin survives as
        // a loser.
        assert_eq!(merged.loser.unwrap().id, a.id);
    }

    #[test]
    fn both_tombstoned_resolves_by_lww_without_loser() {
        let a = record("aaa", 2_000, false);
        let b = record("bbb", 1_000, false);
        let merged = merge_list_item(Some(&a), Some(&b), None);
        assert_eq!(merged.winner.unwrap().id, a.id);
        assert!(merged.loser.is_none());
    }
}
