//! List normalization after a merge round.
//!
//! Phase A re-adds merge losers as fresh items tagged with their winner.
//! Phase B reconciles every list's `order` array against the surviving item
//! records. Both phases share one insertion routine so that replicas healing
//! the same record set land on identical orders: losers are walked in
//! descending `(updated_at, id)` and each is inserted immediately after its
//! winner (or appended when the winner is gone), which leaves losers sharing
//! a winner in ascending order.

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use uuid::Uuid;

use crate::core::keys::{bucket_of, list_item_key, list_meta_key, parse_list_item, LIST_PREFIX};
use crate::core::{ConflictLoser, Record, RecordId, ValueType};
use crate::store::bucket::BucketStore;

/// A record defeated in a list-item merge, waiting to be re-added.
#[derive(Clone, Debug)]
pub struct PendingLoser {
    pub list: String,
    /// Item id of the record that kept the original slot.
    pub winner_item_id: String,
    pub record: Record,
}

/// Item ids referenced by a meta record's `order` array.
pub fn order_of(meta: &Record) -> Vec<String> {
    meta.value
        .get("order")
        .and_then(|v| v.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Rewrite the `order` array in a meta record's payload. Timestamps are
/// left alone: normalization is derived state, not a write that should win
/// merges.
pub fn set_order(meta: &mut Record, order: Vec<String>) {
    let ids = order.into_iter().map(serde_json::Value::String).collect();
    match &mut meta.value {
        serde_json::Value::Object(map) => {
            map.insert("order".to_string(), serde_json::Value::Array(ids));
        }
        other => {
            *other = serde_json::json!({ "order": serde_json::Value::Array(ids) });
        }
    }
}

fn insert_after_winner(order: &mut Vec<String>, item_id: &str, winner_id: &str) {
    match order.iter().position(|id| id == winner_id) {
        Some(pos) => order.insert(pos + 1, item_id.to_string()),
        None => order.push(item_id.to_string()),
    }
}

/// Phase A: re-add every pending loser under a fresh item id, tag it with
/// the winner, and splice it into the list order right after the winner.
pub fn apply_losers(buckets: &BucketStore, mut losers: Vec<PendingLoser>) -> io::Result<()> {
    if losers.is_empty() {
        return Ok(());
    }
    losers.sort_by(|a, b| {
        (b.record.updated_at, &b.record.id).cmp(&(a.record.updated_at, &a.record.id))
    });

    for loser in losers {
        let new_id = Uuid::new_v4().to_string();
        let new_key = list_item_key(&loser.list, &new_id);

        let mut record = loser.record;
        record.id = RecordId::new(new_id.clone());
        record.key = new_key.clone();
        record.conflict_loser = Some(ConflictLoser {
            winner_id: loser.winner_item_id.clone(),
        });
        // Object payloads also carry the marker inline so consumers that
        // only read values still see it.
        if record.value_type == ValueType::Object {
            if let serde_json::Value::Object(map) = &mut record.value {
                map.insert("__conflictLoser".to_string(), serde_json::Value::Bool(true));
            }
        }

        let item_bucket = bucket_of(&new_key);
        let mut records = buckets.read(&item_bucket);
        records.insert(new_key, record);
        buckets.write(&item_bucket, &records)?;

        let meta_key = list_meta_key(&loser.list);
        let meta_bucket = bucket_of(&meta_key);
        let mut records = buckets.read(&meta_bucket);
        let mut changed = false;
        if let Some(meta) = records.get_mut(&meta_key) {
            if meta.is_live() && meta.value_type == ValueType::List {
                let mut order = order_of(meta);
                insert_after_winner(&mut order, &new_id, &loser.winner_item_id);
                set_order(meta, order);
                changed = true;
            }
        }
        if changed {
            buckets.write(&meta_bucket, &records)?;
        }
    }
    Ok(())
}

/// Phase B core: recompute a list's order from its surviving records.
///
/// Dead ids are pruned and live items missing from the order are
/// re-inserted. Ordinary items keep their incoming relative order;
/// conflict losers always float — their position is derived from
/// `(winner, updated_at, id)` even when the incoming order already placed
/// them. Replicas whose merges picked the same meta winner therefore
/// compute identical orders no matter which of them originally spliced a
/// loser in.
pub fn reconcile_order(order: &[String], items: &BTreeMap<String, Record>) -> Vec<String> {
    let live = |id: &str| items.get(id).map(Record::is_live).unwrap_or(false);
    let is_loser = |id: &str| {
        items
            .get(id)
            .map(|record| record.conflict_loser.is_some())
            .unwrap_or(false)
    };

    let mut reconciled: Vec<String> = order
        .iter()
        .filter(|id| live(id) && !is_loser(id))
        .cloned()
        .collect();

    let present: BTreeSet<&str> = reconciled.iter().map(String::as_str).collect();
    let mut losers: Vec<(&str, &Record)> = Vec::new();
    let mut others: Vec<(&str, &Record)> = Vec::new();
    for (item_id, record) in items {
        if !record.is_live() {
            continue;
        }
        if record.conflict_loser.is_some() {
            losers.push((item_id, record));
        } else if !present.contains(item_id.as_str()) {
            others.push((item_id, record));
        }
    }
    losers.sort_by_key(|(id, record)| (record.updated_at, *id));
    others.sort_by_key(|(id, record)| (record.updated_at, *id));

    for (item_id, _) in &others {
        reconciled.push(item_id.to_string());
    }
    for (item_id, record) in losers.iter().rev() {
        let winner_id = record
            .conflict_loser
            .as_ref()
            .map(|marker| marker.winner_id.as_str())
            .unwrap_or_default();
        insert_after_winner(&mut reconciled, item_id, winner_id);
    }
    reconciled
}

/// Phase B: reconcile every live list meta on disk, rewriting the shards
/// whose order changed.
pub fn normalize_lists(buckets: &BucketStore) -> io::Result<()> {
    let mut shards: BTreeMap<String, BTreeMap<String, Record>> = BTreeMap::new();
    for bucket in buckets.list_buckets() {
        let records = buckets.read(&bucket);
        if !records.is_empty() {
            shards.insert(bucket, records);
        }
    }

    let mut items_by_list: BTreeMap<String, BTreeMap<String, Record>> = BTreeMap::new();
    for records in shards.values() {
        for (key, record) in records {
            if let Some(item) = parse_list_item(key) {
                items_by_list
                    .entry(item.list.to_string())
                    .or_default()
                    .insert(item.item_id.to_string(), record.clone());
            }
        }
    }

    let empty = BTreeMap::new();
    let mut dirty: BTreeSet<String> = BTreeSet::new();
    for (bucket, records) in &mut shards {
        for (key, record) in records.iter_mut() {
            if record.value_type != ValueType::List || !record.is_live() {
                continue;
            }
            if parse_list_item(key).is_some() {
                continue;
            }
            let Some(list) = key.strip_prefix(LIST_PREFIX) else {
                continue;
            };
            let items = items_by_list.get(list).unwrap_or(&empty);
            let order = order_of(record);
            let reconciled = reconcile_order(&order, items);
            if reconciled != order {
                set_order(record, reconciled);
                dirty.insert(bucket.clone());
            }
        }
    }

    for bucket in dirty {
        buckets.write(&bucket, &shards[&bucket])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::WallClock;

    fn item(id: &str, updated_at: u64, live: bool, winner: Option<&str>) -> Record {
        let mut record = Record::create(
            list_item_key("todos", id),
            ValueType::Object,
            serde_json::json!({"n": updated_at}),
            WallClock(updated_at),
        );
        record.id = RecordId::new(id);
        if !live {
            record.deleted_at = Some(WallClock(updated_at));
        }
        record.conflict_loser = winner.map(|w| ConflictLoser {
            winner_id: w.to_string(),
        });
        record
    }

    const A: &str = "00000000-0000-4000-8000-00000000000a";
    const B: &str = "00000000-0000-4000-8000-00000000000b";
    const C: &str = "00000000-0000-4000-8000-00000000000c";
    const D: &str = "00000000-0000-4000-8000-00000000000d";

    #[test]
    fn dead_ids_are_pruned() {
        let mut items = BTreeMap::new();
        items.insert(A.to_string(), item(A, 10, true, None));
        items.insert(B.to_string(), item(B, 20, false, None));

        let order = vec![A.to_string(), B.to_string()];
        assert_eq!(reconcile_order(&order, &items), vec![A.to_string()]);
    }

    #[test]
    fn missing_live_items_are_appended_in_stamp_order() {
        let mut items = BTreeMap::new();
        items.insert(A.to_string(), item(A, 10, true, None));
        items.insert(B.to_string(), item(B, 30, true, None));
        items.insert(C.to_string(), item(C, 20, true, None));

        let order = vec![A.to_string()];
        assert_eq!(
            reconcile_order(&order, &items),
            vec![A.to_string(), C.to_string(), B.to_string()]
        );
    }

    #[test]
    fn losers_land_after_their_winner_ascending() {
        let mut items = BTreeMap::new();
        items.insert(A.to_string(), item(A, 10, true, None));
        items.insert(B.to_string(), item(B, 40, true, None));
        items.insert(C.to_string(), item(C, 30, true, Some(A)));
        items.insert(D.to_string(), item(D, 20, true, Some(A)));

        let order = vec![A.to_string(), B.to_string()];
        assert_eq!(
            reconcile_order(&order, &items),
            vec![A.to_string(), D.to_string(), C.to_string(), B.to_string()]
        );
    }

    #[test]
    fn loser_with_gone_winner_is_appended() {
        let mut items = BTreeMap::new();
        items.insert(A.to_string(), item(A, 10, true, None));
        items.insert(C.to_string(), item(C, 30, true, Some(B)));

        let order = vec![A.to_string()];
        assert_eq!(
            reconcile_order(&order, &items),
            vec![A.to_string(), C.to_string()]
        );
    }

    #[test]
    fn reconcile_is_stable_on_already_normalized_input() {
        let mut items = BTreeMap::new();
        items.insert(A.to_string(), item(A, 10, true, None));
        items.insert(C.to_string(), item(C, 30, true, Some(A)));

        let order = vec![A.to_string(), C.to_string()];
        let once = reconcile_order(&order, &items);
        assert_eq!(once, order);
        assert_eq!(reconcile_order(&once, &items), once);
    }

    #[test]
    fn replicas_with_different_loser_placement_converge() {
        let mut items = BTreeMap::new();
        items.insert(A.to_string(), item(A, 10, true, None));
        items.insert(C.to_string(), item(C, 30, true, Some(A)));
        items.insert(D.to_string(), item(D, 20, true, Some(A)));

        // One replica already spliced both losers in, the other spliced
        // only one, a third none at all. Same records, same result.
        let placed = vec![A.to_string(), D.to_string(), C.to_string()];
        let partial = vec![A.to_string(), C.to_string()];
        let bare = vec![A.to_string()];

        let expected = vec![A.to_string(), D.to_string(), C.to_string()];
        assert_eq!(reconcile_order(&placed, &items), expected);
        assert_eq!(reconcile_order(&partial, &items), expected);
        assert_eq!(reconcile_order(&bare, &items), expected);
    }

    #[test]
    fn apply_losers_rewrites_key_and_tags_value() {
        let dir = tempfile::tempdir().unwrap();
        let buckets = BucketStore::new(dir.path());

        // Seed a live meta with the winner in order.
        let meta_key = list_meta_key("todos");
        let mut meta = Record::create(
            &meta_key,
            ValueType::List,
            serde_json::json!({"order": [A]}),
            WallClock(5),
        );
        meta.id = RecordId::new("meta");
        let mut records = BTreeMap::new();
        records.insert(meta_key.clone(), meta);
        buckets.write(&bucket_of(&meta_key), &records).unwrap();

        let loser = PendingLoser {
            list: "todos".to_string(),
            winner_item_id: A.to_string(),
            record: item(B, 20, true, None),
        };
        apply_losers(&buckets, vec![loser]).unwrap();

        let meta = buckets
            .read(&bucket_of(&meta_key))
            .remove(&meta_key)
            .unwrap();
        let order = order_of(&meta);
        assert_eq!(order.len(), 2);
        assert_eq!(order[0], A);
        let new_id = &order[1];
        assert_ne!(new_id, B);

        let new_key = list_item_key("todos", new_id);
        let readded = buckets
            .read(&bucket_of(&new_key))
            .remove(&new_key)
            .unwrap();
        assert_eq!(readded.id.as_str(), new_id);
        assert_eq!(readded.conflict_loser.as_ref().unwrap().winner_id, A);
        assert_eq!(
            readded.value.get("__conflictLoser"),
            Some(&serde_json::Value::Bool(true))
        );
    }
}
