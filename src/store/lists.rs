//! Redis-like list operations.
//!
//! A list named `L` is a live meta record at `list:L` (type `list`, payload
//! `{"order": [...]}`), plus one item record per element at
//! `list:L:item:<uuid>`. Reads walk the order array and skip tombstoned or
//! missing items; stale ids stay in the order until the sync normalizer
//! prunes them.

use uuid::Uuid;

use crate::core::keys::{list_item_key, list_meta_key};
use crate::core::{CoreError, Record, RecordId, Value, ValueType, WallClock};
use crate::merge::normalize::{order_of, set_order};
use crate::Result;

use super::bucket::BucketTxn;
use super::Store;

/// A list loaded through a transaction: meta plus live items in order.
struct ListView {
    meta: Record,
    order: Vec<String>,
    /// `(item_id, record)` for every live item, in order.
    items: Vec<(String, Record)>,
}

fn load_list(txn: &mut BucketTxn<'_>, list: &str) -> Result<Option<ListView>> {
    let Some(meta) = txn.record(&list_meta_key(list)).filter(Record::is_live) else {
        return Ok(None);
    };
    if meta.value_type != ValueType::List {
        return Err(CoreError::WrongType.into());
    }
    let order = order_of(&meta);
    let mut items = Vec::with_capacity(order.len());
    for item_id in &order {
        if let Some(record) = txn.record(&list_item_key(list, item_id)) {
            if record.is_live() {
                items.push((item_id.clone(), record));
            }
        }
    }
    Ok(Some(ListView { meta, order, items }))
}

/// Resolve a possibly-negative index against `len`. Negative indices count
/// from the end.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    if resolved < 0 || resolved >= len {
        None
    } else {
        Some(resolved as usize)
    }
}

fn decode(record: &Record) -> Value {
    Value::decode(record.value_type, &record.value)
}

impl Store {
    fn push(&self, list: &str, values: Vec<Value>, front: bool) -> Result<usize> {
        let length = {
            let _guard = self.inner.lock_ops();
            let now = WallClock::now();
            let mut txn = BucketTxn::new(&self.inner.buckets);

            let mut meta = match txn.record(&list_meta_key(list)) {
                Some(record) if record.is_live() => {
                    if record.value_type != ValueType::List {
                        return Err(CoreError::WrongType.into());
                    }
                    record
                }
                Some(mut tombstone) => {
                    // Revived list starts empty; the old items stay dead.
                    tombstone.update(ValueType::List, serde_json::json!({ "order": [] }), now);
                    tombstone
                }
                None => Record::create(
                    list_meta_key(list),
                    ValueType::List,
                    serde_json::json!({ "order": [] }),
                    now,
                ),
            };

            let mut order = order_of(&meta);
            for value in &values {
                let item_id = Uuid::new_v4().to_string();
                let mut record = Record::create(
                    list_item_key(list, &item_id),
                    value.infer_type(),
                    value.encode(),
                    now,
                );
                record.id = RecordId::new(item_id.clone());
                txn.put(record);
                if front {
                    order.insert(0, item_id);
                } else {
                    order.push(item_id);
                }
            }

            let length = order
                .iter()
                .filter(|id| {
                    txn.record(&list_item_key(list, id))
                        .map(|r| r.is_live())
                        .unwrap_or(false)
                })
                .count();

            set_order(&mut meta, order);
            meta.updated_at = now;
            txn.put(meta);
            txn.commit()?;
            length
        };
        self.inner
            .after_mutation(if front { "lpush" } else { "rpush" });
        Ok(length)
    }

    fn pop(&self, list: &str, count: usize, front: bool) -> Result<Vec<Value>> {
        let popped = {
            let _guard = self.inner.lock_ops();
            let now = WallClock::now();
            let mut txn = BucketTxn::new(&self.inner.buckets);
            let Some(view) = load_list(&mut txn, list)? else {
                return Ok(Vec::new());
            };
            let ListView {
                mut meta,
                mut order,
                items,
            } = view;

            let mut popped = Vec::new();
            let mut live: Vec<&(String, Record)> = items.iter().collect();
            while popped.len() < count {
                let next = if front { 0 } else { live.len().wrapping_sub(1) };
                let Some((item_id, record)) = live.get(next).copied() else {
                    break;
                };
                popped.push(decode(record));
                txn.modify(&list_item_key(list, item_id), |r| r.delete(now));
                order.retain(|id| id != item_id);
                if front {
                    live.remove(0);
                } else {
                    live.pop();
                }
            }

            if popped.is_empty() {
                return Ok(popped);
            }
            set_order(&mut meta, order);
            meta.updated_at = now;
            txn.put(meta);
            txn.commit()?;
            popped
        };
        self.inner
            .after_mutation(if front { "lpop" } else { "rpop" });
        Ok(popped)
    }

    /// Prepend values; each successive value lands at the head, so the
    /// last pushed value is first (Redis semantics).
    pub fn lpush<V: Into<Value>>(&self, list: &str, values: Vec<V>) -> Result<usize> {
        self.push(list, values.into_iter().map(Into::into).collect(), true)
    }

    /// Append values in order.
    pub fn rpush<V: Into<Value>>(&self, list: &str, values: Vec<V>) -> Result<usize> {
        self.push(list, values.into_iter().map(Into::into).collect(), false)
    }

    /// Pop one element from the head. `None` on an empty or missing list.
    pub fn lpop(&self, list: &str) -> Result<Option<Value>> {
        Ok(self.pop(list, 1, true)?.into_iter().next())
    }

    /// Pop up to `count` elements from the head; possibly empty.
    pub fn lpop_n(&self, list: &str, count: usize) -> Result<Vec<Value>> {
        self.pop(list, count, true)
    }

    /// Pop one element from the tail.
    pub fn rpop(&self, list: &str) -> Result<Option<Value>> {
        Ok(self.pop(list, 1, false)?.into_iter().next())
    }

    /// Pop up to `count` elements from the tail, tail first.
    pub fn rpop_n(&self, list: &str, count: usize) -> Result<Vec<Value>> {
        self.pop(list, count, false)
    }

    /// Number of live elements.
    pub fn llen(&self, list: &str) -> Result<usize> {
        let _guard = self.inner.lock_ops();
        let mut txn = BucketTxn::new(&self.inner.buckets);
        Ok(load_list(&mut txn, list)?
            .map(|view| view.items.len())
            .unwrap_or(0))
    }

    /// Inclusive range with Redis index rules: negative indices count from
    /// the end, out-of-bound edges clamp, inverted ranges are empty.
    pub fn lrange(&self, list: &str, start: i64, stop: i64) -> Result<Vec<Value>> {
        let _guard = self.inner.lock_ops();
        let mut txn = BucketTxn::new(&self.inner.buckets);
        let Some(view) = load_list(&mut txn, list)? else {
            return Ok(Vec::new());
        };
        let len = view.items.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = (if start < 0 { len + start } else { start }).max(0);
        let stop = (if stop < 0 { len + stop } else { stop }).min(len - 1);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(view.items[start as usize..=stop as usize]
            .iter()
            .map(|(_, record)| decode(record))
            .collect())
    }

    pub fn lindex(&self, list: &str, index: i64) -> Result<Option<Value>> {
        let _guard = self.inner.lock_ops();
        let mut txn = BucketTxn::new(&self.inner.buckets);
        let Some(view) = load_list(&mut txn, list)? else {
            return Ok(None);
        };
        Ok(resolve_index(index, view.items.len())
            .map(|at| decode(&view.items[at].1)))
    }

    /// Replace the element at `index`, preserving its item id and creation
    /// time. Fails on a missing list or an out-of-range index.
    pub fn lset(&self, list: &str, index: i64, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        {
            let _guard = self.inner.lock_ops();
            let now = WallClock::now();
            let mut txn = BucketTxn::new(&self.inner.buckets);
            let Some(view) = load_list(&mut txn, list)? else {
                return Err(CoreError::IndexOutOfRange.into());
            };
            let Some(at) = resolve_index(index, view.items.len()) else {
                return Err(CoreError::IndexOutOfRange.into());
            };
            let (item_id, _) = &view.items[at];
            txn.modify(&list_item_key(list, item_id), |record| {
                record.update(value.infer_type(), value.encode(), now);
            });
            txn.commit()?;
        }
        self.inner.after_mutation("lset");
        Ok(())
    }

    /// Ordered live payloads; debug view used to inspect conflict losers.
    pub fn litems(&self, list: &str) -> Result<Vec<Value>> {
        let _guard = self.inner.lock_ops();
        let mut txn = BucketTxn::new(&self.inner.buckets);
        Ok(load_list(&mut txn, list)?
            .map(|view| view.items.iter().map(|(_, r)| decode(r)).collect())
            .unwrap_or_default())
    }

    /// Ordered live item records, conflict markers included.
    pub fn litem_records(&self, list: &str) -> Result<Vec<Record>> {
        let _guard = self.inner.lock_ops();
        let mut txn = BucketTxn::new(&self.inner.buckets);
        Ok(load_list(&mut txn, list)?
            .map(|view| view.items.into_iter().map(|(_, r)| r).collect())
            .unwrap_or_default())
    }

    /// The raw meta record, if the list exists.
    pub fn lmeta(&self, list: &str) -> Option<Record> {
        let _guard = self.inner.lock_ops();
        let mut txn = BucketTxn::new(&self.inner.buckets);
        txn.record(&list_meta_key(list)).filter(Record::is_live)
    }
}
