//! Key routing: bucket placement and list-internal key encoding.
//!
//! Bucket placement must agree byte-for-byte across every writer, so the
//! policy is fixed: first two hex digits of SHA-1 over the raw key.

use sha1::{Digest, Sha1};
use uuid::Uuid;

/// Prefix shared by list meta keys (`list:<name>`) and list item keys.
pub const LIST_PREFIX: &str = "list:";

/// Separator between a list name and an item id.
const ITEM_MARKER: &str = ":item:";

/// Shard id for a key: `sha1(key)[0..1]` as lowercase hex, 256 buckets.
pub fn bucket_of(key: &str) -> String {
    let digest = Sha1::digest(key.as_bytes());
    format!("{:02x}", digest[0])
}

/// Meta key for a list.
pub fn list_meta_key(list: &str) -> String {
    format!("{LIST_PREFIX}{list}")
}

/// Derived key for an item within a list.
pub fn list_item_key(list: &str, item_id: &str) -> String {
    format!("{LIST_PREFIX}{list}{ITEM_MARKER}{item_id}")
}

/// A key that parses as a list item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListItemKey<'a> {
    pub list: &'a str,
    pub item_id: &'a str,
}

/// Parse a list item key, or `None` if the key is an ordinary user key.
///
/// The split is on the *last* `:item:` occurrence so list names containing
/// colons (or even the marker itself) still resolve to the final segment,
/// and the tail must be a canonical hyphenated UUID. Anything else is not a
/// list item, no matter how it is spelled.
pub fn parse_list_item(key: &str) -> Option<ListItemKey<'_>> {
    let body = key.strip_prefix(LIST_PREFIX)?;
    let at = body.rfind(ITEM_MARKER)?;
    let list = &body[..at];
    let item_id = &body[at + ITEM_MARKER.len()..];
    if list.is_empty() || !is_item_id(item_id) {
        return None;
    }
    Some(ListItemKey { list, item_id })
}

/// Canonical hyphenated UUID check (36 chars; other UUID spellings are
/// rejected so parsing stays unambiguous).
pub fn is_item_id(s: &str) -> bool {
    s.len() == 36 && Uuid::try_parse(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "f81d4fae-7dec-41d0-a765-00a0c91e6bf6";

    #[test]
    fn bucket_of_known_digests() {
        // sha1("") = da39..., sha1("foo") = 0bee...
        assert_eq!(bucket_of(""), "da");
        assert_eq!(bucket_of("foo"), "0b");
        assert_eq!(bucket_of("foo").len(), 2);
    }

    #[test]
    fn bucket_placement_is_stable() {
        assert_eq!(bucket_of("some:key"), bucket_of("some:key"));
    }

    #[test]
    fn item_key_round_trip() {
        let key = list_item_key("todos", ID);
        let parsed = parse_list_item(&key).unwrap();
        assert_eq!(parsed.list, "todos");
        assert_eq!(parsed.item_id, ID);
    }

    #[test]
    fn list_names_with_colons_split_on_last_marker() {
        let key = list_item_key("a:b:item:c", ID);
        let parsed = parse_list_item(&key).unwrap();
        assert_eq!(parsed.list, "a:b:item:c");
        assert_eq!(parsed.item_id, ID);
    }

    #[test]
    fn non_uuid_tail_is_an_ordinary_key() {
        assert!(parse_list_item("list:todos:item:not-a-uuid").is_none());
        assert!(parse_list_item("list:todos").is_none());
        assert!(parse_list_item("plain-key").is_none());
        // Simple (unhyphenated) UUID spelling is rejected.
        let simple = ID.replace('-', "");
        assert!(parse_list_item(&list_item_key("todos", &simple)).is_none());
    }
}
