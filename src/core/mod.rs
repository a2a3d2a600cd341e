//! Core domain types.
//!
//! Module order follows type dependency:
//! - time: wall-clock milliseconds
//! - record: Record, RecordId, ValueType, ConflictLoser
//! - value: the public value union and codec
//! - keys: bucket placement and list key encoding
//! - pattern: key globs for enumeration

pub mod error;
pub mod keys;
pub mod pattern;
pub mod record;
pub mod time;
pub mod value;

pub use error::CoreError;
pub use pattern::KeyPattern;
pub use record::{ConflictLoser, Record, RecordId, ValueType};
pub use time::WallClock;
pub use value::Value;
