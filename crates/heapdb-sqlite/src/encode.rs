//! Literal column forms for values that have no direct SQLite type.

use std::fmt::Write as _;

use heapdb_types::{ABSENT_ID, BlockingReason, ObjectAddress, RootKind, ThreadId};

/// Thread-id list value meaning "no threads". Distinct from the empty string.
pub const NO_THREADS: &str = "-1";

/// Tag written for root kinds and blocking reasons outside the known set.
pub const UNKNOWN_TAG: &str = "Unknown";

/// Appends `targets` as comma-delimited decimal addresses, in visitation order.
/// Nothing is appended for an empty slice.
pub fn write_references(out: &mut String, targets: &[ObjectAddress]) {
    for (index, target) in targets.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        // Writing into a String cannot fail.
        let _ = write!(out, "{}", target.get());
    }
}

pub fn encode_references(targets: &[ObjectAddress]) -> String {
    let mut out = String::new();
    write_references(&mut out, targets);
    out
}

pub fn encode_thread_ids(ids: &[ThreadId]) -> String {
    if ids.is_empty() {
        return NO_THREADS.to_string();
    }
    let mut out = String::with_capacity(ids.len() * 4);
    for (index, id) in ids.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let _ = write!(out, "{id}");
    }
    out
}

pub fn encode_root_kind(kind: RootKind) -> &'static str {
    match kind.tag() {
        Some(tag) => tag,
        None => UNKNOWN_TAG,
    }
}

pub fn encode_blocking_reason(reason: BlockingReason) -> &'static str {
    match reason.tag() {
        Some(tag) => tag,
        None => UNKNOWN_TAG,
    }
}

/// `None` becomes the `-1` sentinel.
pub fn optional_id(value: Option<i64>) -> i64 {
    value.unwrap_or(ABSENT_ID)
}

pub fn flag(value: bool) -> i64 {
    i64::from(value)
}

/// Byte sizes never approach `i64::MAX`; saturate rather than wrap if one does.
pub fn size_to_sql(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}
