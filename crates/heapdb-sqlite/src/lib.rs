//! SQLite projection of a heap snapshot.
//!
//! This crate owns the canonical snapshot tables (`Types`, `Objects`,
//! `ObjectReferences`, `Roots`, `BlockingObjects`), the literal encodings of
//! values SQLite has no type for, and the single-transaction writer that
//! fills them.
//!
//! Graph edges stay normalized as rows in `ObjectReferences` by default; the
//! packed text column exists only for consumers that cannot join.

pub mod encode;
mod error;
pub mod schema;
mod store;

pub use error::StoreError;
pub use schema::{ReferenceEncoding, Table};
pub use store::{RowCounts, SnapshotStore, SnapshotWriter, UNRESOLVED_TYPE_NAME};
