//! Capture a frozen managed heap into a normalized SQLite snapshot.
//!
//! A capture walks a [`source::HeapSource`] once per table, aggregating
//! per-type instance counts on the way, and writes everything through a
//! single transaction. Either the whole snapshot commits or the file is left
//! without tables.
//!
//! ```no_run
//! use std::path::Path;
//!
//! let config = heapdb::CaptureConfig::default();
//! let summary =
//!     heapdb::capture_export(Path::new("w3wp.json"), 0, Path::new("w3wp.sqlite"), &config)?;
//! println!("{} objects", summary.rows.objects);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod aggregate;
mod capture;
mod config;
pub mod source;

pub use capture::{CaptureError, CaptureSummary, capture, capture_export};
pub use config::{CaptureConfig, DEFAULT_PROGRESS_EVERY, default_output_path};
pub use heapdb_sqlite::{ReferenceEncoding, RowCounts, StoreError};

#[cfg(test)]
mod tests;
