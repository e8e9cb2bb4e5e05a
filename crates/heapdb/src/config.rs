use std::path::{Path, PathBuf};

use heapdb_sqlite::ReferenceEncoding;

pub const DEFAULT_PROGRESS_EVERY: u64 = 1_000_000;

/// Knobs for one capture run.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub encoding: ReferenceEncoding,
    /// Log a progress line every this many objects. 0 disables progress lines.
    pub progress_every: u64,
    /// Build the secondary indexes before commit.
    pub index_references: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            encoding: ReferenceEncoding::default(),
            progress_every: DEFAULT_PROGRESS_EVERY,
            index_references: true,
        }
    }
}

/// `heap.json` → `heap.sqlite`, next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("sqlite")
}
