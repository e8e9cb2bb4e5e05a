use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use heapdb_sqlite::{RowCounts, SnapshotStore, SnapshotWriter, StoreError};
use heapdb_types::{BlockingReason, HeapObject, ObjectAddress, RootKind};
use tracing::{debug, error, info, warn};

use crate::aggregate::TypeAggregator;
use crate::config::CaptureConfig;
use crate::source::{ExportError, HeapSource, load_export};

/// Data passes, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Objects,
    Types,
    Roots,
    BlockingObjects,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Objects => "objects",
            Self::Types => "types",
            Self::Roots => "roots",
            Self::BlockingObjects => "blocking_objects",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    HeapLoaded,
    HeapValidated,
    SchemaReady,
    Loading(Pass),
    Committed,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::HeapLoaded => f.write_str("heap_loaded"),
            Self::HeapValidated => f.write_str("heap_validated"),
            Self::SchemaReady => f.write_str("schema_ready"),
            Self::Loading(pass) => write!(f, "loading_{pass}"),
            Self::Committed => f.write_str("committed"),
            Self::Done => f.write_str("done"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// What a successful capture wrote and what it had to leave out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub rows: RowCounts,
    /// Objects whose type could not be resolved; not written, not counted.
    pub skipped_objects: u64,
    pub unrecognized_root_kinds: u64,
    pub unrecognized_blocking_reasons: u64,
    /// Types observed on objects but missing from the type enumeration.
    pub unresolved_types: u64,
    /// Repeated entries in the type enumeration.
    pub duplicate_types: u64,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum CaptureError {
    Export(ExportError),
    HeapNotWalkable,
    Store(StoreError),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Export(error) => write!(f, "{error}"),
            Self::HeapNotWalkable => {
                f.write_str("heap cannot be walked (dump taken while the collector was running?)")
            }
            Self::Store(error) => write!(f, "{error}"),
        }
    }
}

impl Error for CaptureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Export(error) => Some(error),
            Self::HeapNotWalkable => None,
            Self::Store(error) => Some(error),
        }
    }
}

impl From<StoreError> for CaptureError {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

impl From<ExportError> for CaptureError {
    fn from(error: ExportError) -> Self {
        Self::Export(error)
    }
}

struct Run {
    phase: Phase,
    summary: CaptureSummary,
}

impl Run {
    fn enter(&mut self, phase: Phase) {
        debug!(from = %self.phase, to = %phase, "capture phase");
        self.phase = phase;
    }

    fn fail<E: fmt::Display>(&mut self, error: &E) {
        error!(phase = %self.phase, %error, "capture failed");
        self.enter(Phase::Failed);
    }
}

/// Writes one snapshot of `source` to `output`, replacing any file already there.
///
/// All tables and rows go through a single transaction: on error the file is
/// left without any tables. A heap that cannot be walked removes any previous
/// snapshot at `output` and writes nothing.
pub fn capture<S: HeapSource>(
    source: &S,
    output: &Path,
    config: &CaptureConfig,
) -> Result<CaptureSummary, CaptureError> {
    let started = Instant::now();
    let mut run = Run {
        phase: Phase::Idle,
        summary: CaptureSummary::default(),
    };
    run.enter(Phase::HeapLoaded);

    if !source.can_walk() {
        let error = CaptureError::HeapNotWalkable;
        run.fail(&error);
        discard_previous(output);
        return Err(error);
    }
    run.enter(Phase::HeapValidated);

    let mut store = SnapshotStore::open(output).inspect_err(|error| run.fail(error))?;
    info!(path = %store.path().display(), encoding = %config.encoding, "writing snapshot");
    let mut writer = store
        .begin(config.encoding)
        .inspect_err(|error| run.fail(error))?;

    if let Err(error) = load(source, &mut writer, config, &mut run) {
        run.fail(&error);
        match writer.rollback() {
            Ok(()) => info!("snapshot transaction rolled back"),
            Err(rollback) => error!(error = %rollback, "rollback failed"),
        }
        return Err(error.into());
    }

    let rows = writer.commit().inspect_err(|error| run.fail(error))?;
    run.enter(Phase::Committed);

    if let Err(error) = store.close() {
        warn!(%error, "snapshot committed but closing the database failed");
    }
    run.enter(Phase::Done);

    run.summary.rows = rows;
    run.summary.elapsed = started.elapsed();
    info!(
        types = rows.types,
        objects = rows.objects,
        references = rows.references,
        roots = rows.roots,
        blocking_objects = rows.blocking_objects,
        skipped_objects = run.summary.skipped_objects,
        elapsed_ms = run.summary.elapsed.as_millis() as u64,
        "snapshot committed"
    );
    Ok(run.summary)
}

/// Decodes runtime `runtime` of the heap export at `input` and captures it.
///
/// An export that cannot be read or decoded removes any previous snapshot at
/// `output`, like every other failure.
pub fn capture_export(
    input: &Path,
    runtime: usize,
    output: &Path,
    config: &CaptureConfig,
) -> Result<CaptureSummary, CaptureError> {
    let heap = load_export(input, runtime).inspect_err(|error| {
        error!(%error, "heap export rejected");
        discard_previous(output);
    })?;
    capture(&heap, output, config)
}

// A snapshot from an earlier run must not pass for this one.
fn discard_previous(output: &Path) {
    if let Err(error) = SnapshotStore::discard(output) {
        warn!(%error, "could not remove previous snapshot");
    }
}

fn load<S: HeapSource>(
    source: &S,
    writer: &mut SnapshotWriter<'_>,
    config: &CaptureConfig,
    run: &mut Run,
) -> Result<(), StoreError> {
    writer.create_schema()?;
    run.enter(Phase::SchemaReady);
    writer.begin_bulk_load()?;

    run.enter(Phase::Loading(Pass::Objects));
    let mut aggregator = TypeAggregator::new();
    load_objects(source, writer, config, &mut aggregator, &mut run.summary)?;
    info!(
        objects = aggregator.total_objects(),
        types = aggregator.distinct_types(),
        skipped = run.summary.skipped_objects,
        "object pass done"
    );

    run.enter(Phase::Loading(Pass::Types));
    load_types(source, writer, aggregator, &mut run.summary)?;

    run.enter(Phase::Loading(Pass::Roots));
    for root in source.roots() {
        if root.kind == RootKind::Unrecognized {
            run.summary.unrecognized_root_kinds += 1;
        }
        writer.insert_root(&root)?;
    }
    info!(roots = writer.counts().roots, "root pass done");

    run.enter(Phase::Loading(Pass::BlockingObjects));
    for blocking in source.blocking_objects() {
        if blocking.reason == BlockingReason::Unrecognized {
            run.summary.unrecognized_blocking_reasons += 1;
        }
        writer.insert_blocking_object(&blocking)?;
    }
    info!(
        blocking_objects = writer.counts().blocking_objects,
        "blocking object pass done"
    );

    if config.index_references {
        writer.create_indexes()?;
        info!("secondary indexes built");
    }
    Ok(())
}

fn load_objects<S: HeapSource>(
    source: &S,
    writer: &mut SnapshotWriter<'_>,
    config: &CaptureConfig,
    aggregator: &mut TypeAggregator,
    summary: &mut CaptureSummary,
) -> Result<(), StoreError> {
    let mut references: Vec<ObjectAddress> = Vec::new();
    let mut enumerated = 0u64;
    for address in source.objects() {
        enumerated += 1;
        if progress_due(enumerated, config.progress_every) {
            info!(objects = enumerated, "object pass progress");
        }

        let Some(type_index) = source.type_of(address) else {
            debug!(%address, "skipping object with unresolvable type");
            summary.skipped_objects += 1;
            continue;
        };
        let object = HeapObject {
            address,
            type_index,
            size: source.object_size(address, type_index),
        };

        references.clear();
        source.visit_references(
            address,
            &mut |owner: ObjectAddress, target: ObjectAddress| {
                debug_assert_eq!(owner, address);
                references.push(target);
            },
        );

        writer.insert_object(&object, &references)?;
        aggregator.observe(type_index);
    }
    Ok(())
}

/// `every == 0` turns progress lines off.
fn progress_due(enumerated: u64, every: u64) -> bool {
    every > 0 && enumerated % every == 0
}

fn load_types<S: HeapSource>(
    source: &S,
    writer: &mut SnapshotWriter<'_>,
    mut aggregator: TypeAggregator,
    summary: &mut CaptureSummary,
) -> Result<(), StoreError> {
    let mut written = HashSet::new();
    for ty in source.types() {
        if !written.insert(ty.index) {
            warn!(
                type_index = %ty.index,
                name = %ty.name,
                "type enumerated twice; keeping the first"
            );
            summary.duplicate_types += 1;
            continue;
        }
        let count = aggregator.take(ty.index);
        writer.insert_type(&ty, count)?;
    }

    for (type_index, count) in aggregator.drain_remaining() {
        warn!(%type_index, count, "objects reference a type the enumeration never listed");
        writer.insert_unresolved_type(type_index, count)?;
        summary.unresolved_types += 1;
    }
    info!(types = writer.counts().types, "type pass done");
    Ok(())
}
