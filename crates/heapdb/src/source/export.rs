//! Heap-export documents: JSON written by an external dump decoder.
//!
//! ```json
//! { "runtimes": [ {
//!     "version": "8.0.4", "walkable": true,
//!     "types":   [ { "index": 1, "name": "Node", "base_size": 24 } ],
//!     "objects": [ { "address": 4096, "type_index": 1, "references": [4128] } ],
//!     "roots":   [ { "object": 4096, "address": 140737, "kind": "LocalVar", "thread": 1 } ],
//!     "blocking_objects": [ { "object": 4096, "taken": true, "owner": 1, "reason": "Monitor" } ]
//! } ] }
//! ```
//!
//! One run captures exactly one runtime.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use facet::Facet;
use heapdb_types::{
    BlockingObject, BlockingReason, DomainId, ObjectAddress, RootKind, RootReference, ThreadId,
    TypeDescriptor, TypeIndex,
};
use tracing::{debug, info, warn};

use super::MemoryHeap;

#[derive(Facet, Debug)]
struct ExportDocument {
    runtimes: Vec<ExportRuntime>,
}

#[derive(Facet, Debug)]
struct ExportRuntime {
    #[facet(default)]
    version: Option<String>,
    #[facet(default)]
    walkable: Option<bool>,
    #[facet(default)]
    types: Vec<ExportType>,
    #[facet(default)]
    objects: Vec<ExportObject>,
    #[facet(default)]
    roots: Vec<ExportRoot>,
    #[facet(default)]
    blocking_objects: Vec<ExportBlockingObject>,
}

#[derive(Facet, Debug)]
struct ExportType {
    index: u32,
    name: String,
    base_size: u64,
    #[facet(default)]
    metadata_token: Option<u32>,
}

#[derive(Facet, Debug)]
struct ExportObject {
    address: u64,
    /// Null when the decoder could not resolve the object's type.
    #[facet(default)]
    type_index: Option<u32>,
    #[facet(default)]
    size: Option<u64>,
    #[facet(default)]
    references: Vec<u64>,
}

#[derive(Facet, Debug)]
struct ExportRoot {
    #[facet(default)]
    type_index: Option<u32>,
    object: u64,
    address: u64,
    #[facet(default)]
    app_domain: Option<u32>,
    #[facet(default)]
    thread: Option<u32>,
    #[facet(default)]
    interior: bool,
    #[facet(default)]
    pinned: bool,
    #[facet(default)]
    possible_false_positive: bool,
    /// Missing tags decode as unrecognized.
    #[facet(default)]
    kind: String,
    #[facet(default)]
    name: Option<String>,
}

#[derive(Facet, Debug)]
struct ExportBlockingObject {
    object: u64,
    #[facet(default)]
    taken: bool,
    #[facet(default)]
    recursion_count: u32,
    #[facet(default)]
    owner: Option<u32>,
    #[facet(default)]
    has_single_owner: bool,
    #[facet(default)]
    owners: Vec<u32>,
    #[facet(default)]
    waiters: Vec<u32>,
    #[facet(default)]
    reason: String,
}

#[derive(Debug)]
pub enum ExportError {
    Read { path: PathBuf, source: io::Error },
    Decode(String),
    RuntimeNotFound { requested: usize, available: usize },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "read heap export {}: {source}", path.display())
            }
            Self::Decode(message) => write!(f, "decode heap export: {message}"),
            Self::RuntimeNotFound {
                requested,
                available,
            } => write!(
                f,
                "heap export has {available} runtime(s), runtime index {requested} does not exist"
            ),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Reads the export at `path` and decodes runtime number `runtime`.
pub fn load_export(path: &Path, runtime: usize) -> Result<MemoryHeap, ExportError> {
    let text = std::fs::read_to_string(path).map_err(|source| ExportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), bytes = text.len(), "read heap export");
    let selected = decode_runtime(&text, runtime)?;
    drop(text);
    Ok(selected.into_heap())
}

pub fn parse_export(text: &str, runtime: usize) -> Result<MemoryHeap, ExportError> {
    decode_runtime(text, runtime).map(ExportRuntime::into_heap)
}

fn decode_runtime(text: &str, runtime: usize) -> Result<ExportRuntime, ExportError> {
    let document: ExportDocument =
        facet_json::from_str(text).map_err(|error| ExportError::Decode(error.to_string()))?;
    let available = document.runtimes.len();
    if available > 1 {
        warn!(
            available,
            selected = runtime,
            "heap export contains several runtimes; capturing only the selected one"
        );
    }
    let selected = document
        .runtimes
        .into_iter()
        .nth(runtime)
        .ok_or(ExportError::RuntimeNotFound {
            requested: runtime,
            available,
        })?;
    debug!(
        version = selected.version.as_deref().unwrap_or("unknown"),
        types = selected.types.len(),
        objects = selected.objects.len(),
        "selected runtime"
    );
    Ok(selected)
}

impl ExportRuntime {
    /// Each export list is released as soon as it has been converted.
    fn into_heap(self) -> MemoryHeap {
        let Self {
            version: _,
            walkable,
            types,
            objects,
            roots,
            blocking_objects,
        } = self;

        let mut heap = MemoryHeap::new();
        if walkable == Some(false) {
            heap.mark_unwalkable();
        }
        for ty in types {
            let mut descriptor =
                TypeDescriptor::new(TypeIndex::new(ty.index), ty.name, ty.base_size);
            descriptor.metadata_token = ty.metadata_token;
            heap.add_type(descriptor);
        }
        for object in objects {
            let address = ObjectAddress::new(object.address);
            let references = object.references.into_iter().map(ObjectAddress::new).collect();
            match (object.type_index.map(TypeIndex::new), object.size) {
                (Some(type_index), Some(size)) => {
                    heap.add_sized_object(address, type_index, size, references);
                }
                (Some(type_index), None) => {
                    heap.add_object(address, type_index, references);
                }
                (None, _) => {
                    heap.add_unresolved_object(address);
                }
            }
        }
        for root in roots {
            heap.add_root(root.into_model());
        }
        for blocking in blocking_objects {
            heap.add_blocking_object(blocking.into_model());
        }
        heap
    }
}

impl ExportRoot {
    fn into_model(self) -> RootReference {
        let kind = RootKind::from_tag(&self.kind);
        if kind == RootKind::Unrecognized {
            debug!(tag = %self.kind, "unrecognized root kind in export");
        }
        RootReference {
            type_index: self.type_index.map(TypeIndex::new),
            object: ObjectAddress::new(self.object),
            address: self.address,
            app_domain: self.app_domain.map(DomainId::new),
            thread: self.thread.map(ThreadId::new),
            is_interior: self.interior,
            is_pinned: self.pinned,
            is_possible_false_positive: self.possible_false_positive,
            kind,
            name: self.name,
        }
    }
}

impl ExportBlockingObject {
    fn into_model(self) -> BlockingObject {
        let reason = BlockingReason::from_tag(&self.reason);
        if reason == BlockingReason::Unrecognized {
            debug!(tag = %self.reason, "unrecognized blocking reason in export");
        }
        BlockingObject {
            object: ObjectAddress::new(self.object),
            taken: self.taken,
            recursion_count: self.recursion_count,
            owner: self.owner.map(ThreadId::new),
            has_single_owner: self.has_single_owner,
            owners: self.owners.into_iter().map(ThreadId::new).collect(),
            waiters: self.waiters.into_iter().map(ThreadId::new).collect(),
            reason,
        }
    }
}
