//! Model of a frozen managed heap as heapdb captures it.
//!
//! Everything here is a read-only view of one enumeration of one heap.
//! Optional provider fields stay `Option` in this crate; the `-1` sentinel
//! used by the snapshot file only appears at the storage boundary.

use facet::Facet;

mod ids;
mod kinds;

pub use ids::{ABSENT_ID, DomainId, ObjectAddress, ThreadId, TypeIndex};
pub use kinds::{BlockingReason, RootKind};

/// A runtime type as enumerated by the provider.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub index: TypeIndex,
    pub name: String,
    /// Size of an instance without any variable-length payload.
    pub base_size: u64,
    /// Metadata token of the type definition, when the provider knows it.
    /// Carried on the model only; the snapshot schema has no column for it.
    pub metadata_token: Option<u32>,
}

impl TypeDescriptor {
    pub fn new(index: TypeIndex, name: impl Into<String>, base_size: u64) -> Self {
        Self {
            index,
            name: name.into(),
            base_size,
            metadata_token: None,
        }
    }

    pub fn with_metadata_token(mut self, token: u32) -> Self {
        self.metadata_token = Some(token);
        self
    }
}

/// One object whose type resolved. Outgoing references are visited, not stored.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapObject {
    pub address: ObjectAddress,
    pub type_index: TypeIndex,
    pub size: u64,
}

/// One outgoing pointer field: `source` holds a reference to `target`.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceEdge {
    pub source: ObjectAddress,
    pub target: ObjectAddress,
}

/// An external starting point keeping part of the graph reachable.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct RootReference {
    /// Type of the rooted object, when it resolved.
    pub type_index: Option<TypeIndex>,
    /// Object the root points at.
    pub object: ObjectAddress,
    /// Where the root itself lives (stack slot, handle, static storage).
    pub address: u64,
    pub app_domain: Option<DomainId>,
    pub thread: Option<ThreadId>,
    pub is_interior: bool,
    pub is_pinned: bool,
    pub is_possible_false_positive: bool,
    pub kind: RootKind,
    pub name: Option<String>,
}

impl RootReference {
    /// A root with no optional relations and all flags cleared.
    pub fn new(object: ObjectAddress, address: u64, kind: RootKind) -> Self {
        Self {
            type_index: None,
            object,
            address,
            app_domain: None,
            thread: None,
            is_interior: false,
            is_pinned: false,
            is_possible_false_positive: false,
            kind,
            name: None,
        }
    }
}

/// A synchronization primitive observed on the heap.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct BlockingObject {
    pub object: ObjectAddress,
    pub taken: bool,
    pub recursion_count: u32,
    /// Current owner, if any thread holds it.
    pub owner: Option<ThreadId>,
    pub has_single_owner: bool,
    /// Owners in provider order; an absent list is modeled as empty.
    pub owners: Vec<ThreadId>,
    pub waiters: Vec<ThreadId>,
    pub reason: BlockingReason,
}

impl BlockingObject {
    /// An untaken object nobody waits on.
    pub fn new(object: ObjectAddress, reason: BlockingReason) -> Self {
        Self {
            object,
            taken: false,
            recursion_count: 0,
            owner: None,
            has_single_owner: false,
            owners: Vec::new(),
            waiters: Vec::new(),
            reason,
        }
    }
}
