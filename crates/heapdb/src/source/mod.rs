//! Read side of a capture: the narrow interface a heap-inspection provider
//! exposes, plus the providers that ship with heapdb.

use heapdb_types::{BlockingObject, ObjectAddress, RootReference, TypeDescriptor, TypeIndex};

mod export;
mod memory;

pub use export::{ExportError, load_export, parse_export};
pub use memory::MemoryHeap;

/// Receives one call per outgoing pointer field of `owner`.
///
/// The owner travels with every call, so a visitor never has to remember
/// which object is being walked.
pub trait ReferenceVisitor {
    fn visit_reference(&mut self, owner: ObjectAddress, target: ObjectAddress);
}

impl<F> ReferenceVisitor for F
where
    F: FnMut(ObjectAddress, ObjectAddress),
{
    fn visit_reference(&mut self, owner: ObjectAddress, target: ObjectAddress) {
        self(owner, target)
    }
}

/// Enumeration interface over one frozen heap.
///
/// Every sequence is a single forward pass; callers never rewind and must
/// not assume any of them fits in memory.
pub trait HeapSource {
    /// `false` when the heap is in a state that cannot be enumerated
    /// (for example a dump taken mid-collection).
    fn can_walk(&self) -> bool;

    fn types(&self) -> impl Iterator<Item = TypeDescriptor> + '_;

    fn objects(&self) -> impl Iterator<Item = ObjectAddress> + '_;

    /// `None` when the object's type cannot be resolved.
    fn type_of(&self, address: ObjectAddress) -> Option<TypeIndex>;

    /// Byte size of a resolved object.
    fn object_size(&self, address: ObjectAddress, type_index: TypeIndex) -> u64;

    fn visit_references(&self, address: ObjectAddress, visitor: &mut dyn ReferenceVisitor);

    fn roots(&self) -> impl Iterator<Item = RootReference> + '_;

    fn blocking_objects(&self) -> impl Iterator<Item = BlockingObject> + '_;
}
