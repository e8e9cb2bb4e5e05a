use std::collections::HashMap;

use heapdb_types::{BlockingObject, ObjectAddress, RootReference, TypeDescriptor, TypeIndex};

use super::{HeapSource, ReferenceVisitor};

#[derive(Debug, Clone)]
struct MemoryObject {
    address: ObjectAddress,
    type_index: Option<TypeIndex>,
    size: Option<u64>,
    references: Vec<ObjectAddress>,
}

/// A decoded heap held in memory, enumerated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryHeap {
    unwalkable: bool,
    types: Vec<TypeDescriptor>,
    base_sizes: HashMap<TypeIndex, u64>,
    objects: Vec<MemoryObject>,
    by_address: HashMap<ObjectAddress, usize>,
    roots: Vec<RootReference>,
    blocking_objects: Vec<BlockingObject>,
}

impl MemoryHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unwalkable(&mut self) -> &mut Self {
        self.unwalkable = true;
        self
    }

    pub fn add_type(&mut self, ty: TypeDescriptor) -> &mut Self {
        self.base_sizes.entry(ty.index).or_insert(ty.base_size);
        self.types.push(ty);
        self
    }

    /// Adds an object sized like its type's base instance.
    pub fn add_object(
        &mut self,
        address: ObjectAddress,
        type_index: TypeIndex,
        references: Vec<ObjectAddress>,
    ) -> &mut Self {
        self.push_object(MemoryObject {
            address,
            type_index: Some(type_index),
            size: None,
            references,
        })
    }

    /// Adds an object whose size differs from its type's base size (arrays, strings).
    pub fn add_sized_object(
        &mut self,
        address: ObjectAddress,
        type_index: TypeIndex,
        size: u64,
        references: Vec<ObjectAddress>,
    ) -> &mut Self {
        self.push_object(MemoryObject {
            address,
            type_index: Some(type_index),
            size: Some(size),
            references,
        })
    }

    /// Adds an object the enumeration yields but whose type cannot be resolved.
    pub fn add_unresolved_object(&mut self, address: ObjectAddress) -> &mut Self {
        self.push_object(MemoryObject {
            address,
            type_index: None,
            size: None,
            references: Vec::new(),
        })
    }

    pub fn add_root(&mut self, root: RootReference) -> &mut Self {
        self.roots.push(root);
        self
    }

    pub fn add_blocking_object(&mut self, blocking: BlockingObject) -> &mut Self {
        self.blocking_objects.push(blocking);
        self
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn push_object(&mut self, object: MemoryObject) -> &mut Self {
        self.by_address.insert(object.address, self.objects.len());
        self.objects.push(object);
        self
    }

    fn object(&self, address: ObjectAddress) -> Option<&MemoryObject> {
        self.by_address
            .get(&address)
            .and_then(|index| self.objects.get(*index))
    }
}

impl HeapSource for MemoryHeap {
    fn can_walk(&self) -> bool {
        !self.unwalkable
    }

    fn types(&self) -> impl Iterator<Item = TypeDescriptor> + '_ {
        self.types.iter().cloned()
    }

    fn objects(&self) -> impl Iterator<Item = ObjectAddress> + '_ {
        self.objects.iter().map(|object| object.address)
    }

    fn type_of(&self, address: ObjectAddress) -> Option<TypeIndex> {
        self.object(address).and_then(|object| object.type_index)
    }

    fn object_size(&self, address: ObjectAddress, type_index: TypeIndex) -> u64 {
        self.object(address)
            .and_then(|object| object.size)
            .or_else(|| self.base_sizes.get(&type_index).copied())
            .unwrap_or(0)
    }

    fn visit_references(&self, address: ObjectAddress, visitor: &mut dyn ReferenceVisitor) {
        let Some(object) = self.object(address) else {
            return;
        };
        for target in &object.references {
            visitor.visit_reference(address, *target);
        }
    }

    fn roots(&self) -> impl Iterator<Item = RootReference> + '_ {
        self.roots.iter().cloned()
    }

    fn blocking_objects(&self) -> impl Iterator<Item = BlockingObject> + '_ {
        self.blocking_objects.iter().cloned()
    }
}
