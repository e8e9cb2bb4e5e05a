use std::collections::HashMap;

use heapdb_types::TypeIndex;

/// Per-type instance counts gathered during the object pass.
#[derive(Debug, Default)]
pub struct TypeAggregator {
    counts: HashMap<TypeIndex, u64>,
    total: u64,
}

impl TypeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, type_index: TypeIndex) {
        *self.counts.entry(type_index).or_default() += 1;
        self.total += 1;
    }

    pub fn count_of(&self, type_index: TypeIndex) -> u64 {
        self.counts.get(&type_index).copied().unwrap_or(0)
    }

    /// Removes and returns the count for `type_index`, 0 if it was never observed.
    pub fn take(&mut self, type_index: TypeIndex) -> u64 {
        self.counts.remove(&type_index).unwrap_or(0)
    }

    pub fn distinct_types(&self) -> usize {
        self.counts.len()
    }

    /// Every observation so far, including ones already taken.
    pub fn total_objects(&self) -> u64 {
        self.total
    }

    /// Drains whatever was never taken, ordered by type index.
    pub fn drain_remaining(&mut self) -> Vec<(TypeIndex, u64)> {
        let mut remaining: Vec<_> = self.counts.drain().collect();
        remaining.sort_unstable_by_key(|(type_index, _)| *type_index);
        remaining
    }
}
