use std::collections::BTreeMap;

///
/// IdentityAllocator
///
/// Per-entity-name counters issuing decimal-string ids from 1. Scoped to one
/// build call and passed explicitly; uniqueness holds only within one
/// allocator instance.
///

#[derive(Debug, Default)]
pub struct IdentityAllocator {
    counters: BTreeMap<String, u64>,
}

impl IdentityAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }

    /// Issue the next id for an entity name.
    pub fn next(&mut self, entity: &str) -> String {
        let counter = self.counters.entry(entity.to_string()).or_insert(0);
        *counter += 1;

        counter.to_string()
    }
}

///
/// TESTS
///
