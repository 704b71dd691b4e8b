//! Per-storage configuration and id generator.

/// Configuration shared by every bucket of one storage.
///
/// Holds the fixed block capacity and a monotonically increasing id counter.
/// Ids stamp both buckets (at creation) and elements (at insertion), so
/// they are unique and strictly increasing across the storage's history.
/// Positions compare by these ids, never by slot number.
#[derive(Debug, Clone)]
pub(crate) struct SharedContent {
    block_capacity: usize,
    id_counter: u64,
}

impl SharedContent {
    /// Caller validates `block_capacity`; see [`BucketStorageBuilder`].
    ///
    /// [`BucketStorageBuilder`]: crate::BucketStorageBuilder
    #[inline]
    pub(crate) const fn new(block_capacity: usize) -> Self {
        debug_assert!(block_capacity > 0);
        Self {
            block_capacity,
            id_counter: 0,
        }
    }

    #[inline]
    pub(crate) const fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    /// Returns the next id and advances the counter.
    ///
    /// Overflow would need 2^64 inserts and is not handled.
    #[inline]
    pub(crate) fn next_id(&mut self) -> u64 {
        let id = self.id_counter;
        self.id_counter += 1;
        id
    }

    /// Same capacity, counter continued from the current value.
    ///
    /// Ids issued by the copy never collide with ids already issued here.
    #[inline]
    pub(crate) fn continued(&self) -> Self {
        self.clone()
    }
}
