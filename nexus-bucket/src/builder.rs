//! Storage configuration.

use crate::content::SharedContent;
use crate::{BucketStorage, Error};

/// Block capacity used by [`BucketStorage::new`].
pub const DEFAULT_BLOCK_CAPACITY: usize = 64;

/// Largest block capacity; slot indices within a bucket are `u32`.
pub const MAX_BLOCK_CAPACITY: usize = u32::MAX as usize;

/// Builder for [`BucketStorage`].
///
/// # Example
///
/// ```
/// use nexus_bucket::{BucketStorage, BucketStorageBuilder};
///
/// let storage: BucketStorage<u64> = BucketStorageBuilder::default()
///     .block_capacity(16)
///     .build()
///     .unwrap();
/// assert_eq!(storage.block_capacity(), 16);
/// assert_eq!(storage.capacity(), 0); // buckets are allocated lazily
/// ```
#[derive(Clone, Debug)]
pub struct BucketStorageBuilder {
    block_capacity: usize,
}

impl Default for BucketStorageBuilder {
    fn default() -> Self {
        Self {
            block_capacity: DEFAULT_BLOCK_CAPACITY,
        }
    }
}

impl BucketStorageBuilder {
    /// Slots per bucket. Default: [`DEFAULT_BLOCK_CAPACITY`].
    ///
    /// Larger buckets mean fewer allocations; smaller buckets waste less
    /// memory when the storage is sparse.
    pub fn block_capacity(mut self, slots: usize) -> Self {
        self.block_capacity = slots;
        self
    }

    /// Builds an empty storage. No bucket is allocated until the first insert.
    ///
    /// # Errors
    ///
    /// - [`Error::ZeroBlockCapacity`] if the block capacity is zero
    /// - [`Error::BlockCapacityTooLarge`] if it exceeds [`MAX_BLOCK_CAPACITY`]
    pub fn build<T>(self) -> Result<BucketStorage<T>, Error> {
        if self.block_capacity == 0 {
            return Err(Error::ZeroBlockCapacity);
        }

        if self.block_capacity > MAX_BLOCK_CAPACITY {
            return Err(Error::BlockCapacityTooLarge {
                requested: self.block_capacity,
                max: MAX_BLOCK_CAPACITY,
            });
        }

        Ok(BucketStorage::from_content(SharedContent::new(
            self.block_capacity,
        )))
    }
}
