//! Error types for bucket storage construction and insertion.

use std::collections::TryReserveError;

use thiserror::Error;

/// Error raised while configuring a storage or allocating a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Block capacity is zero.
    #[error("block capacity cannot be zero")]
    ZeroBlockCapacity,

    /// Block capacity does not fit the `u32` slot indices of a bucket.
    #[error("block capacity {requested} exceeds maximum of {max}")]
    BlockCapacityTooLarge {
        /// Capacity that was asked for.
        requested: usize,
        /// Largest supported capacity.
        max: usize,
    },

    /// Backing memory for a new bucket could not be reserved.
    #[error("failed to allocate bucket of {slots} slots")]
    Alloc {
        /// Slots the bucket was sized for.
        slots: usize,
        /// Underlying reservation failure.
        #[source]
        source: TryReserveError,
    },
}

/// Error returned by [`BucketStorage::try_insert_with`].
///
/// Either the storage could not make room for the element, or the element's
/// own constructor failed. In both cases the storage is left exactly as it
/// was before the call.
///
/// [`BucketStorage::try_insert_with`]: crate::BucketStorage::try_insert_with
#[derive(Debug, Error)]
pub enum InsertError<E> {
    /// Allocating a bucket for the element failed.
    #[error(transparent)]
    Storage(#[from] Error),

    /// The element constructor returned an error.
    #[error("element construction failed")]
    Construct(E),
}

impl<E> InsertError<E> {
    /// Returns the constructor error, if that is what failed.
    pub fn into_construct(self) -> Option<E> {
        match self {
            InsertError::Construct(err) => Some(err),
            InsertError::Storage(_) => None,
        }
    }
}
