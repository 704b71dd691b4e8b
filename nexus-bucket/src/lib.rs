//! nexus-bucket - segmented storage with stable element addresses.
//!
//! [`BucketStorage`] keeps elements in fixed-size buckets that are allocated
//! on demand and released as soon as they empty. Inserting or erasing an
//! element never moves any other element, so references and [`Position`]s
//! stay valid the way they would for a linked list, while elements are still
//! packed contiguously within each bucket.
//!
//! - Insert and erase are O(1). A chain of buckets with free slots means an
//!   insert never searches.
//! - Freed slots are recycled before never-used ones.
//! - Iteration visits buckets in creation order, and within a bucket the
//!   elements in the order they were placed there.
//! - Positions are totally ordered consistently with iteration.
//!
//! # Example
//!
//! ```
//! use nexus_bucket::BucketStorage;
//!
//! let mut orders = BucketStorage::with_block_capacity(128).unwrap();
//!
//! let first = orders.insert(100u64);
//! let second = orders.insert(250);
//! let addr = orders.get(second).unwrap() as *const u64;
//!
//! // Erasing and inserting elsewhere does not move `second`.
//! orders.erase(first);
//! for qty in 0..1_000 {
//!     orders.insert(qty);
//! }
//! assert_eq!(orders.get(second).unwrap() as *const u64, addr);
//!
//! // Positions order like iteration.
//! let later = orders.insert(7);
//! assert!(second < later);
//! ```
//!
//! # Configuration
//!
//! ```
//! use nexus_bucket::{BucketStorage, Error};
//!
//! let storage: BucketStorage<u64> = BucketStorage::<u64>::builder().block_capacity(16).build().unwrap();
//! assert_eq!(storage.block_capacity(), 16);
//!
//! let err = BucketStorage::<u64>::with_block_capacity(0).unwrap_err();
//! assert_eq!(err, Error::ZeroBlockCapacity);
//! ```
//!
//! # Panics
//!
//! Operations that require a live element ([`BucketStorage::erase`]) or a
//! step in range ([`BucketStorage::next_position`],
//! [`BucketStorage::prev_position`], [`BucketStorage::get_to_distance`])
//! panic when that does not hold. [`BucketStorage::get`],
//! [`BucketStorage::remove`] and [`BucketStorage::contains`] are the checked
//! forms.

#![warn(missing_docs)]

mod bucket;
mod builder;
mod content;
mod cursor;
mod error;
mod iter;
mod position;
mod storage;

pub use builder::{BucketStorageBuilder, DEFAULT_BLOCK_CAPACITY, MAX_BLOCK_CAPACITY};
pub use cursor::{Cursor, CursorMut};
pub use error::{Error, InsertError};
pub use iter::{IntoIter, Iter, IterMut};
pub use position::Position;
pub use storage::BucketStorage;
