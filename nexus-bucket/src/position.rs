//! Stable handle to an element slot.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::bucket::SENTINEL_ID;

/// Handle naming one element of a [`BucketStorage`], or its end.
///
/// A position is a `(bucket, slot)` pair plus the ids stamped on the bucket
/// at creation and on the element at insertion. It stays valid until the
/// element it names is erased, the storage is cleared or dropped, or
/// [`shrink_to_fit`] relocates everything. Inserting or erasing *other*
/// elements never invalidates it.
///
/// # Ordering
///
/// Slots are recycled, so slot numbers say nothing about history. Positions
/// instead compare by bucket id first (buckets are stamped in chain order)
/// and then by the element's insertion stamp. This matches traversal order:
/// `a < b` exactly when `a` is visited before `b`. [`end`] is greater than
/// every element position.
///
/// Equality and hashing use the same ids, so an erased position never
/// equals the element that later reuses its slot.
///
/// Comparing positions from different storages is meaningless.
///
/// [`BucketStorage`]: crate::BucketStorage
/// [`shrink_to_fit`]: crate::BucketStorage::shrink_to_fit
/// [`end`]: crate::BucketStorage::end
#[derive(Clone, Copy, Debug)]
pub struct Position {
    pub(crate) bucket: usize,
    pub(crate) index: u32,
    pub(crate) bucket_id: u64,
    pub(crate) id: u64,
}

impl Position {
    #[inline]
    pub(crate) const fn new(bucket: usize, index: u32, bucket_id: u64, id: u64) -> Self {
        Self {
            bucket,
            index,
            bucket_id,
            id,
        }
    }

    /// Slot index within the owning bucket.
    #[inline]
    pub const fn slot(&self) -> u32 {
        self.index
    }

    /// Id stamped on the owning bucket when it was created.
    #[inline]
    pub const fn bucket_id(&self) -> u64 {
        self.bucket_id
    }

    /// Id stamped on the element when it was inserted.
    #[inline]
    pub const fn stamp(&self) -> u64 {
        self.id
    }

    /// Returns `true` if this is the end position.
    #[inline]
    pub const fn is_end(&self) -> bool {
        self.bucket_id == SENTINEL_ID
    }

    /// Returns `true` if both positions live in the same bucket.
    #[inline]
    pub const fn same_bucket(&self, other: &Position) -> bool {
        self.bucket == other.bucket && self.bucket_id == other.bucket_id
    }
}

// Keyed on the ids, same as `Ord`.
impl PartialEq for Position {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bucket_id == other.bucket_id && self.id == other.id
    }
}

impl Eq for Position {}

impl Hash for Position {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bucket_id.hash(state);
        self.id.hash(state);
    }
}

impl PartialOrd for Position {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.bucket_id
            .cmp(&other.bucket_id)
            .then(self.id.cmp(&other.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_matches_ordering() {
        let a = Position::new(1, 2, 10, 20);
        let b = Position::new(1, 2, 10, 20);
        let c = Position::new(1, 3, 10, 21);
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert_ne!(a, c);
        assert_ne!(a.cmp(&c), Ordering::Equal);
    }

    #[test]
    fn recycled_slot_is_a_different_position() {
        // Same bucket and slot, restamped after an erase.
        let erased = Position::new(0, 1, 3, 4);
        let reused = Position::new(0, 1, 3, 9);
        assert_ne!(erased, reused);
        assert_eq!(erased.cmp(&reused), Ordering::Less);

        let hashed: std::collections::HashSet<_> = [erased].into_iter().collect();
        assert!(!hashed.contains(&reused));
    }

    #[test]
    fn bucket_id_dominates_stamp() {
        // Later bucket, earlier element stamp: still greater.
        let early_bucket = Position::new(0, 0, 1, 50);
        let late_bucket = Position::new(5, 0, 7, 8);
        assert!(early_bucket < late_bucket);
    }

    #[test]
    fn stamp_orders_within_bucket() {
        // Slot numbers are irrelevant: slot 3 was filled before slot 1.
        let a = Position::new(0, 3, 1, 4);
        let b = Position::new(0, 1, 1, 9);
        assert!(a < b);
        assert!(b > a);
    }

    #[test]
    fn end_is_maximum() {
        let end = Position::new(0, 0, SENTINEL_ID, SENTINEL_ID);
        let element = Position::new(3, 2, 1_000, 2_000);
        assert!(end.is_end());
        assert!(!element.is_end());
        assert!(element < end);
    }

    #[test]
    fn same_bucket() {
        let a = Position::new(2, 0, 5, 6);
        let b = Position::new(2, 3, 5, 9);
        let c = Position::new(3, 0, 11, 12);
        assert!(a.same_bucket(&b));
        assert!(!a.same_bucket(&c));
    }
}
