//! The bucket storage container.
//!
//! # Layout
//!
//! ```text
//!  first                                         last (sentinel)
//!    │                                               │
//!    ▼                                               ▼
//! [bucket 0] ◄──► [bucket 1] ◄──► [bucket 2] ◄──► [end]        main chain
//!                     ▲               │
//!  incomplete ────────┘               └──► [end]               incomplete chain
//! ```
//!
//! Buckets live in a [`Slab`] arena and link to each other by handle. The
//! main chain holds every bucket in creation order and defines iteration
//! order. The incomplete chain threads the same buckets through a second
//! pair of links and holds exactly those with a free slot; inserts always go
//! to its head, so finding room is O(1).
//!
//! A bucket is allocated when an insert finds the incomplete chain empty and
//! released the moment its last element is erased. Element slots are boxed
//! per bucket and never resized, so an element's address does not change
//! while it is live (except across [`BucketStorage::shrink_to_fit`]).

use std::fmt;
use std::mem;

use slab::Slab;
use tracing::{debug, trace, warn};

use crate::bucket::{Bucket, NONE, SENTINEL_ID};
use crate::builder::DEFAULT_BLOCK_CAPACITY;
use crate::content::SharedContent;
use crate::{
    BucketStorageBuilder, Cursor, CursorMut, Error, InsertError, IntoIter, Iter, IterMut,
    Position,
};

/// Segmented container with stable element addresses.
///
/// Elements are stored in fixed-size buckets. Insert and erase are O(1);
/// neither moves any other element, so [`Position`]s and references to
/// other elements stay valid.
///
/// # Example
///
/// ```
/// use nexus_bucket::BucketStorage;
///
/// let mut storage = BucketStorage::with_block_capacity(4).unwrap();
///
/// let a = storage.insert("a");
/// let b = storage.insert("b");
/// let c = storage.insert("c");
///
/// // Erase returns the position of the next element.
/// let next = storage.erase(b);
/// assert_eq!(next, c);
/// assert_eq!(storage.get(a), Some(&"a"));
/// assert_eq!(storage.get(b), None);
///
/// assert_eq!(storage.iter().copied().collect::<Vec<_>>(), ["a", "c"]);
/// ```
pub struct BucketStorage<T> {
    content: SharedContent,
    buckets: Slab<Bucket<T>>,
    len: usize,
    bucket_count: usize,
    first: usize,
    last: usize,
    incomplete: usize,
}

impl<T> BucketStorage<T> {
    /// Creates an empty storage with [`DEFAULT_BLOCK_CAPACITY`] slots per
    /// bucket.
    ///
    /// [`DEFAULT_BLOCK_CAPACITY`]: crate::DEFAULT_BLOCK_CAPACITY
    pub fn new() -> Self {
        Self::from_content(SharedContent::new(DEFAULT_BLOCK_CAPACITY))
    }

    /// Creates an empty storage with `block_capacity` slots per bucket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroBlockCapacity`] if `block_capacity` is zero, or
    /// [`Error::BlockCapacityTooLarge`] if it exceeds
    /// [`MAX_BLOCK_CAPACITY`](crate::MAX_BLOCK_CAPACITY).
    pub fn with_block_capacity(block_capacity: usize) -> Result<Self, Error> {
        BucketStorageBuilder::default()
            .block_capacity(block_capacity)
            .build()
    }

    /// Returns a builder for configuring a storage.
    pub fn builder() -> BucketStorageBuilder {
        BucketStorageBuilder::default()
    }

    pub(crate) fn from_content(content: SharedContent) -> Self {
        let mut buckets = Slab::new();
        let sentinel = buckets.insert(Bucket::sentinel());
        Self {
            content,
            buckets,
            len: 0,
            bucket_count: 0,
            first: sentinel,
            last: sentinel,
            incomplete: sentinel,
        }
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Returns the number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the storage holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of slots across all allocated buckets.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.content.block_capacity() * self.bucket_count
    }

    /// Returns the number of allocated buckets.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Returns the number of slots per bucket.
    #[inline]
    pub fn block_capacity(&self) -> usize {
        self.content.block_capacity()
    }

    /// Theoretical maximum number of elements, bounded by address space.
    #[inline]
    pub fn max_size(&self) -> usize {
        isize::MAX as usize / mem::size_of::<Option<T>>().max(1)
    }

    // ========================================================================
    // Positions
    // ========================================================================

    /// Position of the first element, or [`end`](Self::end) if empty.
    #[inline]
    pub fn begin(&self) -> Position {
        self.position_at(self.first, self.buckets[self.first].first_index())
    }

    /// Position one past the last element.
    #[inline]
    pub fn end(&self) -> Position {
        Position::new(self.last, 0, SENTINEL_ID, SENTINEL_ID)
    }

    /// Position following `pos` in iteration order.
    ///
    /// Stepping from the last element yields [`end`](Self::end).
    ///
    /// # Panics
    ///
    /// Panics if `pos` is the end position.
    pub fn next_position(&self, pos: Position) -> Position {
        let bucket = &self.buckets[pos.bucket];
        assert!(!bucket.is_end(), "advancing past end");

        if pos.index != bucket.last_index() {
            self.position_at(pos.bucket, bucket.next_index(pos.index))
        } else {
            let next = bucket.next;
            self.position_at(next, self.buckets[next].first_index())
        }
    }

    /// Position preceding `pos` in iteration order.
    ///
    /// Stepping back from [`end`](Self::end) yields the last element.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is the first position.
    pub fn prev_position(&self, pos: Position) -> Position {
        let bucket = &self.buckets[pos.bucket];

        if pos.index != bucket.first_index() {
            self.position_at(pos.bucket, bucket.prev_index(pos.index))
        } else {
            assert!(!bucket.is_begin(), "retreating before begin");
            let prev = bucket.prev;
            self.position_at(prev, self.buckets[prev].last_index())
        }
    }

    /// Moves `pos` by `distance` elements (backwards if negative).
    ///
    /// Produces the same position as stepping `distance` times with
    /// [`next_position`](Self::next_position) or
    /// [`prev_position`](Self::prev_position), but whole buckets are skipped
    /// in one step using their element count once the walk is aligned on a
    /// bucket boundary.
    ///
    /// # Panics
    ///
    /// Panics if the walk would pass [`end`](Self::end) or go before
    /// [`begin`](Self::begin).
    pub fn get_to_distance(&self, pos: Position, distance: isize) -> Position {
        let mut handle = pos.bucket;
        let mut index = pos.index;
        let mut remaining = distance.unsigned_abs();

        if distance >= 0 {
            while remaining > 0 {
                let bucket = &self.buckets[handle];
                assert!(!bucket.is_end(), "advancing past end");

                if index == bucket.first_index() && remaining >= bucket.len() {
                    remaining -= bucket.len();
                    handle = bucket.next;
                    index = self.buckets[handle].first_index();
                } else if index != bucket.last_index() {
                    index = bucket.next_index(index);
                    remaining -= 1;
                } else {
                    handle = bucket.next;
                    index = self.buckets[handle].first_index();
                    remaining -= 1;
                }
            }
        } else {
            while remaining > 0 {
                let bucket = &self.buckets[handle];

                if !bucket.is_end() && index == bucket.last_index() && remaining >= bucket.len() {
                    assert!(!bucket.is_begin(), "retreating before begin");
                    remaining -= bucket.len();
                    handle = bucket.prev;
                    index = self.buckets[handle].last_index();
                } else if index != bucket.first_index() {
                    index = bucket.prev_index(index);
                    remaining -= 1;
                } else {
                    assert!(!bucket.is_begin(), "retreating before begin");
                    handle = bucket.prev;
                    index = self.buckets[handle].last_index();
                    remaining -= 1;
                }
            }
        }

        self.position_at(handle, index)
    }

    #[inline]
    fn position_at(&self, handle: usize, index: u32) -> Position {
        let bucket = &self.buckets[handle];
        if bucket.is_end() {
            return self.end();
        }
        Position::new(handle, index, bucket.id(), bucket.id_at(index))
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Returns `true` if `pos` names a live element of this storage.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        self.live_bucket(pos).is_some()
    }

    /// Returns a reference to the element at `pos`.
    ///
    /// Returns `None` for [`end`](Self::end) or a position whose element has
    /// been erased.
    #[inline]
    pub fn get(&self, pos: Position) -> Option<&T> {
        self.live_bucket(pos)?.get(pos.index)
    }

    /// Returns a mutable reference to the element at `pos`.
    #[inline]
    pub fn get_mut(&mut self, pos: Position) -> Option<&mut T> {
        let bucket = self.buckets.get_mut(pos.bucket)?;
        if bucket.id() != pos.bucket_id || !bucket.holds(pos.index, pos.id) {
            return None;
        }
        bucket.get_mut(pos.index)
    }

    /// Returns a reference to the first element.
    #[inline]
    pub fn front(&self) -> Option<&T> {
        self.get(self.begin())
    }

    /// Returns a mutable reference to the first element.
    #[inline]
    pub fn front_mut(&mut self) -> Option<&mut T> {
        let begin = self.begin();
        self.get_mut(begin)
    }

    /// Returns a reference to the last element.
    #[inline]
    pub fn back(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.get(self.prev_position(self.end()))
    }

    /// Returns a mutable reference to the last element.
    #[inline]
    pub fn back_mut(&mut self) -> Option<&mut T> {
        if self.is_empty() {
            return None;
        }
        let last = self.prev_position(self.end());
        self.get_mut(last)
    }

    /// Unchecked-stamp lookup for positions produced by traversal.
    #[inline]
    pub(crate) fn value_at(&self, pos: Position) -> Option<&T> {
        self.buckets.get(pos.bucket)?.get(pos.index)
    }

    #[inline]
    fn live_bucket(&self, pos: Position) -> Option<&Bucket<T>> {
        self.buckets
            .get(pos.bucket)
            .filter(|bucket| bucket.id() == pos.bucket_id && bucket.holds(pos.index, pos.id))
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Inserts `value`, returning its position.
    ///
    /// The element goes into the most recently freed-up bucket, or into a
    /// new bucket appended to the chain when every bucket is full.
    ///
    /// # Panics
    ///
    /// Panics if a new bucket is needed and cannot be allocated. Use
    /// [`try_insert`](Self::try_insert) to handle that case.
    pub fn insert(&mut self, value: T) -> Position {
        match self.try_insert(value) {
            Ok(pos) => pos,
            Err(err) => panic!("{err}"),
        }
    }

    /// Inserts `value`, returning its position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Alloc`] if a new bucket is needed and cannot be
    /// allocated. The value is dropped and the storage is unchanged.
    pub fn try_insert(&mut self, value: T) -> Result<Position, Error> {
        self.prepare_insert()?;
        Ok(self.complete_insert(value))
    }

    /// Inserts the value produced by `make`, which may fail.
    ///
    /// Room for the element is reserved before `make` runs. If `make`
    /// returns an error (or panics), any bucket allocated for this insert is
    /// released again and the storage is left exactly as before the call.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_bucket::{BucketStorage, InsertError};
    ///
    /// let mut storage: BucketStorage<u32> = BucketStorage::with_block_capacity(4).unwrap();
    ///
    /// let err = storage.try_insert_with(|| "42x".parse::<u32>()).unwrap_err();
    /// assert!(matches!(err, InsertError::Construct(_)));
    /// assert_eq!(storage.bucket_count(), 0);
    ///
    /// let pos = storage.try_insert_with(|| "42".parse::<u32>()).unwrap();
    /// assert_eq!(storage.get(pos), Some(&42));
    /// ```
    ///
    /// # Errors
    ///
    /// - [`InsertError::Storage`] if a bucket could not be allocated
    /// - [`InsertError::Construct`] with the error returned by `make`
    pub fn try_insert_with<F, E>(&mut self, make: F) -> Result<Position, InsertError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.prepare_insert()?;

        let mut guard = UndoInsert {
            storage: self,
            armed: true,
        };
        match make() {
            Ok(value) => {
                guard.armed = false;
                Ok(guard.storage.complete_insert(value))
            }
            Err(err) => Err(InsertError::Construct(err)),
        }
    }

    /// Ensures the incomplete chain has a head, allocating a bucket if not.
    fn prepare_insert(&mut self) -> Result<(), Error> {
        if self.incomplete != self.last {
            return Ok(());
        }
        let bucket = self.allocate_bucket()?;
        self.adopt_bucket(bucket);
        Ok(())
    }

    fn allocate_bucket(&mut self) -> Result<Bucket<T>, Error> {
        let capacity = self.content.block_capacity();
        let id = self.content.next_id();
        Bucket::try_new(id, capacity).map_err(|source| {
            warn!(slots = capacity, "bucket allocation failed");
            Error::Alloc {
                slots: capacity,
                source,
            }
        })
    }

    /// Links an empty bucket as the last real bucket and the incomplete head.
    /// The incomplete chain must be empty.
    fn adopt_bucket(&mut self, bucket: Bucket<T>) {
        debug_assert_eq!(self.incomplete, self.last);
        let bucket_id = bucket.id();
        let capacity = bucket.capacity();

        let handle = self.buckets.insert(bucket);
        self.link_before_sentinel(handle);
        self.buckets[handle].next_incomplete = self.last;
        self.incomplete = handle;
        self.bucket_count += 1;

        trace!(bucket_id, handle, capacity, "allocated bucket");
    }

    /// Stores `value` in the incomplete head. `prepare_insert` must have run.
    fn complete_insert(&mut self, value: T) -> Position {
        let handle = self.incomplete;
        let id = self.content.next_id();

        let bucket = &mut self.buckets[handle];
        let index = bucket.insert(value, id);
        let bucket_id = bucket.id();
        if bucket.is_full() {
            self.pop_incomplete();
        }

        self.len += 1;
        Position::new(handle, index, bucket_id, id)
    }

    /// Releases the incomplete head if it was created for an insert that
    /// never completed.
    fn undo_insert(&mut self) {
        let handle = self.incomplete;
        if handle != self.last && self.buckets[handle].is_empty() {
            self.release_bucket(handle, true);
        }
    }

    // ========================================================================
    // Erase
    // ========================================================================

    /// Erases the element at `pos`, returning the position of the element
    /// that followed it (or [`end`](Self::end)).
    ///
    /// # Panics
    ///
    /// Panics if `pos` does not name a live element. Use
    /// [`remove`](Self::remove) for a checked variant.
    pub fn erase(&mut self, pos: Position) -> Position {
        assert!(self.contains(pos), "erasing a position with no live element");
        self.take_at(pos).1
    }

    /// Removes and returns the element at `pos`.
    ///
    /// Returns `None` if `pos` does not name a live element.
    pub fn remove(&mut self, pos: Position) -> Option<T> {
        if !self.contains(pos) {
            return None;
        }
        Some(self.take_at(pos).0)
    }

    /// Removes and returns the first element.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let begin = self.begin();
        Some(self.take_at(begin).0)
    }

    /// Removes and returns the last element.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let last = self.prev_position(self.end());
        Some(self.take_at(last).0)
    }

    /// Removes the live element at `pos`, returning it with its successor.
    pub(crate) fn take_at(&mut self, pos: Position) -> (T, Position) {
        let successor = self.next_position(pos);

        let bucket = &mut self.buckets[pos.bucket];
        let was_full = bucket.is_full();
        let value = bucket.take(pos.index);

        if bucket.is_empty() {
            // A bucket that was not full was on the incomplete chain.
            self.release_bucket(pos.bucket, !was_full);
        } else if was_full {
            self.push_incomplete(pos.bucket);
        }

        self.len -= 1;
        (value, successor)
    }

    // ========================================================================
    // Bulk operations
    // ========================================================================

    /// Removes every element and releases every bucket.
    pub fn clear(&mut self) {
        let released = self.bucket_count;
        let sentinel = self.last;

        self.buckets.retain(|handle, _| handle == sentinel);
        self.buckets[sentinel].prev = NONE;

        self.first = sentinel;
        self.incomplete = sentinel;
        self.len = 0;
        self.bucket_count = 0;

        debug!(released, "cleared bucket storage");
    }

    /// Repacks all elements into as few buckets as possible.
    ///
    /// Elements keep their iteration order but are **moved**: every
    /// [`Position`] and every reference taken before this call is
    /// invalidated. This is the one operation that does not preserve
    /// addresses.
    ///
    /// # Panics
    ///
    /// Panics if a bucket cannot be allocated. The storage is left untouched
    /// in that case; see [`try_shrink_to_fit`](Self::try_shrink_to_fit).
    pub fn shrink_to_fit(&mut self) {
        if let Err(err) = self.try_shrink_to_fit() {
            panic!("{err}");
        }
    }

    /// Fallible [`shrink_to_fit`](Self::shrink_to_fit).
    ///
    /// Every bucket the packed layout needs is allocated before any element
    /// moves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Alloc`] if a bucket cannot be allocated. No element
    /// has been moved and every position is still valid.
    pub fn try_shrink_to_fit(&mut self) -> Result<(), Error> {
        let before = self.bucket_count;
        let needed = self.len.div_ceil(self.content.block_capacity());

        let mut packed = Self::from_content(self.content.continued());
        let mut spare = Vec::with_capacity(needed);
        for _ in 0..needed {
            spare.push(packed.allocate_bucket()?);
        }

        let mut spare = spare.into_iter();
        while let Some(value) = self.pop_front() {
            if packed.incomplete == packed.last {
                if let Some(bucket) = spare.next() {
                    packed.adopt_bucket(bucket);
                }
            }
            packed.insert(value);
        }
        *self = packed;

        debug!(
            before,
            after = self.bucket_count,
            "shrunk bucket storage"
        );
        Ok(())
    }

    /// Swaps the contents of two storages in O(1).
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Returns an iterator over the elements in position order.
    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns an iterator of mutable references in position order.
    ///
    /// Allocates: every reference is collected before the first is yielded.
    /// See [`IterMut`].
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        let mut values = Vec::with_capacity(self.len);

        let mut by_handle: Vec<Option<&mut Bucket<T>>> = Vec::new();
        for (handle, bucket) in self.buckets.iter_mut() {
            if by_handle.len() <= handle {
                by_handle.resize_with(handle + 1, || None);
            }
            by_handle[handle] = Some(bucket);
        }

        let mut handle = self.first;
        while handle != self.last {
            let Some(bucket) = by_handle[handle].take() else {
                break;
            };
            handle = bucket.next;
            bucket.collect_mut(&mut values);
        }

        IterMut::new(values)
    }

    /// Returns a cursor at `pos`.
    #[inline]
    pub fn cursor(&self, pos: Position) -> Cursor<'_, T> {
        Cursor::new(self, pos)
    }

    /// Returns a cursor at the first element.
    #[inline]
    pub fn cursor_front(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.begin())
    }

    /// Returns a mutable cursor at `pos`.
    #[inline]
    pub fn cursor_mut(&mut self, pos: Position) -> CursorMut<'_, T> {
        CursorMut::new(self, pos)
    }

    /// Returns a mutable cursor at the first element.
    #[inline]
    pub fn cursor_front_mut(&mut self) -> CursorMut<'_, T> {
        let begin = self.begin();
        CursorMut::new(self, begin)
    }

    // ========================================================================
    // Internal: main chain
    // ========================================================================

    /// Links `handle` as the last real bucket.
    fn link_before_sentinel(&mut self, handle: usize) {
        let sentinel = self.last;
        let tail = self.buckets[sentinel].prev;

        let bucket = &mut self.buckets[handle];
        bucket.prev = tail;
        bucket.next = sentinel;

        self.buckets[sentinel].prev = handle;
        if tail != NONE {
            self.buckets[tail].next = handle;
        } else {
            self.first = handle;
        }
    }

    fn unlink_main(&mut self, handle: usize) {
        let bucket = &self.buckets[handle];
        let prev = bucket.prev;
        let next = bucket.next;

        // next is never NONE: the sentinel terminates the chain
        self.buckets[next].prev = prev;
        if prev != NONE {
            self.buckets[prev].next = next;
        } else {
            self.first = next;
        }
    }

    // ========================================================================
    // Internal: incomplete chain
    // ========================================================================

    /// Detaches the head of the incomplete chain (it just became full).
    fn pop_incomplete(&mut self) {
        let head = self.incomplete;
        let next = self.buckets[head].next_incomplete;

        self.incomplete = next;
        if next != self.last {
            self.buckets[next].prev_incomplete = NONE;
        }

        let bucket = &mut self.buckets[head];
        bucket.next_incomplete = NONE;
        bucket.prev_incomplete = NONE;
    }

    /// Makes `handle` the head of the incomplete chain.
    fn push_incomplete(&mut self, handle: usize) {
        let head = self.incomplete;
        if head != self.last {
            self.buckets[head].prev_incomplete = handle;
        }

        let bucket = &mut self.buckets[handle];
        bucket.prev_incomplete = NONE;
        bucket.next_incomplete = head;
        self.incomplete = handle;
    }

    fn unlink_incomplete(&mut self, handle: usize) {
        let bucket = &self.buckets[handle];
        let prev = bucket.prev_incomplete;
        let next = bucket.next_incomplete;

        if prev != NONE {
            self.buckets[prev].next_incomplete = next;
        } else {
            self.incomplete = next;
        }
        if next != self.last {
            self.buckets[next].prev_incomplete = prev;
        }

        let bucket = &mut self.buckets[handle];
        bucket.next_incomplete = NONE;
        bucket.prev_incomplete = NONE;
    }

    /// Unlinks `handle` from both chains and drops it.
    fn release_bucket(&mut self, handle: usize, in_incomplete: bool) {
        self.unlink_main(handle);
        if in_incomplete {
            self.unlink_incomplete(handle);
        }

        let bucket = self.buckets.remove(handle);
        self.bucket_count -= 1;

        trace!(bucket_id = bucket.id(), handle, "released bucket");
    }
}

/// Rolls back `prepare_insert` unless disarmed.
struct UndoInsert<'a, T> {
    storage: &'a mut BucketStorage<T>,
    armed: bool,
}

impl<T> Drop for UndoInsert<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.storage.undo_insert();
        }
    }
}

// =============================================================================
// Trait impls
// =============================================================================

impl<T> Default for BucketStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep copy. Element stamps, bucket handles and slot layout are preserved,
/// so a [`Position`] taken from the source names the same element in the
/// copy. The copy's id counter continues from the source's.
impl<T: Clone> Clone for BucketStorage<T> {
    fn clone(&self) -> Self {
        Self {
            content: self.content.continued(),
            buckets: self.buckets.clone(),
            len: self.len,
            bucket_count: self.bucket_count,
            first: self.first,
            last: self.last,
            incomplete: self.incomplete,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for BucketStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for BucketStorage<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for BucketStorage<T> {}

impl<T> Extend<T> for BucketStorage<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<T> FromIterator<T> for BucketStorage<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut storage = Self::new();
        storage.extend(iter);
        storage
    }
}

impl<T> IntoIterator for BucketStorage<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter::new(self)
    }
}

impl<'a, T> IntoIterator for &'a BucketStorage<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut BucketStorage<T> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> IterMut<'a, T> {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    impl<T> BucketStorage<T> {
        /// Walks both chains and checks every structural invariant.
        fn assert_invariants(&self) {
            let cap = self.block_capacity();

            // Main chain
            let mut buckets = 0;
            let mut elements = 0;
            let mut prev = NONE;
            let mut handle = self.first;
            let mut last_id = None;
            while handle != self.last {
                let bucket = &self.buckets[handle];
                assert_eq!(bucket.prev, prev, "main chain back link");
                assert!(bucket.len() > 0, "empty bucket left on chain");
                assert!(bucket.len() <= cap);
                assert_eq!(bucket.capacity(), cap);
                if let Some(id) = last_id {
                    assert!(bucket.id() > id, "bucket ids increase along chain");
                }
                last_id = Some(bucket.id());
                buckets += 1;
                elements += bucket.len();
                prev = handle;
                handle = bucket.next;
            }
            assert_eq!(self.buckets[self.last].prev, prev);
            assert_eq!(buckets, self.bucket_count);
            assert_eq!(elements, self.len);
            assert_eq!(self.buckets.len(), self.bucket_count + 1);
            assert_eq!(self.capacity(), cap * self.bucket_count);
            assert_eq!(self.first == self.last, self.is_empty());

            // Incomplete chain: exactly the non-full buckets
            let mut incomplete = Vec::new();
            let mut prev = NONE;
            let mut handle = self.incomplete;
            while handle != self.last {
                let bucket = &self.buckets[handle];
                assert_eq!(bucket.prev_incomplete, prev, "incomplete back link");
                assert!(!bucket.is_full(), "full bucket on incomplete chain");
                incomplete.push(handle);
                prev = handle;
                handle = bucket.next_incomplete;
            }
            let mut expected: Vec<usize> = self
                .buckets
                .iter()
                .filter(|(h, b)| *h != self.last && !b.is_full())
                .map(|(h, _)| h)
                .collect();
            incomplete.sort_unstable();
            expected.sort_unstable();
            assert_eq!(incomplete, expected);

            // Traversal count and ordering
            let mut count = 0;
            let mut pos = self.begin();
            while pos != self.end() {
                let next = self.next_position(pos);
                assert!(pos < next, "positions increase along traversal");
                count += 1;
                pos = next;
            }
            assert_eq!(count, self.len);
        }
    }

    fn storage(cap: usize) -> BucketStorage<u64> {
        BucketStorage::with_block_capacity(cap).unwrap()
    }

    #[test]
    fn new_is_empty() {
        let storage: BucketStorage<u64> = BucketStorage::new();
        assert!(storage.is_empty());
        assert_eq!(storage.len(), 0);
        assert_eq!(storage.capacity(), 0);
        assert_eq!(storage.block_capacity(), DEFAULT_BLOCK_CAPACITY);
        assert_eq!(storage.begin(), storage.end());
        assert!(storage.front().is_none());
        assert!(storage.back().is_none());
        storage.assert_invariants();
    }

    #[test]
    fn insert_fills_buckets_in_order() {
        let mut storage = storage(4);
        for i in 0..10 {
            storage.insert(i);
            storage.assert_invariants();
        }
        assert_eq!(storage.bucket_count(), 3);
        assert_eq!(storage.capacity(), 12);
        assert_eq!(storage.iter().copied().collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn freed_bucket_becomes_incomplete_head() {
        let mut storage = storage(2);
        let a = storage.insert(1);
        storage.insert(2);
        storage.insert(3);
        storage.insert(4);
        storage.insert(5); // third bucket, incomplete head

        storage.erase(a);
        storage.assert_invariants();
        assert_eq!(storage.incomplete, a.bucket);

        let f = storage.insert(6);
        assert!(f.same_bucket(&a));
        storage.assert_invariants();
    }

    #[test]
    fn emptied_bucket_is_released() {
        let mut storage = storage(2);
        let a = storage.insert(1);
        let b = storage.insert(2);
        let c = storage.insert(3);

        storage.erase(a);
        storage.assert_invariants();
        assert_eq!(storage.bucket_count(), 2);

        // Middle of chain: bucket 0 goes, bucket 1 becomes first.
        storage.erase(b);
        storage.assert_invariants();
        assert_eq!(storage.bucket_count(), 1);
        assert_eq!(storage.begin(), c);
    }

    #[test]
    fn releasing_middle_bucket_relinks_neighbours() {
        let mut storage = storage(1);
        let a = storage.insert(1);
        let b = storage.insert(2);
        let c = storage.insert(3);

        assert_eq!(storage.erase(b), c);
        storage.assert_invariants();
        assert_eq!(storage.next_position(a), c);
        assert_eq!(storage.prev_position(c), a);
    }

    #[test]
    fn capacity_one_full_to_empty() {
        // A full single-slot bucket was never on the incomplete chain.
        let mut storage = storage(1);
        let a = storage.insert(1);
        assert_eq!(storage.incomplete, storage.last);
        storage.erase(a);
        storage.assert_invariants();
        assert!(storage.is_empty());
        assert_eq!(storage.bucket_count(), 0);
    }

    #[test]
    fn erase_returns_successor() {
        let mut storage = storage(3);
        let positions: Vec<_> = (0..7).map(|i| storage.insert(i)).collect();

        // Last in bucket: successor in next bucket.
        assert_eq!(storage.erase(positions[2]), positions[3]);
        // Within bucket.
        assert_eq!(storage.erase(positions[3]), positions[4]);
        // Last element overall.
        assert_eq!(storage.erase(positions[6]), storage.end());
        storage.assert_invariants();
    }

    #[test]
    fn stale_position_is_rejected() {
        let mut storage = storage(4);
        let a = storage.insert(1);
        storage.insert(2);
        storage.erase(a);

        // Same slot recycled with a new stamp.
        let c = storage.insert(3);
        assert_eq!(c.slot(), a.slot());
        assert!(storage.get(a).is_none());
        assert!(storage.remove(a).is_none());
        assert_eq!(storage.get(c), Some(&3));
    }

    #[test]
    #[should_panic(expected = "no live element")]
    fn erase_end_panics() {
        let mut storage = storage(4);
        storage.insert(1);
        let end = storage.end();
        storage.erase(end);
    }

    #[test]
    #[should_panic(expected = "past end")]
    fn next_of_end_panics() {
        let storage = storage(4);
        storage.next_position(storage.end());
    }

    #[test]
    #[should_panic(expected = "before begin")]
    fn prev_of_begin_panics() {
        let mut storage = storage(4);
        storage.insert(1);
        storage.prev_position(storage.begin());
    }

    #[test]
    fn prev_of_end_is_last() {
        let mut storage = storage(2);
        storage.insert(1);
        storage.insert(2);
        let last = storage.insert(3);
        assert_eq!(storage.prev_position(storage.end()), last);
    }

    #[test]
    fn failed_construction_rolls_back_new_bucket() {
        let mut storage = storage(2);
        storage.insert(1);
        storage.insert(2);
        assert_eq!(storage.incomplete, storage.last);

        let result = storage.try_insert_with(|| Err::<u64, _>("boom"));
        assert!(matches!(result, Err(InsertError::Construct("boom"))));
        assert_eq!(storage.bucket_count(), 1);
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.incomplete, storage.last);
        storage.assert_invariants();
    }

    #[test]
    fn failed_construction_keeps_existing_incomplete_bucket() {
        let mut storage = storage(4);
        storage.insert(1);
        let before = storage.incomplete;

        let result = storage.try_insert_with(|| Err::<u64, _>(()));
        assert!(result.is_err());
        assert_eq!(storage.bucket_count(), 1);
        assert_eq!(storage.incomplete, before);
        storage.assert_invariants();
    }

    #[test]
    fn panicking_construction_rolls_back() {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let mut storage = storage(2);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _ = storage.try_insert_with(|| -> Result<u64, ()> { panic!("ctor") });
        }));
        assert!(result.is_err());
        assert_eq!(storage.bucket_count(), 0);
        storage.assert_invariants();
    }

    #[test]
    fn clear_releases_everything() {
        let mut storage = storage(3);
        for i in 0..10 {
            storage.insert(i);
        }
        storage.clear();
        storage.assert_invariants();
        assert!(storage.is_empty());
        assert_eq!(storage.bucket_count(), 0);

        storage.insert(42);
        storage.assert_invariants();
        assert_eq!(storage.front(), Some(&42));
    }

    #[test]
    fn shrink_to_fit_packs_buckets() {
        let mut storage = storage(4);
        let positions: Vec<_> = (0..16).map(|i| storage.insert(i)).collect();
        // Leave one element in each bucket.
        for (i, pos) in positions.iter().enumerate() {
            if i % 4 != 0 {
                storage.erase(*pos);
            }
        }
        assert_eq!(storage.bucket_count(), 4);

        storage.shrink_to_fit();
        storage.assert_invariants();
        assert_eq!(storage.bucket_count(), 1);
        assert_eq!(storage.iter().copied().collect::<Vec<_>>(), vec![0, 4, 8, 12]);
    }

    #[test]
    fn failed_shrink_leaves_storage_intact() {
        // 64 KiB elements: a bucket of MAX_BLOCK_CAPACITY of these exceeds
        // any address space.
        type Page = [u64; 8192];

        let mut storage: BucketStorage<Page> = BucketStorage::with_block_capacity(2).unwrap();
        let positions: Vec<_> = (0..5).map(|i| storage.insert([i; 8192])).collect();
        storage.erase(positions[1]);
        let content = mem::replace(
            &mut storage.content,
            SharedContent::new(crate::MAX_BLOCK_CAPACITY),
        );

        let err = storage.try_shrink_to_fit().unwrap_err();
        assert!(matches!(err, Error::Alloc { .. }));

        storage.content = content;
        storage.assert_invariants();
        assert_eq!(storage.len(), 4);
        assert_eq!(storage.bucket_count(), 3);
        assert_eq!(storage.iter().map(|page| page[0]).collect::<Vec<_>>(), vec![0, 2, 3, 4]);
        assert_eq!(storage.get(positions[4]).map(|page| page[8191]), Some(4));
    }

    #[test]
    fn shrink_of_empty_storage_allocates_nothing() {
        let mut storage = storage(4);
        let a = storage.insert(1);
        storage.erase(a);
        storage.try_shrink_to_fit().unwrap();
        assert_eq!(storage.bucket_count(), 0);
        storage.assert_invariants();
    }

    #[test]
    fn max_size_bounds_len() {
        let storage = storage(4);
        assert!(storage.max_size() >= storage.len());
        assert_eq!(storage.max_size(), isize::MAX as usize / mem::size_of::<Option<u64>>());

        let unit: BucketStorage<()> = BucketStorage::new();
        assert_eq!(unit.max_size(), isize::MAX as usize);
    }

    #[test]
    fn get_to_distance_matches_stepping() {
        let mut storage = storage(3);
        let positions: Vec<_> = (0..20).map(|i| storage.insert(i)).collect();
        for pos in positions.iter().step_by(4) {
            storage.erase(*pos);
        }
        let order: Vec<Position> = {
            let mut out = Vec::new();
            let mut pos = storage.begin();
            while pos != storage.end() {
                out.push(pos);
                pos = storage.next_position(pos);
            }
            out.push(pos);
            out
        };

        for from in 0..order.len() {
            for to in 0..order.len() {
                let distance = to as isize - from as isize;
                assert_eq!(
                    storage.get_to_distance(order[from], distance),
                    order[to],
                    "from {from} by {distance}"
                );
            }
        }
    }

    #[test]
    fn iter_mut_visits_in_order() {
        let mut storage = storage(3);
        let positions: Vec<_> = (0..8).map(|i| storage.insert(i)).collect();
        storage.erase(positions[1]);
        storage.insert(100);

        for value in storage.iter_mut() {
            *value *= 2;
        }
        // 100 reused slot 1 of the first bucket, after its survivors.
        assert_eq!(
            storage.iter().copied().collect::<Vec<_>>(),
            vec![0, 4, 200, 6, 8, 10, 12, 14]
        );
    }

    #[test]
    fn clone_preserves_positions() {
        let mut storage = storage(2);
        let a = storage.insert(1);
        let b = storage.insert(2);
        storage.insert(3);

        let mut copy = storage.clone();
        copy.assert_invariants();
        assert_eq!(copy.get(b), Some(&2));

        *copy.get_mut(a).unwrap() = 10;
        let d = copy.insert(4);
        assert!(d.stamp() > b.stamp());
        assert_eq!(storage.get(a), Some(&1));
        assert_eq!(storage.len(), 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u64),
        Erase(usize),
        Shrink,
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => any::<u64>().prop_map(Op::Insert),
            4 => any::<usize>().prop_map(Op::Erase),
            1 => Just(Op::Shrink),
        ]
    }

    proptest! {
        #[test]
        fn prop_invariants_hold(cap in 1usize..6, ops in prop::collection::vec(arb_op(), 1..200)) {
            let mut storage = storage(cap);
            let mut live: Vec<Position> = Vec::new();

            for op in ops {
                match op {
                    Op::Insert(v) => live.push(storage.insert(v)),
                    Op::Erase(i) if !live.is_empty() => {
                        let pos = live.swap_remove(i % live.len());
                        storage.erase(pos);
                    }
                    Op::Erase(_) => {}
                    Op::Shrink => {
                        storage.shrink_to_fit();
                        live.clear();
                        let mut pos = storage.begin();
                        while pos != storage.end() {
                            live.push(pos);
                            pos = storage.next_position(pos);
                        }
                    }
                }
                storage.assert_invariants();
                prop_assert_eq!(storage.len(), live.len());
            }
        }
    }
}
