//! Iterators over a [`BucketStorage`].
//!
//! All three walk elements in position order: buckets in creation order,
//! and within a bucket from `first` to `last` along the slot ring.

use std::iter::FusedIterator;

use crate::{BucketStorage, Position};

// =============================================================================
// Iter
// =============================================================================

/// Iterator over references to the elements of a [`BucketStorage`].
pub struct Iter<'a, T> {
    storage: &'a BucketStorage<T>,
    front: Position,
    back: Position,
    remaining: usize,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(storage: &'a BucketStorage<T>) -> Self {
        Self {
            storage,
            front: storage.begin(),
            back: storage.end(),
            remaining: storage.len(),
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let pos = self.front;
        self.front = self.storage.next_position(pos);
        self.remaining -= 1;
        self.storage.value_at(pos)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        self.back = self.storage.prev_position(self.back);
        self.remaining -= 1;
        self.storage.value_at(self.back)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

// =============================================================================
// IterMut
// =============================================================================

/// Iterator over mutable references to the elements of a [`BucketStorage`].
///
/// The references are gathered up front, one per live element, so creating
/// the iterator costs O(len) time and allocates a buffer of `len` pointers
/// (plus scratch space proportional to the bucket arena and one bucket).
/// Prefer [`Iter`] or a [`CursorMut`](crate::CursorMut) on hot paths.
pub struct IterMut<'a, T> {
    inner: std::vec::IntoIter<&'a mut T>,
}

impl<'a, T> IterMut<'a, T> {
    pub(crate) fn new(values: Vec<&'a mut T>) -> Self {
        Self {
            inner: values.into_iter(),
        }
    }
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<T> FusedIterator for IterMut<'_, T> {}

// =============================================================================
// IntoIter
// =============================================================================

/// Owning iterator; elements are moved out front to back.
///
/// Buckets are released as they drain. Dropping the iterator drops the
/// remaining elements.
pub struct IntoIter<T> {
    storage: BucketStorage<T>,
}

impl<T> IntoIter<T> {
    pub(crate) fn new(storage: BucketStorage<T>) -> Self {
        Self { storage }
    }
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        self.storage.pop_front()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.storage.len(), Some(self.storage.len()))
    }
}

impl<T> DoubleEndedIterator for IntoIter<T> {
    #[inline]
    fn next_back(&mut self) -> Option<T> {
        self.storage.pop_back()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> FusedIterator for IntoIter<T> {}
