//! Cursors over a [`BucketStorage`].
//!
//! A cursor is a [`Position`] bound to the storage it came from. It can sit
//! on any element or on the end position, and steps with the same rules as
//! [`BucketStorage::next_position`] / [`BucketStorage::prev_position`],
//! except that stepping off either end is a no-op instead of a panic.

use crate::{BucketStorage, Position};

// =============================================================================
// Cursor
// =============================================================================

/// Read-only cursor.
pub struct Cursor<'a, T> {
    storage: &'a BucketStorage<T>,
    pos: Position,
}

impl<'a, T> Cursor<'a, T> {
    #[inline]
    pub(crate) fn new(storage: &'a BucketStorage<T>, pos: Position) -> Self {
        Self { storage, pos }
    }

    /// Position the cursor is on.
    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    /// Element under the cursor, or `None` at the end.
    #[inline]
    pub fn current(&self) -> Option<&'a T> {
        self.storage.get(self.pos)
    }

    /// Returns `true` if the cursor is on the end position.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.pos.is_end()
    }

    /// Steps forward. Returns `false` (and stays put) at the end.
    #[inline]
    pub fn move_next(&mut self) -> bool {
        if self.pos.is_end() {
            return false;
        }
        self.pos = self.storage.next_position(self.pos);
        true
    }

    /// Steps back. Returns `false` (and stays put) at the first element.
    #[inline]
    pub fn move_prev(&mut self) -> bool {
        if self.pos == self.storage.begin() {
            return false;
        }
        self.pos = self.storage.prev_position(self.pos);
        true
    }

    /// Moves by `distance` elements; see [`BucketStorage::get_to_distance`].
    ///
    /// # Panics
    ///
    /// Panics if the move leaves `begin()..=end()`.
    #[inline]
    pub fn seek(&mut self, distance: isize) {
        self.pos = self.storage.get_to_distance(self.pos, distance);
    }
}

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<'_, T> {}

// =============================================================================
// CursorMut
// =============================================================================

/// Cursor with exclusive access, able to modify, remove and insert.
///
/// # Example
///
/// ```
/// use nexus_bucket::BucketStorage;
///
/// let mut storage: BucketStorage<u32> = (1..=6).collect();
///
/// // Drop the even values, scale the rest.
/// let mut cursor = storage.cursor_front_mut();
/// while let Some(value) = cursor.current_mut() {
///     if *value % 2 == 0 {
///         cursor.remove_current(); // moves to the successor
///     } else {
///         *value *= 10;
///         cursor.move_next();
///     }
/// }
///
/// assert_eq!(storage.iter().copied().collect::<Vec<_>>(), [10, 30, 50]);
/// ```
pub struct CursorMut<'a, T> {
    storage: &'a mut BucketStorage<T>,
    pos: Position,
}

impl<'a, T> CursorMut<'a, T> {
    #[inline]
    pub(crate) fn new(storage: &'a mut BucketStorage<T>, pos: Position) -> Self {
        Self { storage, pos }
    }

    /// Position the cursor is on.
    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    /// Element under the cursor, or `None` at the end.
    #[inline]
    pub fn current(&self) -> Option<&T> {
        self.storage.get(self.pos)
    }

    /// Mutable access to the element under the cursor.
    #[inline]
    pub fn current_mut(&mut self) -> Option<&mut T> {
        self.storage.get_mut(self.pos)
    }

    /// Returns `true` if the cursor is on the end position.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.pos.is_end()
    }

    /// Steps forward. Returns `false` (and stays put) at the end.
    #[inline]
    pub fn move_next(&mut self) -> bool {
        if self.pos.is_end() {
            return false;
        }
        self.pos = self.storage.next_position(self.pos);
        true
    }

    /// Steps back. Returns `false` (and stays put) at the first element.
    #[inline]
    pub fn move_prev(&mut self) -> bool {
        if self.pos == self.storage.begin() {
            return false;
        }
        self.pos = self.storage.prev_position(self.pos);
        true
    }

    /// Moves by `distance` elements; see [`BucketStorage::get_to_distance`].
    ///
    /// # Panics
    ///
    /// Panics if the move leaves `begin()..=end()`.
    #[inline]
    pub fn seek(&mut self, distance: isize) {
        self.pos = self.storage.get_to_distance(self.pos, distance);
    }

    /// Removes the element under the cursor and moves to its successor.
    ///
    /// Returns `None` (cursor unchanged) at the end.
    pub fn remove_current(&mut self) -> Option<T> {
        if !self.storage.contains(self.pos) {
            return None;
        }
        let (value, next) = self.storage.take_at(self.pos);
        self.pos = next;
        Some(value)
    }

    /// Inserts `value` into the storage and returns its position.
    ///
    /// The cursor does not move. Where the new element lands in iteration
    /// order is decided by the storage, not by the cursor.
    #[inline]
    pub fn insert(&mut self, value: T) -> Position {
        self.storage.insert(value)
    }

    /// Read-only view at the same position.
    #[inline]
    pub fn as_cursor(&self) -> Cursor<'_, T> {
        Cursor::new(self.storage, self.pos)
    }
}
