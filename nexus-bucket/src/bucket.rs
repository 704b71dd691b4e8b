//! Fixed-capacity block of slots with an embedded slot ring.
//!
//! Each bucket owns `capacity` element slots plus three parallel buffers:
//!
//! ```text
//! slots    [Option<T>; capacity]   element storage, allocated once
//! next_of  [u32; capacity]         ring successor
//! prev_of  [u32; capacity]         ring predecessor
//! id_of    [u64; capacity]         insertion stamp
//! ```
//!
//! `next_of`/`prev_of` form one circular doubly-linked ring over every slot
//! that has ever been used. Walking from `first` reaches the active slots in
//! insertion order up to `last`; the slots between `last` and `first` are
//! vacant and recycled before any never-used slot:
//!
//! ```text
//!   first ─► a ─► b ─► last ─► free ─► free ─┐
//!     ▲                                       │
//!     └───────────────────────────────────────┘
//! ```
//!
//! Never-used slots form the prefix-free tail `len..capacity` once the ring
//! has no vacant entries, so no separate free list is needed.

use std::collections::TryReserveError;

/// Missing bucket link.
pub(crate) const NONE: usize = usize::MAX;

/// Id carried by the sentinel bucket and the `end()` position.
pub(crate) const SENTINEL_ID: u64 = u64::MAX;

/// A block of element slots plus its chain links.
///
/// Links are handles into the storage's bucket arena: `next`/`prev` for the
/// main chain (creation order) and `next_incomplete`/`prev_incomplete` for
/// the chain of buckets with free capacity.
#[derive(Debug, Clone)]
pub(crate) struct Bucket<T> {
    id: u64,
    slots: Box<[Option<T>]>,
    next_of: Box<[u32]>,
    prev_of: Box<[u32]>,
    id_of: Box<[u64]>,
    first: u32,
    last: u32,
    len: u32,
    pub(crate) next: usize,
    pub(crate) prev: usize,
    pub(crate) next_incomplete: usize,
    pub(crate) prev_incomplete: usize,
}

impl<T> Bucket<T> {
    /// Allocates a bucket with `capacity` slots.
    ///
    /// Every buffer is reserved fallibly; nothing is leaked on failure.
    pub(crate) fn try_new(id: u64, capacity: usize) -> Result<Self, TryReserveError> {
        debug_assert!(capacity > 0 && capacity <= u32::MAX as usize);
        Ok(Self {
            id,
            slots: buffer(capacity, || None)?,
            next_of: buffer(capacity, || 0)?,
            prev_of: buffer(capacity, || 0)?,
            id_of: buffer(capacity, || 0)?,
            first: 0,
            last: 0,
            len: 0,
            next: NONE,
            prev: NONE,
            next_incomplete: NONE,
            prev_incomplete: NONE,
        })
    }

    /// The zero-slot terminal bucket standing for `end()`.
    pub(crate) fn sentinel() -> Self {
        Self {
            id: SENTINEL_ID,
            slots: Box::default(),
            next_of: Box::default(),
            prev_of: Box::default(),
            id_of: Box::default(),
            first: 0,
            last: 0,
            len: 0,
            next: NONE,
            prev: NONE,
            next_incomplete: NONE,
            prev_incomplete: NONE,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// First bucket of the main chain.
    #[inline]
    pub(crate) fn is_begin(&self) -> bool {
        self.prev == NONE
    }

    /// Only the sentinel has no successor.
    #[inline]
    pub(crate) fn is_end(&self) -> bool {
        self.next == NONE
    }

    #[inline]
    pub(crate) fn first_index(&self) -> u32 {
        self.first
    }

    #[inline]
    pub(crate) fn last_index(&self) -> u32 {
        self.last
    }

    #[inline]
    pub(crate) fn next_index(&self, index: u32) -> u32 {
        self.next_of[index as usize]
    }

    #[inline]
    pub(crate) fn prev_index(&self, index: u32) -> u32 {
        self.prev_of[index as usize]
    }

    /// Insertion stamp of the element at `index`.
    #[inline]
    pub(crate) fn id_at(&self, index: u32) -> u64 {
        self.id_of[index as usize]
    }

    /// Returns `true` if `index` is occupied by the element stamped `id`.
    #[inline]
    pub(crate) fn holds(&self, index: u32, id: u64) -> bool {
        let i = index as usize;
        self.id_of.get(i) == Some(&id) && self.slots[i].is_some()
    }

    #[inline]
    pub(crate) fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize)?.as_ref()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize)?.as_mut()
    }

    /// Stores `value` stamped with `id`, returning its slot.
    ///
    /// The caller guarantees the bucket is not full.
    pub(crate) fn insert(&mut self, value: T, id: u64) -> u32 {
        debug_assert!(!self.is_full(), "insert into full bucket");

        let (index, fresh) = self.vacant_slot();
        if fresh {
            self.splice_after_last(index);
        }

        let i = index as usize;
        self.slots[i] = Some(value);
        self.id_of[i] = id;
        self.last = index;
        self.len += 1;
        index
    }

    /// Moves the value out of `index` and returns the slot to the ring's
    /// vacant segment.
    ///
    /// # Panics
    ///
    /// Panics if the slot is vacant.
    pub(crate) fn take(&mut self, index: u32) -> T {
        let value = match self.slots[index as usize].take() {
            Some(value) => value,
            None => panic!("removing from vacant slot"),
        };

        if index == self.first {
            // Old first now sits after the vacant segment.
            self.first = self.next_of[index as usize];
        } else if index == self.last {
            // Old last is now the first vacant slot.
            self.last = self.prev_of[index as usize];
        } else {
            let prev = self.prev_of[index as usize];
            let next = self.next_of[index as usize];
            self.next_of[prev as usize] = next;
            self.prev_of[next as usize] = prev;
            self.splice_after_last(index);
        }

        self.len -= 1;
        value
    }

    /// Pushes references to every live value, in ring order, onto `out`.
    pub(crate) fn collect_mut<'a>(&'a mut self, out: &mut Vec<&'a mut T>) {
        if self.len == 0 {
            return;
        }

        let mut refs: Vec<Option<&'a mut T>> = self.slots.iter_mut().map(Option::as_mut).collect();
        let mut index = self.first;
        loop {
            if let Some(value) = refs[index as usize].take() {
                out.push(value);
            }
            if index == self.last {
                break;
            }
            index = self.next_of[index as usize];
        }
    }

    /// Picks the slot for the next insert: `(index, never_used)`.
    ///
    /// Recycled slots are already linked right after `last`; never-used
    /// slots still have to be spliced in.
    #[inline]
    fn vacant_slot(&mut self) -> (u32, bool) {
        if self.len == 0 {
            // Restart the ring as the single slot 0.
            self.first = 0;
            self.last = 0;
            self.next_of[0] = 0;
            self.prev_of[0] = 0;
            return (0, false);
        }

        let after_last = self.next_of[self.last as usize];
        if after_last == self.first {
            (self.len, true)
        } else {
            (after_last, false)
        }
    }

    /// Links `index` between `last` and whatever follows it.
    #[inline]
    fn splice_after_last(&mut self, index: u32) {
        let last = self.last;
        let after = self.next_of[last as usize];
        self.next_of[last as usize] = index;
        self.prev_of[after as usize] = index;
        self.next_of[index as usize] = after;
        self.prev_of[index as usize] = last;
    }
}

/// Allocates a boxed buffer of `len` elements without aborting on OOM.
fn buffer<U>(len: usize, fill: impl FnMut() -> U) -> Result<Box<[U]>, TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize_with(len, fill);
    Ok(buf.into_boxed_slice())
}
