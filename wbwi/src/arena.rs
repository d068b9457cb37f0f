//! Bump arena for index nodes.
//!
//! Values are appended and addressed by a compact [`ArenaId`]. Nothing is freed
//! individually: skip-list nodes that get unlinked stay allocated until the whole
//! arena is cleared or dropped together with its batch.
//!
//! # Invariants
//!
//! - Ids are dense and handed out in allocation order
//! - An id stays valid until `clear()` (ids are never reused before that)

// Ids are u32 to keep skip-list links small; allocation asserts the bound.
#![allow(clippy::cast_possible_truncation)]

use std::mem::size_of;

/// Handle to a value allocated in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId(u32);

impl ArenaId {
    /// Position of the value inside its arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Id of the value `n` slots after this one.
    ///
    /// Used for values allocated contiguously with `alloc_extend`.
    #[must_use]
    pub const fn offset(self, n: usize) -> Self {
        Self(self.0 + n as u32)
    }
}

/// A typed bump allocator.
#[derive(Debug)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Arena<T> {
    /// Create an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Create an arena with room for `capacity` values before it reallocates.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Allocate a single value.
    ///
    /// # Panics
    /// Panics if the arena already holds `u32::MAX` values.
    pub fn alloc(&mut self, value: T) -> ArenaId {
        let id = self.next_id();
        self.items.push(value);
        id
    }

    /// Allocate a run of values in consecutive slots and return the first id.
    ///
    /// An empty iterator returns the id the next allocation would get.
    pub fn alloc_extend(&mut self, values: impl IntoIterator<Item = T>) -> ArenaId {
        let first = self.next_id();
        self.items.extend(values);
        assert!(
            self.items.len() <= u32::MAX as usize,
            "arena exhausted its id space"
        );
        first
    }

    /// Borrow an allocated value.
    #[must_use]
    pub fn get(&self, id: ArenaId) -> &T {
        &self.items[id.index()]
    }

    /// Mutably borrow an allocated value.
    pub fn get_mut(&mut self, id: ArenaId) -> &mut T {
        &mut self.items[id.index()]
    }

    /// Number of values ever allocated since the last clear.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bytes reserved by the arena, including unused capacity.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn allocated_bytes(&self) -> usize {
        self.items.capacity() * size_of::<T>()
    }

    /// Release every value at once. All outstanding ids become invalid.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[allow(clippy::missing_const_for_fn)]
    fn next_id(&self) -> ArenaId {
        assert!(
            self.items.len() < u32::MAX as usize,
            "arena exhausted its id space"
        );
        ArenaId(self.items.len() as u32)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
