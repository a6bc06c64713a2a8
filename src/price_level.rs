//! Price Level - A FIFO queue of orders at a single price point.
//!
//! Implements a doubly-linked list using arena indices for O(1)
//! append and O(1) removal from any position.

use rust_decimal::Decimal;

use crate::arena::{Arena, ArenaIndex, NULL_INDEX};

/// A queue of orders resting at one price on one side of the book.
///
/// Orders keep their insertion order. Quantity amendments patch the
/// order in place and never move it within the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceLevel {
    /// The level's key, fixed at creation
    pub price: Decimal,
    /// Index of the oldest order
    pub head: ArenaIndex,
    /// Index of the newest order
    pub tail: ArenaIndex,
    /// Total quantity across all orders at this level
    pub total_volume: Decimal,
    /// Number of orders at this level
    pub count: u32,
}

impl PriceLevel {
    /// Create a new empty price level
    #[inline]
    pub const fn new(price: Decimal) -> Self {
        Self {
            price,
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_volume: Decimal::ZERO,
            count: 0,
        }
    }

    /// Returns true if there are no orders at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether `quantity` can join this level without overflowing its volume.
    #[inline]
    pub fn can_accept(&self, quantity: Decimal) -> bool {
        self.total_volume.checked_add(quantity).is_some()
    }

    /// Append an order to the tail of the queue (newest order).
    ///
    /// The caller checks [`can_accept`](Self::can_accept) first.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn push_back(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let quantity = arena.get(index).quantity;

        if self.tail == NULL_INDEX {
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
            self.tail = index;
            let node = arena.get_mut(index);
            node.prev = NULL_INDEX;
            node.next = NULL_INDEX;
        } else {
            arena.get_mut(self.tail).next = index;
            let node = arena.get_mut(index);
            node.prev = self.tail;
            node.next = NULL_INDEX;
            self.tail = index;
        }

        self.count += 1;
        self.total_volume += quantity;
    }

    /// Unlink an order from anywhere in the queue.
    ///
    /// Returns `true` if the level is now empty. The order is NOT freed
    /// from the arena; the caller must do that.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn remove(&mut self, arena: &mut Arena, index: ArenaIndex) -> bool {
        let node = arena.get(index);
        let prev_idx = node.prev;
        let next_idx = node.next;
        let quantity = node.quantity;

        if prev_idx == NULL_INDEX {
            debug_assert!(self.head == index);
            self.head = next_idx;
        } else {
            arena.get_mut(prev_idx).next = next_idx;
        }

        if next_idx == NULL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev_idx;
        } else {
            arena.get_mut(next_idx).prev = prev_idx;
        }

        self.count -= 1;
        self.total_volume -= quantity;

        let node = arena.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.is_empty()
    }

    /// Level volume once one of its orders moves from `old` to `new`.
    ///
    /// `None` if the result does not fit in a `Decimal`.
    #[inline]
    pub fn volume_after_amend(&self, old: Decimal, new: Decimal) -> Option<Decimal> {
        self.total_volume.checked_sub(old)?.checked_add(new)
    }

    /// Walk the queue from oldest to newest.
    pub fn iter<'a>(&self, arena: &'a Arena) -> LevelIter<'a> {
        LevelIter { arena, cursor: self.head }
    }
}

/// Iterator over the arena indices of a level, oldest first.
pub struct LevelIter<'a> {
    arena: &'a Arena,
    cursor: ArenaIndex,
}

impl Iterator for LevelIter<'_> {
    type Item = ArenaIndex;

    fn next(&mut self) -> Option<ArenaIndex> {
        if self.cursor == NULL_INDEX {
            return None;
        }
        let index = self.cursor;
        self.cursor = self.arena.get(index).next;
        Some(index)
    }
}
