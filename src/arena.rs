//! Order Arena - slab storage for resting orders.
//!
//! The book owns every resting order through this arena. Price levels and
//! the order index only ever hold `ArenaIndex` keys into it, never a second
//! owning handle. Freed slots are recycled through a free list threaded
//! through the `next` field, so steady-state churn does not allocate.

use std::fmt;

use rust_decimal::Decimal;

use crate::command::Side;

/// Sentinel value representing a null/invalid index
pub const NULL_INDEX: u32 = u32::MAX;

/// Type alias for arena indices - compressed "pointers" into the slab
pub type ArenaIndex = u32;

/// A single resting order plus its FIFO linkage within a price level.
#[derive(Clone, PartialEq, Eq)]
pub struct OrderNode {
    /// Caller-assigned order ID
    pub order_id: String,
    /// Book side, fixed for the life of the order
    pub side: Side,
    /// Limit price, fixed for the life of the order
    pub price: Decimal,
    /// Current resting quantity
    pub quantity: Decimal,
    /// Creation time in nanoseconds (informational)
    pub timestamp_ns: i64,

    // === Linkage (FIFO queue pointers within a PriceLevel) ===

    /// Index of next order at same price level
    pub next: ArenaIndex,
    /// Index of previous order (enables O(1) cancel)
    pub prev: ArenaIndex,
}

impl OrderNode {
    /// Create a new unlinked order node
    #[inline]
    pub fn new(
        order_id: String,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        timestamp_ns: i64,
    ) -> Self {
        Self {
            order_id,
            side,
            price,
            quantity,
            timestamp_ns,
            next: NULL_INDEX,
            prev: NULL_INDEX,
        }
    }

    /// Create an empty node (for the free list)
    #[inline]
    pub const fn empty() -> Self {
        Self {
            order_id: String::new(),
            side: Side::Bid,
            price: Decimal::ZERO,
            quantity: Decimal::ZERO,
            timestamp_ns: 0,
            next: NULL_INDEX,
            prev: NULL_INDEX,
        }
    }
}

impl fmt::Debug for OrderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNode")
            .field("order_id", &self.order_id)
            .field("side", &self.side)
            .field("price", &self.price)
            .field("quantity", &self.quantity)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// Growable slab with O(1) allocation and deallocation.
pub struct Arena {
    /// Slots, live and free
    nodes: Vec<OrderNode>,

    /// Head of the free list (index of first recyclable slot)
    free_head: ArenaIndex,

    /// Number of currently allocated nodes
    allocated_count: u32,
}

impl Arena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an arena with room for `capacity` orders before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            free_head: NULL_INDEX,
            allocated_count: 0,
        }
    }

    /// Store a node in the arena.
    ///
    /// Reuses a freed slot when one is available, otherwise grows the slab.
    /// Returns `None` only when the 32-bit index space is exhausted.
    ///
    /// # Complexity
    /// O(1) amortized
    #[inline]
    pub fn alloc(&mut self, mut node: OrderNode) -> Option<ArenaIndex> {
        node.next = NULL_INDEX;
        node.prev = NULL_INDEX;

        let index = if self.free_head != NULL_INDEX {
            let index = self.free_head;
            self.free_head = self.nodes[index as usize].next;
            self.nodes[index as usize] = node;
            index
        } else {
            let index = u32::try_from(self.nodes.len()).ok().filter(|&i| i != NULL_INDEX)?;
            self.nodes.push(node);
            index
        };

        self.allocated_count += 1;
        Some(index)
    }

    /// Release a slot and hand back the order it held.
    ///
    /// The caller must ensure the index is live (allocated and not yet
    /// freed) and already unlinked from its price level.
    ///
    /// # Complexity
    /// O(1) - pushes to head of free list
    #[inline]
    pub fn free(&mut self, index: ArenaIndex) -> OrderNode {
        debug_assert!((index as usize) < self.nodes.len(), "Index out of bounds");
        debug_assert!(self.allocated_count > 0, "Double free detected");

        let mut node = std::mem::replace(&mut self.nodes[index as usize], OrderNode::empty());
        self.nodes[index as usize].next = self.free_head;
        self.free_head = index;
        self.allocated_count -= 1;

        node.next = NULL_INDEX;
        node.prev = NULL_INDEX;
        node
    }

    /// Get an immutable reference to a node.
    #[inline]
    pub fn get(&self, index: ArenaIndex) -> &OrderNode {
        debug_assert!((index as usize) < self.nodes.len(), "Index out of bounds");
        &self.nodes[index as usize]
    }

    /// Get a mutable reference to a node.
    #[inline]
    pub fn get_mut(&mut self, index: ArenaIndex) -> &mut OrderNode {
        debug_assert!((index as usize) < self.nodes.len(), "Index out of bounds");
        &mut self.nodes[index as usize]
    }

    /// Returns the number of currently allocated nodes.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated_count
    }

    /// Returns the number of slots (live or free) backing the arena.
    #[inline]
    pub fn slots(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no nodes are allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }

    /// Drop every node and reset the free list.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_head = NULL_INDEX;
        self.allocated_count = 0;
    }

    /// Make room for at least `additional` more orders without reallocating.
    pub fn reserve(&mut self, additional: usize) {
        self.nodes.reserve(additional);
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("slots", &self.nodes.len())
            .field("allocated", &self.allocated_count)
            .field("free_head", &self.free_head)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn node(id: &str, qty: Decimal) -> OrderNode {
        OrderNode::new(id.to_string(), Side::Bid, dec!(100), qty, 0)
    }

    #[test]
    fn test_arena_creation() {
        let arena = Arena::with_capacity(100);
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.slots(), 0);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_arena_alloc_free() {
        let mut arena = Arena::new();

        let idx0 = arena.alloc(node("a", dec!(1))).expect("Should allocate");
        let idx1 = arena.alloc(node("b", dec!(2))).expect("Should allocate");
        let idx2 = arena.alloc(node("c", dec!(3))).expect("Should allocate");
        assert_eq!(arena.allocated(), 3);

        // Free one and get the order back
        let freed = arena.free(idx1);
        assert_eq!(freed.order_id, "b");
        assert_eq!(freed.quantity, dec!(2));
        assert_eq!(arena.allocated(), 2);

        // Allocate again (should reuse idx1's slot)
        let idx3 = arena.alloc(node("d", dec!(4))).expect("Should allocate");
        assert_eq!(idx3, idx1, "Should reuse freed slot");
        assert_eq!(arena.slots(), 3);
        assert_eq!(arena.get(idx3).order_id, "d");

        arena.free(idx0);
        arena.free(idx2);
        arena.free(idx3);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_arena_get_set() {
        let mut arena = Arena::new();
        let idx = arena.alloc(node("x", dec!(100))).unwrap();

        arena.get_mut(idx).quantity = dec!(250.5);

        let node = arena.get(idx);
        assert_eq!(node.order_id, "x");
        assert_eq!(node.quantity, dec!(250.5));
        assert_eq!(node.next, NULL_INDEX);
        assert_eq!(node.prev, NULL_INDEX);
    }

    #[test]
    fn test_alloc_resets_linkage() {
        let mut arena = Arena::new();
        let mut linked = node("x", dec!(1));
        linked.next = 7;
        linked.prev = 3;

        let idx = arena.alloc(linked).unwrap();
        assert_eq!(arena.get(idx).next, NULL_INDEX);
        assert_eq!(arena.get(idx).prev, NULL_INDEX);
    }

    #[test]
    fn test_arena_clear() {
        let mut arena = Arena::new();
        arena.alloc(node("a", dec!(1))).unwrap();
        let idx = arena.alloc(node("b", dec!(1))).unwrap();
        arena.free(idx);

        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.slots(), 0);
        assert_eq!(arena.alloc(node("c", dec!(1))), Some(0));
    }
}
