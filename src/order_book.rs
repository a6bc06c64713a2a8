//! Order Book - The passive limit order book for one instrument.
//!
//! Maintains bid and ask price levels in price order with cached best
//! prices, and an O(1) order index for modify and cancel. Bids and asks
//! are never matched against each other.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::arena::{Arena, ArenaIndex, OrderNode};
use crate::command::{AddOrder, BookUpdate, Side};
use crate::error::BookError;
use crate::price_level::PriceLevel;

/// Where an order lives: a non-owning key into the book's structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderInfo {
    /// Slot in the arena
    pub arena_index: ArenaIndex,
    /// Book side (selects the level map)
    pub side: Side,
    /// Price (selects the level)
    pub price: Decimal,
}

/// An owned copy of a resting order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Order {
    pub order_id: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp_ns: i64,
}

impl From<&OrderNode> for Order {
    fn from(node: &OrderNode) -> Self {
        Self {
            order_id: node.order_id.clone(),
            side: node.side,
            price: node.price,
            quantity: node.quantity,
            timestamp_ns: node.timestamp_ns,
        }
    }
}

impl From<OrderNode> for Order {
    fn from(node: OrderNode) -> Self {
        Self {
            order_id: node.order_id,
            side: node.side,
            price: node.price,
            quantity: node.quantity,
            timestamp_ns: node.timestamp_ns,
        }
    }
}

/// Limit order book for a single symbol.
///
/// Both sides are ordered maps keyed by price; bids are read from the top
/// of the map (highest first), asks from the bottom (lowest first).
pub struct OrderBook {
    /// Instrument identifier, fixed at construction
    symbol: String,
    /// Bid price levels (buy orders)
    pub(crate) bids: BTreeMap<Decimal, PriceLevel>,
    /// Ask price levels (sell orders)
    pub(crate) asks: BTreeMap<Decimal, PriceLevel>,
    /// Cached best bid price (highest buy price)
    best_bid: Option<Decimal>,
    /// Cached best ask price (lowest sell price)
    best_ask: Option<Decimal>,
    /// Order lookup map: OrderId -> OrderInfo
    order_index: FxHashMap<String, OrderInfo>,
    /// Owns every resting order
    pub(crate) arena: Arena,
    /// Latest creation timestamp seen on an add
    last_timestamp_ns: i64,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_capacity(symbol, 0)
    }

    /// Create a new order book with room for `orders` resting orders
    pub fn with_capacity(symbol: impl Into<String>, orders: usize) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            best_bid: None,
            best_ask: None,
            order_index: FxHashMap::with_capacity_and_hasher(orders, Default::default()),
            arena: Arena::with_capacity(orders),
            last_timestamp_ns: 0,
        }
    }

    /// The instrument this book represents
    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Get the best bid price (highest buy price)
    #[inline]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.best_bid
    }

    /// Get the best ask price (lowest sell price)
    #[inline]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.best_ask
    }

    /// Get the best price on a given side
    #[inline]
    pub fn best_price(&self, side: Side) -> Option<Decimal> {
        match side {
            Side::Bid => self.best_bid,
            Side::Ask => self.best_ask,
        }
    }

    // ========================================================================
    // Level Access
    // ========================================================================

    /// Get a price level (immutable)
    #[inline]
    pub fn get_level(&self, side: Side, price: Decimal) -> Option<&PriceLevel> {
        match side {
            Side::Bid => self.bids.get(&price),
            Side::Ask => self.asks.get(&price),
        }
    }

    /// Levels of one side in book-priority order (best price first).
    pub fn levels(&self, side: Side) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match side {
            Side::Bid => Box::new(self.bids.values().rev()),
            Side::Ask => Box::new(self.asks.values()),
        }
    }

    /// Orders resting at one level, oldest first.
    pub fn level_orders(&self, side: Side, price: Decimal) -> Vec<Order> {
        self.get_level(side, price)
            .map(|level| {
                level
                    .iter(&self.arena)
                    .map(|index| Order::from(self.arena.get(index)))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Add a resting order to the book.
    ///
    /// Rejects non-positive prices, non-positive quantities and order IDs
    /// that are already resting. A quantity that would push the level's
    /// volume past `Decimal::MAX` is rejected as invalid before anything
    /// is written. On success returns the new state of the order's price
    /// level.
    pub fn add_order(&mut self, order: AddOrder) -> Result<BookUpdate, BookError> {
        if order.price <= Decimal::ZERO {
            return Err(BookError::InvalidPrice {
                order_id: order.order_id,
                price: order.price,
            });
        }
        if order.quantity <= Decimal::ZERO {
            return Err(BookError::InvalidQuantity {
                order_id: order.order_id,
                quantity: order.quantity,
            });
        }
        if self.order_index.contains_key(&order.order_id) {
            return Err(BookError::DuplicateOrder(order.order_id));
        }
        let fits = self
            .get_level(order.side, order.price)
            .map_or(true, |level| level.can_accept(order.quantity));
        if !fits {
            return Err(BookError::InvalidQuantity {
                order_id: order.order_id,
                quantity: order.quantity,
            });
        }

        let AddOrder {
            order_id,
            side,
            price,
            quantity,
            timestamp_ns,
        } = order;

        let arena_index = self
            .arena
            .alloc(OrderNode::new(order_id.clone(), side, price, quantity, timestamp_ns))
            .ok_or_else(|| BookError::Inconsistent("order arena index space exhausted".into()))?;

        self.order_index.insert(
            order_id,
            OrderInfo {
                arena_index,
                side,
                price,
            },
        );

        let levels = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let level = levels.entry(price).or_insert_with(|| {
            tracing::trace!(%side, %price, "price level created");
            PriceLevel::new(price)
        });
        level.push_back(&mut self.arena, arena_index);
        let update = BookUpdate {
            side,
            price,
            new_volume: level.total_volume,
            new_count: level.count,
        };

        self.last_timestamp_ns = self.last_timestamp_ns.max(timestamp_ns);
        self.update_best_prices();

        Ok(update)
    }

    /// Replace the resting quantity of an order in place.
    ///
    /// The level's volume moves by the difference between the new and old
    /// quantity; the order keeps its queue position. A new quantity of zero
    /// removes the order, exactly like a cancel. A quantity that would
    /// overflow the level's volume is rejected and nothing changes.
    pub fn modify_order(
        &mut self,
        order_id: &str,
        new_quantity: Decimal,
    ) -> Result<BookUpdate, BookError> {
        let info = *self
            .order_index
            .get(order_id)
            .ok_or_else(|| BookError::NotFound(order_id.to_string()))?;

        if new_quantity < Decimal::ZERO {
            return Err(BookError::InvalidQuantity {
                order_id: order_id.to_string(),
                quantity: new_quantity,
            });
        }

        if new_quantity.is_zero() {
            let removed = self.cancel_order(order_id)?;
            return Ok(self.level_update(removed.side, removed.price));
        }

        let levels = match info.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let level = levels.get_mut(&info.price).ok_or_else(|| {
            BookError::Inconsistent(format!(
                "order {order_id} indexed at missing {} level {}",
                info.side, info.price
            ))
        })?;

        let node = self.arena.get_mut(info.arena_index);
        let new_volume = level
            .volume_after_amend(node.quantity, new_quantity)
            .ok_or_else(|| BookError::InvalidQuantity {
                order_id: order_id.to_string(),
                quantity: new_quantity,
            })?;
        node.quantity = new_quantity;
        level.total_volume = new_volume;

        Ok(BookUpdate {
            side: info.side,
            price: info.price,
            new_volume: level.total_volume,
            new_count: level.count,
        })
    }

    /// Remove an order from the book.
    ///
    /// Drops the order's price level once it holds no volume. Returns the
    /// cancelled order; an unknown ID fails and leaves the book untouched.
    pub fn cancel_order(&mut self, order_id: &str) -> Result<Order, BookError> {
        let info = self
            .order_index
            .remove(order_id)
            .ok_or_else(|| BookError::NotFound(order_id.to_string()))?;

        let levels = match info.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        if let Some(level) = levels.get_mut(&info.price) {
            let is_empty = level.remove(&mut self.arena, info.arena_index);
            if is_empty || level.total_volume <= Decimal::ZERO {
                debug_assert!(is_empty, "level with orders but no volume");
                levels.remove(&info.price);
                tracing::trace!(side = %info.side, price = %info.price, "price level removed");
            }
        }

        let node = self.arena.free(info.arena_index);
        self.update_best_prices();

        Ok(Order::from(node))
    }

    /// Look up an order by ID.
    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.order_index
            .get(order_id)
            .map(|info| Order::from(self.arena.get(info.arena_index)))
    }

    /// Check if an order exists.
    #[inline]
    pub fn contains_order(&self, order_id: &str) -> bool {
        self.order_index.contains_key(order_id)
    }

    // ========================================================================
    // Best Price Management
    // ========================================================================

    /// Recompute both cached best prices from the level maps.
    fn update_best_prices(&mut self) {
        self.best_bid = self.bids.last_key_value().map(|(price, _)| *price);
        self.best_ask = self.asks.first_key_value().map(|(price, _)| *price);
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    /// Current state of one level as an L2 update (zero volume if absent)
    pub fn level_update(&self, side: Side, price: Decimal) -> BookUpdate {
        let (new_volume, new_count) = self.depth_at(side, price);
        BookUpdate {
            side,
            price,
            new_volume,
            new_count,
        }
    }

    /// Get the total number of orders in the book
    pub fn order_count(&self) -> usize {
        self.order_index.len()
    }

    /// Get the number of bid levels
    pub fn bid_level_count(&self) -> usize {
        self.bids.len()
    }

    /// Get the number of ask levels
    pub fn ask_level_count(&self) -> usize {
        self.asks.len()
    }

    /// Latest order creation timestamp applied to the book
    pub fn last_timestamp_ns(&self) -> i64 {
        self.last_timestamp_ns
    }

    /// Check if the book is empty
    pub fn is_empty(&self) -> bool {
        self.order_index.is_empty()
    }

    /// Clear all orders from the book
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.best_bid = None;
        self.best_ask = None;
        self.last_timestamp_ns = 0;
        self.order_index.clear();
        self.arena.clear();
    }

    /// Make room for `additional` more orders
    pub fn reserve(&mut self, additional: usize) {
        self.order_index.reserve(additional);
        self.arena.reserve(additional);
    }

    /// Read-only view of the order storage
    #[inline]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Get depth at a price level as (volume, order count)
    pub fn depth_at(&self, side: Side, price: Decimal) -> (Decimal, u32) {
        self.get_level(side, price)
            .map(|l| (l.total_volume, l.count))
            .unwrap_or((Decimal::ZERO, 0))
    }

    // ========================================================================
    // Integrity
    // ========================================================================

    /// Verify every structural invariant of the book.
    ///
    /// Walks all levels, so this is O(n); intended for tests and audits,
    /// not for the ingestion path.
    pub fn validate(&self) -> Result<(), BookError> {
        let mut linked_orders = 0usize;

        for (side, levels) in [(Side::Bid, &self.bids), (Side::Ask, &self.asks)] {
            for (&price, level) in levels {
                if level.price != price {
                    return Err(inconsistent(format!(
                        "{side} level keyed {price} reports price {}",
                        level.price
                    )));
                }
                if level.is_empty() || level.total_volume <= Decimal::ZERO {
                    return Err(inconsistent(format!("{side} level {price} holds no volume")));
                }

                let mut count = 0u32;
                let mut volume = Decimal::ZERO;
                for index in level.iter(&self.arena) {
                    let node = self.arena.get(index);
                    if node.side != side || node.price != price {
                        return Err(inconsistent(format!(
                            "order {} ({} @ {}) linked into {side} level {price}",
                            node.order_id, node.side, node.price
                        )));
                    }
                    match self.order_index.get(&node.order_id) {
                        Some(info) if info.arena_index == index && info.side == side && info.price == price => {}
                        _ => {
                            return Err(inconsistent(format!(
                                "order {} at {side} {price} has no matching index entry",
                                node.order_id
                            )))
                        }
                    }
                    count += 1;
                    volume += node.quantity;
                }

                if count != level.count {
                    return Err(inconsistent(format!(
                        "{side} level {price} counts {} orders but links {count}",
                        level.count
                    )));
                }
                if volume != level.total_volume {
                    return Err(inconsistent(format!(
                        "{side} level {price} volume {} != order sum {volume}",
                        level.total_volume
                    )));
                }
                linked_orders += count as usize;
            }
        }

        if linked_orders != self.order_index.len() || linked_orders != self.arena.allocated() as usize {
            return Err(inconsistent(format!(
                "{linked_orders} linked orders, {} indexed, {} allocated",
                self.order_index.len(),
                self.arena.allocated()
            )));
        }

        let expected_bid = self.bids.last_key_value().map(|(price, _)| *price);
        let expected_ask = self.asks.first_key_value().map(|(price, _)| *price);
        if self.best_bid != expected_bid || self.best_ask != expected_ask {
            return Err(inconsistent(format!(
                "cached best {:?}/{:?}, levels say {expected_bid:?}/{expected_ask:?}",
                self.best_bid, self.best_ask
            )));
        }

        Ok(())
    }
}

fn inconsistent(reason: String) -> BookError {
    BookError::Inconsistent(reason)
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("symbol", &self.symbol)
            .field("best_bid", &self.best_bid)
            .field("best_ask", &self.best_ask)
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.order_index.len())
            .finish()
    }
}
