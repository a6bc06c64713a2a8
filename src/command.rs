//! Command and update types for the order book.
//!
//! Commands are the ingress event stream (add / modify / cancel).
//! Updates are the Level 2 deltas produced by applying them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Bid = 0,
    /// Sell side (asks)
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Builds a side from the buy/sell flag used by most feeds.
    #[inline]
    pub const fn from_is_buy(is_buy: bool) -> Self {
        if is_buy { Side::Bid } else { Side::Ask }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Bid => f.write_str("bid"),
            Side::Ask => f.write_str("ask"),
        }
    }
}

// ============================================================================
// Input Commands
// ============================================================================

/// Add a new resting order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddOrder {
    /// Caller-assigned order ID, unique while the order rests
    pub order_id: String,
    /// Order side (bid/ask)
    pub side: Side,
    /// Limit price, strictly positive
    pub price: Decimal,
    /// Resting size
    pub quantity: Decimal,
    /// Creation time in nanoseconds since the epoch (informational only)
    pub timestamp_ns: i64,
}

impl AddOrder {
    /// Convenience constructor for a bid.
    pub fn bid(order_id: impl Into<String>, price: Decimal, quantity: Decimal) -> Self {
        Self {
            order_id: order_id.into(),
            side: Side::Bid,
            price,
            quantity,
            timestamp_ns: 0,
        }
    }

    /// Convenience constructor for an ask.
    pub fn ask(order_id: impl Into<String>, price: Decimal, quantity: Decimal) -> Self {
        Self {
            order_id: order_id.into(),
            side: Side::Ask,
            price,
            quantity,
            timestamp_ns: 0,
        }
    }

    /// Sets the creation timestamp.
    pub fn at(mut self, timestamp_ns: i64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }
}

/// Change the resting quantity of an existing order.
///
/// Price amendments are not supported: cancel and re-add instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModifyOrder {
    /// Order to amend
    pub order_id: String,
    /// Replacement quantity (not a delta)
    pub new_quantity: Decimal,
}

/// Cancel an existing order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelOrder {
    /// Order ID to cancel
    pub order_id: String,
}

/// Input commands, applied in delivery order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Add a new resting order
    Add(AddOrder),
    /// Amend an order's quantity in place
    Modify(ModifyOrder),
    /// Cancel an existing order
    Cancel(CancelOrder),
}

impl Command {
    /// The order ID this command targets.
    pub fn order_id(&self) -> &str {
        match self {
            Command::Add(add) => &add.order_id,
            Command::Modify(modify) => &modify.order_id,
            Command::Cancel(cancel) => &cancel.order_id,
        }
    }

    /// Short lowercase name, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Add(_) => "add",
            Command::Modify(_) => "modify",
            Command::Cancel(_) => "cancel",
        }
    }
}

impl From<AddOrder> for Command {
    fn from(add: AddOrder) -> Self {
        Command::Add(add)
    }
}

impl From<ModifyOrder> for Command {
    fn from(modify: ModifyOrder) -> Self {
        Command::Modify(modify)
    }
}

impl From<CancelOrder> for Command {
    fn from(cancel: CancelOrder) -> Self {
        Command::Cancel(cancel)
    }
}

// ============================================================================
// Output Updates
// ============================================================================

/// Order book level update (Level 2 market data)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BookUpdate {
    /// Which side changed
    pub side: Side,
    /// Price level that changed
    pub price: Decimal,
    /// New total volume at this price (0 = level removed)
    pub new_volume: Decimal,
    /// New order count at this price
    pub new_count: u32,
}

impl BookUpdate {
    /// True when the update removed the level from the book.
    #[inline]
    pub fn is_level_removed(&self) -> bool {
        self.new_count == 0
    }
}
