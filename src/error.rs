//! Error types for order book mutations.

use rust_decimal::Decimal;

/// Reasons an order book operation is rejected.
///
/// Rejections never leave the book partially mutated: validation runs
/// before any state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    /// Add called with an order ID that is already resting
    #[error("order {0} already exists in the book")]
    DuplicateOrder(String),

    /// Modify or cancel called with an unknown order ID
    #[error("order {0} not found in the book")]
    NotFound(String),

    /// Negative quantity on add/modify, or zero quantity on add
    #[error("invalid quantity {quantity} for order {order_id}")]
    InvalidQuantity { order_id: String, quantity: Decimal },

    /// Non-positive price on add
    #[error("invalid price {price} for order {order_id}")]
    InvalidPrice { order_id: String, price: Decimal },

    /// Internal consistency check failed
    #[error("order book inconsistent: {0}")]
    Inconsistent(String),
}

impl BookError {
    /// The order ID the error refers to, if any.
    pub fn order_id(&self) -> Option<&str> {
        match self {
            BookError::DuplicateOrder(id) | BookError::NotFound(id) => Some(id),
            BookError::InvalidQuantity { order_id, .. } | BookError::InvalidPrice { order_id, .. } => {
                Some(order_id)
            }
            BookError::Inconsistent(_) => None,
        }
    }
}
