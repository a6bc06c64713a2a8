//! # Depth-LOB
//!
//! A passive limit order book with depth, imbalance and market-impact
//! analytics for a single instrument.
//!
//! ## Design Principles
//!
//! - **Passive**: bids and asks are never matched, even when crossed
//! - **Single-Writer**: one owner mutates the book; concurrent callers go
//!   through a channel to that owner ([`BookService`])
//! - **Single Ownership**: orders live in an arena owned by the book; levels
//!   and the order index hold keys into it, never shared handles
//! - **Exact Arithmetic**: prices and sizes are `Decimal`, so level volumes
//!   always equal the sum of their orders
//!
//! ## Architecture
//!
//! ```text
//! [Feed / Replay] --Command--> [Engine] --BookUpdate--> [Consumers]
//!                                 |
//!                            [OrderBook] <--queries-- [Analytics / Execution]
//! ```

pub mod arena;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod order_book;
pub mod price_level;
pub mod replay;
pub mod service;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
pub use command::{AddOrder, BookUpdate, CancelOrder, Command, ModifyOrder, Side};
pub use config::BookConfig;
pub use engine::Engine;
pub use error::BookError;
pub use metrics::{BookSnapshot, LevelPair, Quote, Sweep};
pub use order_book::{Order, OrderBook, OrderInfo};
pub use price_level::PriceLevel;
pub use replay::{read_commands, replay, ReplayError, ReplaySummary};
pub use service::{BookHandle, BookService, ServiceError};
