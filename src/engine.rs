//! Engine - applies the ingress command stream to a book.
//!
//! Adds logging and a determinism hash on top of [`OrderBook`], and with
//! the `runtime` feature drives the book from an rtrb ring buffer.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rust_decimal::Decimal;

use crate::command::{BookUpdate, Command, Side};
use crate::config::BookConfig;
use crate::error::BookError;
use crate::metrics::{BookSnapshot, Quote};
use crate::order_book::OrderBook;

/// Single-writer owner of one instrument's book.
pub struct Engine {
    /// The underlying order book
    pub book: OrderBook,
    config: BookConfig,
    applied: u64,
    rejected: u64,
}

impl Engine {
    /// Create a new engine with the default configuration.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_config(symbol, BookConfig::default())
    }

    /// Create a new engine with an explicit configuration.
    pub fn with_config(symbol: impl Into<String>, config: BookConfig) -> Self {
        Self {
            book: OrderBook::with_capacity(symbol, config.initial_capacity),
            config,
            applied: 0,
            rejected: 0,
        }
    }

    /// Run the engine event loop.
    ///
    /// Pops commands from `input` and pushes one result per command to
    /// `output`, dropping results when the output ring is full.
    ///
    /// # Note
    /// This function busy-waits until `input`'s producer is dropped and
    /// the ring has drained.
    #[cfg(feature = "runtime")]
    pub fn run(
        &mut self,
        input: &mut rtrb::Consumer<Command>,
        output: &mut rtrb::Producer<Result<BookUpdate, BookError>>,
        pin_to_core: bool,
    ) {
        if pin_to_core {
            self.pin_to_core();
        }

        self.warm_up();
        tracing::info!(symbol = %self.book.symbol(), "engine loop started");

        loop {
            while let Ok(cmd) = input.pop() {
                let result = self.process_command(cmd);
                if output.push(result).is_err() {
                    tracing::warn!(symbol = %self.book.symbol(), "output ring full, result dropped");
                }
            }
            if input.is_abandoned() && input.is_empty() {
                break;
            }
            std::hint::spin_loop();
        }

        tracing::info!(
            symbol = %self.book.symbol(),
            applied = self.applied,
            rejected = self.rejected,
            "engine loop stopped"
        );
    }

    /// Apply a single command and return the resulting level update.
    ///
    /// This is the main entry point for synchronous usage (services,
    /// replay, tests, benchmarks). Rejections leave the book untouched.
    #[inline]
    pub fn process_command(&mut self, cmd: Command) -> Result<BookUpdate, BookError> {
        let kind = cmd.kind();
        let result = match cmd {
            Command::Add(order) => self.book.add_order(order),
            Command::Modify(modify) => self.book.modify_order(&modify.order_id, modify.new_quantity),
            Command::Cancel(cancel) => self.book.cancel_order(&cancel.order_id).map(|order| {
                self.book.level_update(order.side, order.price)
            }),
        };

        match &result {
            Ok(update) => {
                self.applied += 1;
                tracing::debug!(
                    symbol = %self.book.symbol(),
                    kind,
                    side = %update.side,
                    price = %update.price,
                    volume = %update.new_volume,
                    "command applied"
                );
            }
            Err(err) => {
                self.rejected += 1;
                tracing::warn!(symbol = %self.book.symbol(), kind, error = %err, "command rejected");
            }
        }

        result
    }

    /// Pin the current thread to the last available CPU core.
    ///
    /// The last core is typically isolated from OS interrupts.
    pub fn pin_to_core(&self) {
        if let Some(core_ids) = core_affinity::get_core_ids() {
            if let Some(last_core) = core_ids.last() {
                if !core_affinity::set_for_current(*last_core) {
                    tracing::warn!(core = last_core.id, "failed to pin engine thread");
                }
            }
        }
    }

    /// Reserve the configured order capacity up front.
    pub fn warm_up(&mut self) {
        let spare = self.config.initial_capacity.saturating_sub(self.book.order_count());
        self.book.reserve(spare);
    }

    /// The engine's configuration.
    pub fn config(&self) -> &BookConfig {
        &self.config
    }

    /// Commands applied successfully since construction.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Commands rejected since construction.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Get the best bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.book.best_bid()
    }

    /// Get the best ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.book.best_ask()
    }

    /// Get the top-of-book quote.
    #[inline]
    pub fn quote(&self) -> Quote {
        self.book.quote()
    }

    /// Imbalance over the configured number of levels.
    #[inline]
    pub fn imbalance(&self) -> f64 {
        self.book.order_imbalance(self.config.imbalance_levels)
    }

    /// Market impact estimate for an aggressor on `side`.
    #[inline]
    pub fn market_impact(&self, side: Side, quantity: Decimal) -> Option<Decimal> {
        self.book.estimate_market_impact(side, quantity)
    }

    /// Snapshot at the configured depth and imbalance window.
    pub fn snapshot(&self) -> BookSnapshot {
        self.snapshot_with_depth(self.config.snapshot_depth)
    }

    /// Snapshot at an explicit depth.
    pub fn snapshot_with_depth(&self, depth: usize) -> BookSnapshot {
        self.book.snapshot(depth, self.config.imbalance_levels)
    }

    /// Get total order count.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    /// Compute a hash of the current book state for determinism testing.
    ///
    /// Covers every level's price, volume and order count on both sides.
    /// Decimals are normalized, so `100.0` and `100.00` hash alike.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.book.best_bid().map(|p| p.normalize()).hash(&mut hasher);
        self.book.best_ask().map(|p| p.normalize()).hash(&mut hasher);
        self.book.order_count().hash(&mut hasher);

        for side in [Side::Bid, Side::Ask] {
            side.hash(&mut hasher);
            for level in self.book.levels(side) {
                level.price.normalize().hash(&mut hasher);
                level.total_volume.normalize().hash(&mut hasher);
                level.count.hash(&mut hasher);
            }
        }

        hasher.finish()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("book", &self.book)
            .field("applied", &self.applied)
            .field("rejected", &self.rejected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{AddOrder, CancelOrder, ModifyOrder};
    use rust_decimal_macros::dec;

    #[test]
    fn test_engine_creation() {
        let engine = Engine::new("TEST");
        assert_eq!(engine.order_count(), 0);
        assert_eq!(engine.best_bid(), None);
        assert_eq!(engine.best_ask(), None);
        assert_eq!(engine.config(), &BookConfig::default());
    }

    #[test]
    fn test_engine_process_add() {
        let mut engine = Engine::new("TEST");

        let update = engine
            .process_command(AddOrder::bid("1", dec!(100), dec!(10)).into())
            .unwrap();

        assert_eq!(update.new_volume, dec!(10));
        assert_eq!(engine.order_count(), 1);
        assert_eq!(engine.best_bid(), Some(dec!(100)));
        assert_eq!(engine.applied(), 1);
    }

    #[test]
    fn test_engine_process_modify_and_cancel() {
        let mut engine = Engine::new("TEST");
        engine.process_command(AddOrder::bid("1", dec!(100), dec!(10)).into()).unwrap();
        engine.process_command(AddOrder::bid("2", dec!(100), dec!(5)).into()).unwrap();

        let update = engine
            .process_command(
                ModifyOrder {
                    order_id: "1".into(),
                    new_quantity: dec!(4),
                }
                .into(),
            )
            .unwrap();
        assert_eq!(update.new_volume, dec!(9));

        let update = engine
            .process_command(CancelOrder { order_id: "2".into() }.into())
            .unwrap();
        assert_eq!(update.new_volume, dec!(4));
        assert_eq!(update.new_count, 1);

        let update = engine
            .process_command(CancelOrder { order_id: "1".into() }.into())
            .unwrap();
        assert!(update.is_level_removed());
        assert_eq!(engine.order_count(), 0);
    }

    #[test]
    fn test_engine_counts_rejections() {
        let mut engine = Engine::new("TEST");

        let err = engine
            .process_command(CancelOrder { order_id: "ghost".into() }.into())
            .unwrap_err();
        assert_eq!(err, BookError::NotFound("ghost".into()));
        assert_eq!(engine.rejected(), 1);
        assert_eq!(engine.applied(), 0);
    }

    #[test]
    fn test_engine_snapshot_uses_config() {
        let config = BookConfig {
            imbalance_levels: 1,
            snapshot_depth: 1,
            ..BookConfig::default()
        };
        let mut engine = Engine::with_config("TEST", config);
        engine.process_command(AddOrder::bid("b1", dec!(10), dec!(30)).into()).unwrap();
        engine.process_command(AddOrder::bid("b2", dec!(9), dec!(70)).into()).unwrap();
        engine.process_command(AddOrder::ask("a1", dec!(11), dec!(10)).into()).unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.bids.len(), 1);
        assert_eq!(snapshot.imbalance_levels, 1);
        assert!((snapshot.imbalance - 0.5).abs() < 1e-9);
        assert!((engine.imbalance() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_engine_state_hash_determinism() {
        let mut engine1 = Engine::new("TEST");
        let mut engine2 = Engine::new("TEST");

        for i in 0..100u32 {
            let price = Decimal::from(100 + (i % 10));
            let cmd: Command = if i % 2 == 0 {
                AddOrder::bid(i.to_string(), price, dec!(1)).into()
            } else {
                AddOrder::ask(i.to_string(), price + dec!(20), dec!(1)).into()
            };
            engine1.process_command(cmd.clone()).unwrap();
            engine2.process_command(cmd).unwrap();
        }

        assert_eq!(engine1.state_hash(), engine2.state_hash());

        engine2
            .process_command(CancelOrder { order_id: "0".into() }.into())
            .unwrap();
        assert_ne!(engine1.state_hash(), engine2.state_hash());
    }

    #[cfg(feature = "runtime")]
    #[test]
    fn test_engine_run_drains_ring() {
        let (mut cmd_tx, mut cmd_rx) = rtrb::RingBuffer::<Command>::new(16);
        let (mut out_tx, mut out_rx) = rtrb::RingBuffer::new(16);

        cmd_tx.push(AddOrder::bid("1", dec!(100), dec!(10)).into()).unwrap();
        cmd_tx.push(AddOrder::bid("2", dec!(100), dec!(5)).into()).unwrap();
        cmd_tx.push(CancelOrder { order_id: "ghost".into() }.into()).unwrap();
        drop(cmd_tx);

        let mut engine = Engine::new("TEST");
        engine.run(&mut cmd_rx, &mut out_tx, false);

        let results: Vec<_> = std::iter::from_fn(|| out_rx.pop().ok()).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].as_ref().unwrap().new_volume, dec!(15));
        assert_eq!(results[2], Err(BookError::NotFound("ghost".into())));
        assert_eq!(engine.order_count(), 2);
    }

    #[test]
    fn test_engine_warm_up() {
        let mut engine = Engine::new("TEST");
        engine.warm_up(); // Should not panic
    }
}
