//! Book Service - a single owning task for concurrent callers.
//!
//! One tokio task owns the [`Engine`]; every mutation and query is a
//! message on its channel, so requests are applied strictly in arrival
//! order and readers never observe a half-applied command. Replies carry
//! owned copies of book data.
//!
//! ```text
//! [Feed task]  --apply-->    \
//! [Analytics]  --snapshot--> [mpsc] --> [Owner task: Engine]
//! [Execution]  --impact-->   /
//! ```

use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::command::{BookUpdate, Command, Side};
use crate::engine::Engine;
use crate::error::BookError;
use crate::metrics::{BookSnapshot, LevelPair, Quote};

/// Failures seen by a [`BookHandle`] caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The owning task has stopped
    #[error("order book service is closed")]
    Closed,

    /// The book rejected the command
    #[error(transparent)]
    Book(#[from] BookError),
}

enum Request {
    Apply {
        command: Command,
        reply: oneshot::Sender<Result<BookUpdate, BookError>>,
    },
    Quote {
        reply: oneshot::Sender<Quote>,
    },
    Levels {
        side: Side,
        count: usize,
        reply: oneshot::Sender<Vec<LevelPair>>,
    },
    Imbalance {
        levels: usize,
        reply: oneshot::Sender<f64>,
    },
    MarketImpact {
        side: Side,
        quantity: Decimal,
        reply: oneshot::Sender<Option<Decimal>>,
    },
    Snapshot {
        depth: Option<usize>,
        reply: oneshot::Sender<BookSnapshot>,
    },
}

/// Spawns the owning task for an engine.
pub struct BookService;

impl BookService {
    /// Move `engine` into a new task and return a handle to it.
    ///
    /// `buffer` bounds the number of queued requests. The task ends once
    /// every handle is dropped; the join handle yields the engine back.
    pub fn spawn(engine: Engine, buffer: usize) -> (BookHandle, JoinHandle<Engine>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(Self::serve(engine, rx));
        (BookHandle { tx }, task)
    }

    async fn serve(mut engine: Engine, mut rx: mpsc::Receiver<Request>) -> Engine {
        tracing::info!(symbol = %engine.book.symbol(), "book service started");

        while let Some(request) = rx.recv().await {
            // A dropped reply receiver only means the caller stopped waiting.
            match request {
                Request::Apply { command, reply } => {
                    let _ = reply.send(engine.process_command(command));
                }
                Request::Quote { reply } => {
                    let _ = reply.send(engine.quote());
                }
                Request::Levels { side, count, reply } => {
                    let levels = match side {
                        Side::Bid => engine.book.bid_levels(count),
                        Side::Ask => engine.book.ask_levels(count),
                    };
                    let _ = reply.send(levels);
                }
                Request::Imbalance { levels, reply } => {
                    let _ = reply.send(engine.book.order_imbalance(levels));
                }
                Request::MarketImpact { side, quantity, reply } => {
                    let _ = reply.send(engine.market_impact(side, quantity));
                }
                Request::Snapshot { depth, reply } => {
                    let snapshot = match depth {
                        Some(depth) => engine.snapshot_with_depth(depth),
                        None => engine.snapshot(),
                    };
                    let _ = reply.send(snapshot);
                }
            }
        }

        tracing::info!(
            symbol = %engine.book.symbol(),
            applied = engine.applied(),
            rejected = engine.rejected(),
            "book service stopped"
        );
        engine
    }
}

/// Cloneable client for a running [`BookService`].
#[derive(Clone, Debug)]
pub struct BookHandle {
    tx: mpsc::Sender<Request>,
}

impl BookHandle {
    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// Apply a command and wait for the resulting level update.
    pub async fn apply(&self, command: Command) -> Result<BookUpdate, ServiceError> {
        let result = self.call(|reply| Request::Apply { command, reply }).await?;
        Ok(result?)
    }

    /// Best prices, mid and spread.
    pub async fn quote(&self) -> Result<Quote, ServiceError> {
        self.call(|reply| Request::Quote { reply }).await
    }

    /// Best bid and best ask.
    pub async fn best_prices(&self) -> Result<(Option<Decimal>, Option<Decimal>), ServiceError> {
        let quote = self.quote().await?;
        Ok((quote.best_bid, quote.best_ask))
    }

    /// Mid price, `None` unless both sides rest.
    pub async fn mid_price(&self) -> Result<Option<Decimal>, ServiceError> {
        Ok(self.quote().await?.mid_price)
    }

    /// Best ask minus best bid, `None` unless both sides rest.
    pub async fn spread(&self) -> Result<Option<Decimal>, ServiceError> {
        Ok(self.quote().await?.spread)
    }

    /// Up to `count` bid levels, best first.
    pub async fn bid_levels(&self, count: usize) -> Result<Vec<LevelPair>, ServiceError> {
        self.call(|reply| Request::Levels { side: Side::Bid, count, reply }).await
    }

    /// Up to `count` ask levels, best first.
    pub async fn ask_levels(&self, count: usize) -> Result<Vec<LevelPair>, ServiceError> {
        self.call(|reply| Request::Levels { side: Side::Ask, count, reply }).await
    }

    /// Depth imbalance over `levels` levels per side.
    pub async fn imbalance(&self, levels: usize) -> Result<f64, ServiceError> {
        self.call(|reply| Request::Imbalance { levels, reply }).await
    }

    /// Market impact estimate for an aggressor on `side`.
    pub async fn market_impact(
        &self,
        side: Side,
        quantity: Decimal,
    ) -> Result<Option<Decimal>, ServiceError> {
        self.call(|reply| Request::MarketImpact { side, quantity, reply }).await
    }

    /// Snapshot at the engine's configured depth.
    pub async fn snapshot(&self) -> Result<BookSnapshot, ServiceError> {
        self.call(|reply| Request::Snapshot { depth: None, reply }).await
    }

    /// Snapshot at an explicit depth.
    pub async fn snapshot_with_depth(&self, depth: usize) -> Result<BookSnapshot, ServiceError> {
        self.call(|reply| Request::Snapshot { depth: Some(depth), reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{AddOrder, CancelOrder};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_apply_and_query() {
        let (handle, task) = BookService::spawn(Engine::new("TEST"), 16);

        handle.apply(AddOrder::bid("b1", dec!(10.00), dec!(100)).into()).await.unwrap();
        handle.apply(AddOrder::ask("a1", dec!(10.05), dec!(50)).into()).await.unwrap();

        let quote = handle.quote().await.unwrap();
        assert_eq!(quote.mid_price, Some(dec!(10.025)));
        assert_eq!(handle.bid_levels(5).await.unwrap(), vec![(dec!(10.00), dec!(100))]);

        drop(handle);
        let engine = task.await.unwrap();
        assert_eq!(engine.order_count(), 2);
    }

    #[tokio::test]
    async fn test_rejection_is_surfaced() {
        let (handle, _task) = BookService::spawn(Engine::new("TEST"), 4);

        let err = handle
            .apply(CancelOrder { order_id: "missing".into() }.into())
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Book(BookError::NotFound("missing".into())));
    }
}
