//! Derived market-state queries over an [`OrderBook`].
//!
//! Everything here is read-only and returns owned data, so results stay
//! valid after the book mutates again.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::command::Side;
use crate::order_book::OrderBook;

/// A `(price, aggregate volume)` pair, best price first in every listing.
pub type LevelPair = (Decimal, Decimal);

/// Top-of-book summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub mid_price: Option<Decimal>,
    pub spread: Option<Decimal>,
}

/// Outcome of walking resting liquidity for a hypothetical aggressor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Sweep {
    /// Side of the aggressor (the opposite side is consumed)
    pub side: Side,
    /// Quantity that would execute against resting volume
    pub filled: Decimal,
    /// Quantity left over once the opposite side is exhausted
    pub unfilled: Decimal,
    /// Volume-weighted execution price, `None` if nothing fills or the
    /// notional does not fit in a `Decimal`
    pub average_price: Option<Decimal>,
    /// Worst price touched, `None` if nothing fills
    pub last_price: Option<Decimal>,
    /// Number of levels touched
    pub levels_consumed: usize,
}

/// Point-in-time copy of the book's state, suitable for persistence.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BookSnapshot {
    pub symbol: String,
    /// Latest order timestamp applied before the snapshot was taken
    pub timestamp_ns: i64,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub mid_price: Option<Decimal>,
    pub spread: Option<Decimal>,
    /// Imbalance over `imbalance_levels` levels per side
    pub imbalance: f64,
    pub imbalance_levels: usize,
    pub bids: Vec<LevelPair>,
    pub asks: Vec<LevelPair>,
    pub order_count: usize,
}

impl OrderBook {
    /// Average of best bid and best ask; `None` unless both sides rest.
    ///
    /// Prices too large to add are averaged as `bid + (ask - bid) / 2`.
    pub fn mid_price(&self) -> Option<Decimal> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        bid.checked_add(ask)
            .map(|sum| sum / Decimal::TWO)
            .or_else(|| bid.checked_add((ask - bid) / Decimal::TWO))
    }

    /// Best ask minus best bid; `None` unless both sides rest.
    ///
    /// The book never matches, so a crossed book yields a negative spread.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Best prices plus mid and spread in one read.
    pub fn quote(&self) -> Quote {
        Quote {
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            mid_price: self.mid_price(),
            spread: self.spread(),
        }
    }

    /// Total resting volume over the best `levels` levels of one side.
    ///
    /// Saturates at `Decimal::MAX`.
    pub fn depth_volume(&self, side: Side, levels: usize) -> Decimal {
        self.levels(side)
            .take(levels)
            .fold(Decimal::ZERO, |total, level| total.saturating_add(level.total_volume))
    }

    fn checked_depth_volume(&self, side: Side, levels: usize) -> Option<Decimal> {
        self.levels(side)
            .take(levels)
            .try_fold(Decimal::ZERO, |total, level| total.checked_add(level.total_volume))
    }

    /// Normalized depth imbalance over the top `levels` levels per side.
    ///
    /// `(bid - ask) / (bid + ask)`, in `[-1, 1]`; `+1` means all volume in
    /// the window is on the bid. Zero when the window holds no volume.
    /// Windows whose volume overflows a `Decimal` are summed in `f64`.
    pub fn order_imbalance(&self, levels: usize) -> f64 {
        let exact = self.checked_depth_volume(Side::Bid, levels).and_then(|bid| {
            let ask = self.checked_depth_volume(Side::Ask, levels)?;
            Some((bid, ask, bid.checked_add(ask)?))
        });

        match exact {
            Some((_, _, total)) if total.is_zero() => 0.0,
            Some((bid, ask, total)) => ((bid - ask) / total).to_f64().unwrap_or(0.0),
            None => {
                let float_depth = |side: Side| -> f64 {
                    self.levels(side)
                        .take(levels)
                        .map(|level| level.total_volume.to_f64().unwrap_or(0.0))
                        .sum()
                };
                let (bid, ask) = (float_depth(Side::Bid), float_depth(Side::Ask));
                ((bid - ask) / (bid + ask)).clamp(-1.0, 1.0)
            }
        }
    }

    /// Up to `count` bid levels, highest price first.
    pub fn bid_levels(&self, count: usize) -> Vec<LevelPair> {
        self.level_pairs(Side::Bid, count)
    }

    /// Up to `count` ask levels, lowest price first.
    pub fn ask_levels(&self, count: usize) -> Vec<LevelPair> {
        self.level_pairs(Side::Ask, count)
    }

    fn level_pairs(&self, side: Side, count: usize) -> Vec<LevelPair> {
        self.levels(side)
            .take(count)
            .map(|level| (level.price, level.total_volume))
            .collect()
    }

    /// Walk the side opposite `side` from its best price outward, taking
    /// `min(remaining, level volume)` at each level until `quantity` is
    /// covered or the side runs out. Nothing is consumed from the book.
    ///
    /// `average_price` is `None` when the traded notional overflows.
    pub fn sweep(&self, side: Side, quantity: Decimal) -> Sweep {
        let mut remaining = quantity.max(Decimal::ZERO);
        let mut notional = Some(Decimal::ZERO);
        let mut filled = Decimal::ZERO;
        let mut last_price = None;
        let mut levels_consumed = 0;

        for level in self.levels(side.opposite()) {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = remaining.min(level.total_volume);
            notional = notional.and_then(|sum| sum.checked_add(take.checked_mul(level.price)?));
            filled += take;
            remaining -= take;
            last_price = Some(level.price);
            levels_consumed += 1;
        }

        Sweep {
            side,
            filled,
            unfilled: remaining,
            average_price: notional
                .filter(|_| !filled.is_zero())
                .and_then(|sum| sum.checked_div(filled)),
            last_price,
            levels_consumed,
        }
    }

    /// Price concession of an instantaneous sweep, relative to mid.
    ///
    /// Signed so that a positive value is adverse for the aggressor: a buy
    /// reports `average - mid`, a sell `mid - average`. Returns `Some(0)`
    /// when nothing would execute and `None` when there is no mid price or
    /// the sweep's average price overflows.
    pub fn estimate_market_impact(&self, side: Side, quantity: Decimal) -> Option<Decimal> {
        let mid = self.mid_price()?;
        let sweep = self.sweep(side, quantity);

        if sweep.filled.is_zero() {
            return Some(Decimal::ZERO);
        }
        let average = sweep.average_price?;
        Some(match side {
            Side::Bid => average - mid,
            Side::Ask => mid - average,
        })
    }

    /// Copy out the top `depth` levels of each side plus derived metrics.
    pub fn snapshot(&self, depth: usize, imbalance_levels: usize) -> BookSnapshot {
        let quote = self.quote();
        BookSnapshot {
            symbol: self.symbol().to_string(),
            timestamp_ns: self.last_timestamp_ns(),
            best_bid: quote.best_bid,
            best_ask: quote.best_ask,
            mid_price: quote.mid_price,
            spread: quote.spread,
            imbalance: self.order_imbalance(imbalance_levels),
            imbalance_levels,
            bids: self.bid_levels(depth),
            asks: self.ask_levels(depth),
            order_count: self.order_count(),
        }
    }
}
