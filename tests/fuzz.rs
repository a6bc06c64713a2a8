//! Fuzz Test - Compares Depth-LOB against a reference implementation.
//!
//! Uses a naive but correct reference book to verify the arena-backed
//! book produces identical results, and checks the structural invariants
//! after every command.

use depth_lob::{AddOrder, BookError, BookUpdate, CancelOrder, Command, Engine, ModifyOrder, Side};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

type Queue = Vec<(String, Decimal)>;

/// Simple reference implementation for verification
struct ReferenceBook {
    bids: BTreeMap<Decimal, Queue>, // price -> [(order_id, qty)] in arrival order
    asks: BTreeMap<Decimal, Queue>,
    orders: HashMap<String, (Side, Decimal)>, // order_id -> (side, price)
}

impl ReferenceBook {
    fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, Queue> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn side(&self, side: Side) -> &BTreeMap<Decimal, Queue> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    fn level(&self, side: Side, price: Decimal) -> BookUpdate {
        let (new_volume, new_count) = self
            .side(side)
            .get(&price)
            .map(|queue| (queue.iter().map(|(_, q)| *q).sum::<Decimal>(), queue.len() as u32))
            .unwrap_or((Decimal::ZERO, 0));
        BookUpdate {
            side,
            price,
            new_volume,
            new_count,
        }
    }

    /// Best-first `(price, volume)` pairs.
    fn levels(&self, side: Side) -> Vec<(Decimal, Decimal)> {
        let pairs = self
            .side(side)
            .iter()
            .map(|(price, queue)| (*price, queue.iter().map(|(_, q)| *q).sum::<Decimal>()));
        match side {
            Side::Bid => pairs.rev().collect(),
            Side::Ask => pairs.collect(),
        }
    }

    fn add(&mut self, order: &AddOrder) -> Result<BookUpdate, BookError> {
        if order.price <= Decimal::ZERO {
            return Err(BookError::InvalidPrice {
                order_id: order.order_id.clone(),
                price: order.price,
            });
        }
        if order.quantity <= Decimal::ZERO {
            return Err(BookError::InvalidQuantity {
                order_id: order.order_id.clone(),
                quantity: order.quantity,
            });
        }
        if self.orders.contains_key(&order.order_id) {
            return Err(BookError::DuplicateOrder(order.order_id.clone()));
        }
        self.orders.insert(order.order_id.clone(), (order.side, order.price));
        self.side_mut(order.side)
            .entry(order.price)
            .or_default()
            .push((order.order_id.clone(), order.quantity));
        Ok(self.level(order.side, order.price))
    }

    fn modify(&mut self, order_id: &str, new_quantity: Decimal) -> Result<BookUpdate, BookError> {
        let (side, price) = *self
            .orders
            .get(order_id)
            .ok_or_else(|| BookError::NotFound(order_id.to_string()))?;
        if new_quantity < Decimal::ZERO {
            return Err(BookError::InvalidQuantity {
                order_id: order_id.to_string(),
                quantity: new_quantity,
            });
        }
        if new_quantity.is_zero() {
            return self.cancel(order_id);
        }
        let queue = self.side_mut(side).get_mut(&price).unwrap();
        let entry = queue.iter_mut().find(|(id, _)| id == order_id).unwrap();
        entry.1 = new_quantity;
        Ok(self.level(side, price))
    }

    fn cancel(&mut self, order_id: &str) -> Result<BookUpdate, BookError> {
        let (side, price) = self
            .orders
            .remove(order_id)
            .ok_or_else(|| BookError::NotFound(order_id.to_string()))?;
        let book = self.side_mut(side);
        let queue = book.get_mut(&price).unwrap();
        queue.retain(|(id, _)| id != order_id);
        if queue.is_empty() {
            book.remove(&price);
        }
        Ok(self.level(side, price))
    }

    fn apply(&mut self, cmd: &Command) -> Result<BookUpdate, BookError> {
        match cmd {
            Command::Add(order) => self.add(order),
            Command::Modify(modify) => self.modify(&modify.order_id, modify.new_quantity),
            Command::Cancel(cancel) => self.cancel(&cancel.order_id),
        }
    }

    fn order_count(&self) -> usize {
        self.orders.len()
    }
}

/// Prices on a 0.05 grid between 98.00 and 102.00; the two sides overlap
/// on purpose since the book never matches.
fn random_price(rng: &mut ChaCha8Rng) -> Decimal {
    Decimal::new(rng.gen_range(1960..2040) * 5, 2)
}

/// Quantities with up to three decimal places.
fn random_quantity(rng: &mut ChaCha8Rng) -> Decimal {
    Decimal::new(rng.gen_range(1..200_000), 3)
}

/// Mostly valid traffic with a sprinkling of every rejection kind.
fn generate_command(rng: &mut ChaCha8Rng, next_id: &mut u64, live: &[String]) -> Command {
    let roll: f64 = rng.gen();

    if live.is_empty() || roll < 0.5 {
        let order_id = if !live.is_empty() && rng.gen_bool(0.02) {
            live[rng.gen_range(0..live.len())].clone() // duplicate
        } else {
            *next_id += 1;
            next_id.to_string()
        };
        let price = if rng.gen_bool(0.01) { Decimal::ZERO } else { random_price(rng) };
        let quantity = if rng.gen_bool(0.01) { -Decimal::ONE } else { random_quantity(rng) };
        let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
        AddOrder {
            order_id,
            side,
            price,
            quantity,
            timestamp_ns: *next_id as i64,
        }
        .into()
    } else if roll < 0.75 {
        let order_id = if rng.gen_bool(0.05) {
            "ghost".to_string()
        } else {
            live[rng.gen_range(0..live.len())].clone()
        };
        let new_quantity = match rng.gen_range(0..20) {
            0 => Decimal::ZERO,
            1 => -Decimal::ONE,
            _ => random_quantity(rng),
        };
        ModifyOrder { order_id, new_quantity }.into()
    } else {
        let order_id = if rng.gen_bool(0.05) {
            "ghost".to_string()
        } else {
            live[rng.gen_range(0..live.len())].clone()
        };
        CancelOrder { order_id }.into()
    }
}

fn run_against_reference(seed: u64, ops: usize, full_compare_every: usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut engine = Engine::new("FUZZ");
    let mut reference = ReferenceBook::new();

    let mut next_id = 0u64;
    let mut live: Vec<String> = Vec::new();

    for i in 0..ops {
        let cmd = generate_command(&mut rng, &mut next_id, &live);

        let expected = reference.apply(&cmd);
        let actual = engine.process_command(cmd.clone());
        assert_eq!(actual, expected, "Result mismatch at op {} for {:?}", i, cmd);

        live.retain(|id| reference.orders.contains_key(id));
        if let Command::Add(add) = &cmd {
            if expected.is_ok() {
                live.push(add.order_id.clone());
            }
        }

        engine
            .book
            .validate()
            .unwrap_or_else(|err| panic!("Invariant violated at op {}: {}", i, err));

        assert_eq!(engine.best_bid(), reference.best_bid(), "Best bid mismatch at op {}", i);
        assert_eq!(engine.best_ask(), reference.best_ask(), "Best ask mismatch at op {}", i);
        assert_eq!(engine.order_count(), reference.order_count(), "Order count mismatch at op {}", i);

        if i % full_compare_every == 0 {
            for side in [Side::Bid, Side::Ask] {
                let levels = match side {
                    Side::Bid => engine.book.bid_levels(usize::MAX),
                    Side::Ask => engine.book.ask_levels(usize::MAX),
                };
                assert_eq!(levels, reference.levels(side), "{} levels mismatch at op {}", side, i);
            }
        }
    }

    println!("Fuzz run passed!");
    println!("  Seed: {:#x}  Operations: {}", seed, ops);
    println!("  Final order count: {}", engine.order_count());
}

#[test]
fn test_fuzz_against_reference() {
    run_against_reference(0xFEEDFACE, 10_000, 100);
}

#[test]
fn test_fuzz_second_seed() {
    run_against_reference(0xBADC0DE, 5_000, 50);
}

#[test]
fn test_fuzz_fifo_order_per_level() {
    const SEED: u64 = 0x12345678;
    const OPS: usize = 3_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = Engine::new("FUZZ");
    let mut reference = ReferenceBook::new();

    let mut next_id = 0u64;
    let mut live: Vec<String> = Vec::new();

    for _ in 0..OPS {
        let cmd = generate_command(&mut rng, &mut next_id, &live);
        let ok = reference.apply(&cmd).is_ok();
        engine.process_command(cmd.clone()).ok();

        live.retain(|id| reference.orders.contains_key(id));
        if let (Command::Add(add), true) = (&cmd, ok) {
            live.push(add.order_id.clone());
        }
    }

    // Queue order inside each level must match arrival order
    for side in [Side::Bid, Side::Ask] {
        for (price, queue) in reference.side(side) {
            let ids: Vec<String> = engine
                .book
                .level_orders(side, *price)
                .into_iter()
                .map(|order| order.order_id)
                .collect();
            let expected: Vec<String> = queue.iter().map(|(id, _)| id.clone()).collect();
            assert_eq!(ids, expected, "FIFO mismatch at {} {}", side, price);
        }
    }
}

#[test]
fn test_fuzz_market_impact_bounds() {
    const SEED: u64 = 0xA11CE;
    const OPS: usize = 2_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = Engine::new("FUZZ");
    let mut next_id = 0u64;
    let mut live: Vec<String> = Vec::new();

    for _ in 0..OPS {
        let cmd = generate_command(&mut rng, &mut next_id, &live);
        if let Command::Add(add) = &cmd {
            if engine.process_command(cmd.clone()).is_ok() {
                live.push(add.order_id.clone());
            }
            continue;
        }
        let id = cmd.order_id().to_string();
        engine.process_command(cmd).ok();
        if !engine.book.contains_order(&id) {
            live.retain(|live_id| live_id != &id);
        }

        let size = random_quantity(&mut rng);
        for side in [Side::Bid, Side::Ask] {
            let sweep = engine.book.sweep(side, size);
            assert_eq!(sweep.filled + sweep.unfilled, size);
            assert!(sweep.filled <= engine.book.depth_volume(side.opposite(), usize::MAX));

            // The sweep starts at the opposite best, so the average can
            // never beat it
            if let (Some(avg), Some(best)) = (sweep.average_price, engine.book.best_price(side.opposite())) {
                match side {
                    Side::Bid => assert!(avg >= best),
                    Side::Ask => assert!(avg <= best),
                }
            }

            let impact = engine.market_impact(side, size);
            assert_eq!(impact.is_some(), engine.quote().mid_price.is_some());
        }
    }
}
