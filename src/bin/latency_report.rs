use depth_lob::{AddOrder, CancelOrder, Command, Engine, ModifyOrder, Side};
use hdrhistogram::Histogram;
use rust_decimal::Decimal;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const ITERATIONS: u64 = 1_000_000;
const RESTING: u64 = 10_000;

fn print_report(name: &str, histogram: &Histogram<u64>, ops: u64, total: Duration) {
    println!("\n=== {name} Latency (ns) ===");
    println!("Total Ops:  {}", ops);
    println!("Throughput: {:.2} ops/sec", ops as f64 / total.as_secs_f64());
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");
}

fn timed<T>(histogram: &mut Histogram<u64>, total: &mut Duration, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = std::hint::black_box(f());
    let elapsed = start.elapsed();
    // Outliers above the histogram bound are dropped
    histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
    *total += elapsed;
    out
}

fn side_for(id: u64) -> Side {
    if id % 2 == 0 {
        Side::Bid
    } else {
        Side::Ask
    }
}

fn price_for(id: u64) -> Decimal {
    // Bids 90.00-99.99, asks 100.01-110.00; never crossed
    let tick = Decimal::new((id % 1000) as i64, 2);
    match side_for(id) {
        Side::Bid => Decimal::new(9000, 2) + tick,
        Side::Ask => Decimal::new(10001, 2) + tick,
    }
}

fn add_command(id: u64) -> Command {
    AddOrder {
        order_id: id.to_string(),
        side: side_for(id),
        price: price_for(id),
        quantity: Decimal::from(1 + id % 50),
        timestamp_ns: id as i64,
    }
    .into()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Rejections log at warn; keep the hot loop quiet unless asked
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("Preparing Latency Benchmark...");

    let mut engine = Engine::new("BENCH");
    engine.book.reserve(RESTING as usize + 1);
    engine.warm_up();

    for id in 0..RESTING {
        engine.process_command(add_command(id))?;
    }

    let mut add_hist = Histogram::<u64>::new_with_bounds(1, 100_000, 3)?;
    let mut modify_hist = Histogram::<u64>::new_with_bounds(1, 100_000, 3)?;
    let mut cancel_hist = Histogram::<u64>::new_with_bounds(1, 100_000, 3)?;
    let mut query_hist = Histogram::<u64>::new_with_bounds(1, 100_000, 3)?;
    let (mut add_total, mut modify_total, mut cancel_total, mut query_total) =
        (Duration::ZERO, Duration::ZERO, Duration::ZERO, Duration::ZERO);

    println!("Running {} iterations over {} resting orders...", ITERATIONS, RESTING);

    // Churn: each step adds a fresh order, shrinks it, then cancels the
    // oldest one so the book depth stays constant.
    for step in 0..ITERATIONS {
        let new_id = RESTING + step;
        let oldest = step;

        let add = add_command(new_id);
        timed(&mut add_hist, &mut add_total, || engine.process_command(add))?;

        let modify: Command = ModifyOrder {
            order_id: new_id.to_string(),
            new_quantity: Decimal::ONE,
        }
        .into();
        timed(&mut modify_hist, &mut modify_total, || engine.process_command(modify))?;

        let cancel: Command = CancelOrder {
            order_id: oldest.to_string(),
        }
        .into();
        timed(&mut cancel_hist, &mut cancel_total, || engine.process_command(cancel))?;

        timed(&mut query_hist, &mut query_total, || {
            (
                engine.quote(),
                engine.imbalance(),
                engine.market_impact(Side::Bid, Decimal::from(100)),
            )
        });
    }

    print_report("Add", &add_hist, ITERATIONS, add_total);
    print_report("Modify", &modify_hist, ITERATIONS, modify_total);
    print_report("Cancel", &cancel_hist, ITERATIONS, cancel_total);
    print_report("Quote + Imbalance + Impact", &query_hist, ITERATIONS, query_total);

    println!("\nAdd distribution:");
    for v in add_hist.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:6} ns: {:10} count", v.value_iterated_to(), count);
        }
    }

    engine.book.validate()?;
    println!("\nFinal book: {} orders, state hash {:016x}", engine.order_count(), engine.state_hash());
    Ok(())
}
