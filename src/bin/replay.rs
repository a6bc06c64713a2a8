use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use clap::Parser;
use depth_lob::{read_commands, replay, BookConfig, Engine, Side};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

/// Replay a CSV order event stream into a book and print its final state.
#[derive(Parser, Debug)]
#[command(name = "replay", version)]
struct Args {
    /// Event file (`type,order_id,side,price,quantity,timestamp`); `-` reads stdin
    input: PathBuf,

    /// Instrument symbol for the book
    #[arg(long, default_value = "UNKNOWN")]
    symbol: String,

    /// Levels per side to print
    #[arg(long, default_value_t = depth_lob::config::DEFAULT_SNAPSHOT_DEPTH)]
    depth: usize,

    /// Levels per side summed for imbalance
    #[arg(long, default_value_t = depth_lob::config::DEFAULT_IMBALANCE_LEVELS)]
    imbalance_levels: usize,

    /// Resting orders to reserve room for up front
    #[arg(long, default_value_t = depth_lob::config::DEFAULT_INITIAL_CAPACITY)]
    capacity: usize,

    /// Size used for the buy/sell market impact estimate
    #[arg(long)]
    impact_quantity: Option<Decimal>,

    /// Abort on the first rejected event instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = BookConfig {
        imbalance_levels: args.imbalance_levels,
        snapshot_depth: args.depth,
        initial_capacity: args.capacity,
    };
    let mut engine = Engine::with_config(args.symbol.clone(), config);
    engine.warm_up();

    tracing::info!(input = %args.input.display(), symbol = %args.symbol, "replaying events");

    let summary = if args.input.as_os_str() == "-" {
        replay(&mut engine, read_commands(io::stdin().lock()), args.strict)?
    } else {
        let file = BufReader::new(File::open(&args.input)?);
        replay(&mut engine, read_commands(file), args.strict)?
    };

    let snapshot = engine.snapshot();
    let fmt_opt = |value: Option<Decimal>| value.map_or_else(|| "-".to_string(), |v| v.to_string());

    println!("\n=== {} ===", snapshot.symbol);
    println!("Events:     {} applied, {} rejected", summary.applied, summary.rejected);
    println!("Orders:     {}", snapshot.order_count);
    println!("Best bid:   {}", fmt_opt(snapshot.best_bid));
    println!("Best ask:   {}", fmt_opt(snapshot.best_ask));
    println!("Mid:        {}", fmt_opt(snapshot.mid_price));
    println!("Spread:     {}", fmt_opt(snapshot.spread));
    println!("Imbalance:  {:+.4} (top {} levels)", snapshot.imbalance, snapshot.imbalance_levels);

    if let Some(quantity) = args.impact_quantity {
        for (label, side) in [("buy", Side::Bid), ("sell", Side::Ask)] {
            let sweep = engine.book.sweep(side, quantity);
            println!(
                "Impact {label:<4} {quantity}: {} (avg {}, unfilled {})",
                fmt_opt(engine.market_impact(side, quantity)),
                fmt_opt(sweep.average_price),
                sweep.unfilled
            );
        }
    }

    println!("---------------------------");
    println!("{:>14} {:>14} | {:<14} {:<14}", "bid size", "bid", "ask", "ask size");
    let rows = snapshot.bids.len().max(snapshot.asks.len());
    for i in 0..rows {
        let (bid_px, bid_qty) = snapshot
            .bids
            .get(i)
            .map_or((String::new(), String::new()), |(p, q)| (p.to_string(), q.to_string()));
        let (ask_px, ask_qty) = snapshot
            .asks
            .get(i)
            .map_or((String::new(), String::new()), |(p, q)| (p.to_string(), q.to_string()));
        println!("{bid_qty:>14} {bid_px:>14} | {ask_px:<14} {ask_qty:<14}");
    }

    Ok(())
}
