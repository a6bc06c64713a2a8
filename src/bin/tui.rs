use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use depth_lob::{AddOrder, BookConfig, BookSnapshot, CancelOrder, Command, Engine, LevelPair, ModifyOrder, Side};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::{io, time::Duration};

const DISPLAY_DEPTH: usize = 15;
const MAX_LIVE_ORDERS: usize = 5_000;
const IMPACT_SIZE: i64 = 250;

/// What the feed thread publishes for the render loop.
#[derive(Clone)]
struct Published {
    snapshot: BookSnapshot,
    buy_impact: Option<Decimal>,
    sell_impact: Option<Decimal>,
}

struct SharedStats {
    ops_count: AtomicU64,
    avg_latency_ns: AtomicU64,
    rejected: AtomicU64,
    running: AtomicBool,
    published: RwLock<Option<Published>>,
}

impl SharedStats {
    fn new() -> Self {
        Self {
            ops_count: AtomicU64::new(0),
            avg_latency_ns: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            running: AtomicBool::new(true),
            published: RwLock::new(None),
        }
    }
}

fn render_level_bars(levels: &[LevelPair]) -> String {
    let max_qty = levels
        .iter()
        .filter_map(|(_, qty)| qty.to_f64())
        .fold(1.0_f64, f64::max);

    let mut out = String::new();
    for (price, qty) in levels.iter().take(DISPLAY_DEPTH) {
        let bar_len = ((qty.to_f64().unwrap_or(0.0) / max_qty) * 20.0) as usize;
        out.push_str(&format!("{:>9.2} {:<20} {}\n", price, "█".repeat(bar_len), qty));
    }
    out
}

fn fmt_opt(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

/// Synthetic feed: a random-walk mid with orders placed around it, old
/// orders cancelled once the book holds `MAX_LIVE_ORDERS`.
fn run_feed(stats: Arc<SharedStats>) {
    let config = BookConfig {
        snapshot_depth: DISPLAY_DEPTH,
        ..BookConfig::default()
    };
    let mut engine = Engine::with_config("ETH-USD", config);
    engine.warm_up();

    let mut live: VecDeque<u64> = VecDeque::with_capacity(MAX_LIVE_ORDERS + 1);
    let mut order_id = 0u64;
    let mut rng = 12345u64; // LCG
    let mut loop_count = 0u64;
    // Cents; starts at 3000.00
    let mut mid_cents = 300_000i64;

    while stats.running.load(Ordering::Relaxed) {
        const BATCH_SIZE: u64 = 1000;
        let start_batch = std::time::Instant::now();
        let mut rejected = 0u64;

        for _ in 0..BATCH_SIZE {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
            // LCG low bits are poor
            let r = rng >> 32;

            if r % 100 == 0 {
                mid_cents = (mid_cents + (r % 11) as i64 - 5).max(1_000);
            }

            let cmd: Command = if live.len() >= MAX_LIVE_ORDERS {
                let oldest = live.pop_front().unwrap_or_default();
                CancelOrder {
                    order_id: oldest.to_string(),
                }
                .into()
            } else if r % 7 == 0 && !live.is_empty() {
                let target = live[(r as usize / 7) % live.len()];
                ModifyOrder {
                    order_id: target.to_string(),
                    new_quantity: Decimal::from(1 + (r >> 8) % 50),
                }
                .into()
            } else {
                order_id += 1;
                live.push_back(order_id);

                let side = if r % 2 == 0 { Side::Bid } else { Side::Ask };
                let offset = (100 + (r % 400) as i64) / 2;
                let noise = (r % 20) as i64 - 10;
                let cents = match side {
                    Side::Bid => mid_cents - offset + noise,
                    Side::Ask => mid_cents + offset + noise,
                }
                .max(1);

                AddOrder {
                    order_id: order_id.to_string(),
                    side,
                    price: Decimal::new(cents, 2),
                    quantity: Decimal::from(1 + rng % 100),
                    timestamp_ns: order_id as i64,
                }
                .into()
            };

            if engine.process_command(cmd).is_err() {
                rejected += 1;
            }
        }

        loop_count += 1;

        stats.ops_count.fetch_add(BATCH_SIZE, Ordering::Relaxed);
        stats.rejected.fetch_add(rejected, Ordering::Relaxed);
        let ns_per_op = start_batch.elapsed().as_nanos() as u64 / BATCH_SIZE;
        stats.avg_latency_ns.store(ns_per_op, Ordering::Relaxed);

        if loop_count % 50 == 0 {
            let size = Decimal::from(IMPACT_SIZE);
            let published = Published {
                snapshot: engine.snapshot(),
                buy_impact: engine.market_impact(Side::Bid, size),
                sell_impact: engine.market_impact(Side::Ask, size),
            };
            if let Ok(mut guard) = stats.published.write() {
                *guard = Some(published);
            }
        }
    }

    tracing::info!(applied = engine.applied(), rejected = engine.rejected(), "feed stopped");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let stats = Arc::new(SharedStats::new());
    let feed_stats = stats.clone();
    let feed = thread::spawn(move || run_feed(feed_stats));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut last_ops = 0;
    let mut last_time = std::time::Instant::now();
    let mut throughput = 0.0;

    loop {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q') {
                    break;
                }
            }
        }

        let now = std::time::Instant::now();
        if now.duration_since(last_time).as_secs_f64() >= 1.0 {
            let current_ops = stats.ops_count.load(Ordering::Relaxed);
            throughput = (current_ops - last_ops) as f64;
            last_ops = current_ops;
            last_time = now;
        }

        let published = stats.published.read().ok().and_then(|guard| guard.clone());

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(1)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Min(10),
                    Constraint::Length(10),
                ])
                .split(f.size());

            let header = Block::default().borders(Borders::ALL).title("DEPTH-LOB Demo (Random Walk)");
            let title = Paragraph::new("ETH-USD | Press 'q' to quit")
                .block(header)
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::Cyan));
            f.render_widget(title, chunks[0]);

            let book_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(chunks[1]);

            let (bids_text, asks_text) = match &published {
                Some(p) => (render_level_bars(&p.snapshot.bids), render_level_bars(&p.snapshot.asks)),
                None => (String::new(), String::new()),
            };

            let bids_widget = Paragraph::new(bids_text).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("BIDS")
                    .style(Style::default().fg(Color::Green)),
            );
            let asks_widget = Paragraph::new(asks_text).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("ASKS")
                    .style(Style::default().fg(Color::Red)),
            );
            f.render_widget(bids_widget, book_chunks[0]);
            f.render_widget(asks_widget, book_chunks[1]);

            let ops_fmt = if throughput > 1_000_000.0 {
                format!("{:.2} M", throughput / 1_000_000.0)
            } else {
                format!("{:.0} k", throughput / 1_000.0)
            };
            let latency = stats.avg_latency_ns.load(Ordering::Relaxed);
            let rejected = stats.rejected.load(Ordering::Relaxed);

            let market = match &published {
                Some(p) => format!(
                    "Mid: {}  Spread: {}  Imbalance: {:+.3}\nImpact {IMPACT_SIZE}: buy {} / sell {}\nOrders: {}",
                    fmt_opt(p.snapshot.mid_price),
                    fmt_opt(p.snapshot.spread),
                    p.snapshot.imbalance,
                    fmt_opt(p.buy_impact),
                    fmt_opt(p.sell_impact),
                    p.snapshot.order_count,
                ),
                None => "Waiting for feed...".to_string(),
            };

            let stats_text = format!(
                "Throughput: {} ops/sec\nLatency (Avg Batch): {} ns\nRejected: {}\n{}",
                ops_fmt, latency, rejected, market
            );
            let stats_block = Paragraph::new(stats_text)
                .block(Block::default().borders(Borders::ALL).title("Book Analytics"))
                .style(Style::default().fg(Color::Yellow));
            f.render_widget(stats_block, chunks[2]);
        })?;
    }

    stats.running.store(false, Ordering::Relaxed);
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    let _ = feed.join();
    Ok(())
}
