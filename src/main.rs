use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

use aleph_bus::Config;
use aleph_bus::core::config::RunMode;
use aleph_bus::core::{Side, Symbol};
use aleph_bus::execution::{ExecutionEngine, PaperVenue, TradingMessage};
use aleph_bus::messaging::{Envelope, Mailbox, Payload};
use aleph_bus::order::{CancelOrder, SubmitOrder};
use aleph_bus::risk::RiskGate;
use aleph_bus::scheduler::{Scheduler, TokioScheduler};
use aleph_bus::throttle::Throttler;

const RUN_FOR: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(Path::new(&path))?,
        None => Config::load_default(),
    };

    // 1. Logger: RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,aleph_bus={}", config.app.log_level)));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    tracing::info!("AlephTX bus starting in {:?} mode", config.app.mode);
    if config.app.mode == RunMode::Live {
        anyhow::bail!("live mode needs a broker adapter; only the paper venue is available");
    }

    // 2. Components
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler);

    let mut monitor = Mailbox::new("monitor", 0usize);
    monitor.register_any(|seen, envelope: Envelope<TradingMessage>| {
        *seen += 1;
        tracing::info!(
            kind = ?envelope.payload().kind(),
            category = %envelope.category(),
            "{:?}",
            envelope.payload()
        );
        Ok(())
    })?;

    let mut venue = PaperVenue::new(&config.paper, scheduler.clone()).mailbox()?;
    let throttler = Throttler::for_endpoint(
        "venue-throttle",
        config.throttle.interval(),
        config.throttle.max_per_interval,
        venue.endpoint(),
        scheduler.clone(),
    )?;

    let risk =
        RiskGate::new(config.risk.clone()).with_reference_price(config.paper.reference_price);
    let engine = ExecutionEngine::new(risk, throttler.endpoint(), monitor.endpoint()).mailbox()?;
    venue.state_mut().connect(engine.endpoint());

    let monitor = monitor.start();
    let venue = venue.start();
    let engine = engine.start();
    throttler.start();

    // 3. Demo flow
    let orders = engine.endpoint();
    let btc = Symbol::new("btc/usdt");
    let mut resting = None;
    for i in 0..5 {
        let price = Decimal::from(100 + i);
        let order = SubmitOrder::limit(btc.clone(), Side::Buy, Decimal::ONE, price);
        resting.get_or_insert(order.order_id);
        orders.send(Envelope::command(order));
    }
    orders.send(Envelope::command(SubmitOrder::market(
        Symbol::new("eth/usdt"),
        Side::Sell,
        Decimal::from(2),
    )));
    // Over the notional limit
    orders.send(Envelope::command(SubmitOrder::limit(
        btc,
        Side::Buy,
        config.risk.max_order_quantity,
        config.risk.max_order_notional,
    )));
    if let Some(order_id) = resting {
        orders.send(Envelope::command(CancelOrder { order_id }));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
        _ = tokio::time::sleep(RUN_FOR) => {}
    }

    // 4. Shutdown, upstream first
    throttler.stop();
    let engine = engine.stop().await?;
    venue.stop().await?;
    let seen = monitor.stop().await?;

    for order in engine.orders() {
        tracing::info!(
            order_id = %order.id,
            symbol = %order.symbol,
            state = %order.state(),
            filled = %order.filled_quantity,
            "final"
        );
    }
    tracing::info!(events = seen, "AlephTX bus stopped");
    Ok(())
}
