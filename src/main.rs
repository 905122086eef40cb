use log::{error, info, warn};
use otc_simulator::{
    analytics,
    config::Config,
    dex::JupiterClient,
    error::OtcError,
    logsink::CsvLogger,
    monitor::PriceMonitor,
    pool::{OfferFilter, OtcPool, Side},
    utils::setup_logging,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), OtcError> {
    dotenv::dotenv().ok();
    setup_logging().expect("Failed to initialize logging");
    info!("🚀 OTC simulator starting...");

    let config = Config::from_env();
    config.validate_and_log()?;

    let provider = Arc::new(JupiterClient::new(&config)?);
    let sink = Arc::new(CsvLogger::new(
        &config.matches_csv_path,
        &config.prices_csv_path,
    )?);
    let pool = Arc::new(OtcPool::new(config.price_rule));

    let poll_interval = Duration::from_secs(config.poll_interval_secs);
    let rsi_period = config.rsi_period;
    let volatility_window = config.volatility_window;
    let monitor = PriceMonitor::new(provider, Arc::clone(&pool), sink, config);
    monitor.start(poll_interval)?;

    // Seed a small book around the first observed price so matching and
    // scanning have something to chew on from the start.
    match monitor.force_update().await {
        Ok(price) => {
            for (side, limit) in [(Side::Sell, price * 1.01), (Side::Buy, price * 0.99)] {
                if let Err(e) = pool.create_offer(side, 5.0, limit) {
                    warn!("Could not seed {} offer: {}", side, e);
                }
            }
            info!("Seeded demo book around market price {:.4}", price);
        }
        Err(e) => warn!("Initial fetch failed, starting with an empty view: {}", e),
    }

    let mut status_tick = tokio::time::interval(Duration::from_secs(60));
    status_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    status_tick.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = status_tick.tick() => {
                report_status(&monitor, &pool, rsi_period, volatility_window);
            }
        }
    }

    monitor.stop().await;
    info!("OTC simulator stopped cleanly");
    Ok(())
}

fn report_status(monitor: &PriceMonitor, pool: &OtcPool, rsi_period: usize, volatility_window: usize) {
    let stats = pool.stats();
    match monitor.latest() {
        Some(quote) => info!(
            "Status: {} = {:.4} from {} ({} open offers, {} matches, {} opportunities)",
            quote.pair,
            quote.price,
            quote.source,
            stats.open_offers,
            stats.matches,
            monitor.opportunities().len()
        ),
        None => info!(
            "Status: no quote yet ({} open offers)",
            pool.list_offers(OfferFilter::open()).len()
        ),
    }

    let prices = monitor.history_prices();
    match analytics::rsi(&prices, rsi_period) {
        Ok(value) => info!("RSI({}) = {:.1}", rsi_period, value),
        Err(e) => warn!("RSI unavailable: {}", e),
    }
    if prices.len() >= volatility_window {
        match analytics::volatility(&prices[prices.len() - volatility_window..]) {
            Ok(value) => info!("Volatility({}) = {:.6}", volatility_window, value),
            Err(e) => error!("Volatility computation failed: {}", e),
        }
    }
    let signal = analytics::trading_signal(&prices);
    info!(
        "Signal: {:?} ({:?}) - {}",
        signal.action,
        signal.strength,
        signal.reasons.join("; ")
    );
}
