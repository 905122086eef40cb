//! End-to-end run of the simulator core over the mock provider: poll loop,
//! matching, scanning and the log sink working together without network.

use otc_simulator::config::Config;
use otc_simulator::dex::QuoteProvider;
use otc_simulator::logsink::LogSink;
use otc_simulator::monitor::PriceMonitor;
use otc_simulator::pool::{OfferFilter, OfferStatus, OtcPool, PriceRule, Side};
use otc_simulator::testing::{MemorySink, MockQuoteProvider};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> Config {
    Config {
        poll_interval_secs: 1,
        quote_ttl_secs: 60,
        request_timeout_secs: 2,
        backoff_ceiling_secs: 0, // keep retry cadence at the poll interval
        ..Config::default()
    }
}

struct Harness {
    provider: Arc<MockQuoteProvider>,
    pool: Arc<OtcPool>,
    sink: Arc<MemorySink>,
    monitor: PriceMonitor,
}

fn harness(price: f64) -> Harness {
    let provider = Arc::new(MockQuoteProvider::constant(price));
    let pool = Arc::new(OtcPool::new(PriceRule::Midpoint));
    let sink = Arc::new(MemorySink::default());
    let monitor = PriceMonitor::new(
        Arc::clone(&provider) as Arc<dyn QuoteProvider>,
        Arc::clone(&pool),
        Arc::clone(&sink) as Arc<dyn LogSink>,
        fast_config(),
    );
    Harness {
        provider,
        pool,
        sink,
        monitor,
    }
}

#[tokio::test]
async fn full_cycle_matches_logs_and_ranks() {
    let h = harness(100.0);

    // Resting sell below market, observed by one cycle first so later
    // matches carry market context.
    h.pool.create_offer(Side::Sell, 10.0, 95.0).unwrap();
    h.monitor.force_update().await.unwrap();

    // A crossing buy arrives and matches 4 units at the midpoint.
    h.pool.create_offer(Side::Buy, 4.0, 96.0).unwrap();
    h.monitor.force_update().await.unwrap();

    let matches = h.sink.matches();
    assert_eq!(matches.len(), 1);
    assert!((matches[0].quantity - 4.0).abs() < 1e-9);
    assert!((matches[0].price - 95.5).abs() < 1e-9);
    assert_eq!(matches[0].market_price, Some(100.0));

    // Each cycle logged one price sample and extended the history.
    assert_eq!(h.sink.prices(), vec![100.0, 100.0]);
    assert_eq!(h.monitor.history_prices(), vec![100.0, 100.0]);

    // The leftover sell (6 @ 95) is the single ranked opportunity.
    let opportunities = h.monitor.opportunities();
    assert_eq!(opportunities.len(), 1);
    assert_eq!(opportunities[0].side, Side::Sell);
    assert!(opportunities[0].net_score > 0.0);

    let open = h.pool.list_offers(OfferFilter::open());
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].status, OfferStatus::Open);
}

#[tokio::test]
async fn poll_loop_runs_and_stops_cleanly() {
    let h = harness(100.0);

    h.monitor.start(Duration::from_millis(20)).unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(h.monitor.is_running());

    h.monitor.stop().await;
    assert!(!h.monitor.is_running());

    let polled = h.provider.calls();
    assert!(polled >= 2, "expected repeated polling, saw {} calls", polled);
    assert_eq!(h.sink.prices().len(), h.monitor.history_prices().len());

    // No further fetches after stop.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(h.provider.calls(), polled);
}

#[tokio::test]
async fn outage_degrades_to_stale_data_without_crashing() {
    let h = harness(150.0);

    h.monitor.start(Duration::from_millis(20)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.monitor.latest_fresh().is_some());

    // Hard outage: every subsequent fetch fails.
    h.provider.fail_next(1000, "provider down");
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Loop is alive, still serving the last good quote.
    assert!(h.monitor.is_running());
    let last = h.monitor.latest().expect("last quote retained through outage");
    assert!((last.price - 150.0).abs() < 1e-9);

    h.monitor.stop().await;
}

#[tokio::test]
async fn price_moves_update_rankings_between_cycles() {
    let h = harness(100.0);

    // At 100 the sell @ 99 is attractive; at 90 it is not.
    h.pool.create_offer(Side::Sell, 5.0, 99.0).unwrap();

    h.monitor.force_update().await.unwrap();
    assert_eq!(h.monitor.opportunities().len(), 1);

    h.provider.set_price(90.0);
    h.monitor.force_update().await.unwrap();
    assert!(h.monitor.opportunities().is_empty());
    assert_eq!(h.monitor.history_prices(), vec![100.0, 90.0]);
}
