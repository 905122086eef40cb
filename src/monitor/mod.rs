//! Price Monitor
//!
//! The one background task in the system. It polls the quote provider at a
//! configurable cadence, keeps the latest quote plus a bounded rolling
//! history, and on every accepted quote triggers a matching pass and an
//! arbitrage scan. Provider failures never escape the loop: the previous
//! quote ages into staleness in place and the next attempt backs off
//! exponentially up to a ceiling.

use crate::arbitrage::{ArbitrageScanner, Opportunity};
use crate::config::Config;
use crate::dex::{Quote, QuoteProvider};
use crate::error::OtcError;
use crate::logsink::LogSink;
use crate::pool::{OfferFilter, OtcPool};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// One accepted price sample.
#[derive(Debug, Clone, Copy)]
pub struct PricePoint {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, append-only window of accepted prices, oldest evicted first.
#[derive(Debug)]
pub struct PriceHistory {
    window: VecDeque<PricePoint>,
    max_samples: usize,
}

impl PriceHistory {
    pub fn new(max_samples: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn push(&mut self, price: f64, timestamp: DateTime<Utc>) {
        if self.window.len() == self.max_samples {
            self.window.pop_front();
        }
        self.window.push_back(PricePoint { price, timestamp });
    }

    /// Prices oldest first, the shape the indicator functions expect.
    pub fn prices(&self) -> Vec<f64> {
        self.window.iter().map(|p| p.price).collect()
    }

    pub fn points(&self) -> Vec<PricePoint> {
        self.window.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// State shared between the poll task and the monitor's accessors.
struct MonitorCore {
    provider: Arc<dyn QuoteProvider>,
    pool: Arc<OtcPool>,
    scanner: ArbitrageScanner,
    sink: Arc<dyn LogSink>,
    config: Config,
    latest: RwLock<Option<Quote>>,
    history: RwLock<PriceHistory>,
    opportunities: RwLock<Vec<Opportunity>>,
}

impl MonitorCore {
    /// One poll cycle: bounded fetch, then state update, matching pass, sink
    /// appends and scan. The sink writes happen inside the cycle so a stop
    /// request can never abandon a record halfway.
    async fn run_cycle(&self) -> Result<f64, OtcError> {
        let deadline = Duration::from_secs(self.config.request_timeout_secs);
        let quote = timeout(
            deadline,
            self.provider.fetch_quote(&self.config.impact_sample_sizes),
        )
        .await
        .map_err(|_| {
            OtcError::ProviderUnavailable(format!(
                "{} fetch timed out after {:?}",
                self.provider.name(),
                deadline
            ))
        })??;

        let price = quote.price;
        {
            let mut latest = self.latest.write().unwrap();
            *latest = Some(quote.clone());
        }
        {
            let mut history = self.history.write().unwrap();
            history.push(price, quote.fetched_at_utc);
        }

        // Fresh price: re-run matching so new matches carry market context.
        self.pool.on_market_price(Some(price));
        for record in self.pool.take_pending_matches() {
            if let Err(e) = self.sink.append_match(&record).await {
                warn!("Failed to log match {}x{}: {}", record.buy_id, record.sell_id, e);
            }
        }
        if let Err(e) = self.sink.append_price_sample(&quote).await {
            warn!("Failed to log price sample: {}", e);
        }

        let offers = self.pool.list_offers(OfferFilter::open());
        let ranked = self.scanner.scan(&offers, &quote);
        info!(
            "Price update: {} = {:.4} ({} open offers, {} opportunities)",
            quote.pair,
            price,
            offers.len(),
            ranked.len()
        );
        *self.opportunities.write().unwrap() = ranked;

        Ok(price)
    }

    fn quote_ttl(&self) -> Duration {
        Duration::from_secs(self.config.quote_ttl_secs)
    }
}

/// Background polling service around a [`QuoteProvider`].
pub struct PriceMonitor {
    core: Arc<MonitorCore>,
    running: Arc<AtomicBool>,
    /// Fresh per started task, so a stray stop cannot pre-cancel a restart
    shutdown: Mutex<Arc<Notify>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PriceMonitor {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        pool: Arc<OtcPool>,
        sink: Arc<dyn LogSink>,
        config: Config,
    ) -> Self {
        let scanner = ArbitrageScanner::new(
            Duration::from_secs(config.quote_ttl_secs),
            config.quote_half_spread_pct,
            config.impact_fallback,
            config.min_alert_spread_pct,
        );
        let history = PriceHistory::new(config.price_history_len);
        Self {
            core: Arc::new(MonitorCore {
                provider,
                pool,
                scanner,
                sink,
                config,
                latest: RwLock::new(None),
                history: RwLock::new(history),
                opportunities: RwLock::new(Vec::new()),
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Mutex::new(Arc::new(Notify::new())),
            handle: Mutex::new(None),
        }
    }

    /// Begin the poll loop. Fails with `AlreadyRunning` when active.
    pub fn start(&self, interval: Duration) -> Result<(), OtcError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OtcError::AlreadyRunning);
        }

        let core = Arc::clone(&self.core);
        let running = Arc::clone(&self.running);
        let shutdown = Arc::new(Notify::new());
        *self.shutdown.lock().unwrap() = Arc::clone(&shutdown);
        let ceiling = Duration::from_secs(core.config.backoff_ceiling_secs);

        info!(
            "Price monitor started: polling {} every {:?}",
            core.provider.name(),
            interval
        );

        let task = tokio::spawn(async move {
            let mut consecutive_failures: u32 = 0;
            loop {
                match core.run_cycle().await {
                    Ok(_) => consecutive_failures = 0,
                    Err(e) => {
                        consecutive_failures += 1;
                        warn!(
                            "Poll cycle failed ({} consecutive): {}",
                            consecutive_failures, e
                        );
                        // Let matching know the hint has gone stale.
                        let stale = core
                            .latest
                            .read()
                            .unwrap()
                            .as_ref()
                            .map_or(true, |q| q.is_stale(core.quote_ttl()));
                        if stale {
                            core.pool.on_market_price(None);
                        }
                    }
                }

                let delay = if consecutive_failures == 0 {
                    interval
                } else {
                    // interval * 2^failures, capped; exponent capped too so the
                    // multiply cannot overflow during long outages.
                    interval
                        .saturating_mul(2u32.saturating_pow(consecutive_failures.min(16)))
                        .min(ceiling.max(interval))
                };

                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = sleep(delay) => {}
                }
            }
            running.store(false, Ordering::SeqCst);
            info!("Price monitor stopped");
        });

        *self.handle.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Signal the loop to terminate after its current iteration and wait for
    /// it. Idempotent; safe to call when never started.
    pub async fn stop(&self) {
        self.shutdown.lock().unwrap().notify_one();
        let task = self.handle.lock().unwrap().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Price monitor task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Most recent quote, valid or not. Staleness is the caller's check via
    /// [`Quote::is_stale`] or [`PriceMonitor::latest_fresh`].
    pub fn latest(&self) -> Option<Quote> {
        self.core.latest.read().unwrap().clone()
    }

    /// Most recent quote only if it is still fresh enough for decisions.
    pub fn latest_fresh(&self) -> Option<Quote> {
        self.latest().filter(|q| !q.is_stale(self.core.quote_ttl()))
    }

    pub fn history_prices(&self) -> Vec<f64> {
        self.core.history.read().unwrap().prices()
    }

    pub fn history_points(&self) -> Vec<PricePoint> {
        self.core.history.read().unwrap().points()
    }

    /// Ranking produced by the most recent successful cycle.
    pub fn opportunities(&self) -> Vec<Opportunity> {
        self.core.opportunities.read().unwrap().clone()
    }

    /// One immediate fetch outside the poll cadence.
    pub async fn force_update(&self) -> Result<f64, OtcError> {
        self.core.run_cycle().await
    }
}
