//! Test doubles: a scripted quote provider and in-memory log sinks.
//!
//! Lets the monitor, scanner and integration tests run whole poll cycles
//! without touching the network or the filesystem.

use crate::dex::{PriceImpactSample, ProviderHealthStatus, Quote, QuoteProvider, RouteHop};
use crate::error::OtcError;
use crate::logsink::LogSink;
use crate::pool::Match;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Scripted [`QuoteProvider`]: serves a configurable price, with optional
/// queued failures, and a linear impact curve (`impact_slope_pct` percent of
/// impact per base unit of size).
pub struct MockQuoteProvider {
    price: Mutex<f64>,
    queued_failures: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
    impact_slope_pct: f64,
}

impl MockQuoteProvider {
    pub fn constant(price: f64) -> Self {
        Self {
            price: Mutex::new(price),
            queued_failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            impact_slope_pct: 0.001,
        }
    }

    pub fn with_impact_slope(price: f64, impact_slope_pct: f64) -> Self {
        Self {
            impact_slope_pct,
            ..Self::constant(price)
        }
    }

    pub fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = price;
    }

    /// The next `n` fetches fail with `message`.
    pub fn fail_next(&self, n: usize, message: &str) {
        let mut queue = self.queued_failures.lock().unwrap();
        for _ in 0..n {
            queue.push_back(message.to_string());
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for MockQuoteProvider {
    fn name(&self) -> &str {
        "MockProvider"
    }

    async fn fetch_quote(&self, size_samples: &[f64]) -> Result<Quote, OtcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.queued_failures.lock().unwrap().pop_front() {
            return Err(OtcError::ProviderUnavailable(message));
        }

        let price = *self.price.lock().unwrap();
        let mut sizes: Vec<f64> = size_samples.iter().copied().filter(|s| *s > 0.0).collect();
        if !sizes.contains(&1.0) {
            sizes.push(1.0);
        }
        sizes.sort_by(|a, b| a.total_cmp(b));

        Ok(Quote {
            pair: "SOL/USDC".to_string(),
            price,
            input_amount: 1.0,
            output_amount: price,
            impact_samples: sizes
                .into_iter()
                .map(|size| PriceImpactSample {
                    size,
                    impact_pct: size * self.impact_slope_pct,
                })
                .collect(),
            route: vec![RouteHop {
                label: "MockAmm".to_string(),
                percent: 100,
            }],
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            source: self.name().to_string(),
            is_valid: true,
        })
    }

    async fn health_check(&self) -> ProviderHealthStatus {
        ProviderHealthStatus {
            is_healthy: true,
            response_time_ms: Some(0),
            status_message: "mock provider".to_string(),
        }
    }
}

/// Sink that drops everything. For tests that don't care about the log.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl LogSink for NullSink {
    async fn append_match(&self, _record: &Match) -> Result<(), OtcError> {
        Ok(())
    }

    async fn append_price_sample(&self, _quote: &Quote) -> Result<(), OtcError> {
        Ok(())
    }
}

/// Sink that records appends in memory for assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    matches: Mutex<Vec<Match>>,
    prices: Mutex<Vec<f64>>,
}

impl MemorySink {
    pub fn matches(&self) -> Vec<Match> {
        self.matches.lock().unwrap().clone()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.prices.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn append_match(&self, record: &Match) -> Result<(), OtcError> {
        self.matches.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn append_price_sample(&self, quote: &Quote) -> Result<(), OtcError> {
        self.prices.lock().unwrap().push(quote.price);
        Ok(())
    }
}
