//! Quote model and the provider seam.
//!
//! A [`Quote`] is a normalized snapshot of the external market: one effective
//! price for the pair, a sampled price-impact curve, and route metadata from
//! the aggregator. [`QuoteProvider`] abstracts where quotes come from so the
//! monitor and tests can run against anything that produces them.

pub mod jupiter;

use crate::error::OtcError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

pub use jupiter::JupiterClient;

/// One point of the price-impact curve: executing `size` base units is
/// expected to worsen the execution price by `impact_pct` percent.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceImpactSample {
    pub size: f64,
    pub impact_pct: f64,
}

/// One hop of the aggregator's routing plan.
#[derive(Debug, Clone)]
pub struct RouteHop {
    pub label: String,
    pub percent: u8,
}

/// Snapshot of the external market price for the pair.
#[derive(Debug, Clone)]
pub struct Quote {
    /// Pair description, e.g. "SOL/USDC"
    pub pair: String,
    /// Effective price in quote units per base unit at the unit size
    pub price: f64,
    /// Base amount the unit-size request quoted
    pub input_amount: f64,
    /// Quote amount returned for that base amount
    pub output_amount: f64,
    /// Impact curve samples, ascending by size; never empty for a valid quote
    pub impact_samples: Vec<PriceImpactSample>,
    /// Routing plan of the unit-size quote
    pub route: Vec<RouteHop>,
    pub fetched_at: Instant,
    pub fetched_at_utc: DateTime<Utc>,
    /// Provider that produced the quote
    pub source: String,
    /// False when constructed as a placeholder rather than from a live fetch
    pub is_valid: bool,
}

impl Quote {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// A quote older than the staleness TTL must not be used for matching or
    /// scoring; it may still be displayed as last-known.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        !self.is_valid || self.age() > ttl
    }

    /// Bid derived from the effective price with a configurable half-spread.
    pub fn bid(&self, half_spread_pct: f64) -> f64 {
        self.price * (1.0 - half_spread_pct / 100.0)
    }

    /// Ask derived from the effective price with a configurable half-spread.
    pub fn ask(&self, half_spread_pct: f64) -> f64 {
        self.price * (1.0 + half_spread_pct / 100.0)
    }

    /// Interpolated price impact (percent) for a trade of `size` base units.
    ///
    /// Linear between the two bracketing samples; flat below the smallest
    /// sample. Sizes beyond the largest sample are refused with
    /// `InsufficientImpactData` so the caller can apply its fallback policy.
    pub fn impact_pct_at(&self, size: f64) -> Result<f64, OtcError> {
        if self.impact_samples.is_empty() {
            return Err(OtcError::InsufficientImpactData(
                "quote carries no impact samples".to_string(),
            ));
        }

        let first = &self.impact_samples[0];
        if size <= first.size {
            return Ok(first.impact_pct);
        }

        for pair in self.impact_samples.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if size <= hi.size {
                let span = hi.size - lo.size;
                if span <= f64::EPSILON {
                    return Ok(hi.impact_pct);
                }
                let t = (size - lo.size) / span;
                return Ok(lo.impact_pct + t * (hi.impact_pct - lo.impact_pct));
            }
        }

        let last = self.impact_samples.last().map(|s| s.size).unwrap_or(0.0);
        Err(OtcError::InsufficientImpactData(format!(
            "size {} exceeds largest sampled size {}",
            size, last
        )))
    }

    /// Placeholder returned before the first successful fetch.
    pub fn invalid(pair: &str, source: &str) -> Self {
        Quote {
            pair: pair.to_string(),
            price: 0.0,
            input_amount: 0.0,
            output_amount: 0.0,
            impact_samples: Vec::new(),
            route: Vec::new(),
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            source: source.to_string(),
            is_valid: false,
        }
    }
}

/// Health snapshot reported by a provider.
#[derive(Debug, Clone)]
pub struct ProviderHealthStatus {
    pub is_healthy: bool,
    pub response_time_ms: Option<u64>,
    pub status_message: String,
}

/// Source of market quotes for the pair.
///
/// Implementations must return at least one impact sample at the unit size
/// when `size_samples` is empty, and bound their own network I/O; the monitor
/// additionally wraps calls in a timeout.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_quote(&self, size_samples: &[f64]) -> Result<Quote, OtcError>;

    async fn health_check(&self) -> ProviderHealthStatus;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn quote_with_samples(samples: Vec<(f64, f64)>) -> Quote {
        Quote {
            impact_samples: samples
                .into_iter()
                .map(|(size, impact_pct)| PriceImpactSample { size, impact_pct })
                .collect(),
            is_valid: true,
            ..Quote::invalid("SOL/USDC", "test")
        }
    }

    #[test]
    fn test_impact_interpolation_between_samples() {
        let quote = quote_with_samples(vec![(1.0, 0.01), (10.0, 0.10), (100.0, 1.00)]);
        // Halfway between 10 and 100
        assert_approx_eq!(quote.impact_pct_at(55.0).unwrap(), 0.55, 1e-9);
        // Exactly on a sample
        assert_approx_eq!(quote.impact_pct_at(10.0).unwrap(), 0.10, 1e-9);
    }

    #[test]
    fn test_impact_flat_below_smallest_sample() {
        let quote = quote_with_samples(vec![(1.0, 0.01), (10.0, 0.10)]);
        assert_approx_eq!(quote.impact_pct_at(0.25).unwrap(), 0.01, 1e-9);
    }

    #[test]
    fn test_impact_beyond_curve_is_refused() {
        let quote = quote_with_samples(vec![(1.0, 0.01), (10.0, 0.10)]);
        assert!(matches!(
            quote.impact_pct_at(500.0),
            Err(OtcError::InsufficientImpactData(_))
        ));
    }

    #[test]
    fn test_empty_curve_is_refused() {
        let quote = quote_with_samples(vec![]);
        assert!(quote.impact_pct_at(1.0).is_err());
    }

    #[test]
    fn test_invalid_quote_is_always_stale() {
        let quote = Quote::invalid("SOL/USDC", "test");
        assert!(quote.is_stale(Duration::from_secs(3600)));
    }

    #[test]
    fn test_bid_ask_derivation() {
        let quote = Quote {
            price: 200.0,
            ..Quote::invalid("SOL/USDC", "test")
        };
        assert_approx_eq!(quote.bid(0.5), 199.0, 1e-9);
        assert_approx_eq!(quote.ask(0.5), 201.0, 1e-9);
        assert_approx_eq!(quote.bid(0.0), 200.0, 1e-9);
    }
}
