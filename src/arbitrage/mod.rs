//! Arbitrage Scanner
//!
//! Consumes the pool's open offers and the latest oracle quote, scores each
//! offer's edge against the market net of estimated price impact, and ranks
//! the surviving opportunities best-first. Opportunities are ephemeral; every
//! scan recomputes them from the snapshot it was handed.

use crate::dex::Quote;
use crate::error::OtcError;
use crate::pool::{Offer, Side};
use log::{debug, info, warn};
use std::str::FromStr;
use std::time::Duration;

/// Policy when the impact curve cannot cover a requested size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactFallback {
    /// Treat impact as zero and flag the opportunity as degraded
    Zero,
    /// Exclude the offer from the scan
    Skip,
}

impl FromStr for ImpactFallback {
    type Err = OtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" => Ok(ImpactFallback::Zero),
            "skip" => Ok(ImpactFallback::Skip),
            other => Err(OtcError::ConfigError(format!(
                "unknown impact fallback '{}' (expected zero|skip)",
                other
            ))),
        }
    }
}

/// A scored potential arbitrage action against one offer.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub offer_id: u64,
    pub side: Side,
    pub offer_price: f64,
    pub market_price: f64,
    pub quantity: f64,
    /// Edge before impact, in quote units
    pub gross_edge: f64,
    /// Estimated cost of moving the market for this size, in quote units
    pub impact_cost: f64,
    /// `gross_edge - impact_cost`; always positive in scan output
    pub net_score: f64,
    /// OTC-vs-market spread in percent, signed so positive favors taking
    pub spread_pct: f64,
    /// True when impact data was insufficient and impact was taken as zero
    pub impact_degraded: bool,
}

/// Scores and ranks offers against the live quote.
pub struct ArbitrageScanner {
    quote_ttl: Duration,
    half_spread_pct: f64,
    impact_fallback: ImpactFallback,
    min_alert_spread_pct: f64,
}

impl ArbitrageScanner {
    pub fn new(
        quote_ttl: Duration,
        half_spread_pct: f64,
        impact_fallback: ImpactFallback,
        min_alert_spread_pct: f64,
    ) -> Self {
        Self {
            quote_ttl,
            half_spread_pct,
            impact_fallback,
            min_alert_spread_pct,
        }
    }

    /// Rank the offers against the quote, best net score first.
    ///
    /// A stale or invalid quote yields no opportunities; the scan operates on
    /// whatever snapshot it was given and never blocks on fresher data.
    pub fn scan(&self, offers: &[Offer], quote: &Quote) -> Vec<Opportunity> {
        if quote.is_stale(self.quote_ttl) {
            debug!("Scan skipped: quote from {} is stale or invalid", quote.source);
            return Vec::new();
        }

        let mut opportunities: Vec<Opportunity> = offers
            .iter()
            .filter(|o| o.is_open())
            .filter_map(|offer| self.score_offer(offer, quote))
            .filter(|opp| opp.net_score > 0.0)
            .collect();

        opportunities.sort_by(|a, b| {
            b.net_score
                .total_cmp(&a.net_score)
                .then(b.quantity.total_cmp(&a.quantity))
        });

        for opp in &opportunities {
            if opp.spread_pct.abs() >= self.min_alert_spread_pct {
                info!(
                    "Arbitrage opportunity: offer #{} {} {} @ {} vs market {} ({:+.2}%, net {:.4})",
                    opp.offer_id,
                    opp.side,
                    opp.quantity,
                    opp.offer_price,
                    opp.market_price,
                    opp.spread_pct,
                    opp.net_score
                );
            }
        }

        opportunities
    }

    fn score_offer(&self, offer: &Offer, quote: &Quote) -> Option<Opportunity> {
        // Buying from a sell offer exits at the market bid; filling a buy
        // offer sources at the market ask.
        let gross_edge = match offer.side {
            Side::Sell => (quote.bid(self.half_spread_pct) - offer.price) * offer.quantity,
            Side::Buy => (offer.price - quote.ask(self.half_spread_pct)) * offer.quantity,
        };

        let (impact_cost, impact_degraded) = match quote.impact_pct_at(offer.quantity) {
            Ok(impact_pct) => (impact_pct / 100.0 * quote.price * offer.quantity, false),
            Err(e) => match self.impact_fallback {
                ImpactFallback::Zero => {
                    warn!(
                        "Impact data insufficient for offer #{} (size {}): {}; treating impact as zero",
                        offer.id, offer.quantity, e
                    );
                    (0.0, true)
                }
                ImpactFallback::Skip => {
                    warn!(
                        "Impact data insufficient for offer #{} (size {}): {}; skipping offer",
                        offer.id, offer.quantity, e
                    );
                    return None;
                }
            },
        };

        // The %-spread convention of the original alerting: positive means
        // the counterparty taking this offer comes out ahead of the market.
        let spread_pct = match offer.side {
            Side::Sell => (quote.price - offer.price) / quote.price * 100.0,
            Side::Buy => (offer.price - quote.price) / quote.price * 100.0,
        };

        Some(Opportunity {
            offer_id: offer.id,
            side: offer.side,
            offer_price: offer.price,
            market_price: quote.price,
            quantity: offer.quantity,
            gross_edge,
            impact_cost,
            net_score: gross_edge - impact_cost,
            spread_pct,
            impact_degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::PriceImpactSample;
    use crate::pool::OfferStatus;
    use assert_approx_eq::assert_approx_eq;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    fn scanner() -> ArbitrageScanner {
        ArbitrageScanner::new(Duration::from_secs(60), 0.0, ImpactFallback::Zero, 1.0)
    }

    fn quote(price: f64, samples: Vec<(f64, f64)>) -> Quote {
        Quote {
            pair: "SOL/USDC".to_string(),
            price,
            input_amount: 1.0,
            output_amount: price,
            impact_samples: samples
                .into_iter()
                .map(|(size, impact_pct)| PriceImpactSample { size, impact_pct })
                .collect(),
            route: Vec::new(),
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            source: "test".to_string(),
            is_valid: true,
        }
    }

    fn offer(id: u64, side: Side, quantity: f64, price: f64) -> Offer {
        Offer {
            id,
            side,
            quantity,
            original_quantity: quantity,
            price,
            status: OfferStatus::Open,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sell_below_market_is_an_opportunity() {
        // Seller asks 95 while the market pays 100: 5/unit edge on 10 units.
        let opportunities = scanner().scan(
            &[offer(1, Side::Sell, 10.0, 95.0)],
            &quote(100.0, vec![(1.0, 0.0), (100.0, 0.0)]),
        );
        assert_eq!(opportunities.len(), 1);
        assert_approx_eq!(opportunities[0].gross_edge, 50.0);
        assert_approx_eq!(opportunities[0].net_score, 50.0);
        assert_approx_eq!(opportunities[0].spread_pct, 5.0);
    }

    #[test]
    fn test_buy_above_market_is_an_opportunity() {
        let opportunities = scanner().scan(
            &[offer(1, Side::Buy, 4.0, 105.0)],
            &quote(100.0, vec![(1.0, 0.0), (100.0, 0.0)]),
        );
        assert_eq!(opportunities.len(), 1);
        assert_approx_eq!(opportunities[0].gross_edge, 20.0);
        assert_approx_eq!(opportunities[0].spread_pct, 5.0);
    }

    #[test]
    fn test_non_positive_scores_excluded() {
        let opportunities = scanner().scan(
            &[
                offer(1, Side::Sell, 10.0, 100.0), // zero edge
                offer(2, Side::Sell, 10.0, 101.0), // negative edge
                offer(3, Side::Buy, 10.0, 99.0),   // negative edge
            ],
            &quote(100.0, vec![(1.0, 0.0), (100.0, 0.0)]),
        );
        assert!(opportunities.is_empty());
    }

    #[test]
    fn test_impact_cost_reduces_net_score() {
        // 1% impact at size 10 on a 100 market: cost = 0.01 * 100 * 10 = 10.
        let opportunities = scanner().scan(
            &[offer(1, Side::Sell, 10.0, 95.0)],
            &quote(100.0, vec![(1.0, 1.0), (100.0, 1.0)]),
        );
        assert_eq!(opportunities.len(), 1);
        assert_approx_eq!(opportunities[0].impact_cost, 10.0);
        assert_approx_eq!(opportunities[0].net_score, 40.0);
        assert!(!opportunities[0].impact_degraded);
    }

    #[test]
    fn test_impact_can_kill_an_opportunity() {
        // Edge is 10 but impact costs 20.
        let opportunities = scanner().scan(
            &[offer(1, Side::Sell, 10.0, 99.0)],
            &quote(100.0, vec![(1.0, 2.0), (100.0, 2.0)]),
        );
        assert!(opportunities.is_empty());
    }

    #[test]
    fn test_zero_fallback_marks_degraded() {
        // Curve only covers up to size 5; the offer is 10.
        let opportunities = scanner().scan(
            &[offer(1, Side::Sell, 10.0, 95.0)],
            &quote(100.0, vec![(1.0, 0.1), (5.0, 0.5)]),
        );
        assert_eq!(opportunities.len(), 1);
        assert!(opportunities[0].impact_degraded);
        assert_approx_eq!(opportunities[0].impact_cost, 0.0);
    }

    #[test]
    fn test_skip_fallback_excludes_offer() {
        let scanner =
            ArbitrageScanner::new(Duration::from_secs(60), 0.0, ImpactFallback::Skip, 1.0);
        let opportunities = scanner.scan(
            &[offer(1, Side::Sell, 10.0, 95.0)],
            &quote(100.0, vec![(1.0, 0.1), (5.0, 0.5)]),
        );
        assert!(opportunities.is_empty());
    }

    #[test]
    fn test_output_sorted_descending_ties_by_quantity() {
        let opportunities = scanner().scan(
            &[
                offer(1, Side::Sell, 2.0, 95.0),  // edge 10
                offer(2, Side::Sell, 10.0, 99.0), // edge 10, larger size
                offer(3, Side::Sell, 1.0, 80.0),  // edge 20
            ],
            &quote(100.0, vec![(1.0, 0.0), (100.0, 0.0)]),
        );
        assert_eq!(
            opportunities.iter().map(|o| o.offer_id).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
        for pair in opportunities.windows(2) {
            assert!(pair[0].net_score >= pair[1].net_score);
        }
    }

    #[test]
    fn test_stale_quote_yields_nothing() {
        let mut stale = quote(100.0, vec![(1.0, 0.0)]);
        stale.is_valid = false;
        let opportunities = scanner().scan(&[offer(1, Side::Sell, 10.0, 50.0)], &stale);
        assert!(opportunities.is_empty());
    }

    #[test]
    fn test_closed_offers_ignored() {
        let mut cancelled = offer(1, Side::Sell, 10.0, 50.0);
        cancelled.status = OfferStatus::Cancelled;
        let opportunities =
            scanner().scan(&[cancelled], &quote(100.0, vec![(1.0, 0.0), (100.0, 0.0)]));
        assert!(opportunities.is_empty());
    }

    #[test]
    fn test_half_spread_tightens_edges() {
        // With a 1% half-spread the bid drops to 99, shrinking the sell edge.
        let scanner =
            ArbitrageScanner::new(Duration::from_secs(60), 1.0, ImpactFallback::Zero, 1.0);
        let opportunities = scanner.scan(
            &[offer(1, Side::Sell, 10.0, 95.0)],
            &quote(100.0, vec![(1.0, 0.0), (100.0, 0.0)]),
        );
        assert_eq!(opportunities.len(), 1);
        assert_approx_eq!(opportunities[0].gross_edge, 40.0);
    }
}
