//! OTC Pool
//!
//! The private order book. Holds open buy/sell offers, exposes
//! create/cancel/list operations, and runs the matching pass whenever offers
//! change or a fresh oracle price arrives. Offers are never deleted, only
//! status-flagged, so the full history remains auditable.
//!
//! All state lives behind one `RwLock`; a matching pass runs under the write
//! lock, so it is atomic with respect to concurrent offer creation and
//! cancellation and an in-flight pass can neither miss a new offer nor match
//! one twice.

use crate::error::OtcError;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferStatus {
    Open,
    Matched,
    Cancelled,
}

/// Execution price formation rule for matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceRule {
    /// Midpoint of the two limit prices
    Midpoint,
    /// Limit price of the older (resting) offer
    Maker,
}

impl FromStr for PriceRule {
    type Err = OtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "midpoint" => Ok(PriceRule::Midpoint),
            "maker" => Ok(PriceRule::Maker),
            other => Err(OtcError::ConfigError(format!(
                "unknown price rule '{}' (expected midpoint|maker)",
                other
            ))),
        }
    }
}

/// A standing OTC order.
#[derive(Debug, Clone)]
pub struct Offer {
    /// Monotonically assigned by the pool; doubles as creation order
    pub id: u64,
    pub side: Side,
    /// Remaining base quantity; reduced by partial fills
    pub quantity: f64,
    pub original_quantity: f64,
    /// Limit price in quote units per base unit
    pub price: f64,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn is_open(&self) -> bool {
        self.status == OfferStatus::Open
    }
}

/// Immutable record of one completed trade.
#[derive(Debug, Clone)]
pub struct Match {
    pub buy_id: u64,
    pub sell_id: u64,
    pub quantity: f64,
    /// Executed price per the configured [`PriceRule`]
    pub price: f64,
    pub buy_price: f64,
    pub sell_price: f64,
    /// Limit-price improvement captured by the match
    pub spread: f64,
    /// Oracle price at match time, when a fresh quote existed
    pub market_price: Option<f64>,
    /// Executed price versus oracle, in percent
    pub otc_vs_market_spread_pct: Option<f64>,
    pub executed_at: DateTime<Utc>,
}

/// Aggregate view of the pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub open_offers: usize,
    pub buy_offers: usize,
    pub sell_offers: usize,
    pub matches: usize,
    pub total_buy_volume: f64,
    pub total_sell_volume: f64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
}

/// Filter for [`OtcPool::list_offers`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OfferFilter {
    pub status: Option<OfferStatus>,
    pub side: Option<Side>,
}

impl OfferFilter {
    pub fn open() -> Self {
        OfferFilter {
            status: Some(OfferStatus::Open),
            side: None,
        }
    }

    pub fn open_side(side: Side) -> Self {
        OfferFilter {
            status: Some(OfferStatus::Open),
            side: Some(side),
        }
    }

    fn accepts(&self, offer: &Offer) -> bool {
        self.status.map_or(true, |s| offer.status == s)
            && self.side.map_or(true, |s| offer.side == s)
    }
}

struct PoolState {
    /// Keyed by id; BTreeMap iteration order is creation order
    offers: BTreeMap<u64, Offer>,
    matches: Vec<Match>,
    /// Matches produced since the last drain, awaiting the log sink
    pending_matches: Vec<Match>,
    /// Latest fresh oracle price, provided by the price monitor
    market_hint: Option<f64>,
    next_id: u64,
}

/// The order book.
pub struct OtcPool {
    state: RwLock<PoolState>,
    price_rule: PriceRule,
}

impl OtcPool {
    pub fn new(price_rule: PriceRule) -> Self {
        Self {
            state: RwLock::new(PoolState {
                offers: BTreeMap::new(),
                matches: Vec::new(),
                pending_matches: Vec::new(),
                market_hint: None,
                next_id: 1,
            }),
            price_rule,
        }
    }

    /// Add an offer and run a matching pass atomically.
    ///
    /// Returns the offer as it stands after the pass, so a taker that crossed
    /// the book immediately comes back `Matched` with its fill reflected.
    pub fn create_offer(&self, side: Side, quantity: f64, price: f64) -> Result<Offer, OtcError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(OtcError::InvalidOrder(format!(
                "quantity must be strictly positive, got {}",
                quantity
            )));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(OtcError::InvalidOrder(format!(
                "price must be strictly positive, got {}",
                price
            )));
        }

        let mut state = self.state.write().unwrap();
        let id = state.next_id;
        state.next_id += 1;

        let offer = Offer {
            id,
            side,
            quantity,
            original_quantity: quantity,
            price,
            status: OfferStatus::Open,
            created_at: Utc::now(),
        };
        state.offers.insert(id, offer);
        info!("Offer #{} created: {} {} @ {}", id, side, quantity, price);

        let market_hint = state.market_hint;
        Self::run_matching(&mut state, self.price_rule, market_hint);

        Ok(state.offers[&id].clone())
    }

    /// Cancel an open offer. Closed or unknown ids are `NotFound`.
    pub fn cancel_offer(&self, id: u64) -> Result<(), OtcError> {
        let mut state = self.state.write().unwrap();
        match state.offers.get_mut(&id) {
            Some(offer) if offer.is_open() => {
                offer.status = OfferStatus::Cancelled;
                info!("Offer #{} cancelled", id);
                Ok(())
            }
            _ => Err(OtcError::NotFound(id)),
        }
    }

    /// Offers matching the filter, ordered by creation time.
    pub fn list_offers(&self, filter: OfferFilter) -> Vec<Offer> {
        let state = self.state.read().unwrap();
        state
            .offers
            .values()
            .filter(|o| filter.accepts(o))
            .cloned()
            .collect()
    }

    pub fn get_offer(&self, id: u64) -> Option<Offer> {
        self.state.read().unwrap().offers.get(&id).cloned()
    }

    /// Record the latest fresh oracle price and run a matching pass, so match
    /// records carry the OTC-vs-market spread. `None` clears the hint when
    /// the quote has gone stale.
    pub fn on_market_price(&self, market_price: Option<f64>) -> Vec<Match> {
        let mut state = self.state.write().unwrap();
        state.market_hint = market_price;
        Self::run_matching(&mut state, self.price_rule, market_price)
    }

    /// Matches produced since the last call, in execution order. Drained by
    /// whoever feeds the log sink.
    pub fn take_pending_matches(&self) -> Vec<Match> {
        std::mem::take(&mut self.state.write().unwrap().pending_matches)
    }

    /// Full match history, oldest first.
    pub fn match_history(&self) -> Vec<Match> {
        self.state.read().unwrap().matches.clone()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.read().unwrap();
        let mut stats = PoolStats {
            matches: state.matches.len(),
            ..PoolStats::default()
        };
        for offer in state.offers.values().filter(|o| o.is_open()) {
            stats.open_offers += 1;
            match offer.side {
                Side::Buy => {
                    stats.buy_offers += 1;
                    stats.total_buy_volume += offer.quantity;
                    stats.best_bid = Some(stats.best_bid.map_or(offer.price, |b: f64| b.max(offer.price)));
                }
                Side::Sell => {
                    stats.sell_offers += 1;
                    stats.total_sell_volume += offer.quantity;
                    stats.best_ask = Some(stats.best_ask.map_or(offer.price, |a: f64| a.min(offer.price)));
                }
            }
        }
        stats
    }

    /// Drop all offers and history. Testing and demo aid.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap();
        state.offers.clear();
        state.matches.clear();
        state.pending_matches.clear();
        state.next_id = 1;
    }

    /// The matching pass. Greedy by largest limit-price improvement, ties
    /// broken by the older offer (price-time priority); repeats until no
    /// compatible pair remains. Caller holds the write lock.
    fn run_matching(
        state: &mut PoolState,
        price_rule: PriceRule,
        market_price: Option<f64>,
    ) -> Vec<Match> {
        let mut produced = Vec::new();

        loop {
            let Some((buy_id, sell_id)) = Self::best_pair(state) else {
                break;
            };

            let (buy_price, buy_remaining) = {
                let b = &state.offers[&buy_id];
                (b.price, b.quantity)
            };
            let (sell_price, sell_remaining) = {
                let s = &state.offers[&sell_id];
                (s.price, s.quantity)
            };

            let quantity = buy_remaining.min(sell_remaining);
            let price = match price_rule {
                PriceRule::Midpoint => (buy_price + sell_price) / 2.0,
                // The resting (older) offer makes the price
                PriceRule::Maker => {
                    if buy_id < sell_id {
                        buy_price
                    } else {
                        sell_price
                    }
                }
            };

            for id in [buy_id, sell_id] {
                let offer = state.offers.get_mut(&id).unwrap();
                offer.quantity -= quantity;
                if offer.quantity <= 0.0 {
                    offer.quantity = 0.0;
                    offer.status = OfferStatus::Matched;
                }
            }

            let record = Match {
                buy_id,
                sell_id,
                quantity,
                price,
                buy_price,
                sell_price,
                spread: buy_price - sell_price,
                market_price,
                otc_vs_market_spread_pct: market_price
                    .map(|m| (price - m) / m * 100.0),
                executed_at: Utc::now(),
            };
            info!(
                "Match: buy #{} x sell #{} -> {} @ {} (spread {})",
                buy_id, sell_id, quantity, price, record.spread
            );
            state.matches.push(record.clone());
            state.pending_matches.push(record.clone());
            produced.push(record);
        }

        if !produced.is_empty() {
            debug!("Matching pass produced {} match(es)", produced.len());
        }
        produced
    }

    /// The compatible (buy.price >= sell.price) pair with the largest price
    /// improvement; ties go to the pair containing the oldest offer.
    fn best_pair(state: &PoolState) -> Option<(u64, u64)> {
        // (improvement, oldest id, other id) ranks candidates; ids break ties.
        let mut best: Option<(f64, u64, u64, u64, u64)> = None;
        for buy in state.offers.values().filter(|o| o.is_open() && o.side == Side::Buy) {
            for sell in state.offers.values().filter(|o| o.is_open() && o.side == Side::Sell) {
                if buy.price < sell.price {
                    continue;
                }
                let improvement = buy.price - sell.price;
                let oldest = buy.id.min(sell.id);
                let other = buy.id.max(sell.id);
                let better = match best {
                    None => true,
                    Some((best_imp, best_oldest, best_other, _, _)) => {
                        improvement > best_imp
                            || (improvement == best_imp
                                && (oldest < best_oldest
                                    || (oldest == best_oldest && other < best_other)))
                    }
                };
                if better {
                    best = Some((improvement, oldest, other, buy.id, sell.id));
                }
            }
        }
        best.map(|(_, _, _, buy_id, sell_id)| (buy_id, sell_id))
    }
}
