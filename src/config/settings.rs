use crate::arbitrage::ImpactFallback;
use crate::error::OtcError;
use crate::pool::PriceRule;
use crate::utils::parse_csv_list;
use log::{info, warn};
use std::env;

/// SOL and USDC mint addresses, the default trading pair.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

#[derive(Debug, Clone)]
pub struct Config {
    /// Seconds between poll cycles of the price monitor
    pub poll_interval_secs: u64,
    /// Age after which a quote is no longer used for matching or scoring
    pub quote_ttl_secs: u64,
    /// Bound on each provider request
    pub request_timeout_secs: u64,
    /// Ceiling for the exponential backoff between failed poll cycles
    pub backoff_ceiling_secs: u64,
    /// Execution price formation rule for matches
    pub price_rule: PriceRule,
    /// Policy when the impact curve cannot cover a requested size
    pub impact_fallback: ImpactFallback,
    /// Half-spread applied around the oracle price to derive bid/ask, in percent
    pub quote_half_spread_pct: f64,
    /// Spread percentage above which an opportunity is logged as an alert
    pub min_alert_spread_pct: f64,
    /// Trade sizes (base units) sampled for the price-impact curve
    pub impact_sample_sizes: Vec<f64>,
    pub rsi_period: usize,
    pub ma_windows: Vec<usize>,
    pub volatility_window: usize,
    /// Bounded length of the rolling price history
    pub price_history_len: usize,
    pub matches_csv_path: String,
    pub prices_csv_path: String,
    pub base_mint: String,
    pub quote_mint: String,
    pub slippage_bps: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            quote_ttl_secs: env::var("QUOTE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            backoff_ceiling_secs: env::var("BACKOFF_CEILING_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            price_rule: env::var("PRICE_RULE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(PriceRule::Midpoint),
            impact_fallback: env::var("IMPACT_FALLBACK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(ImpactFallback::Zero),
            quote_half_spread_pct: env::var("QUOTE_HALF_SPREAD_PCT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            min_alert_spread_pct: env::var("MIN_ALERT_SPREAD_PCT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            impact_sample_sizes: env::var("IMPACT_SAMPLE_SIZES")
                .ok()
                .map(|s| parse_csv_list(&s))
                .filter(|v: &Vec<f64>| !v.is_empty())
                .unwrap_or_else(|| vec![1.0, 10.0, 50.0, 100.0]),
            rsi_period: env::var("RSI_PERIOD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
            ma_windows: env::var("MA_WINDOWS")
                .ok()
                .map(|s| parse_csv_list(&s))
                .filter(|v: &Vec<usize>| !v.is_empty())
                .unwrap_or_else(|| vec![5, 10, 20, 50]),
            volatility_window: env::var("VOLATILITY_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            price_history_len: env::var("PRICE_HISTORY_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            matches_csv_path: env::var("MATCHES_CSV_PATH")
                .unwrap_or_else(|_| "otc_matches.csv".to_string()),
            prices_csv_path: env::var("PRICES_CSV_PATH")
                .unwrap_or_else(|_| "oracle_prices.csv".to_string()),
            base_mint: env::var("BASE_MINT").unwrap_or_else(|_| SOL_MINT.to_string()),
            quote_mint: env::var("QUOTE_MINT").unwrap_or_else(|_| USDC_MINT.to_string()),
            slippage_bps: env::var("SLIPPAGE_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
        }
    }

    /// Sanity-checks the configuration and logs the effective values.
    pub fn validate(&self) -> Result<(), OtcError> {
        if self.poll_interval_secs == 0 {
            return Err(OtcError::ConfigError(
                "POLL_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        if self.quote_ttl_secs == 0 {
            return Err(OtcError::ConfigError(
                "QUOTE_TTL_SECS must be at least 1".to_string(),
            ));
        }
        if self.impact_sample_sizes.iter().any(|s| *s <= 0.0) {
            return Err(OtcError::ConfigError(
                "IMPACT_SAMPLE_SIZES must be strictly positive".to_string(),
            ));
        }
        if self.quote_half_spread_pct < 0.0 {
            return Err(OtcError::ConfigError(
                "QUOTE_HALF_SPREAD_PCT must not be negative".to_string(),
            ));
        }
        if self.quote_ttl_secs < self.poll_interval_secs {
            warn!(
                "QUOTE_TTL_SECS ({}) is shorter than the poll interval ({}); every quote will go stale between cycles",
                self.quote_ttl_secs, self.poll_interval_secs
            );
        }
        Ok(())
    }

    pub fn validate_and_log(&self) -> Result<(), OtcError> {
        self.validate()?;
        info!(
            "Config: poll every {}s, quote TTL {}s, price rule {:?}, impact fallback {:?}, impact sizes {:?}",
            self.poll_interval_secs,
            self.quote_ttl_secs,
            self.price_rule,
            self.impact_fallback,
            self.impact_sample_sizes
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        // Defaults only; ignores the process environment.
        Config {
            poll_interval_secs: 15,
            quote_ttl_secs: 60,
            request_timeout_secs: 10,
            backoff_ceiling_secs: 120,
            price_rule: PriceRule::Midpoint,
            impact_fallback: ImpactFallback::Zero,
            quote_half_spread_pct: 0.0,
            min_alert_spread_pct: 1.0,
            impact_sample_sizes: vec![1.0, 10.0, 50.0, 100.0],
            rsi_period: 14,
            ma_windows: vec![5, 10, 20, 50],
            volatility_window: 20,
            price_history_len: 500,
            matches_csv_path: "otc_matches.csv".to_string(),
            prices_csv_path: "oracle_prices.csv".to_string(),
            base_mint: SOL_MINT.to_string(),
            quote_mint: USDC_MINT.to_string(),
            slippage_bps: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval_secs, 15);
        assert_eq!(config.impact_sample_sizes, vec![1.0, 10.0, 50.0, 100.0]);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = Config {
            poll_interval_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(OtcError::ConfigError(_))));
    }

    #[test]
    fn test_negative_half_spread_rejected() {
        let config = Config {
            quote_half_spread_pct: -0.1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
