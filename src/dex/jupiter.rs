//! Jupiter v6 quote client.
//!
//! Talks to the public `quote-api.jup.ag` endpoint, which quotes swaps in
//! base-unit integers (lamports in, USDC micro-units out) and reports the
//! price impact and routing plan per request. One request is made per
//! requested impact-sample size, serialized through a conservative rate
//! limiter.

use crate::config::settings::Config;
use crate::dex::{PriceImpactSample, ProviderHealthStatus, Quote, QuoteProvider, RouteHop};
use crate::error::OtcError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

const JUPITER_API_BASE: &str = "https://quote-api.jup.ag/v6";
const JUPITER_QUOTE_ENDPOINT: &str = "quote";

/// Conservative client-side rate limit
const JUPITER_REQUESTS_PER_SECOND: u32 = 10;

/// SOL uses 9 decimals, USDC 6.
const BASE_DECIMALS: u32 = 9;
const QUOTE_DECIMALS: u32 = 6;

/// Headline price is always quoted at one base unit.
const UNIT_SIZE: f64 = 1.0;

#[derive(Debug, Serialize)]
struct JupiterQuoteRequest {
    #[serde(rename = "inputMint")]
    input_mint: String,
    #[serde(rename = "outputMint")]
    output_mint: String,
    amount: u64,
    #[serde(rename = "slippageBps")]
    slippage_bps: u16,
    #[serde(rename = "onlyDirectRoutes")]
    only_direct_routes: Option<bool>,
    #[serde(rename = "asLegacyTransaction")]
    as_legacy_transaction: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct JupiterQuoteResponse {
    #[serde(rename = "inAmount")]
    in_amount: String,
    #[serde(rename = "outAmount")]
    out_amount: String,
    #[serde(rename = "priceImpactPct")]
    price_impact_pct: String,
    #[serde(rename = "routePlan")]
    route_plan: Vec<JupiterRoutePlan>,
    #[serde(rename = "contextSlot")]
    #[allow(dead_code)]
    context_slot: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct JupiterRoutePlan {
    #[serde(rename = "swapInfo")]
    swap_info: JupiterSwapInfo,
    percent: u8,
}

#[derive(Debug, Clone, Deserialize)]
struct JupiterSwapInfo {
    label: Option<String>,
    #[serde(rename = "ammKey")]
    #[allow(dead_code)]
    amm_key: String,
}

/// Serializes requests so bursts of impact sampling stay under the API limit.
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(requests_per_second: u32) -> Self {
        Self {
            last_request: Instant::now() - Duration::from_secs(1),
            min_interval: Duration::from_millis(1000 / requests_per_second as u64),
        }
    }

    async fn wait_if_needed(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            tokio::time::sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// Jupiter aggregator client implementing [`QuoteProvider`] for the pair.
pub struct JupiterClient {
    client: Client,
    base_url: Url,
    base_mint: String,
    quote_mint: String,
    slippage_bps: u16,
    rate_limiter: Mutex<RateLimiter>,
}

impl JupiterClient {
    pub fn new(config: &Config) -> Result<Self, OtcError> {
        Self::with_base_url(config, JUPITER_API_BASE)
    }

    pub fn with_base_url(config: &Config, base_url: &str) -> Result<Self, OtcError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| OtcError::ConfigError(format!("invalid Jupiter base url: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("otc-simulator/0.1")
            .build()
            .map_err(|e| OtcError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            base_mint: config.base_mint.clone(),
            quote_mint: config.quote_mint.clone(),
            slippage_bps: config.slippage_bps,
            rate_limiter: Mutex::new(RateLimiter::new(JUPITER_REQUESTS_PER_SECOND)),
        })
    }

    /// One quote request for `amount` base units. Returns the effective price
    /// (quote per base), the output amount, the reported impact percentage
    /// and the routing plan.
    async fn quote_once(&self, amount: f64) -> Result<(f64, f64, f64, Vec<RouteHop>)> {
        self.rate_limiter.lock().await.wait_if_needed().await;

        let lamports = (amount * 10f64.powi(BASE_DECIMALS as i32)) as u64;
        if lamports == 0 {
            return Err(anyhow!("requested amount {} rounds to zero base units", amount));
        }

        let request = JupiterQuoteRequest {
            input_mint: self.base_mint.clone(),
            output_mint: self.quote_mint.clone(),
            amount: lamports,
            slippage_bps: self.slippage_bps,
            only_direct_routes: Some(false),
            as_legacy_transaction: Some(false),
        };

        let url = self
            .base_url
            .join(JUPITER_QUOTE_ENDPOINT)
            .map_err(|e| anyhow!("invalid quote endpoint: {}", e))?;

        debug!("Requesting Jupiter quote for {} base units", amount);

        let response = self
            .client
            .get(url)
            .query(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Jupiter API request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Jupiter API error {}: {}", status, text));
        }

        let quote: JupiterQuoteResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse Jupiter quote response: {}", e))?;

        let in_amount: u64 = quote
            .in_amount
            .parse()
            .map_err(|e| anyhow!("invalid inAmount: {}", e))?;
        let out_amount: u64 = quote
            .out_amount
            .parse()
            .map_err(|e| anyhow!("invalid outAmount: {}", e))?;
        let impact_pct: f64 = quote.price_impact_pct.parse().unwrap_or(0.0);

        let base_in = in_amount as f64 / 10f64.powi(BASE_DECIMALS as i32);
        let quote_out = out_amount as f64 / 10f64.powi(QUOTE_DECIMALS as i32);
        if base_in <= 0.0 {
            return Err(anyhow!("Jupiter returned zero input amount"));
        }

        let route = quote
            .route_plan
            .into_iter()
            .map(|plan| RouteHop {
                label: plan.swap_info.label.unwrap_or_else(|| "unknown".to_string()),
                percent: plan.percent,
            })
            .collect();

        Ok((quote_out / base_in, quote_out, impact_pct, route))
    }
}

#[async_trait]
impl QuoteProvider for JupiterClient {
    fn name(&self) -> &str {
        "Jupiter"
    }

    /// Fetches the headline unit-size quote plus one impact sample per
    /// requested size. Sample failures are tolerated as long as the unit
    /// quote succeeds; the failures are logged and the curve is simply
    /// shorter.
    async fn fetch_quote(&self, size_samples: &[f64]) -> Result<Quote, OtcError> {
        let (price, output_amount, unit_impact, route) = self
            .quote_once(UNIT_SIZE)
            .await
            .map_err(|e| OtcError::ProviderUnavailable(e.to_string()))?;

        let mut samples = vec![PriceImpactSample {
            size: UNIT_SIZE,
            impact_pct: unit_impact,
        }];

        for &size in size_samples {
            if size <= 0.0 || (size - UNIT_SIZE).abs() < f64::EPSILON {
                continue;
            }
            match self.quote_once(size).await {
                Ok((_, _, impact_pct, _)) => {
                    samples.push(PriceImpactSample { size, impact_pct })
                }
                Err(e) => warn!("Impact sample at size {} failed: {}", size, e),
            }
        }
        samples.sort_by(|a, b| a.size.total_cmp(&b.size));

        Ok(Quote {
            pair: "SOL/USDC".to_string(),
            price,
            input_amount: UNIT_SIZE,
            output_amount,
            impact_samples: samples,
            route,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            source: self.name().to_string(),
            is_valid: true,
        })
    }

    async fn health_check(&self) -> ProviderHealthStatus {
        let start_time = Instant::now();
        match self.quote_once(UNIT_SIZE).await {
            Ok(_) => ProviderHealthStatus {
                is_healthy: true,
                response_time_ms: Some(start_time.elapsed().as_millis() as u64),
                status_message: "Jupiter API responding normally".to_string(),
            },
            Err(e) => ProviderHealthStatus {
                is_healthy: false,
                response_time_ms: None,
                status_message: format!("Jupiter API error: {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = JupiterClient::new(&Config::default()).unwrap();
        assert_eq!(client.name(), "Jupiter");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = JupiterClient::with_base_url(&Config::default(), "not a url");
        assert!(matches!(result, Err(OtcError::ConfigError(_))));
    }

    #[test]
    fn test_rate_limiter_interval() {
        let limiter = RateLimiter::new(10);
        assert_eq!(limiter.min_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_quote_request_serializes_camel_case() {
        let request = JupiterQuoteRequest {
            input_mint: "A".to_string(),
            output_mint: "B".to_string(),
            amount: 1_000_000_000,
            slippage_bps: 50,
            only_direct_routes: Some(false),
            as_legacy_transaction: Some(false),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["inputMint"], "A");
        assert_eq!(json["slippageBps"], 50);
    }

    #[test]
    fn test_quote_response_parses_wire_format() {
        let raw = r#"{
            "inAmount": "1000000000",
            "outAmount": "201500000",
            "priceImpactPct": "0.0012",
            "routePlan": [
                {"swapInfo": {"ammKey": "k1", "label": "Orca"}, "percent": 70},
                {"swapInfo": {"ammKey": "k2", "label": "Raydium"}, "percent": 30}
            ],
            "contextSlot": 12345
        }"#;
        let parsed: JupiterQuoteResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.out_amount, "201500000");
        assert_eq!(parsed.route_plan.len(), 2);
        assert_eq!(parsed.route_plan[0].swap_info.label.as_deref(), Some("Orca"));
    }
}
