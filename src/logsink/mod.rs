//! Log Sink
//!
//! Durable append-only record of matches and price samples. The CSV writer
//! keeps both files open, appends one row per event and flushes before
//! returning, so a record is either fully on disk or not written at all.

use crate::dex::Quote;
use crate::error::OtcError;
use crate::pool::Match;
use async_trait::async_trait;
use log::info;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

const MATCHES_HEADER: &str = "timestamp,buy_id,sell_id,quantity,price,buy_price,sell_price,spread,total_quote,market_price,otc_vs_market_spread_pct";
const PRICES_HEADER: &str = "timestamp,price,input_amount,output_amount,unit_impact_pct,route_hops,source";

/// Append-only record of matches and price samples.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append_match(&self, record: &Match) -> Result<(), OtcError>;

    async fn append_price_sample(&self, quote: &Quote) -> Result<(), OtcError>;
}

/// CSV-backed [`LogSink`] writing two headered streams.
pub struct CsvLogger {
    matches: Mutex<File>,
    prices: Mutex<File>,
}

impl CsvLogger {
    pub fn new(matches_path: &str, prices_path: &str) -> Result<Self, OtcError> {
        let matches = Self::open_with_header(matches_path, MATCHES_HEADER)?;
        let prices = Self::open_with_header(prices_path, PRICES_HEADER)?;
        info!("CSV logger writing to {} and {}", matches_path, prices_path);
        Ok(Self {
            matches: Mutex::new(matches),
            prices: Mutex::new(prices),
        })
    }

    fn open_with_header(path: &str, header: &str) -> Result<File, OtcError> {
        let existed = Path::new(path).metadata().map(|m| m.len() > 0).unwrap_or(false);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| OtcError::SinkError(format!("failed to open {}: {}", path, e)))?;
        if !existed {
            writeln!(file, "{}", header)
                .map_err(|e| OtcError::SinkError(format!("failed to write header: {}", e)))?;
        }
        Ok(file)
    }

    fn append_line(file: &Mutex<File>, line: &str) -> Result<(), OtcError> {
        let mut file = file
            .lock()
            .map_err(|_| OtcError::SinkError("log file lock poisoned".to_string()))?;
        writeln!(file, "{}", line)
            .and_then(|_| file.flush())
            .map_err(|e| OtcError::SinkError(format!("failed to append record: {}", e)))
    }

    fn format_opt(value: Option<f64>) -> String {
        value.map(|v| format!("{:.6}", v)).unwrap_or_default()
    }
}

#[async_trait]
impl LogSink for CsvLogger {
    async fn append_match(&self, record: &Match) -> Result<(), OtcError> {
        let line = format!(
            "{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{}",
            record.executed_at.format("%Y-%m-%d %H:%M:%S"),
            record.buy_id,
            record.sell_id,
            record.quantity,
            record.price,
            record.buy_price,
            record.sell_price,
            record.spread,
            record.quantity * record.price,
            Self::format_opt(record.market_price),
            Self::format_opt(record.otc_vs_market_spread_pct),
        );
        Self::append_line(&self.matches, &line)
    }

    async fn append_price_sample(&self, quote: &Quote) -> Result<(), OtcError> {
        let unit_impact = quote
            .impact_samples
            .first()
            .map(|s| s.impact_pct)
            .unwrap_or(0.0);
        let line = format!(
            "{},{:.6},{:.6},{:.6},{:.6},{},{}",
            quote.fetched_at_utc.format("%Y-%m-%d %H:%M:%S"),
            quote.price,
            quote.input_amount,
            quote.output_amount,
            unit_impact,
            quote.route.len(),
            quote.source,
        );
        Self::append_line(&self.prices, &line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::PriceImpactSample;
    use chrono::Utc;
    use std::time::Instant;

    fn temp_paths(tag: &str) -> (String, String) {
        let dir = std::env::temp_dir();
        let nonce = std::process::id();
        (
            dir.join(format!("otc_test_matches_{}_{}.csv", tag, nonce))
                .to_string_lossy()
                .into_owned(),
            dir.join(format!("otc_test_prices_{}_{}.csv", tag, nonce))
                .to_string_lossy()
                .into_owned(),
        )
    }

    fn sample_match() -> Match {
        Match {
            buy_id: 2,
            sell_id: 1,
            quantity: 5.0,
            price: 101.0,
            buy_price: 102.0,
            sell_price: 100.0,
            spread: 2.0,
            market_price: Some(100.5),
            otc_vs_market_spread_pct: Some(0.4975),
            executed_at: Utc::now(),
        }
    }

    fn sample_quote() -> Quote {
        Quote {
            pair: "SOL/USDC".to_string(),
            price: 100.5,
            input_amount: 1.0,
            output_amount: 100.5,
            impact_samples: vec![PriceImpactSample { size: 1.0, impact_pct: 0.01 }],
            route: Vec::new(),
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            source: "test".to_string(),
            is_valid: true,
        }
    }

    #[tokio::test]
    async fn test_headers_written_once_and_rows_appended() {
        let (matches_path, prices_path) = temp_paths("headers");
        let _ = std::fs::remove_file(&matches_path);
        let _ = std::fs::remove_file(&prices_path);

        {
            let sink = CsvLogger::new(&matches_path, &prices_path).unwrap();
            sink.append_match(&sample_match()).await.unwrap();
            sink.append_price_sample(&sample_quote()).await.unwrap();
        }
        // Reopening an existing file must not duplicate the header.
        {
            let sink = CsvLogger::new(&matches_path, &prices_path).unwrap();
            sink.append_match(&sample_match()).await.unwrap();
        }

        let matches = std::fs::read_to_string(&matches_path).unwrap();
        let lines: Vec<&str> = matches.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], MATCHES_HEADER);
        assert!(lines[1].contains("101.000000"));

        let prices = std::fs::read_to_string(&prices_path).unwrap();
        assert_eq!(prices.lines().count(), 2);
        assert!(prices.lines().nth(1).unwrap().ends_with("test"));

        let _ = std::fs::remove_file(&matches_path);
        let _ = std::fs::remove_file(&prices_path);
    }

    #[tokio::test]
    async fn test_missing_market_price_leaves_fields_empty() {
        let (matches_path, prices_path) = temp_paths("optional");
        let _ = std::fs::remove_file(&matches_path);
        let _ = std::fs::remove_file(&prices_path);

        let sink = CsvLogger::new(&matches_path, &prices_path).unwrap();
        let record = Match {
            market_price: None,
            otc_vs_market_spread_pct: None,
            ..sample_match()
        };
        sink.append_match(&record).await.unwrap();

        let contents = std::fs::read_to_string(&matches_path).unwrap();
        assert!(contents.lines().nth(1).unwrap().ends_with(",,"));

        let _ = std::fs::remove_file(&matches_path);
        let _ = std::fs::remove_file(&prices_path);
    }
}
