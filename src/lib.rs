pub mod analytics;
pub mod arbitrage;
pub mod config;
pub mod dex;
pub mod error;
pub mod logsink;
pub mod monitor;
pub mod pool;
pub mod testing; // Test doubles, also used by integration tests
pub mod utils;

// Re-export the types the presentation layer works with
pub use arbitrage::{ArbitrageScanner, ImpactFallback, Opportunity};
pub use config::Config;
pub use dex::{JupiterClient, Quote, QuoteProvider};
pub use error::OtcError;
pub use logsink::{CsvLogger, LogSink};
pub use monitor::{PriceHistory, PriceMonitor};
pub use pool::{Match, Offer, OfferFilter, OfferStatus, OtcPool, PriceRule, Side};
