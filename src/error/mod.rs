use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum OtcError {
    /// Bad input to offer creation (non-positive or non-finite quantity/price)
    #[error("Invalid Order: {0}")]
    InvalidOrder(String),

    /// Operation on an unknown or already-closed offer
    #[error("Offer Not Found: {0}")]
    NotFound(u64),

    /// Price monitor start requested while the poll loop is active
    #[error("Price monitor is already running")]
    AlreadyRunning,

    /// External quote fetch failed or timed out
    #[error("Provider Unavailable: {0}")]
    ProviderUnavailable(String),

    /// Indicator window larger than the available price history
    #[error("Insufficient History: need {required} samples, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    /// Requested size falls outside the quote's price-impact curve
    #[error("Insufficient Impact Data: {0}")]
    InsufficientImpactData(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Parsing errors for provider responses
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// Log sink write failures
    #[error("Sink Error: {0}")]
    SinkError(String),
}

impl From<serde_json::Error> for OtcError {
    fn from(err: serde_json::Error) -> Self {
        OtcError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<anyhow::Error> for OtcError {
    fn from(err: anyhow::Error) -> Self {
        OtcError::ProviderUnavailable(format!("{}", err))
    }
}

impl OtcError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            OtcError::InvalidOrder(_) => false, // Input needs fixing
            OtcError::NotFound(_) => false,     // Offer id will not appear by retrying
            OtcError::AlreadyRunning => false,  // Caller state issue
            OtcError::ProviderUnavailable(_) => true, // Network/provider may recover
            OtcError::InsufficientHistory { .. } => true, // More samples arrive over time
            OtcError::InsufficientImpactData(_) => true, // A richer quote may arrive
            OtcError::ConfigError(_) => false,  // Config needs fixing
            OtcError::ParseError(_) => false,   // Data format issues aren't recoverable
            OtcError::SinkError(_) => true,     // Disk/file may recover
        }
    }
}
