//! Technical indicators over the rolling price history.
//!
//! Pure functions over a slice of prices (oldest first, newest last). Nothing
//! here caches or mutates shared state; callers recompute on demand and
//! handle `InsufficientHistory` themselves. The trading signal is advisory
//! only and never touches the order book.

use crate::error::OtcError;

/// Simple moving average over the last `window` samples.
pub fn sma(prices: &[f64], window: usize) -> Result<f64, OtcError> {
    if window == 0 {
        return Err(OtcError::ConfigError("SMA window must be at least 1".to_string()));
    }
    if prices.len() < window {
        return Err(OtcError::InsufficientHistory {
            required: window,
            available: prices.len(),
        });
    }
    let tail = &prices[prices.len() - window..];
    Ok(tail.iter().sum::<f64>() / window as f64)
}

/// Exponential moving average with smoothing `2 / (window + 1)`, seeded with
/// the SMA of the first `window` samples.
pub fn ema(prices: &[f64], window: usize) -> Result<f64, OtcError> {
    if window == 0 {
        return Err(OtcError::ConfigError("EMA window must be at least 1".to_string()));
    }
    if prices.len() < window {
        return Err(OtcError::InsufficientHistory {
            required: window,
            available: prices.len(),
        });
    }
    let k = 2.0 / (window as f64 + 1.0);
    let seed = prices[..window].iter().sum::<f64>() / window as f64;
    Ok(prices[window..]
        .iter()
        .fold(seed, |acc, price| price * k + acc * (1.0 - k)))
}

/// Relative Strength Index over `period` deltas (needs `period + 1` samples).
///
/// Neutral 50.0 when the window shows no losses, which also covers a flat
/// window and avoids the divide-by-zero in the RS ratio.
pub fn rsi(prices: &[f64], period: usize) -> Result<f64, OtcError> {
    if period == 0 {
        return Err(OtcError::ConfigError("RSI period must be at least 1".to_string()));
    }
    if prices.len() < period + 1 {
        return Err(OtcError::InsufficientHistory {
            required: period + 1,
            available: prices.len(),
        });
    }

    let tail = &prices[prices.len() - (period + 1)..];
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for pair in tail.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gain_sum += delta;
        } else {
            loss_sum += -delta;
        }
    }

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;
    if avg_loss == 0.0 {
        return Ok(50.0);
    }

    let rs = avg_gain / avg_loss;
    Ok(100.0 - 100.0 / (1.0 + rs))
}

/// Sample standard deviation of log-returns. Needs at least three samples so
/// there are two returns to deviate.
pub fn volatility(prices: &[f64]) -> Result<f64, OtcError> {
    if prices.len() < 3 {
        return Err(OtcError::InsufficientHistory {
            required: 3,
            available: prices.len(),
        });
    }
    if prices.iter().any(|p| *p <= 0.0) {
        return Err(OtcError::ParseError(
            "log-return volatility requires strictly positive prices".to_string(),
        ));
    }

    let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Ok(var.sqrt())
}

/// Percentage change between the oldest and newest sample.
pub fn momentum(prices: &[f64]) -> Result<f64, OtcError> {
    if prices.len() < 2 {
        return Err(OtcError::InsufficientHistory {
            required: 2,
            available: prices.len(),
        });
    }
    let first = prices[0];
    let last = prices[prices.len() - 1];
    if first == 0.0 {
        return Err(OtcError::ParseError(
            "momentum undefined for a zero starting price".to_string(),
        ));
    }
    Ok((last - first) / first * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands over the last `window` samples.
pub fn bollinger_bands(
    prices: &[f64],
    window: usize,
    num_std: f64,
) -> Result<BollingerBands, OtcError> {
    let middle = sma(prices, window)?;
    let tail = &prices[prices.len() - window..];
    let var = tail.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / window as f64;
    let band = var.sqrt() * num_std;
    Ok(BollingerBands {
        upper: middle + band,
        middle,
        lower: middle - band,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStrength {
    Strong,
    Moderate,
    Neutral,
    Weak,
}

/// Advisory aggregation of RSI, MA crossover and Bollinger position.
#[derive(Debug, Clone)]
pub struct TradingSignal {
    pub action: SignalAction,
    pub strength: SignalStrength,
    pub reasons: Vec<String>,
}

/// Combine indicator readings into one advisory signal.
///
/// With fewer than 20 samples the verdict is a weak HOLD rather than an
/// error; the signal is informational and must not block anything.
pub fn trading_signal(prices: &[f64]) -> TradingSignal {
    if prices.len() < 20 {
        return TradingSignal {
            action: SignalAction::Hold,
            strength: SignalStrength::Weak,
            reasons: vec!["Insufficient data for analysis".to_string()],
        };
    }

    let current = prices[prices.len() - 1];
    let mut buys: Vec<String> = Vec::new();
    let mut sells: Vec<String> = Vec::new();

    if let Ok(value) = rsi(prices, 14) {
        if value > 70.0 {
            sells.push("RSI overbought".to_string());
        } else if value < 30.0 {
            buys.push("RSI oversold".to_string());
        }
    }

    if let (Ok(short), Ok(long)) = (sma(prices, 5), sma(prices, 20)) {
        if short > long && current > short {
            buys.push("Price above rising MA".to_string());
        } else if short < long && current < short {
            sells.push("Price below falling MA".to_string());
        }
    }

    if let Ok(bands) = bollinger_bands(prices, 20, 2.0) {
        if current > bands.upper {
            sells.push("Price above upper Bollinger band".to_string());
        } else if current < bands.lower {
            buys.push("Price below lower Bollinger band".to_string());
        }
    }

    let (action, reasons) = if buys.len() > sells.len() {
        (SignalAction::Buy, buys)
    } else if sells.len() > buys.len() {
        (SignalAction::Sell, sells)
    } else {
        (SignalAction::Hold, vec!["Mixed signals".to_string()])
    };
    let strength = match action {
        SignalAction::Hold => SignalStrength::Neutral,
        _ if reasons.len() >= 2 => SignalStrength::Strong,
        _ => SignalStrength::Moderate,
    };

    TradingSignal {
        action,
        strength,
        reasons,
    }
}
