//! Market data types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// LIVE QUOTE
// ═══════════════════════════════════════════════════════════════════════════════

/// Live price snapshot for one ticker, as returned by the market provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Normalized ticker symbol
    pub symbol: String,
    /// Last traded price
    pub price: f64,
    /// Close of the previous trading session
    pub previous_close: f64,
    /// ISO currency code the prices are quoted in
    pub currency: String,
    /// Listing exchange
    pub exchange: String,
    /// When the upstream says the price was effective
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Absolute change against the previous close.
    pub fn change(&self) -> f64 {
        self.price - self.previous_close
    }

    /// Percent change against the previous close, or `None` without a usable close.
    pub fn change_percent(&self) -> Option<f64> {
        if self.previous_close == 0.0 || !self.previous_close.is_finite() {
            None
        } else {
            Some(self.change() / self.previous_close * 100.0)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DAILY HISTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// One point of a daily closing-price series.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyClose {
    /// Trading day
    pub date: NaiveDate,
    /// Closing price for that day
    pub close: f64,
}

/// Sorts a series oldest-first and drops duplicate days, keeping the last seen close.
///
/// Providers may return points in any order; consumers call this before charting.
pub fn sort_daily_closes(mut series: Vec<DailyClose>) -> Vec<DailyClose> {
    series.sort_by_key(|point| point.date);
    let mut sorted: Vec<DailyClose> = Vec::with_capacity(series.len());
    for point in series {
        match sorted.last_mut() {
            Some(last) if last.date == point.date => *last = point,
            _ => sorted.push(point),
        }
    }
    sorted
}
