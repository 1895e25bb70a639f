//! OHLCV bar representation.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::error::TraderError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// low <= price <= high
    pub fn spans(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }

    /// Rejects bars whose prices are not finite, non-positive, or whose
    /// high/low do not bracket open and close.
    pub fn check_integrity(&self) -> Result<(), TraderError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(self.integrity_error("non-positive or non-finite price"));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(self.integrity_error("negative or non-finite volume"));
        }
        if self.low > self.high
            || !self.spans(self.open)
            || !self.spans(self.close)
        {
            return Err(self.integrity_error("high/low do not bracket open and close"));
        }
        Ok(())
    }

    fn integrity_error(&self, reason: &str) -> TraderError {
        TraderError::DataIntegrity {
            symbol: self.symbol.clone(),
            reason: format!("{} at {}", reason, self.timestamp),
        }
    }
}

/// Parses `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or a bare
/// `YYYY-MM-DD` (midnight).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar {
            symbol: "BHP".into(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn spans_is_inclusive() {
        let bar = sample_bar();
        assert!(bar.spans(90.0));
        assert!(bar.spans(110.0));
        assert!(!bar.spans(89.99));
    }

    #[test]
    fn valid_bar_passes_integrity() {
        assert!(sample_bar().check_integrity().is_ok());
    }

    #[test]
    fn inverted_range_fails_integrity() {
        let mut bar = sample_bar();
        bar.high = 95.0;
        assert!(matches!(
            bar.check_integrity(),
            Err(TraderError::DataIntegrity { .. })
        ));
    }

    #[test]
    fn nan_price_fails_integrity() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(bar.check_integrity().is_err());
    }

    #[test]
    fn parse_timestamp_formats() {
        let midnight = parse_timestamp("2024-01-15").unwrap();
        assert_eq!(format_timestamp(&midnight), "2024-01-15 00:00:00");
        let intraday = parse_timestamp("2024-01-15 09:30:00").unwrap();
        assert_eq!(format_timestamp(&intraday), "2024-01-15 09:30:00");
        assert_eq!(parse_timestamp("2024-01-15T09:30:00"), Some(intraday));
        assert!(parse_timestamp("15/01/2024").is_none());
    }
}
