//! Ordered bar stream with the strict-monotonicity contract.
//!
//! Every [`TickSource`](crate::ports::tick_source::TickSource) hands out a
//! [`BarStream`]. The stream yields bars in the order the source produced
//! them and fails with [`TraderError::DataIntegrity`] on the first bar whose
//! timestamp does not strictly increase, whose symbol differs from the
//! stream's, or whose prices are malformed. After an error it is fused.

use chrono::NaiveDateTime;

use super::bar::Bar;
use super::error::TraderError;

type BoxedBars = Box<dyn Iterator<Item = Result<Bar, TraderError>> + Send>;

pub struct BarStream {
    symbol: String,
    inner: BoxedBars,
    last_ts: Option<NaiveDateTime>,
    failed: bool,
}

impl BarStream {
    pub fn new<I>(symbol: impl Into<String>, bars: I) -> Self
    where
        I: IntoIterator<Item = Result<Bar, TraderError>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            symbol: symbol.into(),
            inner: Box::new(bars.into_iter()),
            last_ts: None,
            failed: false,
        }
    }

    pub fn from_bars(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self::new(symbol, bars.into_iter().map(Ok))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    fn admit(&mut self, bar: &Bar) -> Result<(), TraderError> {
        if bar.symbol != self.symbol {
            return Err(TraderError::DataIntegrity {
                symbol: self.symbol.clone(),
                reason: format!("bar for {} in stream for {}", bar.symbol, self.symbol),
            });
        }
        if let Some(last) = self.last_ts {
            if bar.timestamp <= last {
                return Err(TraderError::DataIntegrity {
                    symbol: self.symbol.clone(),
                    reason: format!(
                        "non-monotonic bar: {} follows {}",
                        bar.timestamp, last
                    ),
                });
            }
        }
        bar.check_integrity()?;
        self.last_ts = Some(bar.timestamp);
        Ok(())
    }
}

impl Iterator for BarStream {
    type Item = Result<Bar, TraderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = match self.inner.next()? {
            Ok(bar) => self.admit(&bar).map(|()| bar),
            Err(e) => Err(e),
        };
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            symbol: "BHP".into(),
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn yields_ordered_bars() {
        let stream = BarStream::from_bars("BHP", vec![bar(1, 10.0), bar(2, 11.0), bar(3, 12.0)]);
        let closes: Vec<f64> = stream.map(|b| b.unwrap().close).collect();
        assert_eq!(closes, vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn rejects_duplicate_timestamp_and_fuses() {
        let mut stream =
            BarStream::from_bars("BHP", vec![bar(1, 10.0), bar(1, 11.0), bar(2, 12.0)]);
        assert!(stream.next().unwrap().is_ok());
        assert!(matches!(
            stream.next(),
            Some(Err(TraderError::DataIntegrity { .. }))
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn rejects_backwards_timestamp() {
        let results: Vec<_> =
            BarStream::from_bars("BHP", vec![bar(5, 10.0), bar(4, 11.0)]).collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn rejects_foreign_symbol() {
        let mut other = bar(2, 11.0);
        other.symbol = "CBA".into();
        let results: Vec<_> = BarStream::from_bars("BHP", vec![bar(1, 10.0), other]).collect();
        assert!(results[1].is_err());
    }

    #[test]
    fn reopening_restarts_sequence() {
        let bars = vec![bar(1, 10.0), bar(2, 11.0)];
        let first: Vec<_> = BarStream::from_bars("BHP", bars.clone()).collect();
        let second: Vec<_> = BarStream::from_bars("BHP", bars).collect();
        assert_eq!(first.len(), second.len());
    }
}
