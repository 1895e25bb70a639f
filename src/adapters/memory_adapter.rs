//! In-process tick source and result sink.

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::domain::result::TradeResult;
use crate::domain::tick_stream::BarStream;
use crate::ports::result_sink::{Ack, ResultSink};
use crate::ports::tick_source::TickSource;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Serves bars per symbol in insertion order.
#[derive(Debug, Default)]
pub struct MemoryTickSource {
    bars: BTreeMap<String, Vec<Bar>>,
}

impl MemoryTickSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.insert(symbol, bars);
        self
    }

    pub fn insert(&mut self, symbol: &str, bars: Vec<Bar>) {
        self.bars.entry(symbol.to_string()).or_default().extend(bars);
    }
}

impl TickSource for MemoryTickSource {
    fn open(
        &self,
        symbol: &str,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<BarStream, TraderError> {
        let bars = self.bars.get(symbol).ok_or_else(|| TraderError::Database {
            reason: format!("no bars for {}", symbol),
        })?;
        let selected: Vec<Bar> = bars
            .iter()
            .filter(|b| from.is_none_or(|f| b.timestamp >= f) && to.is_none_or(|t| b.timestamp <= t))
            .cloned()
            .collect();
        Ok(BarStream::from_bars(symbol, selected))
    }

    fn symbols(&self) -> Result<Vec<String>, TraderError> {
        Ok(self.bars.keys().cloned().collect())
    }
}

/// Collects results in arrival order.
#[derive(Debug, Default)]
pub struct MemoryResultSink {
    results: Mutex<Vec<TradeResult>>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<TradeResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ResultSink for MemoryResultSink {
    fn record(&self, result: &TradeResult) -> Result<Ack, TraderError> {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results.push(result.clone());
        Ok(Ack {
            sequence: results.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32) -> Bar {
        Bar {
            symbol: "BHP".into(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: 10.0,
            high: 11.0,
            low: 9.0,
            close: 10.5,
            volume: 100.0,
        }
    }

    #[test]
    fn open_unknown_symbol_fails() {
        let source = MemoryTickSource::new();
        assert!(source.open("BHP", None, None).is_err());
    }

    #[test]
    fn open_applies_window() {
        let source = MemoryTickSource::new().with_bars("BHP", vec![bar(1), bar(2), bar(3)]);
        let from = bar(2).timestamp;
        let bars: Vec<Bar> = source
            .open("BHP", Some(from), None)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(source.symbols().unwrap(), vec!["BHP"]);
    }
}
