//! CSV bar files, pattern files and result output.

use crate::domain::bar::{Bar, parse_timestamp};
use crate::domain::error::TraderError;
use crate::domain::pattern::{Pattern, PatternType};
use crate::domain::result::TradeResult;
use crate::domain::tick_stream::BarStream;
use crate::ports::result_sink::{Ack, ResultSink};
use crate::ports::tick_source::TickSource;
use chrono::NaiveDateTime;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Reads `<base_path>/<SYMBOL>.csv` with columns
/// `timestamp,open,high,low,close,volume`. Rows are streamed in file order.
pub struct CsvTickSource {
    base_path: PathBuf,
}

impl CsvTickSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

fn column<'a>(record: &'a csv::StringRecord, index: usize, name: &str) -> Result<&'a str, String> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| format!("missing {} column", name))
}

fn number(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, String> {
    column(record, index, name)?
        .parse()
        .map_err(|e| format!("invalid {} value: {}", name, e))
}

fn parse_bar(symbol: &str, record: &csv::StringRecord) -> Result<Bar, String> {
    let ts_str = column(record, 0, "timestamp")?;
    let timestamp =
        parse_timestamp(ts_str).ok_or_else(|| format!("invalid timestamp: {}", ts_str))?;

    Ok(Bar {
        symbol: symbol.to_string(),
        timestamp,
        open: number(record, 1, "open")?,
        high: number(record, 2, "high")?,
        low: number(record, 3, "low")?,
        close: number(record, 4, "close")?,
        volume: number(record, 5, "volume")?,
    })
}

fn in_window(ts: NaiveDateTime, from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> bool {
    from.is_none_or(|f| ts >= f) && to.is_none_or(|t| ts <= t)
}

impl TickSource for CsvTickSource {
    fn open(
        &self,
        symbol: &str,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<BarStream, TraderError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| TraderError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut items = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let parsed = result
                .map_err(|e| format!("CSV parse error: {}", e))
                .and_then(|record| parse_bar(symbol, &record));
            match parsed {
                Ok(bar) if in_window(bar.timestamp, from, to) => items.push(Ok(bar)),
                Ok(_) => {}
                Err(reason) => {
                    items.push(Err(TraderError::DataIntegrity {
                        symbol: symbol.to_string(),
                        reason: format!("{} (row {})", reason, line + 1),
                    }));
                    break;
                }
            }
        }

        Ok(BarStream::new(symbol, items))
    }

    fn symbols(&self) -> Result<Vec<String>, TraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| TraderError::Database {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TraderError::Database {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

/// Reads a pattern file with columns
/// `pattern_id,symbol,pattern_type,range_start,range_end,breakout_level,
/// target_level,stop_level,support_level,expected_win_pct,is_trade_able`.
/// An empty `support_level` means none; a missing `is_trade_able` means true.
pub fn load_patterns<P: AsRef<Path>>(path: P) -> Result<Vec<Pattern>, TraderError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| TraderError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut patterns = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let invalid = |reason: String| TraderError::Database {
            reason: format!("{} row {}: {}", path.display(), line + 1, reason),
        };
        let record = result.map_err(|e| invalid(format!("CSV parse error: {}", e)))?;
        patterns.push(parse_pattern(&record).map_err(invalid)?);
    }

    Ok(patterns)
}

fn parse_pattern(record: &csv::StringRecord) -> Result<Pattern, String> {
    let pattern_id: u64 = column(record, 0, "pattern_id")?
        .parse()
        .map_err(|e| format!("invalid pattern_id value: {}", e))?;
    let pattern_type: PatternType = column(record, 2, "pattern_type")?.parse()?;

    let timestamp = |index: usize, name: &str| -> Result<NaiveDateTime, String> {
        let raw = column(record, index, name)?;
        parse_timestamp(raw).ok_or_else(|| format!("invalid {}: {}", name, raw))
    };

    let support_level = match record.get(8).map(str::trim) {
        None | Some("") => None,
        Some(_) => Some(number(record, 8, "support_level")?),
    };
    let is_trade_able = match record.get(10).map(|s| s.trim().to_lowercase()) {
        None => true,
        Some(v) if v.is_empty() => true,
        Some(v) => matches!(v.as_str(), "true" | "yes" | "1"),
    };

    Ok(Pattern {
        pattern_id,
        symbol: column(record, 1, "symbol")?.to_string(),
        pattern_type,
        range_start_ts: timestamp(3, "range_start")?,
        range_end_ts: timestamp(4, "range_end")?,
        breakout_level: number(record, 5, "breakout_level")?,
        target_level: number(record, 6, "target_level")?,
        stop_level: number(record, 7, "stop_level")?,
        support_level,
        expected_win_pct: number(record, 9, "expected_win_pct")?,
        is_trade_able,
        breakout_done: false,
        breakout_ts: None,
    })
}

/// Appends one CSV row per result, header first.
pub struct CsvResultSink {
    writer: Mutex<(csv::Writer<File>, u64)>,
}

impl CsvResultSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, TraderError> {
        let writer = csv::Writer::from_path(path.as_ref()).map_err(|e| TraderError::Database {
            reason: format!("failed to create {}: {}", path.as_ref().display(), e),
        })?;
        Ok(Self {
            writer: Mutex::new((writer, 0)),
        })
    }
}

impl ResultSink for CsvResultSink {
    fn record(&self, result: &TradeResult) -> Result<Ack, TraderError> {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let (writer, count) = &mut *guard;
        writer
            .serialize(result)
            .map_err(|e| TraderError::DatabaseQuery {
                reason: format!("failed to write result: {}", e),
            })?;
        writer.flush()?;
        *count += 1;
        Ok(Ack { sequence: *count })
    }
}

/// Reads back a file written by [`CsvResultSink`].
pub fn read_results<P: AsRef<Path>>(path: P) -> Result<Vec<TradeResult>, TraderError> {
    let mut rdr = csv::Reader::from_path(path.as_ref()).map_err(|e| TraderError::Database {
        reason: format!("failed to read {}: {}", path.as_ref().display(), e),
    })?;
    rdr.deserialize()
        .map(|row| {
            row.map_err(|e| TraderError::Database {
                reason: format!("CSV parse error: {}", e),
            })
        })
        .collect()
}
