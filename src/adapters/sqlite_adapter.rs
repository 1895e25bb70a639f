//! SQLite storage for bars, patterns and trade results.

use crate::domain::bar::{Bar, format_timestamp, parse_timestamp};
use crate::domain::error::TraderError;
use crate::domain::pattern::{Pattern, PatternType};
use crate::domain::result::TradeResult;
use crate::domain::tick_stream::BarStream;
use crate::ports::config_port::ConfigPort;
use crate::ports::result_sink::{Ack, ResultSink};
use crate::ports::tick_source::TickSource;
use chrono::NaiveDateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    recorded: AtomicU64,
}

fn db_err(e: r2d2::Error) -> TraderError {
    TraderError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> TraderError {
    TraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn ts_column(raw: String) -> rusqlite::Result<NaiveDateTime> {
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            raw.len(),
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {}", raw).into(),
        )
    })
}

fn enum_column<T: serde::de::DeserializeOwned>(raw: String) -> rusqlite::Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.clone())).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(raw.len(), rusqlite::types::Type::Text, Box::new(e))
    })
}

fn enum_text<T: serde::Serialize>(value: &T) -> Result<String, TraderError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        _ => Err(TraderError::DatabaseQuery {
            reason: "enum does not serialize to text".into(),
        }),
    }
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        Self::open_file(&db_path, pool_size)
    }

    pub fn open_file(db_path: &str, pool_size: u32) -> Result<Self, TraderError> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(db_err)?;

        Ok(Self {
            pool,
            recorded: AtomicU64::new(0),
        })
    }

    pub fn in_memory() -> Result<Self, TraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;

        Ok(Self {
            pool,
            recorded: AtomicU64::new(0),
        })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TraderError> {
        self.pool.get().map_err(db_err)
    }

    pub fn initialize_schema(&self) -> Result<(), TraderError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bars (
                symbol TEXT NOT NULL,
                ts TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, ts)
            );
            CREATE TABLE IF NOT EXISTS patterns (
                pattern_id INTEGER PRIMARY KEY,
                symbol TEXT NOT NULL,
                pattern_type TEXT NOT NULL,
                range_start TEXT NOT NULL,
                range_end TEXT NOT NULL,
                breakout_level REAL NOT NULL,
                target_level REAL NOT NULL,
                stop_level REAL NOT NULL,
                support_level REAL,
                expected_win_pct REAL NOT NULL,
                is_trade_able INTEGER NOT NULL,
                breakout_ts TEXT
            );
            CREATE TABLE IF NOT EXISTS trade_results (
                candidate_id INTEGER PRIMARY KEY,
                pattern_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                strategy TEXT NOT NULL,
                buy_trigger TEXT NOT NULL,
                outcome TEXT NOT NULL,
                realized_pnl_pct REAL NOT NULL,
                holding_ticks INTEGER NOT NULL,
                max_drawdown_pct REAL NOT NULL,
                max_runup_pct REAL NOT NULL,
                entry_ts TEXT,
                entry_price REAL,
                exit_ts TEXT,
                exit_price REAL,
                exit_reason TEXT,
                rollovers INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_patterns_symbol ON patterns(symbol);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    pub fn insert_bars(&self, bars: &[Bar]) -> Result<(), TraderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO bars (symbol, ts, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.symbol,
                    format_timestamp(&bar.timestamp),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    pub fn insert_patterns(&self, patterns: &[Pattern]) -> Result<(), TraderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for p in patterns {
            tx.execute(
                "INSERT OR REPLACE INTO patterns (pattern_id, symbol, pattern_type, range_start,
                    range_end, breakout_level, target_level, stop_level, support_level,
                    expected_win_pct, is_trade_able, breakout_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    p.pattern_id as i64,
                    p.symbol,
                    p.pattern_type.as_str(),
                    format_timestamp(&p.range_start_ts),
                    format_timestamp(&p.range_end_ts),
                    p.breakout_level,
                    p.target_level,
                    p.stop_level,
                    p.support_level,
                    p.expected_win_pct,
                    p.is_trade_able,
                    p.breakout_ts.as_ref().map(format_timestamp),
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    pub fn load_patterns(&self) -> Result<Vec<Pattern>, TraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT pattern_id, symbol, pattern_type, range_start, range_end, breakout_level,
                        target_level, stop_level, support_level, expected_win_pct,
                        is_trade_able, breakout_ts
                 FROM patterns ORDER BY pattern_id",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                let type_str: String = row.get(2)?;
                let pattern_type: PatternType = type_str.parse().map_err(|e: String| {
                    rusqlite::Error::FromSqlConversionFailure(
                        type_str.len(),
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?;
                let breakout_ts = row
                    .get::<_, Option<String>>(11)?
                    .map(ts_column)
                    .transpose()?;
                Ok(Pattern {
                    pattern_id: row.get::<_, i64>(0)? as u64,
                    symbol: row.get(1)?,
                    pattern_type,
                    range_start_ts: ts_column(row.get(3)?)?,
                    range_end_ts: ts_column(row.get(4)?)?,
                    breakout_level: row.get(5)?,
                    target_level: row.get(6)?,
                    stop_level: row.get(7)?,
                    support_level: row.get(8)?,
                    expected_win_pct: row.get(9)?,
                    is_trade_able: row.get(10)?,
                    breakout_done: breakout_ts.is_some(),
                    breakout_ts,
                })
            })
            .map_err(query_err)?;

        rows.map(|row| row.map_err(query_err)).collect()
    }

    pub fn fetch_results(&self) -> Result<Vec<TradeResult>, TraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT candidate_id, pattern_id, symbol, strategy, buy_trigger, outcome,
                        realized_pnl_pct, holding_ticks, max_drawdown_pct, max_runup_pct,
                        entry_ts, entry_price, exit_ts, exit_price, exit_reason, rollovers
                 FROM trade_results ORDER BY candidate_id",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(TradeResult {
                    candidate_id: row.get::<_, i64>(0)? as u64,
                    pattern_id: row.get::<_, i64>(1)? as u64,
                    symbol: row.get(2)?,
                    strategy: enum_column(row.get(3)?)?,
                    trigger: enum_column(row.get(4)?)?,
                    outcome: enum_column(row.get(5)?)?,
                    realized_pnl_pct: row.get(6)?,
                    holding_ticks: row.get::<_, i64>(7)? as usize,
                    max_drawdown_pct: row.get(8)?,
                    max_runup_pct: row.get(9)?,
                    entry_ts: row.get::<_, Option<String>>(10)?.map(ts_column).transpose()?,
                    entry_price: row.get(11)?,
                    exit_ts: row.get::<_, Option<String>>(12)?.map(ts_column).transpose()?,
                    exit_price: row.get(13)?,
                    exit_reason: row
                        .get::<_, Option<String>>(14)?
                        .map(enum_column)
                        .transpose()?,
                    rollovers: row.get::<_, i64>(15)? as usize,
                })
            })
            .map_err(query_err)?;

        rows.map(|row| row.map_err(query_err)).collect()
    }
}

impl TickSource for SqliteStore {
    fn open(
        &self,
        symbol: &str,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<BarStream, TraderError> {
        let conn = self.conn()?;
        let from_str = from.as_ref().map(format_timestamp);
        let to_str = to.as_ref().map(format_timestamp);

        let mut stmt = conn
            .prepare(
                "SELECT ts, open, high, low, close, volume
                 FROM bars
                 WHERE symbol = ?1
                   AND (?2 IS NULL OR ts >= ?2)
                   AND (?3 IS NULL OR ts <= ?3)
                 ORDER BY ts ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![symbol, from_str, to_str], |row| {
                Ok(Bar {
                    symbol: symbol.to_string(),
                    timestamp: ts_column(row.get(0)?)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })
            .map_err(query_err)?;

        let items: Vec<Result<Bar, TraderError>> = rows
            .map(|row| {
                row.map_err(|e| TraderError::DataIntegrity {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect();

        Ok(BarStream::new(symbol, items))
    }

    fn symbols(&self) -> Result<Vec<String>, TraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM bars ORDER BY symbol")
            .map_err(query_err)?;

        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.map(|row| row.map_err(query_err)).collect()
    }
}

impl ResultSink for SqliteStore {
    fn record(&self, result: &TradeResult) -> Result<Ack, TraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO trade_results (candidate_id, pattern_id, symbol, strategy,
                buy_trigger, outcome, realized_pnl_pct, holding_ticks, max_drawdown_pct,
                max_runup_pct, entry_ts, entry_price, exit_ts, exit_price, exit_reason, rollovers)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                result.candidate_id as i64,
                result.pattern_id as i64,
                result.symbol,
                result.strategy.as_str(),
                result.trigger.as_str(),
                enum_text(&result.outcome)?,
                result.realized_pnl_pct,
                result.holding_ticks as i64,
                result.max_drawdown_pct,
                result.max_runup_pct,
                result.entry_ts.as_ref().map(format_timestamp),
                result.entry_price,
                result.exit_ts.as_ref().map(format_timestamp),
                result.exit_price,
                result.exit_reason.as_ref().map(enum_text).transpose()?,
                result.rollovers as i64,
            ],
        )
        .map_err(query_err)?;

        let sequence = self.recorded.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Ack { sequence })
    }
}
