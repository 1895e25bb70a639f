//! Domain error types.

use std::fmt;

/// Failure raised by a trade policy query. Always recovered by the evaluator
/// (the bar proceeds as if the policy had answered `Wait`).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("policy failed: {reason}")]
    Failed { reason: String },

    #[error("policy query took {elapsed_ms}ms, limit is {limit_ms}ms")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("invalid policy model: {reason}")]
    InvalidModel { reason: String },
}

/// Coarse error classification used by the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DataIntegrity,
    DuplicatePattern,
    Catalog,
    Policy,
    Slippage,
    Configuration,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::DataIntegrity => "data_integrity",
            ErrorKind::DuplicatePattern => "duplicate_pattern",
            ErrorKind::Catalog => "catalog",
            ErrorKind::Policy => "policy",
            ErrorKind::Slippage => "slippage",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Top-level error type for patterntrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("data integrity violation for {symbol}: {reason}")]
    DataIntegrity { symbol: String, reason: String },

    #[error("duplicate {pattern_type} pattern for {symbol} over {range_start}..{range_end}")]
    DuplicatePattern {
        symbol: String,
        pattern_type: String,
        range_start: String,
        range_end: String,
    },

    #[error("unknown pattern {pattern_id}")]
    UnknownPattern { pattern_id: u64 },

    #[error("pattern {pattern_id} already broke out at {recorded}, refusing {requested}")]
    BreakoutConflict {
        pattern_id: u64,
        recorded: String,
        requested: String,
    },

    #[error("invalid pattern {pattern_id}: {reason}")]
    InvalidPattern { pattern_id: u64, reason: String },

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("entry at {entry_price} deviates {deviation:.4} from {reference}, cap is {cap}")]
    Slippage {
        reference: f64,
        entry_price: f64,
        deviation: f64,
        cap: f64,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("worker pool error: {reason}")]
    WorkerPool { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TraderError::DataIntegrity { .. } => ErrorKind::DataIntegrity,
            TraderError::DuplicatePattern { .. } => ErrorKind::DuplicatePattern,
            TraderError::UnknownPattern { .. }
            | TraderError::BreakoutConflict { .. }
            | TraderError::InvalidPattern { .. } => ErrorKind::Catalog,
            TraderError::Policy(_) => ErrorKind::Policy,
            TraderError::Slippage { .. } => ErrorKind::Slippage,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. }
            | TraderError::WorkerPool { .. } => ErrorKind::Configuration,
            TraderError::Database { .. }
            | TraderError::DatabaseQuery { .. }
            | TraderError::Io(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err.kind() {
            ErrorKind::Storage => match err {
                TraderError::Io(_) => 1,
                _ => 3,
            },
            ErrorKind::Configuration => 2,
            ErrorKind::DuplicatePattern | ErrorKind::Catalog => 4,
            ErrorKind::DataIntegrity => 5,
            ErrorKind::Policy | ErrorKind::Slippage => 6,
        };
        std::process::ExitCode::from(code)
    }
}
