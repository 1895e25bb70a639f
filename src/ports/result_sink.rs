//! Terminal result persistence port.

use crate::domain::error::TraderError;
use crate::domain::result::TradeResult;

/// Acknowledgement that a record was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Records stored by this sink so far, this one included.
    pub sequence: u64,
}

pub trait ResultSink: Send + Sync {
    fn record(&self, result: &TradeResult) -> Result<Ack, TraderError>;
}
