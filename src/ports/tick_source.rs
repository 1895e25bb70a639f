//! Bar supply port.

use chrono::NaiveDateTime;

use crate::domain::error::TraderError;
use crate::domain::tick_stream::BarStream;

pub trait TickSource: Send + Sync {
    /// Opens an ordered stream of `symbol` bars, optionally bounded to
    /// `[from, to]` inclusive.
    fn open(
        &self,
        symbol: &str,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<BarStream, TraderError>;

    fn symbols(&self) -> Result<Vec<String>, TraderError>;
}
