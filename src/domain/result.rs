//! Terminal trade records.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::pattern::PatternId;
use super::strategy::{BuyTrigger, StrategyDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Win,
    Loss,
    Neutral,
    Unfilled,
    Cancelled,
    /// Stopped by a data-integrity failure.
    Aborted,
}

impl Outcome {
    pub fn is_filled(self) -> bool {
        matches!(self, Outcome::Win | Outcome::Loss | Outcome::Neutral)
    }

    /// Classifies a realized return (percent) against a symmetric band.
    pub fn from_pnl(pnl_pct: f64, neutral_band_pct: f64) -> Self {
        if pnl_pct > neutral_band_pct {
            Outcome::Win
        } else if pnl_pct < -neutral_band_pct {
            Outcome::Loss
        } else {
            Outcome::Neutral
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
            Outcome::Neutral => "NEUTRAL",
            Outcome::Unfilled => "UNFILLED",
            Outcome::Cancelled => "CANCELLED",
            Outcome::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    Stop,
    Limit,
    PolicySell,
    StrategyExit,
    MaxHolding,
    EndOfData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub candidate_id: u64,
    pub pattern_id: PatternId,
    pub symbol: String,
    pub strategy: StrategyDescriptor,
    pub trigger: BuyTrigger,
    pub outcome: Outcome,
    /// Percent; zero when the candidate never filled.
    pub realized_pnl_pct: f64,
    pub holding_ticks: usize,
    pub max_drawdown_pct: f64,
    pub max_runup_pct: f64,
    pub entry_ts: Option<NaiveDateTime>,
    pub entry_price: Option<f64>,
    pub exit_ts: Option<NaiveDateTime>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub rollovers: usize,
}
