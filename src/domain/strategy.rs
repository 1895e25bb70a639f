//! Exit strategies and entry triggers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyDescriptor {
    FixedLimit,
    TrailingStop,
    TrailingSteppedStop,
    ForecastLimit,
    SellAfterNTicks,
    SellOnFirstWin,
    SellOnFirstLargeWin,
    WaitTillEnd,
    RollOverStopLoss,
}

impl StrategyDescriptor {
    pub const ALL: [StrategyDescriptor; 9] = [
        StrategyDescriptor::FixedLimit,
        StrategyDescriptor::TrailingStop,
        StrategyDescriptor::TrailingSteppedStop,
        StrategyDescriptor::ForecastLimit,
        StrategyDescriptor::SellAfterNTicks,
        StrategyDescriptor::SellOnFirstWin,
        StrategyDescriptor::SellOnFirstLargeWin,
        StrategyDescriptor::WaitTillEnd,
        StrategyDescriptor::RollOverStopLoss,
    ];

    /// Whether a bar reaching `current_limit` closes the trade.
    pub fn caps_at_limit(self) -> bool {
        !matches!(
            self,
            StrategyDescriptor::TrailingStop | StrategyDescriptor::WaitTillEnd
        )
    }

    /// Whether the trade policy may close the trade or move its limit.
    pub fn accepts_policy_exits(self) -> bool {
        self != StrategyDescriptor::WaitTillEnd
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyDescriptor::FixedLimit => "FIXED_LIMIT",
            StrategyDescriptor::TrailingStop => "TRAILING_STOP",
            StrategyDescriptor::TrailingSteppedStop => "TRAILING_STEPPED_STOP",
            StrategyDescriptor::ForecastLimit => "FORECAST_LIMIT",
            StrategyDescriptor::SellAfterNTicks => "SELL_AFTER_N_TICKS",
            StrategyDescriptor::SellOnFirstWin => "SELL_ON_FIRST_WIN",
            StrategyDescriptor::SellOnFirstLargeWin => "SELL_ON_FIRST_LARGE_WIN",
            StrategyDescriptor::WaitTillEnd => "WAIT_TILL_END",
            StrategyDescriptor::RollOverStopLoss => "ROLL_OVER_STOP_LOSS",
        }
    }
}

impl fmt::Display for StrategyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyDescriptor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| format!("unknown strategy: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuyTrigger {
    /// Enter when a bar closes beyond the breakout level on confirming volume.
    Breakout,
    /// Enter when a bar's range includes the support level.
    TouchPoint,
}

impl BuyTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            BuyTrigger::Breakout => "BREAKOUT",
            BuyTrigger::TouchPoint => "TOUCH_POINT",
        }
    }
}

impl fmt::Display for BuyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuyTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "BREAKOUT" => Ok(BuyTrigger::Breakout),
            "TOUCH_POINT" => Ok(BuyTrigger::TouchPoint),
            _ => Err(format!("unknown buy trigger: {s}")),
        }
    }
}
