#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use patterntrader::domain::bar::Bar;
use patterntrader::domain::config::EvaluatorConfig;
use patterntrader::domain::error::PolicyError;
use patterntrader::domain::pattern::{Pattern, PatternType};
use patterntrader::domain::policy::{FeatureSnapshot, PolicyAction, TradePolicy};
use std::sync::Mutex;
use std::time::Duration;

pub const SYMBOL: &str = "BHP";

pub fn day(n: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::days(i64::from(n) - 1)
}

pub fn make_bar(n: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        symbol: SYMBOL.to_string(),
        timestamp: day(n),
        open,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

/// Bars from `(open, high, low, close)` tuples on consecutive days starting at day 1.
pub fn make_bars(rows: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    rows.iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| make_bar(i as u32 + 1, o, h, l, c))
        .collect()
}

/// Flat bars around `price`, one per day in `days`.
pub fn flat_bars(days: std::ops::RangeInclusive<u32>, price: f64) -> Vec<Bar> {
    days.map(|d| make_bar(d, price, price * 1.002, price * 0.998, price))
        .collect()
}

/// Long triangle: breakout 100, target 110, stop 95, range covering January.
pub fn triangle_up() -> Pattern {
    Pattern {
        pattern_id: 1,
        symbol: SYMBOL.to_string(),
        pattern_type: PatternType::TriangleUp,
        range_start_ts: day(1),
        range_end_ts: day(31),
        breakout_level: 100.0,
        target_level: 110.0,
        stop_level: 95.0,
        support_level: None,
        expected_win_pct: 10.0,
        is_trade_able: true,
        breakout_done: false,
        breakout_ts: None,
    }
}

/// Short mirror of [`triangle_up`]: breakout 100, target 90, stop 105.
pub fn triangle_down() -> Pattern {
    Pattern {
        pattern_type: PatternType::TriangleDown,
        target_level: 90.0,
        stop_level: 105.0,
        ..triangle_up()
    }
}

pub fn test_config() -> EvaluatorConfig {
    EvaluatorConfig {
        entry_slippage_pct: 0.02,
        ..EvaluatorConfig::default()
    }
}

/// Answers from a fixed script, then `Wait`.
pub struct ScriptedPolicy {
    script: Mutex<Vec<PolicyAction>>,
}

impl ScriptedPolicy {
    pub fn new(actions: Vec<PolicyAction>) -> Self {
        Self {
            script: Mutex::new(actions),
        }
    }
}

impl TradePolicy for ScriptedPolicy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn select_action(&self, _snapshot: &FeatureSnapshot) -> Result<PolicyAction, PolicyError> {
        let mut script = self.script.lock().unwrap();
        Ok(if script.is_empty() {
            PolicyAction::Wait
        } else {
            script.remove(0)
        })
    }
}

pub struct FailingPolicy;

impl TradePolicy for FailingPolicy {
    fn name(&self) -> &str {
        "failing"
    }

    fn select_action(&self, _snapshot: &FeatureSnapshot) -> Result<PolicyAction, PolicyError> {
        Err(PolicyError::Failed {
            reason: "model unavailable".into(),
        })
    }
}

/// Sleeps past any small query timeout, then asks to sell.
pub struct SlowPolicy {
    pub delay: Duration,
}

impl TradePolicy for SlowPolicy {
    fn name(&self) -> &str {
        "slow"
    }

    fn select_action(&self, _snapshot: &FeatureSnapshot) -> Result<PolicyAction, PolicyError> {
        std::thread::sleep(self.delay);
        Ok(PolicyAction::Sell)
    }
}
