//! Trade policies: pick the next discrete action for a held position.
//!
//! A policy sees only a [`FeatureSnapshot`] and answers with a
//! [`PolicyAction`]. Rule policies are pure functions of the snapshot;
//! learned policies carry weights loaded at construction. Neither trains.

pub mod learned;
pub mod rules;
pub mod worker;

use super::error::PolicyError;
use super::pattern::{PATTERN_TYPE_COUNT, PatternType};

pub use learned::{LinearSoftmaxPolicy, PolicyModel};
pub use rules::{
    ExtendLimitPolicy, SellAfterTicksPolicy, SellOnFirstWinPolicy, TightenStopPolicy, WaitPolicy,
};
pub use worker::PolicyWorker;

/// Deltas are fractions of the entry price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyAction {
    Wait,
    Sell,
    LimitUp(f64),
    LimitDown(f64),
    StopLossUp(f64),
    StopLossDown(f64),
}

impl PolicyAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            PolicyAction::Wait => ActionKind::Wait,
            PolicyAction::Sell => ActionKind::Sell,
            PolicyAction::LimitUp(_) => ActionKind::LimitUp,
            PolicyAction::LimitDown(_) => ActionKind::LimitDown,
            PolicyAction::StopLossUp(_) => ActionKind::StopLossUp,
            PolicyAction::StopLossDown(_) => ActionKind::StopLossDown,
        }
    }
}

/// Payload-free tag of a [`PolicyAction`], used to index model outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Wait,
    Sell,
    LimitUp,
    LimitDown,
    StopLossUp,
    StopLossDown,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Wait,
        ActionKind::Sell,
        ActionKind::LimitUp,
        ActionKind::LimitDown,
        ActionKind::StopLossUp,
        ActionKind::StopLossDown,
    ];

    pub fn with_deltas(self, limit_delta: f64, stop_delta: f64) -> PolicyAction {
        match self {
            ActionKind::Wait => PolicyAction::Wait,
            ActionKind::Sell => PolicyAction::Sell,
            ActionKind::LimitUp => PolicyAction::LimitUp(limit_delta),
            ActionKind::LimitDown => PolicyAction::LimitDown(limit_delta),
            ActionKind::StopLossUp => PolicyAction::StopLossUp(stop_delta),
            ActionKind::StopLossDown => PolicyAction::StopLossDown(stop_delta),
        }
    }
}

/// Number of entries in [`FeatureSnapshot::to_vector`].
pub const FEATURE_WIDTH: usize = 8 + PATTERN_TYPE_COUNT;

/// What a policy sees on each held bar. Percentages are in percent units and
/// signed in the trade's favor.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSnapshot {
    pub unrealized_pct: f64,
    pub ticks_held: usize,
    pub max_runup_pct: f64,
    pub max_drawdown_pct: f64,
    pub distance_to_stop_pct: f64,
    /// `None` while the position has no limit.
    pub distance_to_limit_pct: Option<f64>,
    pub bars_remaining_in_forecast_window: usize,
    pub pattern_type_onehot: [f64; PATTERN_TYPE_COUNT],
}

impl FeatureSnapshot {
    pub fn onehot(pattern_type: PatternType) -> [f64; PATTERN_TYPE_COUNT] {
        let mut v = [0.0; PATTERN_TYPE_COUNT];
        v[pattern_type.index()] = 1.0;
        v
    }

    /// Flat model input. An absent limit encodes as distance 0 with the
    /// `has_limit` slot cleared.
    pub fn to_vector(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(FEATURE_WIDTH);
        v.push(self.unrealized_pct);
        v.push(self.ticks_held as f64);
        v.push(self.max_runup_pct);
        v.push(self.max_drawdown_pct);
        v.push(self.distance_to_stop_pct);
        v.push(self.distance_to_limit_pct.unwrap_or(0.0));
        v.push(if self.distance_to_limit_pct.is_some() { 1.0 } else { 0.0 });
        v.push(self.bars_remaining_in_forecast_window as f64);
        v.extend_from_slice(&self.pattern_type_onehot);
        v
    }
}

pub trait TradePolicy: Send + Sync {
    fn name(&self) -> &str;

    fn select_action(&self, snapshot: &FeatureSnapshot) -> Result<PolicyAction, PolicyError>;

    /// Forecast move (fraction) used by `FORECAST_LIMIT`, asked once on
    /// entry. `None` defers to the evaluator's configured `forecast_pct`.
    fn forecast_on_entry(&self, _snapshot: &FeatureSnapshot) -> Option<f64> {
        None
    }
}
