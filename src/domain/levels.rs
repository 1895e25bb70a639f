//! Stop and limit bookkeeping per exit strategy.

use super::config::EvaluatorConfig;
use super::pattern::{Direction, PatternLevels};
use super::policy::PolicyAction;
use super::strategy::StrategyDescriptor;

/// Live exit levels of a held position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelState {
    pub stop: f64,
    /// `None` when the position is uncapped.
    pub limit: Option<f64>,
    /// Stepped-stop thresholds crossed so far.
    pub steps_crossed: usize,
    /// Least favorable limit allowed (forecast limits never retreat).
    pub limit_floor: Option<f64>,
}

/// Strategies whose stop may only tighten.
pub fn ratchets_stop(strategy: StrategyDescriptor) -> bool {
    matches!(
        strategy,
        StrategyDescriptor::TrailingStop | StrategyDescriptor::TrailingSteppedStop
    )
}

/// Levels at fill time. `forecast_pct` is only read by `FORECAST_LIMIT`.
pub fn initial_levels(
    strategy: StrategyDescriptor,
    pattern: &PatternLevels,
    entry_price: f64,
    config: &EvaluatorConfig,
    forecast_pct: f64,
) -> LevelState {
    let dir = pattern.direction;
    let mut state = LevelState {
        stop: pattern.stop,
        limit: Some(pattern.target),
        steps_crossed: 0,
        limit_floor: None,
    };

    match strategy {
        StrategyDescriptor::TrailingStop => {
            state.stop = dir.tighter_stop(pattern.stop, dir.offset(entry_price, -config.trail_pct));
            state.limit = None;
        }
        StrategyDescriptor::WaitTillEnd => {
            state.limit = None;
        }
        StrategyDescriptor::ForecastLimit => {
            let limit = dir.offset(entry_price, forecast_pct);
            state.limit = Some(limit);
            state.limit_floor = Some(limit);
        }
        _ => {}
    }
    state
}

/// Per-bar level update driven by the bar's close.
pub fn update_on_close(
    strategy: StrategyDescriptor,
    pattern: &PatternLevels,
    entry_price: f64,
    close: f64,
    config: &EvaluatorConfig,
    state: &mut LevelState,
) {
    let dir = pattern.direction;
    match strategy {
        StrategyDescriptor::TrailingStop => {
            state.stop = dir.tighter_stop(state.stop, dir.offset(close, -config.trail_pct));
        }
        StrategyDescriptor::TrailingSteppedStop => {
            let expected = pattern.expected_win_fraction();
            let steps = &config.step_quartiles;
            while state.steps_crossed < steps.len() {
                let threshold = dir.offset(entry_price, expected * steps[state.steps_crossed]);
                if !dir.beyond(close, threshold) {
                    break;
                }
                let locked = match state.steps_crossed {
                    0 => 0.0,
                    k => steps[k - 1],
                };
                state.stop = dir.tighter_stop(state.stop, dir.offset(entry_price, expected * locked));
                state.steps_crossed += 1;
            }
        }
        _ => {}
    }
}

/// Applies a policy level move. Returns false when the action was refused
/// by the strategy (no level changed).
pub fn apply_action(
    strategy: StrategyDescriptor,
    dir: Direction,
    entry_price: f64,
    action: PolicyAction,
    state: &mut LevelState,
) -> bool {
    let step = |delta: f64| delta * entry_price;
    match action {
        PolicyAction::Wait | PolicyAction::Sell => false,
        PolicyAction::LimitUp(d) | PolicyAction::LimitDown(d) => {
            if !strategy.accepts_policy_exits() {
                return false;
            }
            let Some(limit) = state.limit else {
                return false;
            };
            let moved = match action {
                PolicyAction::LimitUp(_) => limit + step(d),
                _ => limit - step(d),
            };
            let moved = match state.limit_floor {
                Some(floor) if dir.beyond(floor, moved) => floor,
                _ => moved,
            };
            state.limit = Some(moved.max(f64::MIN_POSITIVE));
            true
        }
        PolicyAction::StopLossUp(d) | PolicyAction::StopLossDown(d) => {
            let moved = match action {
                PolicyAction::StopLossUp(_) => state.stop + step(d),
                _ => state.stop - step(d),
            };
            let moved = moved.max(f64::MIN_POSITIVE);
            state.stop = if ratchets_stop(strategy) {
                dir.tighter_stop(state.stop, moved)
            } else {
                moved
            };
            true
        }
    }
}
