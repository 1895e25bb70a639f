//! Stateless rule policies.

use super::{FeatureSnapshot, PolicyAction, TradePolicy};
use crate::domain::error::PolicyError;

/// Never acts; leaves exits to the strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitPolicy;

impl TradePolicy for WaitPolicy {
    fn name(&self) -> &str {
        "wait"
    }

    fn select_action(&self, _snapshot: &FeatureSnapshot) -> Result<PolicyAction, PolicyError> {
        Ok(PolicyAction::Wait)
    }
}

/// Sells once the open gain exceeds `threshold_pct` (percent).
#[derive(Debug, Clone, Copy)]
pub struct SellOnFirstWinPolicy {
    pub threshold_pct: f64,
}

impl TradePolicy for SellOnFirstWinPolicy {
    fn name(&self) -> &str {
        "sell_on_first_win"
    }

    fn select_action(&self, snapshot: &FeatureSnapshot) -> Result<PolicyAction, PolicyError> {
        if snapshot.unrealized_pct > self.threshold_pct {
            Ok(PolicyAction::Sell)
        } else {
            Ok(PolicyAction::Wait)
        }
    }
}

/// Sells after holding for `ticks` bars.
#[derive(Debug, Clone, Copy)]
pub struct SellAfterTicksPolicy {
    pub ticks: usize,
}

impl TradePolicy for SellAfterTicksPolicy {
    fn name(&self) -> &str {
        "sell_after_ticks"
    }

    fn select_action(&self, snapshot: &FeatureSnapshot) -> Result<PolicyAction, PolicyError> {
        if snapshot.ticks_held >= self.ticks {
            Ok(PolicyAction::Sell)
        } else {
            Ok(PolicyAction::Wait)
        }
    }
}

/// Once the position is `trigger_pct` in profit, pulls the stop up by
/// `stop_delta` on every bar where it sits more than `max_distance_pct`
/// below the close.
#[derive(Debug, Clone, Copy)]
pub struct TightenStopPolicy {
    pub trigger_pct: f64,
    pub max_distance_pct: f64,
    pub stop_delta: f64,
}

impl TradePolicy for TightenStopPolicy {
    fn name(&self) -> &str {
        "tighten_stop"
    }

    fn select_action(&self, snapshot: &FeatureSnapshot) -> Result<PolicyAction, PolicyError> {
        let in_profit = snapshot.unrealized_pct >= self.trigger_pct;
        if in_profit && snapshot.distance_to_stop_pct > self.max_distance_pct {
            Ok(PolicyAction::StopLossUp(self.stop_delta))
        } else {
            Ok(PolicyAction::Wait)
        }
    }
}

/// Pushes the limit up by `limit_delta` whenever price closes within
/// `near_pct` of it, letting winners run past the pattern target.
#[derive(Debug, Clone, Copy)]
pub struct ExtendLimitPolicy {
    pub near_pct: f64,
    pub limit_delta: f64,
}

impl TradePolicy for ExtendLimitPolicy {
    fn name(&self) -> &str {
        "extend_limit"
    }

    fn select_action(&self, snapshot: &FeatureSnapshot) -> Result<PolicyAction, PolicyError> {
        match snapshot.distance_to_limit_pct {
            Some(distance) if distance <= self.near_pct => {
                Ok(PolicyAction::LimitUp(self.limit_delta))
            }
            _ => Ok(PolicyAction::Wait),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::test_support::snapshot;

    #[test]
    fn wait_always_waits() {
        assert_eq!(WaitPolicy.select_action(&snapshot()), Ok(PolicyAction::Wait));
    }

    #[test]
    fn sell_on_first_win_compares_unrealized() {
        let policy = SellOnFirstWinPolicy { threshold_pct: 2.0 };
        let mut s = snapshot();
        s.unrealized_pct = 2.0;
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::Wait));
        s.unrealized_pct = 2.5;
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::Sell));
    }

    #[test]
    fn sell_after_ticks_counts_held_bars() {
        let policy = SellAfterTicksPolicy { ticks: 3 };
        let mut s = snapshot();
        s.ticks_held = 2;
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::Wait));
        s.ticks_held = 3;
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::Sell));
    }

    #[test]
    fn tighten_stop_only_in_profit() {
        let policy = TightenStopPolicy {
            trigger_pct: 3.0,
            max_distance_pct: 4.0,
            stop_delta: 0.01,
        };
        let mut s = snapshot();
        s.unrealized_pct = 1.0;
        s.distance_to_stop_pct = 8.0;
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::Wait));
        s.unrealized_pct = 5.0;
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::StopLossUp(0.01)));
        s.distance_to_stop_pct = 3.0;
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::Wait));
    }

    #[test]
    fn extend_limit_near_target() {
        let policy = ExtendLimitPolicy {
            near_pct: 1.0,
            limit_delta: 0.02,
        };
        let mut s = snapshot();
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::Wait));
        s.distance_to_limit_pct = Some(0.5);
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::LimitUp(0.02)));
        s.distance_to_limit_pct = None;
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::Wait));
    }
}
