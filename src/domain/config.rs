//! Immutable evaluator configuration.
//!
//! Knobs ending in `_pct` are fractions (0.05 = 5%).

use super::error::TraderError;

const SECTION: &str = "evaluator";

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Max deviation of the fill from the trigger level.
    pub entry_slippage_pct: f64,
    /// Breakout volume must reach this multiple of the trailing mean volume.
    pub volume_increase: f64,
    /// Number of prior bars in the trailing mean volume.
    pub volume_window: usize,
    pub trail_pct: f64,
    pub min_win_pct: f64,
    pub large_win_pct: f64,
    pub forecast_pct: f64,
    /// Fractions of the expected win at which the stepped stop advances.
    pub step_quartiles: Vec<f64>,
    pub sell_after_ticks: usize,
    pub max_holding_ticks: usize,
    pub rollover_limit: usize,
    pub policy_query_timeout_ms: u64,
    pub grace_bars_after_range_end: usize,
    /// Results with |pnl| within this band (in percent) are NEUTRAL.
    pub neutral_band_pct: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        EvaluatorConfig {
            entry_slippage_pct: 0.002,
            volume_increase: 1.0,
            volume_window: 20,
            trail_pct: 0.05,
            min_win_pct: 0.02,
            large_win_pct: 0.08,
            forecast_pct: 0.10,
            step_quartiles: vec![0.25, 0.5, 0.75, 1.0],
            sell_after_ticks: 10,
            max_holding_ticks: 250,
            rollover_limit: 2,
            policy_query_timeout_ms: 1000,
            grace_bars_after_range_end: 10,
            neutral_band_pct: 0.0,
        }
    }
}

impl EvaluatorConfig {
    pub fn validate(&self) -> Result<(), TraderError> {
        non_negative("entry_slippage_pct", self.entry_slippage_pct)?;
        non_negative("volume_increase", self.volume_increase)?;
        non_negative("neutral_band_pct", self.neutral_band_pct)?;
        fraction("trail_pct", self.trail_pct)?;
        positive("min_win_pct", self.min_win_pct)?;
        positive("large_win_pct", self.large_win_pct)?;
        positive("forecast_pct", self.forecast_pct)?;

        if self.large_win_pct < self.min_win_pct {
            return Err(TraderError::invalid(
                SECTION,
                "large_win_pct",
                "large_win_pct must not be below min_win_pct",
            ));
        }
        if self.step_quartiles.is_empty() {
            return Err(TraderError::invalid(
                SECTION,
                "step_quartiles",
                "at least one step is required",
            ));
        }
        let ascending = self.step_quartiles.windows(2).all(|w| w[0] < w[1]);
        let in_range = self
            .step_quartiles
            .iter()
            .all(|q| q.is_finite() && *q > 0.0);
        if !ascending || !in_range {
            return Err(TraderError::invalid(
                SECTION,
                "step_quartiles",
                "steps must be positive and strictly ascending",
            ));
        }
        if self.volume_window == 0 {
            return Err(TraderError::invalid(SECTION, "volume_window", "must be at least 1"));
        }
        if self.sell_after_ticks == 0 {
            return Err(TraderError::invalid(SECTION, "sell_after_ticks", "must be at least 1"));
        }
        if self.max_holding_ticks == 0 {
            return Err(TraderError::invalid(SECTION, "max_holding_ticks", "must be at least 1"));
        }
        if self.policy_query_timeout_ms == 0 {
            return Err(TraderError::invalid(
                SECTION,
                "policy_query_timeout_ms",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn non_negative(key: &str, value: f64) -> Result<(), TraderError> {
    if !value.is_finite() || value < 0.0 {
        return Err(TraderError::invalid(SECTION, key, format!("{key} must be non-negative")));
    }
    Ok(())
}

fn positive(key: &str, value: f64) -> Result<(), TraderError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TraderError::invalid(SECTION, key, format!("{key} must be positive")));
    }
    Ok(())
}

fn fraction(key: &str, value: f64) -> Result<(), TraderError> {
    if !value.is_finite() || value <= 0.0 || value >= 1.0 {
        return Err(TraderError::invalid(SECTION, key, format!("{key} must be between 0 and 1")));
    }
    Ok(())
}
