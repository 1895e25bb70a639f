//! Builds and validates run settings from a [`ConfigPort`].
//!
//! Every failure here is a configuration error and is fatal for the run.

use crate::domain::bar::parse_timestamp;
use crate::domain::batch::BatchOptions;
use crate::domain::config::EvaluatorConfig;
use crate::domain::error::TraderError;
use crate::domain::policy::{
    ExtendLimitPolicy, LinearSoftmaxPolicy, SellAfterTicksPolicy, SellOnFirstWinPolicy,
    TightenStopPolicy, TradePolicy, WaitPolicy,
};
use crate::domain::strategy::{BuyTrigger, StrategyDescriptor};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDateTime;
use std::str::FromStr;

/// Where bars come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Csv { path: String },
    Sqlite { path: String },
}

pub fn build_evaluator_config(config: &dyn ConfigPort) -> Result<EvaluatorConfig, TraderError> {
    let d = EvaluatorConfig::default();
    let s = "evaluator";

    let step_quartiles = match config.get_string(s, "step_quartiles") {
        None => d.step_quartiles.clone(),
        Some(_) => parse_list(config, s, "step_quartiles")?,
    };

    let built = EvaluatorConfig {
        entry_slippage_pct: config.get_double(s, "entry_slippage_pct", d.entry_slippage_pct),
        volume_increase: config.get_double(s, "volume_increase", d.volume_increase),
        volume_window: get_count(config, s, "volume_window", d.volume_window)?,
        trail_pct: config.get_double(s, "trail_pct", d.trail_pct),
        min_win_pct: config.get_double(s, "min_win_pct", d.min_win_pct),
        large_win_pct: config.get_double(s, "large_win_pct", d.large_win_pct),
        forecast_pct: config.get_double(s, "forecast_pct", d.forecast_pct),
        step_quartiles,
        sell_after_ticks: get_count(config, s, "sell_after_ticks", d.sell_after_ticks)?,
        max_holding_ticks: get_count(config, s, "max_holding_ticks", d.max_holding_ticks)?,
        rollover_limit: get_count(config, s, "rollover_limit", d.rollover_limit)?,
        policy_query_timeout_ms: get_count(
            config,
            s,
            "policy_query_timeout_ms",
            d.policy_query_timeout_ms as usize,
        )? as u64,
        grace_bars_after_range_end: get_count(
            config,
            s,
            "grace_bars_after_range_end",
            d.grace_bars_after_range_end,
        )?,
        neutral_band_pct: config.get_double(s, "neutral_band_pct", d.neutral_band_pct),
    };

    built.validate()?;
    Ok(built)
}

/// Exit strategies to evaluate; all of them when unset.
pub fn parse_strategies(config: &dyn ConfigPort) -> Result<Vec<StrategyDescriptor>, TraderError> {
    let strategies: Vec<StrategyDescriptor> = parse_list(config, "strategy", "strategies")?;
    if strategies.is_empty() {
        Ok(StrategyDescriptor::ALL.to_vec())
    } else {
        Ok(strategies)
    }
}

/// Entry triggers to evaluate; `BREAKOUT` when unset.
pub fn parse_triggers(config: &dyn ConfigPort) -> Result<Vec<BuyTrigger>, TraderError> {
    let triggers: Vec<BuyTrigger> = parse_list(config, "strategy", "triggers")?;
    if triggers.is_empty() {
        Ok(vec![BuyTrigger::Breakout])
    } else {
        Ok(triggers)
    }
}

pub fn build_policy(config: &dyn ConfigPort) -> Result<Box<dyn TradePolicy>, TraderError> {
    let s = "policy";
    let kind = config
        .get_string(s, "kind")
        .unwrap_or_else(|| "wait".to_string())
        .trim()
        .to_lowercase();

    let policy: Box<dyn TradePolicy> = match kind.as_str() {
        "wait" => Box::new(WaitPolicy),
        "sell_on_first_win" => Box::new(SellOnFirstWinPolicy {
            threshold_pct: positive(config, s, "threshold_pct", 2.0)?,
        }),
        "sell_after_ticks" => Box::new(SellAfterTicksPolicy {
            ticks: get_count(config, s, "ticks", 10)?.max(1),
        }),
        "tighten_stop" => Box::new(TightenStopPolicy {
            trigger_pct: positive(config, s, "trigger_pct", 2.0)?,
            max_distance_pct: positive(config, s, "max_distance_pct", 3.0)?,
            stop_delta: positive(config, s, "stop_delta", 0.01)?,
        }),
        "extend_limit" => Box::new(ExtendLimitPolicy {
            near_pct: positive(config, s, "near_pct", 1.0)?,
            limit_delta: positive(config, s, "limit_delta", 0.02)?,
        }),
        "learned" => {
            let path = config
                .get_string(s, "weights_path")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: s.into(),
                    key: "weights_path".into(),
                })?;
            Box::new(LinearSoftmaxPolicy::from_file(&path).map_err(|e| {
                TraderError::invalid(s, "weights_path", e.to_string())
            })?)
        }
        other => {
            return Err(TraderError::invalid(
                s,
                "kind",
                format!("unknown policy kind: {}", other),
            ));
        }
    };
    Ok(policy)
}

pub fn parse_data_source(config: &dyn ConfigPort) -> Result<DataSource, TraderError> {
    let path = match config.get_string("data", "path") {
        Some(p) if !p.trim().is_empty() => p.trim().to_string(),
        _ => {
            return Err(TraderError::ConfigMissing {
                section: "data".into(),
                key: "path".into(),
            });
        }
    };
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string())
        .trim()
        .to_lowercase();

    match source.as_str() {
        "csv" => Ok(DataSource::Csv { path }),
        "sqlite" => Ok(DataSource::Sqlite { path }),
        other => Err(TraderError::invalid(
            "data",
            "source",
            format!("unknown data source: {}", other),
        )),
    }
}

pub fn build_batch_options(config: &dyn ConfigPort) -> Result<BatchOptions, TraderError> {
    let default_workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let workers = get_count(config, "run", "workers", default_workers)?;
    if workers == 0 {
        return Err(TraderError::invalid("run", "workers", "workers must be at least 1"));
    }

    let from = parse_bound(config, "from")?;
    let to = parse_bound(config, "to")?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(TraderError::invalid("run", "from", "from must not be after to"));
        }
    }

    Ok(BatchOptions { workers, from, to })
}

/// Checks everything `evaluate` needs, without touching any data.
pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    build_evaluator_config(config)?;
    parse_strategies(config)?;
    parse_triggers(config)?;
    build_policy(config)?;
    parse_data_source(config)?;
    build_batch_options(config)?;
    Ok(())
}

fn parse_list<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Vec<T>, TraderError> {
    config
        .get_list(section, key)
        .iter()
        .map(|item| {
            item.parse::<T>()
                .map_err(|_| TraderError::invalid(section, key, format!("invalid entry: {}", item)))
        })
        .collect()
}

fn get_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, TraderError> {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value)
        .map_err(|_| TraderError::invalid(section, key, format!("{} must be non-negative", key)))
}

fn positive(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, TraderError> {
    let value = config.get_double(section, key, default);
    if !value.is_finite() || value <= 0.0 {
        return Err(TraderError::invalid(section, key, format!("{} must be positive", key)));
    }
    Ok(value)
}

fn parse_bound(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDateTime>, TraderError> {
    match config.get_string("run", key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_timestamp(&raw).map(Some).ok_or_else(|| {
            TraderError::invalid(
                "run",
                key,
                format!("invalid {} format, expected YYYY-MM-DD[ HH:MM:SS]", key),
            )
        }),
    }
}
