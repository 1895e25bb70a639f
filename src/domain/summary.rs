//! Aggregate statistics over trade results.

use std::collections::BTreeMap;

use super::result::{Outcome, TradeResult};
use super::strategy::StrategyDescriptor;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSummary {
    pub candidates: usize,
    pub filled: usize,
    pub wins: usize,
    pub losses: usize,
    pub neutral: usize,
    pub unfilled: usize,
    pub cancelled: usize,
    pub aborted: usize,
    /// Wins over filled trades.
    pub win_rate: f64,
    pub total_pnl_pct: f64,
    pub avg_pnl_pct: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub largest_win_pct: f64,
    pub largest_loss_pct: f64,
    pub profit_factor: f64,
    pub avg_holding_ticks: f64,
    pub worst_drawdown_pct: f64,
}

impl ResultSummary {
    pub fn compute(results: &[TradeResult]) -> Self {
        let mut summary = ResultSummary {
            candidates: results.len(),
            ..Default::default()
        };

        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut total_ticks = 0usize;

        for result in results {
            match result.outcome {
                Outcome::Unfilled => summary.unfilled += 1,
                Outcome::Cancelled => summary.cancelled += 1,
                Outcome::Aborted => summary.aborted += 1,
                Outcome::Win | Outcome::Loss | Outcome::Neutral => {}
            }
            if !result.outcome.is_filled() {
                continue;
            }

            summary.filled += 1;
            total_ticks += result.holding_ticks;
            summary.worst_drawdown_pct = summary.worst_drawdown_pct.max(result.max_drawdown_pct);

            let pnl = result.realized_pnl_pct;
            summary.total_pnl_pct += pnl;
            match result.outcome {
                Outcome::Win => {
                    summary.wins += 1;
                    total_wins += pnl;
                    summary.largest_win_pct = summary.largest_win_pct.max(pnl);
                }
                Outcome::Loss => {
                    summary.losses += 1;
                    total_losses += pnl.abs();
                    summary.largest_loss_pct = summary.largest_loss_pct.max(pnl.abs());
                }
                _ => summary.neutral += 1,
            }
        }

        if summary.filled > 0 {
            let filled = summary.filled as f64;
            summary.win_rate = summary.wins as f64 / filled;
            summary.avg_pnl_pct = summary.total_pnl_pct / filled;
            summary.avg_holding_ticks = total_ticks as f64 / filled;
        }
        if summary.wins > 0 {
            summary.avg_win_pct = total_wins / summary.wins as f64;
        }
        if summary.losses > 0 {
            summary.avg_loss_pct = total_losses / summary.losses as f64;
        }

        summary.profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        summary
    }

    /// One summary per exit strategy present in `results`.
    pub fn by_strategy(results: &[TradeResult]) -> BTreeMap<&'static str, ResultSummary> {
        let mut groups: BTreeMap<&'static str, Vec<TradeResult>> = BTreeMap::new();
        for result in results {
            groups
                .entry(result.strategy.as_str())
                .or_default()
                .push(result.clone());
        }
        groups
            .into_iter()
            .map(|(name, group)| (name, ResultSummary::compute(&group)))
            .collect()
    }

    pub fn for_strategy(results: &[TradeResult], strategy: StrategyDescriptor) -> ResultSummary {
        let matching: Vec<TradeResult> = results
            .iter()
            .filter(|r| r.strategy == strategy)
            .cloned()
            .collect();
        ResultSummary::compute(&matching)
    }
}
