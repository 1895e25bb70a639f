//! Drives trade candidates through their lifecycle, one bar at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use super::audit::AuditLog;
use super::bar::Bar;
use super::candidate::{CandidateState, TradeCandidate};
use super::config::EvaluatorConfig;
use super::entry::{VolumeTracker, confirm_fill, evaluate_trigger};
use super::error::{PolicyError, TraderError};
use super::levels::{self, LevelState};
use super::policy::{FeatureSnapshot, PolicyAction, PolicyWorker, TradePolicy};
use super::result::{ExitReason, Outcome, TradeResult};
use super::strategy::StrategyDescriptor;

pub struct StrategyEvaluator {
    config: EvaluatorConfig,
    policy: Arc<dyn TradePolicy>,
    audit: AuditLog,
}

impl StrategyEvaluator {
    pub fn new(config: EvaluatorConfig, policy: Box<dyn TradePolicy>) -> Result<Self, TraderError> {
        config.validate()?;
        Ok(Self {
            config,
            policy: Arc::from(policy),
            audit: AuditLog::new(),
        })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Runs `candidate` over `bars` until it reaches a terminal state or the
    /// stream ends, and returns the terminal record. A candidate that is
    /// already terminal is returned as is.
    pub fn run<I>(&self, candidate: &mut TradeCandidate, bars: I) -> TradeResult
    where
        I: IntoIterator<Item = Result<Bar, TraderError>>,
    {
        let cancel = candidate.cancel_token();
        let mut volume = VolumeTracker::new(self.config.volume_window);
        let mut worker = PolicyWorker::new(Arc::clone(&self.policy));
        let mut last: Option<Bar> = None;

        for item in bars {
            if candidate.is_terminal() {
                break;
            }
            if cancel.is_cancelled() {
                self.cancel(candidate);
                break;
            }

            let checked = item.and_then(|bar| check_bar(candidate, last.as_ref(), bar));
            let bar = match checked {
                Ok(bar) => bar,
                Err(err) => {
                    self.integrity_failure(candidate, &err, last.as_ref().map(|b| b.timestamp));
                    break;
                }
            };

            self.step(candidate, &bar, &mut volume, &mut worker);
            last = Some(bar);
        }

        if !candidate.is_terminal() {
            if cancel.is_cancelled() {
                self.cancel(candidate);
            } else {
                self.finish(candidate, last.as_ref());
            }
        }

        let result = candidate
            .result()
            .unwrap_or_else(|| candidate.record(Outcome::Aborted));
        debug!(
            candidate_id = result.candidate_id,
            pattern_id = result.pattern_id,
            outcome = %result.outcome,
            pnl_pct = result.realized_pnl_pct,
            "candidate finished"
        );
        result
    }

    pub fn run_slice(&self, candidate: &mut TradeCandidate, bars: &[Bar]) -> TradeResult {
        self.run(candidate, bars.iter().cloned().map(Ok))
    }

    /// A booked exit is completed; anything earlier is dropped as cancelled.
    fn cancel(&self, candidate: &mut TradeCandidate) {
        debug!(candidate_id = candidate.candidate_id(), state = ?candidate.state(), "candidate cancelled");
        if candidate.state() == CandidateState::Selling {
            candidate.complete(self.config.neutral_band_pct);
        } else {
            candidate.abort(Outcome::Cancelled);
        }
    }

    fn step(
        &self,
        candidate: &mut TradeCandidate,
        bar: &Bar,
        volume: &mut VolumeTracker,
        worker: &mut PolicyWorker,
    ) {
        match candidate.state() {
            CandidateState::Watching => self.watch(candidate, bar, volume),
            CandidateState::Buying => self.fill(candidate, bar, worker),
            CandidateState::Holding => self.hold(candidate, bar, worker),
            CandidateState::Selling => {
                if candidate.can_roll_over(self.config.rollover_limit) {
                    candidate.roll_over(bar.open);
                    debug!(
                        candidate_id = candidate.candidate_id(),
                        rollovers = candidate.rollovers(),
                        price = bar.open,
                        "rolled over stop exit"
                    );
                    self.hold(candidate, bar, worker);
                } else {
                    candidate.complete(self.config.neutral_band_pct);
                }
            }
            CandidateState::Completed | CandidateState::Aborted => {}
        }
    }

    fn watch(&self, candidate: &mut TradeCandidate, bar: &Bar, volume: &mut VolumeTracker) {
        let pattern = *candidate.levels();
        if bar.timestamp < pattern.range_start_ts {
            volume.push(bar.volume);
            return;
        }
        if bar.timestamp > pattern.range_end_ts
            && candidate.note_bar_after_range() > self.config.grace_bars_after_range_end
        {
            debug!(
                candidate_id = candidate.candidate_id(),
                "no trigger within the watching window"
            );
            candidate.abort(Outcome::Unfilled);
            return;
        }

        let signal = evaluate_trigger(
            candidate.buy_trigger(),
            &pattern,
            bar,
            volume.mean(),
            self.config.volume_increase,
        );
        volume.push(bar.volume);

        if let Some(signal) = signal {
            debug!(
                candidate_id = candidate.candidate_id(),
                trigger = %candidate.buy_trigger(),
                price = signal.price,
                ts = %bar.timestamp,
                "entry triggered"
            );
            candidate.begin_buying(bar.timestamp, signal);
        }
    }

    fn fill(&self, candidate: &mut TradeCandidate, bar: &Bar, worker: &mut PolicyWorker) {
        let Some(signal) = candidate.pending_entry() else {
            candidate.abort(Outcome::Unfilled);
            return;
        };
        if let Err(err) = confirm_fill(
            candidate.direction(),
            &signal,
            bar,
            self.config.entry_slippage_pct,
        ) {
            debug!(candidate_id = candidate.candidate_id(), error = %err, "entry rejected");
            self.audit
                .record(candidate.candidate_id(), &err, Some(bar.timestamp));
            candidate.abort(Outcome::Unfilled);
            return;
        }

        let strategy = candidate.strategy();
        let pattern = *candidate.levels();
        let initial = levels::initial_levels(
            strategy,
            &pattern,
            signal.price,
            &self.config,
            self.config.forecast_pct,
        );
        candidate.begin_holding(initial);

        if strategy == StrategyDescriptor::ForecastLimit {
            let snapshot = self.features(candidate, signal.price);
            let forecast = self
                .policy
                .forecast_on_entry(&snapshot)
                .filter(|f| f.is_finite() && *f > 0.0);
            if let (Some(forecast), Some(state)) = (forecast, candidate.exit_levels_mut()) {
                *state = levels::initial_levels(strategy, &pattern, signal.price, &self.config, forecast);
            }
        }

        debug!(
            candidate_id = candidate.candidate_id(),
            entry = signal.price,
            stop = ?candidate.current_stop(),
            limit = ?candidate.current_limit(),
            "entry filled"
        );
        self.hold(candidate, bar, worker);
    }

    /// One held bar: stop, then limit, then the strategy's own level update
    /// and forced exits, then the policy.
    fn hold(&self, candidate: &mut TradeCandidate, bar: &Bar, worker: &mut PolicyWorker) {
        let (Some(entry), Some(current)) = (candidate.entry_price(), candidate.exit_levels()) else {
            return;
        };
        let dir = candidate.direction();
        let strategy = candidate.strategy();
        let capped_limit = current.limit.filter(|_| strategy.caps_at_limit());

        candidate.start_held_bar(bar.timestamp);

        let (favorable, adverse) = dir.extremes(bar);
        let favorable = match capped_limit {
            Some(limit) if dir.beyond(favorable, limit) => limit,
            _ => favorable,
        };
        candidate.observe_excursion(favorable, dir.tighter_stop(adverse, current.stop));

        if dir.stop_hit(bar, current.stop) {
            candidate.begin_selling(bar.timestamp, current.stop, ExitReason::Stop);
            return;
        }
        if let Some(limit) = capped_limit {
            if dir.limit_hit(bar, limit) {
                candidate.begin_selling(bar.timestamp, limit, ExitReason::Limit);
                return;
            }
        }

        let pattern = *candidate.levels();
        let mut updated = current;
        levels::update_on_close(strategy, &pattern, entry, bar.close, &self.config, &mut updated);
        self.store_levels(candidate, updated);

        if let Some(reason) = self.forced_exit(candidate, entry, bar) {
            candidate.begin_selling(bar.timestamp, bar.close, reason);
            return;
        }

        let snapshot = self.features(candidate, bar.close);
        candidate.set_features(snapshot.clone());
        let action = self.query_policy(candidate, worker, &snapshot, bar.timestamp);

        match action {
            PolicyAction::Wait => {}
            PolicyAction::Sell if strategy.accepts_policy_exits() => {
                candidate.begin_selling(bar.timestamp, bar.close, ExitReason::PolicySell);
            }
            PolicyAction::Sell => {
                debug!(candidate_id = candidate.candidate_id(), "sell ignored by {}", strategy);
            }
            action => {
                if let Some(state) = candidate.exit_levels_mut() {
                    levels::apply_action(strategy, dir, entry, action, state);
                }
            }
        }
    }

    fn store_levels(&self, candidate: &mut TradeCandidate, updated: LevelState) {
        if let Some(state) = candidate.exit_levels_mut() {
            *state = updated;
        }
    }

    /// Win thresholds are strict: a close exactly at `entry * (1 + pct)`
    /// keeps the position open.
    fn forced_exit(&self, candidate: &TradeCandidate, entry: f64, bar: &Bar) -> Option<ExitReason> {
        let ticks = candidate.holding_ticks();
        let dir = candidate.direction();
        let closed_past = |pct: f64| dir.beyond(bar.close, dir.offset(entry, pct));
        let strategy_exit = match candidate.strategy() {
            StrategyDescriptor::SellAfterNTicks => ticks >= self.config.sell_after_ticks,
            StrategyDescriptor::SellOnFirstWin => closed_past(self.config.min_win_pct),
            StrategyDescriptor::SellOnFirstLargeWin => closed_past(self.config.large_win_pct),
            _ => false,
        };
        if strategy_exit {
            Some(ExitReason::StrategyExit)
        } else if ticks >= self.config.max_holding_ticks {
            Some(ExitReason::MaxHolding)
        } else {
            None
        }
    }

    /// Bars the position may still be held for.
    fn holding_window(&self, strategy: StrategyDescriptor) -> usize {
        match strategy {
            StrategyDescriptor::SellAfterNTicks => {
                self.config.sell_after_ticks.min(self.config.max_holding_ticks)
            }
            _ => self.config.max_holding_ticks,
        }
    }

    fn features(&self, candidate: &TradeCandidate, close: f64) -> FeatureSnapshot {
        let dir = candidate.direction();
        let stop = candidate.current_stop().unwrap_or(candidate.levels().stop);
        FeatureSnapshot {
            unrealized_pct: candidate.open_pnl_at(close),
            ticks_held: candidate.holding_ticks(),
            max_runup_pct: candidate.max_runup_pct(),
            max_drawdown_pct: candidate.max_drawdown_pct(),
            distance_to_stop_pct: dir.sign() * (close - stop) / close * 100.0,
            distance_to_limit_pct: candidate
                .current_limit()
                .map(|limit| dir.sign() * (limit - close) / close * 100.0),
            bars_remaining_in_forecast_window: self
                .holding_window(candidate.strategy())
                .saturating_sub(candidate.holding_ticks()),
            pattern_type_onehot: FeatureSnapshot::onehot(candidate.levels().pattern_type),
        }
    }

    /// Policy answer for this bar. The query is cut off at the configured
    /// timeout; errors, timeouts and malformed actions degrade to `Wait` and
    /// are audited.
    fn query_policy(
        &self,
        candidate: &TradeCandidate,
        worker: &mut PolicyWorker,
        snapshot: &FeatureSnapshot,
        ts: NaiveDateTime,
    ) -> PolicyAction {
        let limit = Duration::from_millis(self.config.policy_query_timeout_ms);
        let answer = worker.query(snapshot, limit).and_then(check_action);

        match answer {
            Ok(action) => action,
            Err(err) => {
                warn!(
                    candidate_id = candidate.candidate_id(),
                    policy = self.policy.name(),
                    error = %err,
                    "policy query failed, holding position"
                );
                self.audit
                    .record(candidate.candidate_id(), &TraderError::Policy(err), Some(ts));
                PolicyAction::Wait
            }
        }
    }

    fn integrity_failure(&self, candidate: &mut TradeCandidate, err: &TraderError, ts: Option<NaiveDateTime>) {
        warn!(candidate_id = candidate.candidate_id(), error = %err, "bar stream rejected");
        self.audit.record(candidate.candidate_id(), err, ts);
        if candidate.state() == CandidateState::Selling {
            candidate.complete(self.config.neutral_band_pct);
        } else {
            candidate.abort(Outcome::Aborted);
        }
    }

    /// Terminal handling once the stream is exhausted.
    fn finish(&self, candidate: &mut TradeCandidate, last: Option<&Bar>) {
        match candidate.state() {
            CandidateState::Watching | CandidateState::Buying => candidate.abort(Outcome::Unfilled),
            CandidateState::Holding => match last {
                Some(bar) => {
                    candidate.begin_selling(bar.timestamp, bar.close, ExitReason::EndOfData);
                    candidate.complete(self.config.neutral_band_pct);
                }
                None => candidate.abort(Outcome::Aborted),
            },
            CandidateState::Selling => candidate.complete(self.config.neutral_band_pct),
            CandidateState::Completed | CandidateState::Aborted => {}
        }
    }
}

fn check_bar(candidate: &TradeCandidate, last: Option<&Bar>, bar: Bar) -> Result<Bar, TraderError> {
    if bar.symbol != candidate.symbol() {
        return Err(TraderError::DataIntegrity {
            symbol: candidate.symbol().to_string(),
            reason: format!("bar for {} in stream", bar.symbol),
        });
    }
    if let Some(prev) = last {
        if bar.timestamp <= prev.timestamp {
            return Err(TraderError::DataIntegrity {
                symbol: bar.symbol.clone(),
                reason: format!("timestamp {} does not follow {}", bar.timestamp, prev.timestamp),
            });
        }
    }
    bar.check_integrity()?;
    Ok(bar)
}

fn check_action(action: PolicyAction) -> Result<PolicyAction, PolicyError> {
    let delta = match action {
        PolicyAction::Wait | PolicyAction::Sell => return Ok(action),
        PolicyAction::LimitUp(d)
        | PolicyAction::LimitDown(d)
        | PolicyAction::StopLossUp(d)
        | PolicyAction::StopLossDown(d) => d,
    };
    if delta.is_finite() && delta >= 0.0 {
        Ok(action)
    } else {
        Err(PolicyError::Failed {
            reason: format!("action {action:?} carries an invalid delta"),
        })
    }
}
