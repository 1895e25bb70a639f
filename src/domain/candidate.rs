//! A single trade attempt against one pattern.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDateTime;

use super::entry::EntrySignal;
use super::error::TraderError;
use super::levels::LevelState;
use super::pattern::{Direction, Pattern, PatternId, PatternLevels};
use super::policy::FeatureSnapshot;
use super::result::{ExitReason, Outcome, TradeResult};
use super::strategy::{BuyTrigger, StrategyDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateState {
    Watching,
    Buying,
    Holding,
    Selling,
    Completed,
    Aborted,
}

impl CandidateState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CandidateState::Completed | CandidateState::Aborted)
    }

    pub fn can_transition_to(self, next: CandidateState) -> bool {
        use CandidateState::*;
        match (self, next) {
            (Watching, Buying) | (Watching, Aborted) => true,
            (Buying, Holding) | (Buying, Aborted) => true,
            (Holding, Selling) | (Holding, Aborted) => true,
            (Selling, Completed) | (Selling, Holding) | (Selling, Aborted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CandidateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CandidateState::Watching => "WATCHING",
            CandidateState::Buying => "BUYING",
            CandidateState::Holding => "HOLDING",
            CandidateState::Selling => "SELLING",
            CandidateState::Completed => "COMPLETED",
            CandidateState::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// Shared cancellation flag, observed between bars.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Levels in effect at the start of a held bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelPoint {
    pub ts: NaiveDateTime,
    pub stop: f64,
    pub limit: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TradeCandidate {
    candidate_id: u64,
    pattern_ref: PatternId,
    symbol: String,
    levels: PatternLevels,
    buy_trigger: BuyTrigger,
    strategy: StrategyDescriptor,
    state: CandidateState,
    outcome: Option<Outcome>,

    entry_ts: Option<NaiveDateTime>,
    entry_price: Option<f64>,
    exit_ts: Option<NaiveDateTime>,
    exit_price: Option<f64>,
    exit_reason: Option<ExitReason>,
    pending_entry: Option<EntrySignal>,

    exit_levels: Option<LevelState>,
    leg_entry_price: f64,
    banked_pnl_pct: f64,
    realized_pnl_pct: Option<f64>,
    features: Option<FeatureSnapshot>,
    holding_ticks: usize,
    rollovers: usize,
    max_runup_pct: f64,
    max_drawdown_pct: f64,
    bars_after_range_end: usize,
    level_trace: Vec<LevelPoint>,
    cancel: CancelToken,
}

impl TradeCandidate {
    /// Opens a candidate in `WATCHING`. Untradeable or malformed patterns are
    /// refused.
    pub fn open(
        candidate_id: u64,
        pattern: &Pattern,
        buy_trigger: BuyTrigger,
        strategy: StrategyDescriptor,
    ) -> Result<Self, TraderError> {
        pattern.validate()?;
        if !pattern.is_trade_able {
            return Err(TraderError::InvalidPattern {
                pattern_id: pattern.pattern_id,
                reason: "pattern is not tradeable".into(),
            });
        }

        Ok(Self {
            candidate_id,
            pattern_ref: pattern.pattern_id,
            symbol: pattern.symbol.clone(),
            levels: pattern.levels(),
            buy_trigger,
            strategy,
            state: CandidateState::Watching,
            outcome: None,
            entry_ts: None,
            entry_price: None,
            exit_ts: None,
            exit_price: None,
            exit_reason: None,
            pending_entry: None,
            exit_levels: None,
            leg_entry_price: 0.0,
            banked_pnl_pct: 0.0,
            realized_pnl_pct: None,
            features: None,
            holding_ticks: 0,
            rollovers: 0,
            max_runup_pct: 0.0,
            max_drawdown_pct: 0.0,
            bars_after_range_end: 0,
            level_trace: Vec::new(),
            cancel: CancelToken::new(),
        })
    }

    pub fn candidate_id(&self) -> u64 {
        self.candidate_id
    }

    pub fn pattern_ref(&self) -> PatternId {
        self.pattern_ref
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn levels(&self) -> &PatternLevels {
        &self.levels
    }

    pub fn direction(&self) -> Direction {
        self.levels.direction
    }

    pub fn buy_trigger(&self) -> BuyTrigger {
        self.buy_trigger
    }

    pub fn strategy(&self) -> StrategyDescriptor {
        self.strategy
    }

    pub fn state(&self) -> CandidateState {
        self.state
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn entry_ts(&self) -> Option<NaiveDateTime> {
        self.entry_ts
    }

    pub fn entry_price(&self) -> Option<f64> {
        self.entry_price
    }

    pub fn exit_ts(&self) -> Option<NaiveDateTime> {
        self.exit_ts
    }

    pub fn exit_price(&self) -> Option<f64> {
        self.exit_price
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit_reason
    }

    pub fn current_stop(&self) -> Option<f64> {
        self.exit_levels.map(|l| l.stop)
    }

    pub fn current_limit(&self) -> Option<f64> {
        self.exit_levels.and_then(|l| l.limit)
    }

    pub fn realized_pnl_pct(&self) -> Option<f64> {
        self.realized_pnl_pct
    }

    /// Last feature snapshot handed to the policy.
    pub fn features(&self) -> Option<&FeatureSnapshot> {
        self.features.as_ref()
    }

    pub fn holding_ticks(&self) -> usize {
        self.holding_ticks
    }

    pub fn rollovers(&self) -> usize {
        self.rollovers
    }

    pub fn max_runup_pct(&self) -> f64 {
        self.max_runup_pct
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        self.max_drawdown_pct
    }

    pub fn level_trace(&self) -> &[LevelPoint] {
        &self.level_trace
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn pending_entry(&self) -> Option<EntrySignal> {
        self.pending_entry
    }

    pub(crate) fn exit_levels(&self) -> Option<LevelState> {
        self.exit_levels
    }

    pub(crate) fn exit_levels_mut(&mut self) -> Option<&mut LevelState> {
        self.exit_levels.as_mut()
    }

    pub(crate) fn leg_entry_price(&self) -> f64 {
        self.leg_entry_price
    }

    /// Counts a post-range bar; returns the running count.
    pub(crate) fn note_bar_after_range(&mut self) -> usize {
        self.bars_after_range_end += 1;
        self.bars_after_range_end
    }

    fn move_to(&mut self, next: CandidateState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    pub(crate) fn begin_buying(&mut self, ts: NaiveDateTime, signal: EntrySignal) {
        self.move_to(CandidateState::Buying);
        self.entry_ts = Some(ts);
        self.pending_entry = Some(signal);
    }

    pub(crate) fn begin_holding(&mut self, levels: LevelState) {
        let Some(signal) = self.pending_entry.take() else {
            return;
        };
        self.move_to(CandidateState::Holding);
        self.entry_price = Some(signal.price);
        self.leg_entry_price = signal.price;
        self.exit_levels = Some(levels);
    }

    /// Return, in percent of the original entry, if closed at `price` now.
    pub fn open_pnl_at(&self, price: f64) -> f64 {
        match self.entry_price {
            Some(entry) => {
                self.banked_pnl_pct
                    + self.direction().sign() * (price - self.leg_entry_price) / entry * 100.0
            }
            None => 0.0,
        }
    }

    /// Starts a held bar: bumps the tick count and records the levels the
    /// bar is tested against.
    pub(crate) fn start_held_bar(&mut self, ts: NaiveDateTime) {
        self.holding_ticks += 1;
        if let Some(levels) = self.exit_levels {
            self.level_trace.push(LevelPoint {
                ts,
                stop: levels.stop,
                limit: levels.limit,
            });
        }
    }

    pub(crate) fn observe_excursion(&mut self, favorable: f64, adverse: f64) {
        self.max_runup_pct = self.max_runup_pct.max(self.open_pnl_at(favorable));
        self.max_drawdown_pct = self.max_drawdown_pct.max(-self.open_pnl_at(adverse));
    }

    pub(crate) fn set_features(&mut self, snapshot: FeatureSnapshot) {
        self.features = Some(snapshot);
    }

    pub(crate) fn begin_selling(&mut self, ts: NaiveDateTime, price: f64, reason: ExitReason) {
        self.move_to(CandidateState::Selling);
        self.exit_ts = Some(ts);
        self.exit_price = Some(price);
        self.exit_reason = Some(reason);
    }

    /// True while a stop exit may still be rolled into a new leg.
    pub(crate) fn can_roll_over(&self, rollover_limit: usize) -> bool {
        self.state == CandidateState::Selling
            && self.strategy == StrategyDescriptor::RollOverStopLoss
            && self.exit_reason == Some(ExitReason::Stop)
            && self.rollovers < rollover_limit
    }

    /// Banks the closed leg and re-enters at `price`, keeping the original
    /// stop distance.
    pub(crate) fn roll_over(&mut self, price: f64) {
        let (Some(entry), Some(exit)) = (self.entry_price, self.exit_price) else {
            return;
        };
        self.banked_pnl_pct += self.direction().sign() * (exit - self.leg_entry_price) / entry * 100.0;
        let distance = (self.levels.stop - entry) / entry;
        if let Some(levels) = self.exit_levels.as_mut() {
            levels.stop = price * (1.0 + distance);
        }
        self.leg_entry_price = price;
        self.rollovers += 1;
        self.exit_ts = None;
        self.exit_price = None;
        self.exit_reason = None;
        self.move_to(CandidateState::Holding);
    }

    pub(crate) fn complete(&mut self, neutral_band_pct: f64) {
        let pnl = self.exit_price.map(|p| self.open_pnl_at(p)).unwrap_or(0.0);
        self.move_to(CandidateState::Completed);
        self.realized_pnl_pct = Some(pnl);
        self.outcome = Some(Outcome::from_pnl(pnl, neutral_band_pct));
    }

    /// Terminal stop for anything that did not complete a sale.
    pub(crate) fn abort(&mut self, outcome: Outcome) {
        self.move_to(CandidateState::Aborted);
        self.outcome = Some(outcome);
        self.pending_entry = None;
        if self.entry_price.is_none() {
            self.entry_ts = None;
        }
    }

    /// The terminal record; `None` until the candidate reaches a terminal
    /// state.
    pub fn result(&self) -> Option<TradeResult> {
        self.outcome.map(|outcome| self.record(outcome))
    }

    pub(crate) fn record(&self, outcome: Outcome) -> TradeResult {
        TradeResult {
            candidate_id: self.candidate_id,
            pattern_id: self.pattern_ref,
            symbol: self.symbol.clone(),
            strategy: self.strategy,
            trigger: self.buy_trigger,
            outcome,
            realized_pnl_pct: self.realized_pnl_pct.unwrap_or(0.0),
            holding_ticks: self.holding_ticks,
            max_drawdown_pct: self.max_drawdown_pct,
            max_runup_pct: self.max_runup_pct,
            entry_ts: self.entry_ts,
            entry_price: self.entry_price,
            exit_ts: self.exit_ts,
            exit_price: self.exit_price,
            exit_reason: self.exit_reason,
            rollovers: self.rollovers,
        }
    }
}
