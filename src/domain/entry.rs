//! Entry triggers and fill confirmation.

use std::collections::VecDeque;

use super::bar::Bar;
use super::error::TraderError;
use super::pattern::{Direction, PatternLevels};
use super::strategy::BuyTrigger;

/// Trailing mean of the last `window` bar volumes.
#[derive(Debug, Clone)]
pub struct VolumeTracker {
    window: usize,
    recent: VecDeque<f64>,
    sum: f64,
}

impl VolumeTracker {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            recent: VecDeque::with_capacity(window.max(1)),
            sum: 0.0,
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.recent.is_empty() {
            None
        } else {
            Some(self.sum / self.recent.len() as f64)
        }
    }

    pub fn push(&mut self, volume: f64) {
        if self.recent.len() == self.window {
            if let Some(old) = self.recent.pop_front() {
                self.sum -= old;
            }
        }
        self.recent.push_back(volume);
        self.sum += volume;
    }
}

/// A fired entry trigger: the price the trade is booked at and the level it
/// is measured against for slippage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntrySignal {
    pub price: f64,
    pub reference: f64,
}

/// Evaluates `trigger` on `bar`. `mean_volume` is the trailing mean of the
/// bars before this one. Touch points only count up to the pattern's range
/// end; breakouts may still fire during the grace bars.
pub fn evaluate_trigger(
    trigger: BuyTrigger,
    levels: &PatternLevels,
    bar: &Bar,
    mean_volume: Option<f64>,
    volume_increase: f64,
) -> Option<EntrySignal> {
    match trigger {
        BuyTrigger::Breakout => {
            let beyond = levels.direction.beyond(bar.close, levels.breakout);
            let confirmed = match mean_volume {
                Some(mean) => bar.volume >= mean * volume_increase,
                None => true,
            };
            (beyond && confirmed).then_some(EntrySignal {
                price: bar.close,
                reference: levels.breakout,
            })
        }
        BuyTrigger::TouchPoint => {
            let in_range = bar.timestamp <= levels.range_end_ts;
            (in_range && bar.spans(levels.support)).then(|| EntrySignal {
                price: match levels.direction {
                    Direction::Long => bar.open.max(levels.support),
                    Direction::Short => bar.open.min(levels.support),
                },
                reference: levels.support,
            })
        }
    }
}

/// Confirms a pending entry on the bar after the trigger. Rejects when the
/// booked price strays from the reference by more than `cap`, or when the
/// confirming bar gaps open past `reference * (1 ± cap)` in the trade's
/// direction.
pub fn confirm_fill(
    direction: Direction,
    signal: &EntrySignal,
    confirming_bar: &Bar,
    cap: f64,
) -> Result<(), TraderError> {
    let deviation = (signal.price - signal.reference).abs() / signal.reference;
    if deviation > cap {
        return Err(TraderError::Slippage {
            reference: signal.reference,
            entry_price: signal.price,
            deviation,
            cap,
        });
    }

    let gap_limit = direction.offset(signal.reference, cap);
    if direction.beyond(confirming_bar.open, gap_limit) {
        return Err(TraderError::Slippage {
            reference: signal.reference,
            entry_price: confirming_bar.open,
            deviation: (confirming_bar.open - signal.reference).abs() / signal.reference,
            cap,
        });
    }
    Ok(())
}
