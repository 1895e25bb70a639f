//! Chart patterns and their directional level geometry.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::bar::Bar;
use super::error::TraderError;

pub type PatternId = u64;

pub const PATTERN_TYPE_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    TriangleUp,
    TriangleDown,
    TriangleSym,
    ChannelUp,
    ChannelDown,
    HeadShoulders,
    HeadShouldersInverse,
    FibonacciAsc,
    FibonacciDesc,
    Flag,
}

impl PatternType {
    pub const ALL: [PatternType; PATTERN_TYPE_COUNT] = [
        PatternType::TriangleUp,
        PatternType::TriangleDown,
        PatternType::TriangleSym,
        PatternType::ChannelUp,
        PatternType::ChannelDown,
        PatternType::HeadShoulders,
        PatternType::HeadShouldersInverse,
        PatternType::FibonacciAsc,
        PatternType::FibonacciDesc,
        PatternType::Flag,
    ];

    pub fn direction(self) -> Direction {
        match self {
            PatternType::TriangleDown
            | PatternType::ChannelDown
            | PatternType::HeadShoulders
            | PatternType::FibonacciDesc => Direction::Short,
            _ => Direction::Long,
        }
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatternType::TriangleUp => "TRIANGLE_UP",
            PatternType::TriangleDown => "TRIANGLE_DOWN",
            PatternType::TriangleSym => "TRIANGLE_SYM",
            PatternType::ChannelUp => "CHANNEL_UP",
            PatternType::ChannelDown => "CHANNEL_DOWN",
            PatternType::HeadShoulders => "HEAD_SHOULDERS",
            PatternType::HeadShouldersInverse => "HEAD_SHOULDERS_INVERSE",
            PatternType::FibonacciAsc => "FIBONACCI_ASC",
            PatternType::FibonacciDesc => "FIBONACCI_DESC",
            PatternType::Flag => "FLAG",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown pattern type: {s}"))
    }
}

/// Directional bias of a pattern; every level comparison mirrors on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// True when `a` lies strictly beyond `b` in the profitable direction.
    pub fn beyond(self, a: f64, b: f64) -> bool {
        match self {
            Direction::Long => a > b,
            Direction::Short => a < b,
        }
    }

    /// `price` moved by `fraction` in the profitable direction.
    pub fn offset(self, price: f64, fraction: f64) -> f64 {
        price * (1.0 + self.sign() * fraction)
    }

    /// Signed return of a move from `entry` to `exit`, in percent.
    pub fn pnl_pct(self, entry: f64, exit: f64) -> f64 {
        self.sign() * (exit - entry) / entry * 100.0
    }

    /// The more protective of two stop levels.
    pub fn tighter_stop(self, a: f64, b: f64) -> f64 {
        match self {
            Direction::Long => a.max(b),
            Direction::Short => a.min(b),
        }
    }

    pub fn stop_hit(self, bar: &Bar, stop: f64) -> bool {
        match self {
            Direction::Long => bar.low <= stop,
            Direction::Short => bar.high >= stop,
        }
    }

    pub fn limit_hit(self, bar: &Bar, limit: f64) -> bool {
        match self {
            Direction::Long => bar.high >= limit,
            Direction::Short => bar.low <= limit,
        }
    }

    /// (favorable, adverse) extremes of a bar for this side.
    pub fn extremes(self, bar: &Bar) -> (f64, f64) {
        match self {
            Direction::Long => (bar.high, bar.low),
            Direction::Short => (bar.low, bar.high),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_id: PatternId,
    pub symbol: String,
    pub pattern_type: PatternType,
    pub range_start_ts: NaiveDateTime,
    pub range_end_ts: NaiveDateTime,
    pub breakout_level: f64,
    pub target_level: f64,
    pub stop_level: f64,
    /// Touch-point level; `None` means the breakout level is retested.
    pub support_level: Option<f64>,
    /// Expected win in percent.
    pub expected_win_pct: f64,
    pub is_trade_able: bool,
    pub breakout_done: bool,
    pub breakout_ts: Option<NaiveDateTime>,
}

impl Pattern {
    pub fn direction(&self) -> Direction {
        self.pattern_type.direction()
    }

    pub fn validate(&self) -> Result<(), TraderError> {
        let invalid = |reason: String| TraderError::InvalidPattern {
            pattern_id: self.pattern_id,
            reason,
        };

        if self.symbol.trim().is_empty() {
            return Err(invalid("empty symbol".into()));
        }
        if self.range_start_ts > self.range_end_ts {
            return Err(invalid("range starts after it ends".into()));
        }
        let levels = [
            self.breakout_level,
            self.target_level,
            self.stop_level,
            self.support_level.unwrap_or(self.breakout_level),
        ];
        if levels.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(invalid("levels must be positive and finite".into()));
        }

        let dir = self.direction();
        let ordered = dir.beyond(self.breakout_level, self.stop_level)
            && dir.beyond(self.target_level, self.breakout_level);
        if !ordered {
            return Err(invalid(format!(
                "levels stop={} breakout={} target={} are not ordered for a {:?} {}",
                self.stop_level, self.breakout_level, self.target_level, dir, self.pattern_type
            )));
        }
        if self.breakout_done != self.breakout_ts.is_some() {
            return Err(invalid("breakout_done disagrees with breakout_ts".into()));
        }
        Ok(())
    }

    /// Catalog identity: two patterns with the same key are the same pattern.
    pub fn key(&self) -> (String, PatternType, NaiveDateTime, NaiveDateTime) {
        (
            self.symbol.clone(),
            self.pattern_type,
            self.range_start_ts,
            self.range_end_ts,
        )
    }

    pub fn overlaps(&self, from: NaiveDateTime, to: NaiveDateTime) -> bool {
        self.range_start_ts <= to && from <= self.range_end_ts
    }

    pub fn same_levels(&self, other: &Pattern) -> bool {
        self.breakout_level == other.breakout_level
            && self.target_level == other.target_level
            && self.stop_level == other.stop_level
    }

    pub fn levels(&self) -> PatternLevels {
        PatternLevels {
            pattern_type: self.pattern_type,
            direction: self.direction(),
            range_start_ts: self.range_start_ts,
            range_end_ts: self.range_end_ts,
            breakout: self.breakout_level,
            target: self.target_level,
            stop: self.stop_level,
            support: self.support_level.unwrap_or(self.breakout_level),
            expected_win_pct: self.expected_win_pct,
        }
    }
}

/// Immutable copy of the levels a candidate trades against, taken when the
/// candidate is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternLevels {
    pub pattern_type: PatternType,
    pub direction: Direction,
    pub range_start_ts: NaiveDateTime,
    pub range_end_ts: NaiveDateTime,
    pub breakout: f64,
    pub target: f64,
    pub stop: f64,
    pub support: f64,
    pub expected_win_pct: f64,
}

impl PatternLevels {
    /// Expected win as a fraction; falls back to the breakout-to-target
    /// distance when the pattern carries none.
    pub fn expected_win_fraction(&self) -> f64 {
        if self.expected_win_pct > 0.0 {
            self.expected_win_pct / 100.0
        } else {
            (self.target - self.breakout).abs() / self.breakout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample_pattern() -> Pattern {
        Pattern {
            pattern_id: 1,
            symbol: "BHP".into(),
            pattern_type: PatternType::TriangleUp,
            range_start_ts: ts(1),
            range_end_ts: ts(10),
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

    #[test]
    fn long_pattern_validates() {
        assert!(sample_pattern().validate().is_ok());
    }

    #[test]
    fn short_pattern_requires_mirrored_levels() {
        let mut p = sample_pattern();
        p.pattern_type = PatternType::HeadShoulders;
        assert!(p.validate().is_err());
        p.target_level = 90.0;
        p.stop_level = 105.0;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn inverted_range_rejected() {
        let mut p = sample_pattern();
        p.range_start_ts = ts(20);
        assert!(matches!(
            p.validate(),
            Err(TraderError::InvalidPattern { pattern_id: 1, .. })
        ));
    }

    #[test]
    fn overlap_is_inclusive() {
        let p = sample_pattern();
        assert!(p.overlaps(ts(10), ts(12)));
        assert!(p.overlaps(ts(1), ts(1)));
        assert!(!p.overlaps(ts(11), ts(12)));
    }

    #[test]
    fn pattern_type_parses_loosely() {
        assert_eq!("triangle_up".parse::<PatternType>(), Ok(PatternType::TriangleUp));
        assert_eq!(
            "head-shoulders-inverse".parse::<PatternType>(),
            Ok(PatternType::HeadShouldersInverse)
        );
        assert!("wedge".parse::<PatternType>().is_err());
        for t in PatternType::ALL {
            assert_eq!(t.as_str().parse::<PatternType>(), Ok(t));
            assert_eq!(PatternType::ALL[t.index()], t);
        }
    }

    #[test]
    fn direction_helpers_mirror() {
        assert!((Direction::Long.pnl_pct(100.0, 110.0) - 10.0).abs() < 1e-9);
        assert!((Direction::Short.pnl_pct(100.0, 90.0) - 10.0).abs() < 1e-9);
        assert!((Direction::Short.offset(100.0, 0.05) - 95.0).abs() < 1e-9);
        assert_eq!(Direction::Long.tighter_stop(95.0, 97.0), 97.0);
        assert_eq!(Direction::Short.tighter_stop(105.0, 103.0), 103.0);
    }

    #[test]
    fn support_defaults_to_breakout() {
        let mut p = sample_pattern();
        assert_eq!(p.levels().support, 100.0);
        p.support_level = Some(97.5);
        assert_eq!(p.levels().support, 97.5);
    }

    #[test]
    fn expected_win_falls_back_to_target_distance() {
        let mut p = sample_pattern();
        assert!((p.levels().expected_win_fraction() - 0.10).abs() < 1e-12);
        p.expected_win_pct = 0.0;
        p.target_level = 120.0;
        assert!((p.levels().expected_win_fraction() - 0.20).abs() < 1e-12);
    }
}
