//! Pattern catalog: the only shared mutable state in a run.
//!
//! Writes (`insert`, `mark_breakout`) take the write half of an `RwLock`, so
//! they are serialized; queries share the read half.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::NaiveDateTime;
use tracing::debug;

use super::bar::format_timestamp;
use super::error::TraderError;
use super::pattern::{Pattern, PatternId};

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl Window {
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> Self {
        Self { from, to }
    }
}

#[derive(Default)]
struct CatalogInner {
    patterns: BTreeMap<PatternId, Pattern>,
    by_symbol: HashMap<String, Vec<PatternId>>,
}

#[derive(Default)]
pub struct PatternCatalog {
    inner: RwLock<CatalogInner>,
}

impl PatternCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pattern: Pattern) -> Result<(), TraderError> {
        pattern.validate()?;

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let key = pattern.key();
        let siblings = inner
            .by_symbol
            .get(&pattern.symbol)
            .map(|ids| ids.as_slice())
            .unwrap_or_default();

        let collides = inner.patterns.contains_key(&pattern.pattern_id)
            || siblings.iter().filter_map(|id| inner.patterns.get(id)).any(|existing| {
                existing.key() == key
                    || (existing.pattern_type == pattern.pattern_type
                        && existing.overlaps(pattern.range_start_ts, pattern.range_end_ts)
                        && existing.same_levels(&pattern))
            });
        if collides {
            return Err(TraderError::DuplicatePattern {
                symbol: pattern.symbol.clone(),
                pattern_type: pattern.pattern_type.to_string(),
                range_start: format_timestamp(&pattern.range_start_ts),
                range_end: format_timestamp(&pattern.range_end_ts),
            });
        }

        debug!(
            pattern_id = pattern.pattern_id,
            symbol = %pattern.symbol,
            pattern_type = %pattern.pattern_type,
            "pattern inserted"
        );
        inner
            .by_symbol
            .entry(pattern.symbol.clone())
            .or_default()
            .push(pattern.pattern_id);
        inner.patterns.insert(pattern.pattern_id, pattern);
        Ok(())
    }

    /// Patterns of `symbol` whose range overlaps `window`, ordered by range
    /// start then id.
    pub fn query(&self, symbol: &str, window: Window) -> Vec<Pattern> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<Pattern> = inner
            .by_symbol
            .get(symbol)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.patterns.get(id))
            .filter(|p| p.overlaps(window.from, window.to))
            .cloned()
            .collect();
        found.sort_by_key(|p| (p.range_start_ts, p.pattern_id));
        found
    }

    pub fn get(&self, pattern_id: PatternId) -> Result<Pattern, TraderError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .patterns
            .get(&pattern_id)
            .cloned()
            .ok_or(TraderError::UnknownPattern { pattern_id })
    }

    /// Records the first breakout of a pattern. Repeating the call with the
    /// same timestamp is a no-op; a different timestamp is a conflict.
    pub fn mark_breakout(&self, pattern_id: PatternId, ts: NaiveDateTime) -> Result<(), TraderError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let pattern = inner
            .patterns
            .get_mut(&pattern_id)
            .ok_or(TraderError::UnknownPattern { pattern_id })?;

        match pattern.breakout_ts {
            Some(recorded) if recorded == ts => Ok(()),
            Some(recorded) => Err(TraderError::BreakoutConflict {
                pattern_id,
                recorded: format_timestamp(&recorded),
                requested: format_timestamp(&ts),
            }),
            None => {
                pattern.breakout_done = true;
                pattern.breakout_ts = Some(ts);
                debug!(pattern_id, %ts, "breakout marked");
                Ok(())
            }
        }
    }

    /// All patterns ordered by id.
    pub fn all(&self) -> Vec<Pattern> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.patterns.values().cloned().collect()
    }

    pub fn symbols(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut symbols: Vec<String> = inner.by_symbol.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .patterns
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
