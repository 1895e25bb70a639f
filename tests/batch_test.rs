//! Batch evaluation over in-memory adapters.
//!
//! Tests cover:
//! - Job planning order and untradeable patterns
//! - Result ordering and candidate ids across worker counts
//! - Jobs that cannot start are audited and skipped
//! - Breakout fills mark the catalog
//! - Sink failures are audited without losing results

mod common;

use common::*;
use patterntrader::adapters::memory_adapter::{MemoryResultSink, MemoryTickSource};
use patterntrader::domain::bar::Bar;
use patterntrader::domain::batch::{BatchOptions, CandidateJob, plan_jobs, run_batch};
use patterntrader::domain::catalog::PatternCatalog;
use patterntrader::domain::error::{ErrorKind, TraderError};
use patterntrader::domain::evaluator::StrategyEvaluator;
use patterntrader::domain::pattern::{Pattern, PatternType};
use patterntrader::domain::policy::WaitPolicy;
use patterntrader::domain::result::{Outcome, TradeResult};
use patterntrader::domain::strategy::{BuyTrigger, StrategyDescriptor};
use patterntrader::ports::result_sink::{Ack, ResultSink};

fn for_symbol(symbol: &str, bars: Vec<Bar>) -> Vec<Bar> {
    bars.into_iter()
        .map(|b| Bar {
            symbol: symbol.to_string(),
            ..b
        })
        .collect()
}

fn winning_bars() -> Vec<Bar> {
    make_bars(&[
        (97.0, 99.0, 96.0, 98.0),
        (98.0, 99.5, 97.0, 99.0),
        (99.0, 101.5, 98.5, 101.0),
        (101.0, 106.0, 100.0, 105.0),
        (105.0, 113.0, 104.0, 112.0),
    ])
}

fn losing_bars() -> Vec<Bar> {
    make_bars(&[
        (99.0, 101.5, 98.0, 101.0),
        (100.5, 101.0, 96.5, 97.0),
        (97.0, 97.5, 93.0, 94.0),
    ])
}

fn catalog() -> PatternCatalog {
    let catalog = PatternCatalog::new();
    catalog.insert(triangle_up()).unwrap();
    catalog
        .insert(Pattern {
            pattern_id: 2,
            symbol: "CBA".into(),
            ..triangle_up()
        })
        .unwrap();
    catalog
        .insert(Pattern {
            pattern_id: 3,
            pattern_type: PatternType::Flag,
            is_trade_able: false,
            ..triangle_up()
        })
        .unwrap();
    catalog
}

fn source() -> MemoryTickSource {
    MemoryTickSource::new()
        .with_bars(SYMBOL, winning_bars())
        .with_bars("CBA", for_symbol("CBA", losing_bars()))
}

fn evaluator() -> StrategyEvaluator {
    StrategyEvaluator::new(test_config(), Box::new(WaitPolicy)).unwrap()
}

fn options(workers: usize) -> BatchOptions {
    BatchOptions {
        workers,
        ..BatchOptions::default()
    }
}

#[test]
fn plan_skips_untradeable_patterns() {
    let strategies = [StrategyDescriptor::FixedLimit, StrategyDescriptor::WaitTillEnd];
    let jobs = plan_jobs(&catalog(), &[BuyTrigger::Breakout], &strategies);

    assert_eq!(jobs.len(), 4);
    assert!(jobs.iter().all(|j| j.pattern_id != 3));
    assert_eq!(
        jobs[0],
        CandidateJob {
            pattern_id: 1,
            trigger: BuyTrigger::Breakout,
            strategy: StrategyDescriptor::FixedLimit,
        }
    );
    assert_eq!(jobs[1].strategy, StrategyDescriptor::WaitTillEnd);
    assert_eq!(jobs[2].pattern_id, 2);
}

#[test]
fn results_follow_job_order() {
    let catalog = catalog();
    let jobs = plan_jobs(&catalog, &[BuyTrigger::Breakout], &[StrategyDescriptor::FixedLimit]);
    let ev = evaluator();
    let sink = MemoryResultSink::new();

    let results = run_batch(&ev, &catalog, &jobs, &source(), &sink, &options(4)).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].candidate_id, 1);
    assert_eq!(results[0].pattern_id, 1);
    assert_eq!(results[0].outcome, Outcome::Win);
    assert_eq!(results[1].candidate_id, 2);
    assert_eq!(results[1].symbol, "CBA");
    assert_eq!(results[1].outcome, Outcome::Loss);
    assert_eq!(sink.results(), results);
}

#[test]
fn worker_count_does_not_change_results() {
    let catalog_a = catalog();
    let catalog_b = catalog();
    let jobs = plan_jobs(&catalog_a, &[BuyTrigger::Breakout], &StrategyDescriptor::ALL);

    let single = run_batch(
        &evaluator(),
        &catalog_a,
        &jobs,
        &source(),
        &MemoryResultSink::new(),
        &options(1),
    )
    .unwrap();
    let parallel = run_batch(
        &evaluator(),
        &catalog_b,
        &jobs,
        &source(),
        &MemoryResultSink::new(),
        &options(8),
    )
    .unwrap();

    assert_eq!(single, parallel);
}

#[test]
fn unstartable_jobs_are_audited() {
    let catalog = catalog();
    catalog
        .insert(Pattern {
            pattern_id: 4,
            symbol: "WBC".into(),
            ..triangle_up()
        })
        .unwrap();
    let jobs = vec![
        CandidateJob {
            pattern_id: 4,
            trigger: BuyTrigger::Breakout,
            strategy: StrategyDescriptor::FixedLimit,
        },
        CandidateJob {
            pattern_id: 99,
            trigger: BuyTrigger::Breakout,
            strategy: StrategyDescriptor::FixedLimit,
        },
        CandidateJob {
            pattern_id: 1,
            trigger: BuyTrigger::Breakout,
            strategy: StrategyDescriptor::FixedLimit,
        },
    ];
    let ev = evaluator();

    let results = run_batch(&ev, &catalog, &jobs, &source(), &MemoryResultSink::new(), &options(2)).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].candidate_id, 3);
    let records = ev.audit().records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.candidate_id == 1 && r.kind == ErrorKind::Storage));
    assert!(records.iter().any(|r| r.candidate_id == 2 && r.kind == ErrorKind::Catalog));
}

#[test]
fn breakout_fill_marks_catalog() {
    let catalog = catalog();
    let jobs = plan_jobs(
        &catalog,
        &[BuyTrigger::Breakout],
        &[StrategyDescriptor::FixedLimit, StrategyDescriptor::TrailingStop],
    );

    run_batch(&evaluator(), &catalog, &jobs, &source(), &MemoryResultSink::new(), &options(2)).unwrap();

    let marked = catalog.get(1).unwrap();
    assert!(marked.breakout_done);
    assert_eq!(marked.breakout_ts, Some(day(3)));
    let untouched = catalog.get(3).unwrap();
    assert!(!untouched.breakout_done);
}

struct RejectingSink;

impl ResultSink for RejectingSink {
    fn record(&self, _result: &TradeResult) -> Result<Ack, TraderError> {
        Err(TraderError::Database {
            reason: "disk full".into(),
        })
    }
}

#[test]
fn sink_failures_are_audited() {
    let catalog = catalog();
    let jobs = plan_jobs(&catalog, &[BuyTrigger::Breakout], &[StrategyDescriptor::FixedLimit]);
    let ev = evaluator();

    let results = run_batch(&ev, &catalog, &jobs, &source(), &RejectingSink, &options(1)).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(ev.audit().len(), 2);
    assert!(ev.audit().records().iter().all(|r| r.kind == ErrorKind::Storage));
}
