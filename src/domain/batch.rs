//! Parallel evaluation of many candidates on a bounded worker pool.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use tracing::{debug, error, info};

use super::candidate::TradeCandidate;
use super::catalog::PatternCatalog;
use super::error::TraderError;
use super::evaluator::StrategyEvaluator;
use super::pattern::PatternId;
use super::result::TradeResult;
use super::strategy::{BuyTrigger, StrategyDescriptor};
use super::summary::ResultSummary;
use crate::ports::result_sink::ResultSink;
use crate::ports::tick_source::TickSource;

/// One candidate to evaluate: a pattern, how to enter it, how to exit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateJob {
    pub pattern_id: PatternId,
    pub trigger: BuyTrigger,
    pub strategy: StrategyDescriptor,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub workers: usize,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

/// Every (pattern, trigger, strategy) combination for the catalog's
/// tradeable patterns, in catalog order.
pub fn plan_jobs(
    catalog: &PatternCatalog,
    triggers: &[BuyTrigger],
    strategies: &[StrategyDescriptor],
) -> Vec<CandidateJob> {
    let mut jobs = Vec::new();
    for pattern in catalog.all().into_iter().filter(|p| p.is_trade_able) {
        for &trigger in triggers {
            for &strategy in strategies {
                jobs.push(CandidateJob {
                    pattern_id: pattern.pattern_id,
                    trigger,
                    strategy,
                });
            }
        }
    }
    jobs
}

/// Evaluates `jobs` on at most `options.workers` threads. Results come back
/// in job order; jobs that cannot start are audited and skipped. Each result
/// is handed to `sink` in the same order.
pub fn run_batch(
    evaluator: &StrategyEvaluator,
    catalog: &PatternCatalog,
    jobs: &[CandidateJob],
    source: &dyn TickSource,
    sink: &dyn ResultSink,
    options: &BatchOptions,
) -> Result<Vec<TradeResult>, TraderError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .build()
        .map_err(|e| TraderError::WorkerPool {
            reason: e.to_string(),
        })?;

    info!(
        jobs = jobs.len(),
        workers = options.workers.max(1),
        policy = evaluator.policy_name(),
        "starting batch"
    );

    let outcomes: Vec<Option<TradeResult>> = pool.install(|| {
        jobs.par_iter()
            .enumerate()
            .map(|(index, job)| {
                let candidate_id = index as u64 + 1;
                match run_job(evaluator, catalog, source, options, candidate_id, job) {
                    Ok(result) => Some(result),
                    Err(err) => {
                        error!(candidate_id, pattern_id = job.pattern_id, error = %err, "job failed");
                        evaluator.audit().record(candidate_id, &err, None);
                        None
                    }
                }
            })
            .collect()
    });

    let results: Vec<TradeResult> = outcomes.into_iter().flatten().collect();
    for result in &results {
        if let Err(err) = sink.record(result) {
            error!(candidate_id = result.candidate_id, error = %err, "result sink rejected record");
            evaluator.audit().record(result.candidate_id, &err, result.exit_ts);
        }
    }

    let summary = ResultSummary::compute(&results);
    info!(
        candidates = summary.candidates,
        filled = summary.filled,
        wins = summary.wins,
        losses = summary.losses,
        unfilled = summary.unfilled,
        aborted = summary.aborted,
        audit_records = evaluator.audit().len(),
        "batch finished"
    );
    Ok(results)
}

fn run_job(
    evaluator: &StrategyEvaluator,
    catalog: &PatternCatalog,
    source: &dyn TickSource,
    options: &BatchOptions,
    candidate_id: u64,
    job: &CandidateJob,
) -> Result<TradeResult, TraderError> {
    let pattern = catalog.get(job.pattern_id)?;
    let mut candidate = TradeCandidate::open(candidate_id, &pattern, job.trigger, job.strategy)?;
    let stream = source.open(&pattern.symbol, options.from, options.to)?;

    debug!(
        candidate_id,
        pattern_id = pattern.pattern_id,
        symbol = %pattern.symbol,
        trigger = %job.trigger,
        strategy = %job.strategy,
        "evaluating candidate"
    );
    let result = evaluator.run(&mut candidate, stream);

    if job.trigger == BuyTrigger::Breakout && result.entry_price.is_some() {
        if let Some(ts) = result.entry_ts {
            if let Err(err) = catalog.mark_breakout(pattern.pattern_id, ts) {
                evaluator.audit().record(candidate_id, &err, Some(ts));
            }
        }
    }
    Ok(result)
}
