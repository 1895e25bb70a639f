//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{CsvResultSink, CsvTickSource, load_patterns};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::batch::{plan_jobs, run_batch};
use crate::domain::catalog::PatternCatalog;
use crate::domain::config_validation::{
    DataSource, build_batch_options, build_evaluator_config, build_policy, parse_data_source,
    parse_strategies, parse_triggers, validate_run_config,
};
use crate::domain::error::TraderError;
use crate::domain::evaluator::StrategyEvaluator;
use crate::domain::result::TradeResult;
use crate::domain::summary::ResultSummary;
use crate::ports::config_port::ConfigPort;
use crate::ports::tick_source::TickSource;

#[derive(Parser, Debug)]
#[command(
    name = "patterntrader",
    about = "Evaluate exit strategies for chart-pattern trades"
)]
pub struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate every pattern against the configured strategies
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        patterns: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Validate a run configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the patterns in a pattern file
    Patterns {
        #[arg(short, long)]
        patterns: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(cli.verbose);

    match cli.command {
        Command::Evaluate {
            config,
            patterns,
            output,
            workers,
        } => run_evaluate(&config, &patterns, output.as_deref(), workers),
        Command::Validate { config } => run_validate(&config),
        Command::Patterns { patterns, symbol } => run_patterns(&patterns, symbol.as_deref()),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn fail(err: TraderError) -> ExitCode {
    error!(error = %err, "run failed");
    (&err).into()
}

/// Loads patterns into a fresh catalog. Rejected patterns are logged and
/// skipped.
pub fn load_catalog(path: &Path) -> Result<PatternCatalog, TraderError> {
    let catalog = PatternCatalog::new();
    for pattern in load_patterns(path)? {
        let pattern_id = pattern.pattern_id;
        if let Err(err) = catalog.insert(pattern) {
            warn!(pattern_id, error = %err, "skipping pattern");
        }
    }
    Ok(catalog)
}

fn open_source(source: &DataSource) -> Result<Box<dyn TickSource>, TraderError> {
    match source {
        DataSource::Csv { path } => Ok(Box::new(CsvTickSource::new(PathBuf::from(path)))),
        #[cfg(feature = "sqlite")]
        DataSource::Sqlite { path } => {
            let store = crate::adapters::sqlite_adapter::SqliteStore::open_file(path, 4)?;
            store.initialize_schema()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        DataSource::Sqlite { .. } => Err(TraderError::invalid(
            "data",
            "source",
            "sqlite feature is required for sqlite data",
        )),
    }
}

/// The `evaluate` pipeline, minus process concerns.
pub fn evaluate(
    config: &dyn ConfigPort,
    patterns_path: &Path,
    output: Option<&Path>,
    workers: Option<usize>,
) -> Result<(Vec<TradeResult>, ResultSummary), TraderError> {
    // Stage 1: settings
    let evaluator_config = build_evaluator_config(config)?;
    let policy = build_policy(config)?;
    let strategies = parse_strategies(config)?;
    let triggers = parse_triggers(config)?;
    let data_source = parse_data_source(config)?;
    let mut options = build_batch_options(config)?;
    if let Some(w) = workers {
        if w == 0 {
            return Err(TraderError::invalid("run", "workers", "workers must be at least 1"));
        }
        options.workers = w;
    }

    let output_path = output
        .map(Path::to_path_buf)
        .or_else(|| config.get_string("output", "path").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("results.csv"));

    // Stage 2: patterns and jobs
    let catalog = load_catalog(patterns_path)?;
    let jobs = plan_jobs(&catalog, &triggers, &strategies);
    info!(
        patterns = catalog.len(),
        symbols = catalog.symbols().len(),
        jobs = jobs.len(),
        "catalog loaded"
    );

    // Stage 3: run
    let evaluator = StrategyEvaluator::new(evaluator_config, policy)?;
    let source = open_source(&data_source)?;
    let sink = CsvResultSink::create(&output_path)?;
    let results = run_batch(&evaluator, &catalog, &jobs, source.as_ref(), &sink, &options)?;

    for record in evaluator.audit().records() {
        warn!(
            candidate_id = record.candidate_id,
            kind = %record.kind,
            ts = ?record.ts,
            "{}",
            record.message
        );
    }
    info!(path = %output_path.display(), results = results.len(), "results written");

    let summary = ResultSummary::compute(&results);
    Ok((results, summary))
}

fn run_evaluate(
    config_path: &Path,
    patterns_path: &Path,
    output: Option<&Path>,
    workers: Option<usize>,
) -> ExitCode {
    info!(path = %config_path.display(), "loading config");
    let adapter = match FileConfigAdapter::from_file(config_path) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    let (results, summary) = match evaluate(&adapter, patterns_path, output, workers) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    print_summary(&summary);
    let by_strategy = ResultSummary::by_strategy(&results);
    if by_strategy.len() > 1 {
        eprintln!("\n=== Per-Strategy Summary ===");
        for (name, s) in &by_strategy {
            eprintln!(
                "  {}:  {} filled, {:.1}% win rate, avg {:+.2}%",
                name,
                s.filled,
                s.win_rate * 100.0,
                s.avg_pnl_pct,
            );
        }
    }
    ExitCode::SUCCESS
}

fn print_summary(summary: &ResultSummary) {
    eprintln!("\n=== Results ===");
    eprintln!("Candidates:       {}", summary.candidates);
    eprintln!("Filled:           {}", summary.filled);
    eprintln!(
        "Won / Lost:       {} / {} ({} neutral)",
        summary.wins, summary.losses, summary.neutral
    );
    eprintln!(
        "Unfilled:         {} ({} aborted, {} cancelled)",
        summary.unfilled, summary.aborted, summary.cancelled
    );
    eprintln!("Win Rate:         {:.1}%", summary.win_rate * 100.0);
    eprintln!("Avg PnL:          {:+.2}%", summary.avg_pnl_pct);
    eprintln!("Avg Win / Loss:   {:.2}% / {:.2}%", summary.avg_win_pct, summary.avg_loss_pct);
    eprintln!("Profit Factor:    {:.2}", summary.profit_factor);
    eprintln!("Avg Holding:      {:.1} bars", summary.avg_holding_ticks);
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match FileConfigAdapter::from_file(config_path) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    match validate_run_config(&adapter) {
        Ok(()) => {
            eprintln!("Config validated successfully");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_patterns(patterns_path: &Path, symbol: Option<&str>) -> ExitCode {
    let catalog = match load_catalog(patterns_path) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let patterns: Vec<_> = catalog
        .all()
        .into_iter()
        .filter(|p| symbol.is_none_or(|s| p.symbol == s))
        .collect();

    println!(
        "{:>6}  {:<8} {:<24} {:<6} {:<19} {:<19} {:>10} {:>10} {:>10}",
        "id", "symbol", "type", "side", "range_start", "range_end", "breakout", "target", "stop"
    );
    for p in &patterns {
        println!(
            "{:>6}  {:<8} {:<24} {:<6} {:<19} {:<19} {:>10.2} {:>10.2} {:>10.2}",
            p.pattern_id,
            p.symbol,
            p.pattern_type.as_str(),
            format!("{:?}", p.direction()),
            p.range_start_ts.format("%Y-%m-%d %H:%M:%S"),
            p.range_end_ts.format("%Y-%m-%d %H:%M:%S"),
            p.breakout_level,
            p.target_level,
            p.stop_level,
        );
    }
    eprintln!("{} patterns", patterns.len());
    ExitCode::SUCCESS
}
