//! Butters Edge - Contextual Edge Miner
//!
//! Replays closed trades into the pattern store and reports ranked pattern edges.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use butters_edge::adapters::cli::{
    CliApp, CoherenceCmd, Command, IngestCmd, InspectCmd, OutputFormat, ReportCmd,
};
use butters_edge::adapters::{
    InMemoryBaselineStore, InMemoryPatternStore, JsonBarDirectory, RecoveryStatus, StoreSnapshot,
};
use butters_edge::application::{
    BaselineTracker, CoherenceAnalyzer, EdgeScorer, EngineConfig, OutcomeProcessor, PatternScores,
    RankingQuery,
};
use butters_edge::config::{load_config_or_default, Config};
use butters_edge::domain::{ClosedTrade, FieldCoherence};

/// Trades buffered between the file reader and the processor
const TRADE_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (path overrides may live here)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config_path = app.command.config_path().to_path_buf();
    let config = load_config_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    init_logging(app.verbose, app.debug, &config.logging.level)?;

    match app.command {
        Command::Ingest(cmd) => ingest_command(cmd, config).await,
        Command::Report(cmd) => report_command(cmd, config).await,
        Command::Inspect(cmd) => inspect_command(cmd, config).await,
        Command::Coherence(cmd) => coherence_command(cmd, config).await,
    }
}

fn init_logging(verbose: bool, debug: bool, configured: &str) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured))
    };

    fmt().with_env_filter(filter).init();
    Ok(())
}

fn snapshot_path(config: &Config, data_dir: Option<&PathBuf>) -> PathBuf {
    match data_dir {
        Some(dir) => dir.join(&config.storage.snapshot_file),
        None => config.storage.snapshot_path(),
    }
}

/// Load both stores from the snapshot, refusing to start over a corrupted one
fn open_stores(path: &Path) -> Result<(Arc<InMemoryPatternStore>, Arc<InMemoryBaselineStore>)> {
    let (patterns, baselines) = match StoreSnapshot::try_recover(path) {
        RecoveryStatus::Empty => {
            tracing::info!("No snapshot at {}, starting empty", path.display());
            StoreSnapshot::empty().into_stores()
        }
        RecoveryStatus::Recovered(snapshot) => {
            tracing::info!(
                "Recovered {} patterns and {} baselines from {} (saved {})",
                snapshot.patterns.len(),
                snapshot.baselines.len(),
                path.display(),
                snapshot.saved_at
            );
            snapshot.into_stores()
        }
        RecoveryStatus::Corrupted(reason) => {
            bail!(
                "Snapshot at {} is corrupted: {}\n\n\
                 Move it aside to start from an empty store, or restore a backup.",
                path.display(),
                reason
            );
        }
    };
    Ok((Arc::new(patterns), Arc::new(baselines)))
}

fn scorer_for(
    config: &Config,
    patterns: Arc<InMemoryPatternStore>,
    baselines: Arc<InMemoryBaselineStore>,
) -> EdgeScorer {
    let params = EngineConfig::from(config).scoring;
    EdgeScorer::new(patterns, BaselineTracker::new(baselines), params)
}

async fn ingest_command(cmd: IngestCmd, config: Config) -> Result<()> {
    tracing::info!("Starting ingest from {}", cmd.input.display());

    let path = snapshot_path(&config, cmd.data_dir.as_ref());
    let (patterns, baselines) = open_stores(&path)?;

    let bars_dir = cmd
        .bars_dir
        .clone()
        .unwrap_or_else(|| config.price_history.get_bars_dir());
    let prices = Arc::new(JsonBarDirectory::new(bars_dir));

    let processor = OutcomeProcessor::new(
        EngineConfig::from(&config),
        patterns.clone(),
        baselines.clone(),
        prices,
    );

    let file = tokio::fs::File::open(&cmd.input)
        .await
        .with_context(|| format!("Failed to open trade file {}", cmd.input.display()))?;

    // Reader task: one closed trade per line
    let (tx, rx) = mpsc::channel::<ClosedTrade>(TRADE_CHANNEL_CAPACITY);
    let input = cmd.input.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0usize;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read {}: {}", input.display(), e);
                    break;
                }
            };
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ClosedTrade>(&line) {
                Ok(trade) => {
                    if tx.send(trade).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Skipping line {}: {}", line_no, e),
            }
        }
    });

    // Setup Ctrl+C handler
    let shutdown = processor.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        shutdown.stop().await;
    });

    let summary = processor.run(rx).await;
    reader.abort();

    println!(
        "Trades: {} received, {} processed, {} skipped",
        summary.trades_received, summary.trades_processed, summary.trades_skipped
    );
    println!(
        "Keys: {} updated, {} failed ({} contexts skipped)",
        summary.keys_updated, summary.keys_failed, summary.contexts_skipped
    );

    if cmd.dry_run {
        tracing::warn!("DRY RUN - snapshot not saved");
        return Ok(());
    }

    let snapshot = StoreSnapshot::capture(&patterns, &baselines).await;
    snapshot
        .save(&path)
        .with_context(|| format!("Failed to save snapshot to {}", path.display()))?;
    println!("Snapshot: {} patterns saved to {}", snapshot.patterns.len(), path.display());

    Ok(())
}

async fn report_command(cmd: ReportCmd, config: Config) -> Result<()> {
    let (patterns, baselines) = open_stores(&snapshot_path(&config, cmd.data_dir.as_ref()))?;
    let tracker = BaselineTracker::new(baselines.clone());
    let scorer = scorer_for(&config, patterns, baselines);

    let mut query = RankingQuery::for_module(&cmd.module)
        .min_samples(cmd.min_samples)
        .limit(cmd.limit);
    if let Some(edge) = cmd.min_edge {
        query = query.min_edge(edge);
    }
    if let Some(edge) = cmd.min_incremental {
        query = query.min_incremental_edge(edge);
    }
    if let Some(cap) = cmd.per_family {
        query = query.max_per_family(cap);
    }

    let ranked = scorer.rank(&query).await.context("Failed to rank patterns")?;

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ranked)?),
        OutputFormat::Text => {
            let tiers = tracker
                .tiers(&cmd.module)
                .await
                .context("Failed to list baselines")?;
            for tier in &tiers {
                println!("Baseline {}: {:+.3} over {} trades", tier.key, tier.mean_rr, tier.n);
            }
            if ranked.is_empty() {
                println!("No patterns for module '{}'", cmd.module);
            }
            for (rank, scores) in ranked.iter().enumerate() {
                println!(
                    "{:>3}. edge {:+.3} (inc {:+.3}) n={} conf={} {}",
                    rank + 1,
                    scores.edge_score,
                    scores.incremental_edge,
                    scores.n,
                    scores.confidence,
                    scores.pattern_key
                );
            }
        }
    }

    Ok(())
}

async fn inspect_command(cmd: InspectCmd, config: Config) -> Result<()> {
    let (patterns, baselines) = open_stores(&snapshot_path(&config, cmd.data_dir.as_ref()))?;
    let scorer = scorer_for(&config, patterns, baselines);

    let Some(scores) = scorer
        .score(&cmd.key)
        .await
        .with_context(|| format!("Failed to score '{}'", cmd.key))?
    else {
        bail!("Pattern not found: {}", cmd.key);
    };

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&scores)?),
        OutputFormat::Text => print_scores(&scores),
    }

    Ok(())
}

fn print_scores(scores: &PatternScores) {
    println!("Pattern:     {}", scores.pattern_key);
    println!("Family:      {}", scores.family_id);
    println!("Samples:     {} ({} confidence)", scores.n, scores.confidence);
    println!("Avg RR:      {:.4} (var {:.4})", scores.avg_rr, scores.variance);
    println!("Win rate:    {:.1}%", scores.win_rate * 100.0);
    println!("Payback:     {:.2} days avg", scores.avg_time_to_payback_days);
    println!("Baseline RR: {:.4}", scores.baseline_rr);
    println!("Edge:        {:+.4}", scores.edge_score);
    println!(
        "Incremental: {:+.4} over {} of {} parents",
        scores.incremental_edge,
        scores.scored_parents,
        scores.parent_keys.len()
    );
    println!("Recurrence:  {:.4}", scores.recurrence_score);
    println!("Emergence:   {:.4}", scores.emergence_score);
}

async fn coherence_command(cmd: CoherenceCmd, config: Config) -> Result<()> {
    let (patterns, baselines) = open_stores(&snapshot_path(&config, cmd.data_dir.as_ref()))?;
    let scorer = scorer_for(&config, patterns.clone(), baselines);
    let analyzer = CoherenceAnalyzer::new(patterns, scorer);

    let coherence = analyzer
        .field_coherence(&cmd.family_id)
        .await
        .with_context(|| format!("Failed to analyze family '{}'", cmd.family_id))?;

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&coherence)?),
        OutputFormat::Text => print_coherence(&coherence),
    }

    Ok(())
}

fn print_coherence(coherence: &FieldCoherence) {
    println!("Family: {}", coherence.family_id);
    match coherence.score {
        Some(score) => println!(
            "Coherence: {:.2} ({}/{} segments with positive edge)",
            score, coherence.positive_segments, coherence.tested_segments
        ),
        None => println!("Coherence: untested (no segment variants observed)"),
    }
    for segment in &coherence.segments {
        println!(
            "  mcap={:<8} tf={:<5} n={:<5} baseline {:+.3} edge {:+.3}",
            segment.segment.mcap_bucket.as_deref().unwrap_or("*"),
            segment.segment.timeframe.as_deref().unwrap_or("*"),
            segment.n,
            segment.baseline_rr,
            segment.edge_score
        );
    }
}
