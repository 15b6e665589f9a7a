//! Outcome Processor
//!
//! Consumes closed trades in arrival order. Per trade:
//! 1. Extract outcome class, realized return, hold time and action contexts
//! 2. Resolve time-to-payback
//! 3. Update the three-tier baselines of every module involved
//! 4. Fold timeframe, hold-time class and entry/exit inefficiency buckets
//!    into each action context
//! 5. Enumerate pattern keys per context and update every key
//!
//! Failures are isolated: a bad context or a failing key is logged with
//! trade id, module and key, and processing moves on.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use thiserror::Error;

use crate::domain::context::{
    ENTRY_IMPROVEMENT_DIM, EXIT_IMPROVEMENT_DIM, HOLD_TIME_CLASS_DIM, MCAP_BUCKET_DIM,
    TIMEFRAME_DIM,
};
use crate::domain::{
    family_id, generate_pattern_keys, parent_keys, ActionContext, ClosedTrade, DimensionMap,
    DimensionValue, InefficiencyBucket, KeyError, Observation, PatternKey,
};
use crate::ports::{BaselineStore, PatternStore, PriceHistoryPort};

use super::aggregator::{PatternUpdate, StreamingAggregator};
use super::baseline_tracker::BaselineTracker;
use super::engine::EngineConfig;
use super::payback_resolver::{PaybackResolver, PaybackSource};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Trade {0} has no outcome class")]
    MissingOutcomeClass(String),

    #[error("Trade {0} has no action contexts")]
    NoActionContexts(String),

    #[error("Unknown module '{module}' in trade {trade_id}")]
    UnknownModule { trade_id: String, module: String },

    #[error("Key generation failed: {0}")]
    Key(#[from] KeyError),
}

/// What one trade did to the stores
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReport {
    pub trade_id: String,
    pub time_to_payback_days: f64,
    pub payback_source: PaybackSource,
    pub baselines_updated: usize,
    pub contexts_processed: usize,
    pub contexts_skipped: usize,
    pub keys_updated: usize,
    pub keys_failed: usize,
}

/// Totals over a `run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub trades_received: usize,
    pub trades_processed: usize,
    pub trades_skipped: usize,
    pub contexts_skipped: usize,
    pub keys_updated: usize,
    pub keys_failed: usize,
}

impl RunSummary {
    fn absorb(&mut self, report: &ProcessReport) {
        self.trades_processed += 1;
        self.contexts_skipped += report.contexts_skipped;
        self.keys_updated += report.keys_updated;
        self.keys_failed += report.keys_failed;
    }
}

/// Main consumer of the closed-trade stream
#[derive(Clone)]
pub struct OutcomeProcessor {
    config: EngineConfig,
    payback: PaybackResolver,
    baselines: BaselineTracker,
    aggregator: StreamingAggregator,
    is_running: Arc<RwLock<bool>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl OutcomeProcessor {
    pub fn new(
        config: EngineConfig,
        patterns: Arc<dyn PatternStore>,
        baselines: Arc<dyn BaselineStore>,
        prices: Arc<dyn PriceHistoryPort>,
    ) -> Self {
        let tracker = BaselineTracker::new(baselines);
        let aggregator = StreamingAggregator::new(
            patterns,
            tracker.clone(),
            config.scoring,
            config.max_update_retries,
        );

        Self {
            payback: PaybackResolver::new(prices, config.price_timeout),
            baselines: tracker,
            aggregator,
            config,
            is_running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(watch::channel(false).0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Consume trades until the channel closes or `stop` is called.
    ///
    /// A stop wakes an idle loop immediately; a trade already being
    /// processed completes first. Once stopped, the processor stays stopped.
    pub async fn run(&self, mut trades: mpsc::Receiver<ClosedTrade>) -> RunSummary {
        let mut stop = self.shutdown.subscribe();
        *self.is_running.write().await = true;
        tracing::info!(
            "Outcome processor started ({} modules, max arity {})",
            self.config.modules.len(),
            self.config.max_arity
        );

        let mut summary = RunSummary::default();
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            let trade = tokio::select! {
                biased;
                _ = stop.changed() => break,
                trade = trades.recv() => match trade {
                    Some(trade) => trade,
                    None => break,
                },
            };
            summary.trades_received += 1;

            match self.process(&trade).await {
                Ok(report) => summary.absorb(&report),
                Err(e) => {
                    tracing::warn!("Skipping trade {}: {}", trade.trade_id, e);
                    summary.trades_skipped += 1;
                }
            }
        }

        *self.is_running.write().await = false;
        tracing::info!(
            "Outcome processor stopped: {} received, {} processed, {} skipped, {} keys updated, {} keys failed",
            summary.trades_received,
            summary.trades_processed,
            summary.trades_skipped,
            summary.keys_updated,
            summary.keys_failed
        );
        summary
    }

    /// Stop the run loop after the current trade
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        tracing::info!("Stop signal sent to outcome processor");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Process one closed trade
    pub async fn process(&self, trade: &ClosedTrade) -> Result<ProcessReport, ProcessError> {
        let outcome_class = trade
            .outcome_class()
            .ok_or_else(|| ProcessError::MissingOutcomeClass(trade.trade_id.clone()))?;
        if trade.actions.is_empty() {
            return Err(ProcessError::NoActionContexts(trade.trade_id.clone()));
        }

        let rr = trade.realized_rr();
        let payback = self.payback.resolve(trade).await;
        let observation = Observation {
            rr,
            is_win: trade.is_win(),
            hold_time_days: trade.resolved_hold_time_days(),
            time_to_payback_days: payback.days,
        };
        let observed_at = trade.observed_at();

        let mut report = ProcessReport {
            trade_id: trade.trade_id.clone(),
            time_to_payback_days: payback.days,
            payback_source: payback.source,
            baselines_updated: 0,
            contexts_processed: 0,
            contexts_skipped: 0,
            keys_updated: 0,
            keys_failed: 0,
        };

        for (module, (mcap_bucket, timeframe)) in baseline_components(trade) {
            if self.config.modules.get(&module).is_none() {
                continue;
            }
            match self
                .baselines
                .record(&module, mcap_bucket.as_deref(), timeframe.as_deref(), rr, observed_at)
                .await
            {
                Ok(updated) => report.baselines_updated += updated.len(),
                Err(e) => tracing::error!(
                    "Trade {}: baseline update for module {} failed: {}",
                    trade.trade_id,
                    module,
                    e
                ),
            }
        }

        for action in &trade.actions {
            let dimensions = fold_trade_dimensions(trade, action);
            match self
                .process_context(trade, action, &dimensions, outcome_class, &observation, observed_at)
                .await
            {
                Ok((updated, failed)) => {
                    report.contexts_processed += 1;
                    report.keys_updated += updated;
                    report.keys_failed += failed;
                }
                Err(e) => {
                    tracing::warn!(
                        "Trade {}: skipping context {}: {}",
                        trade.trade_id,
                        action.describe(),
                        e
                    );
                    report.contexts_skipped += 1;
                }
            }
        }

        tracing::info!(
            "Trade {} ({}, rr={:.2}, payback={:.2}d): {} keys updated, {} failed, {} contexts skipped",
            trade.trade_id,
            outcome_class,
            rr,
            payback.days,
            report.keys_updated,
            report.keys_failed,
            report.contexts_skipped
        );

        Ok(report)
    }

    /// Update every pattern key of one action context.
    ///
    /// Returns (keys updated, keys failed); key failures do not abort the
    /// remaining keys.
    async fn process_context(
        &self,
        trade: &ClosedTrade,
        action: &ActionContext,
        dimensions: &DimensionMap,
        outcome_class: &str,
        observation: &Observation,
        observed_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(usize, usize), ProcessError> {
        let module = self
            .config
            .modules
            .get(&action.module)
            .ok_or_else(|| ProcessError::UnknownModule {
                trade_id: trade.trade_id.clone(),
                module: action.module.clone(),
            })?;

        let keys = generate_pattern_keys(dimensions, Some(outcome_class), module, self.config.max_arity)?;
        let family = family_id(dimensions, outcome_class, module);

        let mut updated = 0;
        let mut failed = 0;
        for key in keys {
            let update = PatternUpdate {
                pattern_key: key.render(),
                module: module.name.clone(),
                dimensions: key.dimension_map(),
                family_id: family.clone(),
                parent_keys: parent_keys(&key).iter().map(PatternKey::render).collect(),
                observation: *observation,
                observed_at,
            };

            match self.aggregator.update(&update).await {
                Ok(_) => updated += 1,
                Err(e) => {
                    tracing::error!(
                        "Trade {}: update failed (module {}, key {}): {}",
                        trade.trade_id,
                        module.name,
                        update.pattern_key,
                        e
                    );
                    failed += 1;
                }
            }
        }

        Ok((updated, failed))
    }
}

/// Baseline key components per distinct module, in order of first appearance
/// among the trade's contexts.
///
/// The market-cap bucket comes from the first context of the module that
/// carries one; the timeframe from the trade, else from such a context.
fn baseline_components(trade: &ClosedTrade) -> Vec<(String, (Option<String>, Option<String>))> {
    let mut order = Vec::new();
    let mut components: BTreeMap<String, (Option<String>, Option<String>)> = BTreeMap::new();

    for action in &trade.actions {
        let entry = components.entry(action.module.clone()).or_insert_with(|| {
            order.push(action.module.clone());
            (None, trade.timeframe.clone())
        });
        if entry.0.is_none() {
            entry.0 = rendered(&action.dimensions, MCAP_BUCKET_DIM);
        }
        if entry.1.is_none() {
            entry.1 = rendered(&action.dimensions, TIMEFRAME_DIM);
        }
    }

    order
        .into_iter()
        .filter_map(|module| components.remove(&module).map(|c| (module, c)))
        .collect()
}

fn rendered(dimensions: &DimensionMap, name: &str) -> Option<String> {
    dimensions
        .get(name)
        .and_then(|value| value.as_ref())
        .map(DimensionValue::render)
}

/// Context dimensions plus the trade-level ones.
///
/// Values already present on the context win. Inefficiency buckets are only
/// folded in when the trade carries the counterfactual measurement.
fn fold_trade_dimensions(trade: &ClosedTrade, action: &ActionContext) -> DimensionMap {
    let mut dimensions = action.dimensions.clone();
    let mut fold = |name: &str, value: Option<String>| {
        if let Some(value) = value {
            let slot = dimensions.entry(name.to_string()).or_insert(None);
            if slot.is_none() {
                *slot = Some(DimensionValue::Text(value));
            }
        }
    };

    fold(TIMEFRAME_DIM, trade.timeframe.clone());
    fold(HOLD_TIME_CLASS_DIM, trade.hold_time_class.clone());
    fold(
        ENTRY_IMPROVEMENT_DIM,
        trade
            .missed_rr_entry
            .map(|missed| InefficiencyBucket::from_missed_rr(Some(missed)).to_string()),
    );
    fold(
        EXIT_IMPROVEMENT_DIM,
        trade
            .missed_rr_exit
            .map(|missed| InefficiencyBucket::from_missed_rr(Some(missed)).to_string()),
    );

    dimensions
}
