//! Named analytic pipelines.
//!
//! Each pipeline reads the execution context and an upstream snapshot, runs
//! kernel or orchestrator calls through the shared cache, and returns a
//! [`PipelineResult`] envelope. Runs never return `Err`; failures become
//! `success: false` envelopes.

pub mod snapshot;

use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::cache::ComputationCache;
use crate::error::SeedcastError;
use crate::kernel::{aggregate_quality_score, threshold_warnings};
use crate::models::{PipelineMetrics, PipelineProvenance, PipelineResult, TimestampMode};
use crate::modules::mean;
use crate::orchestrator::{ModuleOrchestrator, OrchestratorInput};
use crate::scheduler::{
    executor, CalendarEvent, Capabilities, ExecutionContext, Executor, Task, TaskScheduler, Trigger,
};

pub use snapshot::{PriorFeatures, SnapshotSource, StaticSnapshot, UpstreamSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    MetricSnapshot,
    DriftWatch,
    BatchDiagnostics,
    CompositeReport,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 4] = [
        PipelineKind::MetricSnapshot,
        PipelineKind::DriftWatch,
        PipelineKind::BatchDiagnostics,
        PipelineKind::CompositeReport,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineKind::MetricSnapshot => "metric-snapshot",
            PipelineKind::DriftWatch => "drift-watch",
            PipelineKind::BatchDiagnostics => "batch-diagnostics",
            PipelineKind::CompositeReport => "composite-report",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineKind::MetricSnapshot => "Diagnostics for the current snapshot vector",
            PipelineKind::DriftWatch => "Momentum and coherence against the prior vector",
            PipelineKind::BatchDiagnostics => "Metric sets for every vector in the snapshot batch",
            PipelineKind::CompositeReport => "Full layered report across all modules",
        }
    }

    /// Trigger used when configuration does not name one.
    pub fn default_trigger(&self) -> Trigger {
        match self {
            PipelineKind::MetricSnapshot => Trigger::cron("*/15 * * * *"),
            PipelineKind::DriftWatch => Trigger::cron("0 * * * *"),
            PipelineKind::BatchDiagnostics => Trigger::event(CalendarEvent::Daily),
            PipelineKind::CompositeReport => Trigger::cron("0 0 * * *"),
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PipelineKind {
    type Err = SeedcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s.trim())
            .ok_or_else(|| SeedcastError::UnknownPipeline(s.to_string()))
    }
}

/// Binds pipelines to a shared cache and snapshot source.
#[derive(Clone)]
pub struct PipelineRegistry {
    cache: Arc<ComputationCache>,
    orchestrator: ModuleOrchestrator,
    snapshots: Arc<dyn SnapshotSource>,
    timestamp_mode: TimestampMode,
}

impl PipelineRegistry {
    pub fn new(cache: Arc<ComputationCache>, snapshots: Arc<dyn SnapshotSource>) -> Self {
        Self {
            orchestrator: ModuleOrchestrator::new(cache.clone()),
            cache,
            snapshots,
            timestamp_mode: TimestampMode::default(),
        }
    }

    pub fn with_timestamp_mode(mut self, mode: TimestampMode) -> Self {
        self.timestamp_mode = mode;
        self.orchestrator = self.orchestrator.with_timestamp_mode(mode);
        self
    }

    pub fn cache(&self) -> &Arc<ComputationCache> {
        &self.cache
    }

    /// Runs a pipeline by name.
    pub async fn run_named(
        &self,
        name: &str,
        ctx: ExecutionContext,
    ) -> crate::error::Result<PipelineResult> {
        let kind: PipelineKind = name.parse()?;
        Ok(self.run(kind, ctx).await)
    }

    pub async fn run(&self, kind: PipelineKind, ctx: ExecutionContext) -> PipelineResult {
        let start = Instant::now();
        match self.run_inner(kind, &ctx).await {
            Ok((data, mut metrics)) => {
                metrics.duration_ms = start.elapsed().as_millis() as u64;
                debug!("Pipeline '{}' finished in {}ms", kind, metrics.duration_ms);
                PipelineResult::success(
                    data,
                    metrics,
                    PipelineProvenance {
                        task_id: ctx.task_id.clone(),
                        execution_id: ctx.execution_id.clone(),
                        seed: ctx.seed.clone(),
                        timestamp: ctx.started_at,
                    },
                )
            }
            Err(e) => {
                warn!("Pipeline '{}' failed: {:#}", kind, e);
                PipelineResult::failure(format!("{:#}", e), start.elapsed().as_millis() as u64)
            }
        }
    }

    async fn run_inner(
        &self,
        kind: PipelineKind,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<(serde_json::Value, PipelineMetrics)> {
        let snapshot = self.snapshots.fetch(ctx).await?;
        let timestamp = self.timestamp_mode.resolve(&ctx.date);
        let context = snapshot.context(&ctx.seed, &ctx.date);

        match kind {
            PipelineKind::MetricSnapshot => {
                let vector = snapshot.vector(&ctx.seed, timestamp);
                let diagnostics = self.cache.diagnose(&vector, &context);
                let metrics = PipelineMetrics {
                    quality: Some(diagnostics.quality_score),
                    drift: Some(diagnostics.metrics.sdr),
                    entropy: Some(diagnostics.metrics.entropy),
                    ..Default::default()
                };
                Ok((serde_json::to_value(&diagnostics)?, metrics))
            }
            PipelineKind::DriftWatch => {
                let prior = snapshot
                    .prior_vector(&ctx.seed, timestamp)?
                    .ok_or_else(|| SeedcastError::Snapshot("drift-watch needs a prior vector".into()))?;
                let vector = snapshot.vector(&ctx.seed, timestamp);
                let context = context.with_prior(prior);
                let set = self.cache.compute_metrics(&vector, &context);
                let data = json!({
                    "drift": set.sdr,
                    "momentum": set.nmc,
                    "coherence": set.itc,
                    "decay": set.decay,
                    "warnings": threshold_warnings(&set),
                    "metrics": set,
                });
                let metrics = PipelineMetrics {
                    quality: Some(aggregate_quality_score(&set)),
                    drift: Some(set.sdr),
                    entropy: Some(set.entropy),
                    ..Default::default()
                };
                Ok((data, metrics))
            }
            PipelineKind::BatchDiagnostics => {
                let vectors = snapshot.batch_vectors(&ctx.seed, timestamp);
                if vectors.is_empty() {
                    return Err(SeedcastError::Snapshot("snapshot batch is empty".into()).into());
                }
                let sets = self.cache.compute_batch(&vectors, &context);
                let qualities: Vec<f64> = sets.iter().map(aggregate_quality_score).collect();
                let mean_quality = mean(qualities.iter().copied());
                let data = json!({
                    "count": sets.len(),
                    "mean_quality": mean_quality,
                    "results": sets,
                    "cache": self.cache.stats(),
                });
                let metrics = PipelineMetrics {
                    quality: Some(mean_quality),
                    drift: Some(mean(sets.iter().map(|s| s.sdr))),
                    entropy: Some(mean(sets.iter().map(|s| s.entropy))),
                    ..Default::default()
                };
                Ok((data, metrics))
            }
            PipelineKind::CompositeReport => {
                let input = OrchestratorInput {
                    seed: ctx.seed.clone(),
                    date: ctx.date.clone(),
                    runes: snapshot.runes.clone(),
                    archetypes: snapshot.archetypes.clone(),
                    upstream: snapshot.upstream,
                };
                let report = self.orchestrator.generate_report(&input);
                let metrics = PipelineMetrics {
                    quality: Some(report.metadata.quality_score),
                    ..Default::default()
                };
                Ok((serde_json::to_value(&report)?, metrics))
            }
        }
    }

    /// Wraps a pipeline as a scheduler executor.
    pub fn executor(&self, kind: PipelineKind) -> Executor {
        let registry = self.clone();
        executor(move |ctx| {
            let registry = registry.clone();
            async move { Ok(registry.run(kind, ctx).await) }
        })
    }

    pub fn task(&self, kind: PipelineKind, trigger: Trigger, enabled: bool) -> Task {
        Task::new(kind.name(), kind.description(), trigger, self.executor(kind))
            .with_enabled(enabled)
            .with_capabilities(Capabilities {
                read: vec!["upstream-snapshot".to_string()],
                write: Vec::new(),
                network: false,
            })
    }

    /// Registers every pipeline with its default trigger.
    pub fn register_all(&self, scheduler: &TaskScheduler) {
        for kind in PipelineKind::ALL {
            scheduler.register_task(self.task(kind, kind.default_trigger(), true));
        }
    }
}
