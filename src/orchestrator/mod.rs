//! Layered report generation.
//!
//! The orchestrator derives a feature vector from the seed, date and two
//! injected upstream metrics, runs all fifteen modules through the shared
//! cache, and folds their outputs into macro, meso and micro layers.

pub mod layers;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::cache::ComputationCache;
use crate::hash::SeedStream;
use crate::models::{Context, FeatureVector, Provenance, TimestampMode, UpstreamMetrics};
use crate::modules::{MemePressure, ModuleOutputs, ModuleResult, SlangTerm};

pub use layers::{Forecast, MacroLayer, MesoLayer, MicroLayer, PressureSystemKind};

pub const REPORT_VERSION: &str = "1.0.0";
pub const ENTROPY_CLASS: &str = "seeded-deterministic";

/// Everything a layered report is generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorInput {
    pub seed: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetypes: Option<Vec<String>>,
    #[serde(default)]
    pub upstream: UpstreamMetrics,
}

impl OrchestratorInput {
    pub fn new(seed: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            date: date.into(),
            runes: None,
            archetypes: None,
            upstream: UpstreamMetrics::default(),
        }
    }

    pub fn with_upstream(mut self, upstream: UpstreamMetrics) -> Self {
        self.upstream = upstream;
        self
    }

    /// Context the modules run under.
    pub fn context(&self) -> Context {
        Context {
            seed: self.seed.clone(),
            date: self.date.clone(),
            runes: self.runes.clone(),
            archetypes: self.archetypes.clone(),
            prior: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Mean of the two upstream metrics.
    pub quality_score: f64,
    pub processing_ms: u64,
    pub entropy_class: String,
    pub generated_at: DateTime<Utc>,
}

/// Composite report built from every module's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayeredReport {
    pub macro_layer: MacroLayer,
    pub meso_layer: MesoLayer,
    pub micro_layer: MicroLayer,
    pub slang_front: Vec<SlangTerm>,
    pub meme_front: Vec<MemePressure>,
    pub forecast: Forecast,
    pub modules: Vec<ModuleResult>,
    pub metadata: ReportMetadata,
    pub provenance: Provenance,
}

/// Runs the module set and aggregates it into a [`LayeredReport`].
#[derive(Debug, Clone)]
pub struct ModuleOrchestrator {
    cache: Arc<ComputationCache>,
    timestamp_mode: TimestampMode,
}

impl ModuleOrchestrator {
    pub fn new(cache: Arc<ComputationCache>) -> Self {
        Self {
            cache,
            timestamp_mode: TimestampMode::default(),
        }
    }

    pub fn with_timestamp_mode(mut self, mode: TimestampMode) -> Self {
        self.timestamp_mode = mode;
        self
    }

    pub fn cache(&self) -> &Arc<ComputationCache> {
        &self.cache
    }

    /// Builds the six-signal vector the modules read.
    ///
    /// Signal intensity leans on the upstream signal quality and collective
    /// focus on the upstream coherence; the rest are purely seeded.
    pub fn derive_vector(&self, input: &OrchestratorInput) -> FeatureVector {
        let s = SeedStream::new(&*self.cache, &input.seed, &input.date, "orchestrator");
        let upstream = &input.upstream;
        let lean = |seeded: f64, injected: f64| {
            (seeded * 0.7 + injected.clamp(0.0, 1.0) * 0.3).clamp(0.0, 1.0)
        };

        FeatureVector::new(
            [
                ("signal_intensity", lean(s.unit("signal_intensity"), upstream.signal_quality)),
                ("narrative_velocity", s.unit("narrative_velocity")),
                ("symbolic_density", s.unit("symbolic_density")),
                ("collective_focus", lean(s.unit("collective_focus"), upstream.coherence)),
                ("novelty", s.unit("novelty")),
                ("polarity", s.unit("polarity")),
            ],
            self.timestamp_mode.resolve(&input.date),
            input.seed.clone(),
        )
    }

    /// Runs every module for `input`.
    pub fn run_modules(&self, input: &OrchestratorInput) -> ModuleOutputs {
        let vector = self.derive_vector(input);
        ModuleOutputs::generate(&vector, &input.context(), &*self.cache)
    }

    pub fn generate_report(&self, input: &OrchestratorInput) -> LayeredReport {
        let start = Instant::now();
        let outputs = self.run_modules(input);

        let report = LayeredReport {
            macro_layer: layers::macro_layer(&outputs),
            meso_layer: layers::meso_layer(&outputs),
            micro_layer: layers::micro_layer(&outputs),
            slang_front: layers::slang_front(&outputs),
            meme_front: layers::meme_front(&outputs),
            forecast: layers::forecast(&outputs),
            modules: outputs.results(),
            metadata: ReportMetadata {
                quality_score: (input.upstream.signal_quality + input.upstream.coherence) / 2.0,
                processing_ms: start.elapsed().as_millis() as u64,
                entropy_class: ENTROPY_CLASS.to_string(),
                generated_at: Utc::now(),
            },
            provenance: Provenance {
                seed: input.seed.clone(),
                date: input.date.clone(),
                runes: input.runes.clone().unwrap_or_default(),
                archetypes: input.archetypes.clone().unwrap_or_default(),
                version: REPORT_VERSION.to_string(),
            },
        };

        debug!(
            "Generated layered report for seed '{}' in {}ms (dominant system: {})",
            input.seed, report.metadata.processing_ms, report.macro_layer.dominant.kind
        );

        report
    }
}
