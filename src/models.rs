//! Data models shared across the kernel, orchestrator and scheduler.
//!
//! Everything here is plain, serializable data. Feature maps use a `BTreeMap`
//! so that serialization is canonical; field order carries no meaning.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SeedcastError};

/// Named numeric signals describing a subject at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Field name to value.
    pub features: BTreeMap<String, f64>,
    /// Moment the signals were observed.
    pub timestamp: DateTime<Utc>,
    /// Seed the vector was produced under.
    pub seed: String,
}

impl FeatureVector {
    /// Creates a vector from `(name, value)` pairs.
    pub fn new<I, K>(features: I, timestamp: DateTime<Utc>, seed: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            features: features.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            timestamp,
            seed: seed.into(),
        }
    }

    /// Returns the value of a field, if present.
    pub fn get(&self, field: &str) -> Option<f64> {
        self.features.get(field).copied()
    }

    /// Euclidean magnitude of the feature values.
    pub fn magnitude(&self) -> f64 {
        self.features.values().map(|v| v * v).sum::<f64>().sqrt()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }
}

/// Seed, date and category metadata threaded into every computation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Context {
    pub seed: String,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetypes: Option<Vec<String>>,
    /// Previous observation, enables momentum and coherence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<FeatureVector>,
}

impl Context {
    /// Creates a context with no tags and no prior vector.
    pub fn new(seed: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            date: date.into(),
            ..Default::default()
        }
    }

    pub fn with_runes(mut self, runes: Vec<String>) -> Self {
        self.runes = Some(runes);
        self
    }

    pub fn with_archetypes(mut self, archetypes: Vec<String>) -> Self {
        self.archetypes = Some(archetypes);
        self
    }

    pub fn with_prior(mut self, prior: FeatureVector) -> Self {
        self.prior = Some(prior);
        self
    }
}

/// Parses a context date into a UTC instant.
///
/// Plain dates resolve to midnight UTC.
pub fn parse_context_date(date: &str) -> Result<DateTime<Utc>> {
    let trimmed = date.trim();

    if let Ok(day) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SeedcastError::InvalidDate(date.to_string()))
}

/// How feature-vector timestamps are chosen when the system builds vectors
/// itself (pipelines, orchestrator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampMode {
    /// Timestamp is the context date's UTC midnight; outputs reproduce
    /// forever for the same inputs.
    #[default]
    Pinned,
    /// Timestamp is the current wall-clock time; outputs vary between runs.
    WallClock,
}

impl TimestampMode {
    /// Resolves the timestamp for a vector built under `date`.
    pub fn resolve(&self, date: &str) -> DateTime<Utc> {
        match self {
            TimestampMode::Pinned => parse_context_date(date).unwrap_or_default(),
            TimestampMode::WallClock => Utc::now(),
        }
    }
}

impl fmt::Display for TimestampMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampMode::Pinned => write!(f, "pinned"),
            TimestampMode::WallClock => write!(f, "wall-clock"),
        }
    }
}

/// The eight kernel metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Seeded drift, [0,1].
    pub sdr: f64,
    /// Memetic saturation, [0,1].
    pub msi: f64,
    /// Archetype resonance, [-1,1].
    pub arf: f64,
    /// Narrative momentum, [-1,1].
    pub nmc: f64,
    /// Rune flux ratio, [0,1].
    pub rfr: f64,
    /// Normalized Shannon entropy, [0,1].
    pub entropy: f64,
    /// Temporal decay, (0,1].
    pub decay: f64,
    /// Inter-temporal coherence, [0,1].
    pub itc: f64,
}

impl MetricSet {
    /// Metric values with their short names, in declaration order.
    pub fn named(&self) -> [(&'static str, f64); 8] {
        [
            ("SDR", self.sdr),
            ("MSI", self.msi),
            ("ARF", self.arf),
            ("NMC", self.nmc),
            ("RFR", self.rfr),
            ("Hσ", self.entropy),
            ("λN", self.decay),
            ("ITC", self.itc),
        ]
    }
}

/// Two upstream measurements injected into report generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMetrics {
    /// Signal quality of the upstream feed, [0,1].
    pub signal_quality: f64,
    /// Coherence of the upstream feed, [0,1].
    pub coherence: f64,
}

impl Default for UpstreamMetrics {
    fn default() -> Self {
        Self {
            signal_quality: 0.5,
            coherence: 0.5,
        }
    }
}

/// Audit trail attached to every composite output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub seed: String,
    pub date: String,
    pub runes: Vec<String>,
    pub archetypes: Vec<String>,
    pub version: String,
}

/// Per-run measurements carried by a [`PipelineResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProvenance {
    pub task_id: String,
    pub execution_id: String,
    pub seed: String,
    pub timestamp: DateTime<Utc>,
}

/// Uniform envelope every pipeline returns.
///
/// A failed run carries `error` and the duration only; `data` and
/// `provenance` are never set on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metrics: PipelineMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<PipelineProvenance>,
}

impl PipelineResult {
    pub fn success(
        data: serde_json::Value,
        metrics: PipelineMetrics,
        provenance: PipelineProvenance,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metrics,
            provenance: Some(provenance),
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metrics: PipelineMetrics {
                duration_ms,
                ..Default::default()
            },
            provenance: None,
        }
    }
}
