//! Quality scoring and threshold warnings over a [`MetricSet`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MetricSet;

/// Blend weights, in `MetricSet` field order. Sum to 1.
pub const QUALITY_WEIGHTS: [f64; 8] = [0.15, 0.10, 0.15, 0.10, 0.10, 0.10, 0.15, 0.15];

/// Blends the eight metrics into a single score in [0,1].
///
/// ARF and NMC are shifted from [-1,1] to [0,1]; SDR and RFR are inverted
/// because lower drift and flux read as healthier.
pub fn aggregate_quality_score(m: &MetricSet) -> f64 {
    let components = [
        1.0 - m.sdr,
        m.msi,
        (m.arf + 1.0) / 2.0,
        (m.nmc + 1.0) / 2.0,
        1.0 - m.rfr,
        m.entropy,
        m.decay,
        m.itc,
    ];

    let score: f64 = components
        .iter()
        .zip(QUALITY_WEIGHTS.iter())
        .map(|(c, w)| c * w)
        .sum();

    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Metrics, their blended score and any threshold crossings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub metrics: MetricSet,
    pub quality_score: f64,
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Diagnostics {
    /// Builds diagnostics for an already computed metric set.
    pub fn from_metrics(metrics: MetricSet) -> Self {
        Self {
            quality_score: aggregate_quality_score(&metrics),
            warnings: threshold_warnings(&metrics),
            metrics,
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// One human-readable warning per metric crossing its threshold.
pub fn threshold_warnings(m: &MetricSet) -> Vec<String> {
    let mut warnings = Vec::new();

    if m.sdr > 0.7 {
        warnings.push(format!("High drift: SDR {:.3} exceeds 0.7", m.sdr));
    }
    if m.msi > 0.8 {
        warnings.push(format!("Saturation: MSI {:.3} exceeds 0.8", m.msi));
    }
    if m.arf < -0.5 {
        warnings.push(format!("Archetype dissonance: ARF {:.3} below -0.5", m.arf));
    }
    if m.nmc.abs() > 0.8 {
        warnings.push(format!("Momentum spike: |NMC| {:.3} exceeds 0.8", m.nmc.abs()));
    }
    if m.rfr > 0.6 {
        warnings.push(format!("Rune flux instability: RFR {:.3} exceeds 0.6", m.rfr));
    }
    if m.entropy > 0.9 {
        warnings.push(format!("Near-maximal entropy: Hσ {:.3} exceeds 0.9", m.entropy));
    }
    if m.decay < 0.3 {
        warnings.push(format!("Stale vector: λN {:.3} below 0.3", m.decay));
    }
    if m.itc < 0.4 {
        warnings.push(format!("Coherence break: ITC {:.3} below 0.4", m.itc));
    }

    warnings
}
