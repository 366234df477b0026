//! Metric kernel.
//!
//! Eight pure metrics over a feature vector and its context, a weighted
//! quality blend, and threshold diagnostics.

pub mod diagnostics;
pub mod metrics;

pub use diagnostics::{aggregate_quality_score, threshold_warnings, Diagnostics, QUALITY_WEIGHTS};
pub use metrics::{
    archetypes, compute_metric_set, compute_with_prelude, MetricPrelude, DEFAULT_ARCHETYPES,
    ITC_NO_PRIOR,
};

use crate::hash::HashSource;
use crate::models::{Context, FeatureVector};

/// Computes the metric set, quality score and warnings for one vector.
pub fn diagnose<H: HashSource + ?Sized>(
    vector: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> Diagnostics {
    Diagnostics::from_metrics(compute_metric_set(vector, ctx, hasher))
}
