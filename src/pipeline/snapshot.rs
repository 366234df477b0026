//! Upstream snapshots fed into pipelines.

use chrono::{DateTime, Duration, Utc};
use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SeedcastError;
use crate::models::{Context, FeatureVector, UpstreamMetrics};
use crate::scheduler::ExecutionContext;

/// Features observed some time before the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorFeatures {
    pub features: BTreeMap<String, f64>,
    #[serde(default = "default_hours_before")]
    pub hours_before: f64,
}

fn default_hours_before() -> f64 {
    24.0
}

/// External inputs a pipeline run reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamSnapshot {
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<PriorFeatures>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub batch: Vec<BTreeMap<String, f64>>,
    #[serde(default)]
    pub upstream: UpstreamMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetypes: Option<Vec<String>>,
}

impl UpstreamSnapshot {
    pub fn vector(&self, seed: &str, timestamp: DateTime<Utc>) -> FeatureVector {
        FeatureVector::new(self.features.clone(), timestamp, seed)
    }

    /// The prior vector, stamped `hours_before` ahead of `timestamp`.
    ///
    /// Fails when the offset is not finite or leaves chrono's date range.
    pub fn prior_vector(
        &self,
        seed: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<FeatureVector>, SeedcastError> {
        let Some(prior) = self.prior.as_ref() else {
            return Ok(None);
        };

        let stamped = Some(prior.hours_before)
            .filter(|h| h.is_finite())
            .and_then(|h| Duration::try_milliseconds((h * 3_600_000.0) as i64))
            .and_then(|offset| timestamp.checked_sub_signed(offset))
            .ok_or_else(|| {
                SeedcastError::Snapshot(format!(
                    "prior hours_before {} is out of range",
                    prior.hours_before
                ))
            })?;

        Ok(Some(FeatureVector::new(prior.features.clone(), stamped, seed)))
    }

    pub fn batch_vectors(&self, seed: &str, timestamp: DateTime<Utc>) -> Vec<FeatureVector> {
        self.batch
            .iter()
            .map(|features| FeatureVector::new(features.clone(), timestamp, seed))
            .collect()
    }

    /// Context for one run, carrying this snapshot's tag lists.
    pub fn context(&self, seed: &str, date: &str) -> Context {
        Context {
            seed: seed.to_string(),
            date: date.to_string(),
            runes: self.runes.clone(),
            archetypes: self.archetypes.clone(),
            prior: None,
        }
    }
}

/// Provides the snapshot for each pipeline run.
pub trait SnapshotSource: Send + Sync {
    fn fetch<'a>(&'a self, ctx: &'a ExecutionContext) -> BoxFuture<'a, anyhow::Result<UpstreamSnapshot>>;
}

/// Serves one fixed snapshot to every run.
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshot {
    snapshot: UpstreamSnapshot,
}

impl StaticSnapshot {
    pub fn new(snapshot: UpstreamSnapshot) -> Self {
        Self { snapshot }
    }
}

impl SnapshotSource for StaticSnapshot {
    fn fetch<'a>(&'a self, _ctx: &'a ExecutionContext) -> BoxFuture<'a, anyhow::Result<UpstreamSnapshot>> {
        Box::pin(future::ready(Ok(self.snapshot.clone())))
    }
}
