//! Content-addressed memoization for the metric kernel.
//!
//! Two maps: hash derivations keyed by their input string, and full metric
//! sets keyed by a canonical rendering of every input the metrics read.
//! Inputs are immutable so entries never need invalidation; the first value
//! written for a key is the one kept.
//!
//! # Memory
//!
//! Neither map is bounded. There is no TTL and no eviction, so a long-running
//! process that keeps seeing new seeds, dates or vectors grows the cache for
//! as long as it lives. Call [`ComputationCache::clear`] to reclaim memory.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::hash::{deterministic_hash, HashSource};
use crate::kernel::{compute_with_prelude, Diagnostics, MetricPrelude};
use crate::models::{Context, FeatureVector, MetricSet};

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub hash_entries: usize,
    pub metric_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Shared memo for hashes and metric sets.
///
/// Backed by sharded concurrent maps so one instance can be shared across
/// runtime worker threads while keeping one value per key.
#[derive(Debug, Default)]
pub struct ComputationCache {
    hashes: DashMap<String, u32>,
    metrics: DashMap<String, MetricSet>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ComputationCache {
    pub fn new() -> Self {
        debug!("Creating computation cache (unbounded, no eviction)");
        Self::default()
    }

    /// Builds the canonical key for a `(vector, context)` pair.
    ///
    /// Starts from the serialized feature map, seed and date, then appends
    /// the timestamp, tag lists and prior vector so no two distinct inputs
    /// can share an entry.
    pub fn cache_key(vector: &FeatureVector, ctx: &Context) -> String {
        let features = serde_json::to_string(&vector.features).unwrap_or_default();
        let runes = serde_json::to_string(&ctx.runes).unwrap_or_default();
        let archetypes = serde_json::to_string(&ctx.archetypes).unwrap_or_default();
        let prior = match &ctx.prior {
            Some(p) => format!(
                "{}@{}",
                serde_json::to_string(&p.features).unwrap_or_default(),
                p.timestamp.timestamp_millis()
            ),
            None => "-".to_string(),
        };

        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            features,
            ctx.seed,
            ctx.date,
            vector.timestamp.timestamp_millis(),
            runes,
            archetypes,
            prior
        )
    }

    pub fn get(&self, key: &str) -> Option<MetricSet> {
        self.metrics.get(key).map(|entry| *entry)
    }

    /// Stores `metrics` unless the key is already present; returns the value
    /// that ends up stored.
    pub fn set(&self, key: String, metrics: MetricSet) -> MetricSet {
        *self.metrics.entry(key).or_insert(metrics)
    }

    /// Number of memoized metric sets.
    pub fn size(&self) -> usize {
        self.metrics.len()
    }

    /// Number of memoized hash derivations.
    pub fn hash_count(&self) -> usize {
        self.hashes.len()
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&self) {
        let (hashes, metrics) = (self.hashes.len(), self.metrics.len());
        self.hashes.clear();
        self.metrics.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Cleared cache ({} hashes, {} metric sets)", hashes, metrics);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hash_entries: self.hashes.len(),
            metric_entries: self.metrics.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lookup_or_compute(
        &self,
        vector: &FeatureVector,
        ctx: &Context,
        prelude: &MetricPrelude,
    ) -> MetricSet {
        let key = Self::cache_key(vector, ctx);
        if let Some(hit) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let computed = compute_with_prelude(vector, ctx, prelude, self);
        self.set(key, computed)
    }

    /// Cached equivalent of [`crate::kernel::compute_metric_set`].
    pub fn compute_metrics(&self, vector: &FeatureVector, ctx: &Context) -> MetricSet {
        let key = Self::cache_key(vector, ctx);
        if let Some(hit) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }
        let prelude = MetricPrelude::new(ctx, self);
        self.lookup_or_compute(vector, ctx, &prelude)
    }

    /// Computes many vectors that share one context.
    ///
    /// The per-context prelude (baselines, archetype angles) is derived once
    /// and reused for every vector.
    pub fn compute_batch(&self, vectors: &[FeatureVector], ctx: &Context) -> Vec<MetricSet> {
        let prelude = MetricPrelude::new(ctx, self);
        let results: Vec<MetricSet> = vectors
            .iter()
            .map(|v| self.lookup_or_compute(v, ctx, &prelude))
            .collect();
        debug!(
            "Batch computed {} vectors ({} cached metric sets)",
            results.len(),
            self.size()
        );
        results
    }

    /// Cached equivalent of [`crate::kernel::diagnose`].
    pub fn diagnose(&self, vector: &FeatureVector, ctx: &Context) -> Diagnostics {
        Diagnostics::from_metrics(self.compute_metrics(vector, ctx))
    }
}

impl HashSource for ComputationCache {
    fn hash(&self, input: &str) -> u32 {
        if let Some(hit) = self.hashes.get(input) {
            return *hit;
        }
        let value = deterministic_hash(input);
        *self.hashes.entry(input.to_string()).or_insert(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::DirectHash;
    use crate::kernel::compute_metric_set;
    use chrono::{Duration, TimeZone, Utc};

    fn contexts() -> Vec<Context> {
        let ts = Utc.with_ymd_and_hms(2025, 1, 14, 18, 0, 0).unwrap();
        let prior = FeatureVector::new([("price_momentum", 0.4), ("volume_trend", 0.9)], ts, "p");
        vec![
            Context::new("test-seed-12345", "2025-01-15"),
            Context::new("other-seed", "2025-03-01")
                .with_runes(vec!["fehu".into(), "thurisaz".into(), "kenaz".into()]),
            Context::new("test-seed-12345", "2025-01-15")
                .with_archetypes(vec!["hero".into(), "shadow".into()])
                .with_prior(prior),
            Context::new("empty-tags", "2025-01-15").with_archetypes(vec![]),
        ]
    }

    fn vectors() -> Vec<FeatureVector> {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap();
        vec![
            FeatureVector::new(
                [("price_momentum", 0.65), ("volume_trend", 0.72), ("volatility", 0.38)],
                ts,
                "test-seed-12345",
            ),
            FeatureVector::new(Vec::<(&str, f64)>::new(), ts, "s"),
            FeatureVector::new([("a", 0.0), ("b", 0.0)], ts, "s"),
            FeatureVector::new([("a", 1.0), ("b", 1.0), ("c", 1.0)], ts + Duration::days(3), "s"),
            FeatureVector::new([("x", -2.5), ("y", 7.0)], ts, "s"),
        ]
    }

    #[test]
    fn test_cached_matches_uncached_before_and_after_clear() {
        let cache = ComputationCache::new();

        for ctx in contexts() {
            for v in vectors() {
                let uncached = compute_metric_set(&v, &ctx, &DirectHash);
                let first = cache.compute_metrics(&v, &ctx);
                let second = cache.compute_metrics(&v, &ctx);
                assert_eq!(uncached, first);
                assert_eq!(uncached, second);
            }
        }

        cache.clear();
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.hash_count(), 0);

        for ctx in contexts() {
            for v in vectors() {
                assert_eq!(compute_metric_set(&v, &ctx, &DirectHash), cache.compute_metrics(&v, &ctx));
            }
        }
    }

    #[test]
    fn test_batch_matches_single_path() {
        let cache = ComputationCache::new();
        for ctx in contexts() {
            let batch = cache.compute_batch(&vectors(), &ctx);
            let single: Vec<MetricSet> = vectors()
                .iter()
                .map(|v| compute_metric_set(v, &ctx, &DirectHash))
                .collect();
            assert_eq!(batch, single);
        }
    }

    #[test]
    fn test_first_writer_wins() {
        let cache = ComputationCache::new();
        let ctx = &contexts()[0];
        let v = &vectors()[0];
        let key = ComputationCache::cache_key(v, ctx);

        let real = cache.compute_metrics(v, ctx);
        let mut bogus = real;
        bogus.sdr = 0.123;
        let stored = cache.set(key.clone(), bogus);

        assert_eq!(stored, real);
        assert_eq!(cache.get(&key), Some(real));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_hits_and_misses() {
        let cache = ComputationCache::new();
        let ctx = &contexts()[0];
        let v = &vectors()[0];

        cache.compute_metrics(v, ctx);
        cache.compute_metrics(v, ctx);
        cache.compute_metrics(v, ctx);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.metric_entries, 1);
        assert!(stats.hash_entries > 0);
    }

    #[test]
    fn test_key_distinguishes_context_parts() {
        let v = &vectors()[0];
        let keys: std::collections::HashSet<String> = contexts()
            .iter()
            .map(|c| ComputationCache::cache_key(v, c))
            .collect();
        assert_eq!(keys.len(), contexts().len());

        let a = Context::new("s", "2025-01-15");
        let b = a.clone().with_archetypes(vec![]);
        assert_ne!(ComputationCache::cache_key(v, &a), ComputationCache::cache_key(v, &b));
    }

    #[test]
    fn test_cached_hash_matches_direct() {
        let cache = ComputationCache::new();
        for input in ["abc", "seed:affect:joy:2025-01-15", ""] {
            assert_eq!(cache.hash(input), DirectHash.hash(input));
            assert_eq!(
                cache.normalized(input, -1.0, 1.0),
                DirectHash.normalized(input, -1.0, 1.0)
            );
        }
        assert_eq!(cache.hash_count(), 3);
    }

    #[test]
    fn test_cache_shared_across_threads() {
        let cache = std::sync::Arc::new(ComputationCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let ctx = Context::new("test-seed-12345", "2025-01-15");
                    vectors()
                        .iter()
                        .map(|v| cache.compute_metrics(v, &ctx))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<MetricSet>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.size(), vectors().len());
    }
}
