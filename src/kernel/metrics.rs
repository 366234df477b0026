//! The eight bounded kernel metrics.
//!
//! Every function is total: empty maps, zero magnitudes, non-finite values
//! and unparseable dates all map to a documented in-domain fallback.

use std::collections::{BTreeSet, HashSet};
use std::f64::consts::TAU;

use crate::hash::HashSource;
use crate::models::{parse_context_date, Context, FeatureVector, MetricSet};

/// Archetypes used when the context supplies none.
pub const DEFAULT_ARCHETYPES: [&str; 4] = ["sage", "trickster", "guardian", "wanderer"];

/// The context's archetypes. A missing or empty list reads as
/// [`DEFAULT_ARCHETYPES`], for the kernel and the modules alike.
pub fn archetypes(ctx: &Context) -> Vec<String> {
    match &ctx.archetypes {
        Some(list) if !list.is_empty() => list.clone(),
        _ => DEFAULT_ARCHETYPES.iter().map(|a| a.to_string()).collect(),
    }
}

/// Number of buckets keys are hashed into for saturation.
pub const SATURATION_BUCKETS: u32 = 100;

/// Momentum is expressed per hour.
const HOUR_MS: f64 = 3.6e6;

/// Decay time constant.
const DAY_MS: f64 = 86_400_000.0;

/// Coherence when there is nothing to compare against.
pub const ITC_NO_PRIOR: f64 = 0.95;

/// Coherence when either vector has no magnitude.
pub const ITC_DEGENERATE: f64 = 0.5;

const EPSILON: f64 = 1e-10;

/// Per-context derivations shared by every vector computed under that
/// context.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPrelude {
    /// SDR baseline in [-0.5, 0.5).
    pub drift_baseline: f64,
    /// NMC value used when there is no prior vector, in [-0.3, 0.3).
    pub momentum_baseline: f64,
    /// Seeded angle per archetype.
    pub archetype_angles: Vec<(String, f64)>,
    pub runes: Vec<String>,
}

impl MetricPrelude {
    pub fn new<H: HashSource + ?Sized>(ctx: &Context, hasher: &H) -> Self {
        let archetype_angles = archetypes(ctx)
            .into_iter()
            .map(|a| {
                let angle = hasher.normalized(&format!("{}:archetype:{}", ctx.seed, a), 0.0, TAU);
                (a, angle)
            })
            .collect();

        Self {
            drift_baseline: hasher.normalized(&format!("{}baseline", ctx.seed), -0.5, 0.5),
            momentum_baseline: hasher.normalized(&format!("{}momentum", ctx.seed), -0.3, 0.3),
            archetype_angles,
            runes: ctx.runes.clone().unwrap_or_default(),
        }
    }
}

/// Clamps into `[lo, hi]`, mapping NaN to `fallback`.
fn bounded(x: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if x.is_nan() {
        fallback
    } else {
        x.clamp(lo, hi)
    }
}

/// Feature values with non-finite entries read as 0.
fn finite_values(v: &FeatureVector) -> impl Iterator<Item = (&String, f64)> {
    v.features
        .iter()
        .map(|(k, x)| (k, if x.is_finite() { *x } else { 0.0 }))
}

fn finite_magnitude(v: &FeatureVector) -> f64 {
    finite_values(v).map(|(_, x)| x * x).sum::<f64>().sqrt()
}

fn field_angle<H: HashSource + ?Sized>(hasher: &H, seed: &str, key: &str) -> f64 {
    hasher.normalized(&format!("{}:field:{}", seed, key), 0.0, TAU)
}

/// Seeded drift: RMS distance of the features from a seeded baseline.
pub fn sdr(v: &FeatureVector, prelude: &MetricPrelude) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let n = v.len() as f64;
    let mean_sq = finite_values(v)
        .map(|(_, x)| (x - prelude.drift_baseline).powi(2))
        .sum::<f64>()
        / n;
    bounded(mean_sq.sqrt(), 0.0, 1.0, 0.0)
}

/// Memetic saturation: key spread over hash buckets scaled by mean magnitude.
pub fn msi<H: HashSource + ?Sized>(v: &FeatureVector, hasher: &H) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let buckets: HashSet<u32> = v
        .features
        .keys()
        .map(|k| hasher.hash(k) % SATURATION_BUCKETS)
        .collect();
    let mean_abs = finite_values(v).map(|(_, x)| x.abs()).sum::<f64>() / v.len() as f64;
    let spread = buckets.len() as f64 / SATURATION_BUCKETS as f64;
    bounded(spread * mean_abs.min(1.0), 0.0, 1.0, 0.0)
}

/// Archetype resonance: mean cosine between each archetype's seeded angle
/// and the feature-weighted angle.
pub fn arf<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    prelude: &MetricPrelude,
    hasher: &H,
) -> f64 {
    if prelude.archetype_angles.is_empty() {
        return 0.0;
    }

    let (mut sin_sum, mut cos_sum) = (0.0, 0.0);
    for (key, x) in finite_values(v) {
        let alpha = field_angle(hasher, &ctx.seed, key);
        sin_sum += x * alpha.sin();
        cos_sum += x * alpha.cos();
    }
    let phi = sin_sum.atan2(cos_sum);

    let total: f64 = prelude
        .archetype_angles
        .iter()
        .map(|(_, theta)| (theta - phi).cos())
        .sum();
    bounded(total / prelude.archetype_angles.len() as f64, -1.0, 1.0, 0.0)
}

/// Narrative momentum: relative magnitude change per hour since the prior.
pub fn nmc(v: &FeatureVector, ctx: &Context, prelude: &MetricPrelude) -> f64 {
    let Some(prior) = &ctx.prior else {
        return prelude.momentum_baseline;
    };

    let prior_mag = finite_magnitude(prior);
    if prior_mag < EPSILON {
        return 0.0;
    }

    let dt_ms = (v.timestamp - prior.timestamp).num_milliseconds() as f64;
    let per_hour = if dt_ms > 0.0 { HOUR_MS / dt_ms } else { 1.0 };
    let change = (finite_magnitude(v) - prior_mag) / prior_mag;
    bounded(change * per_hour, -1.0, 1.0, 0.0)
}

/// Rune flux ratio: coefficient of variation of per-rune energy projections.
pub fn rfr<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    prelude: &MetricPrelude,
    hasher: &H,
) -> f64 {
    if prelude.runes.is_empty() || v.is_empty() {
        return 0.0;
    }

    let energies: Vec<f64> = prelude
        .runes
        .iter()
        .map(|rune| {
            finite_values(v)
                .map(|(key, x)| {
                    let phase = hasher.normalized(
                        &format!("{}:rune:{}:{}", ctx.seed, rune, key),
                        0.0,
                        TAU,
                    );
                    x * phase.sin()
                })
                .sum()
        })
        .collect();

    let n = energies.len() as f64;
    let mean = energies.iter().sum::<f64>() / n;
    let variance = energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if mean.abs() < EPSILON {
        return if std_dev < EPSILON { 0.0 } else { 1.0 };
    }
    bounded(std_dev / mean.abs(), 0.0, 1.0, 0.0)
}

/// Normalized Shannon entropy of the absolute feature distribution.
pub fn entropy(v: &FeatureVector) -> f64 {
    let magnitudes: Vec<f64> = finite_values(v).map(|(_, x)| x.abs()).collect();
    let total: f64 = magnitudes.iter().sum();
    if total < EPSILON || magnitudes.len() < 2 {
        return 0.0;
    }

    let h: f64 = magnitudes
        .iter()
        .map(|m| m / total)
        .filter(|p| *p > 0.0)
        .map(|p| -p * p.log2())
        .sum();
    bounded(h / (magnitudes.len() as f64).log2(), 0.0, 1.0, 0.0)
}

/// Temporal decay between the vector timestamp and the context date.
pub fn decay(v: &FeatureVector, ctx: &Context) -> f64 {
    let Ok(anchor) = parse_context_date(&ctx.date) else {
        return 1.0;
    };
    let dt_ms = (v.timestamp - anchor).num_milliseconds().unsigned_abs() as f64;
    (-dt_ms / DAY_MS).exp().clamp(f64::MIN_POSITIVE, 1.0)
}

/// Inter-temporal coherence: cosine between current and prior vectors,
/// rescaled to [0,1].
///
/// Vectors are aligned over the union of their keys; a key missing on one
/// side counts as 0.
pub fn itc(v: &FeatureVector, ctx: &Context) -> f64 {
    let Some(prior) = &ctx.prior else {
        return ITC_NO_PRIOR;
    };

    let keys: BTreeSet<&String> = v.features.keys().chain(prior.features.keys()).collect();
    let read = |fv: &FeatureVector, k: &String| {
        fv.features
            .get(k)
            .copied()
            .filter(|x| x.is_finite())
            .unwrap_or(0.0)
    };

    let (mut dot, mut mag_a, mut mag_b) = (0.0, 0.0, 0.0);
    for k in keys {
        let a = read(v, k);
        let b = read(prior, k);
        dot += a * b;
        mag_a += a * a;
        mag_b += b * b;
    }
    let (mag_a, mag_b) = (mag_a.sqrt(), mag_b.sqrt());

    if mag_a < EPSILON || mag_b < EPSILON {
        return ITC_DEGENERATE;
    }
    let cosine = dot / (mag_a * mag_b);
    bounded((cosine + 1.0) / 2.0, 0.0, 1.0, ITC_DEGENERATE)
}

/// Computes all eight metrics against a prepared prelude.
pub fn compute_with_prelude<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    prelude: &MetricPrelude,
    hasher: &H,
) -> MetricSet {
    MetricSet {
        sdr: sdr(v, prelude),
        msi: msi(v, hasher),
        arf: arf(v, ctx, prelude, hasher),
        nmc: nmc(v, ctx, prelude),
        rfr: rfr(v, ctx, prelude, hasher),
        entropy: entropy(v),
        decay: decay(v, ctx),
        itc: itc(v, ctx),
    }
}

/// Computes all eight metrics for one vector.
pub fn compute_metric_set<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> MetricSet {
    let prelude = MetricPrelude::new(ctx, hasher);
    compute_with_prelude(v, ctx, &prelude, hasher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::DirectHash;
    use chrono::{Duration, TimeZone, Utc};

    fn sample_context() -> Context {
        Context::new("test-seed-12345", "2025-01-15")
    }

    fn sample_vector() -> FeatureVector {
        FeatureVector::new(
            [
                ("price_momentum", 0.65),
                ("volume_trend", 0.72),
                ("volatility", 0.38),
            ],
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
            "test-seed-12345",
        )
    }

    fn assert_in_domain(m: &MetricSet) {
        for (name, value) in [
            ("sdr", m.sdr),
            ("msi", m.msi),
            ("rfr", m.rfr),
            ("entropy", m.entropy),
            ("itc", m.itc),
        ] {
            assert!((0.0..=1.0).contains(&value), "{} = {}", name, value);
        }
        assert!(m.decay > 0.0 && m.decay <= 1.0, "decay = {}", m.decay);
        assert!((-1.0..=1.0).contains(&m.arf), "arf = {}", m.arf);
        assert!((-1.0..=1.0).contains(&m.nmc), "nmc = {}", m.nmc);
    }

    #[test]
    fn test_reference_example() {
        let m = compute_metric_set(&sample_vector(), &sample_context(), &DirectHash);
        assert_eq!(m.itc, 0.95);
        assert_in_domain(&m);
    }

    #[test]
    fn test_deterministic() {
        let a = compute_metric_set(&sample_vector(), &sample_context(), &DirectHash);
        let b = compute_metric_set(&sample_vector(), &sample_context(), &DirectHash);
        assert_eq!(a, b);
        assert_eq!(a.sdr.to_bits(), b.sdr.to_bits());
        assert_eq!(a.arf.to_bits(), b.arf.to_bits());
    }

    #[test]
    fn test_bounds_degenerate_vectors() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        let ctx = sample_context()
            .with_runes(vec!["fehu".into(), "ansuz".into(), "raido".into()])
            .with_prior(FeatureVector::new([("a", 0.0)], ts, "s"));

        let cases = vec![
            FeatureVector::new(Vec::<(&str, f64)>::new(), ts, "s"),
            FeatureVector::new([("a", 0.0), ("b", 0.0), ("c", 0.0)], ts, "s"),
            FeatureVector::new([("a", 1.0), ("b", 1.0), ("c", 1.0)], ts, "s"),
            FeatureVector::new([("a", 1e9), ("b", -1e9)], ts, "s"),
            FeatureVector::new([("a", f64::NAN), ("b", f64::INFINITY)], ts, "s"),
        ];

        for v in &cases {
            assert_in_domain(&compute_metric_set(v, &ctx, &DirectHash));
            assert_in_domain(&compute_metric_set(v, &sample_context(), &DirectHash));
        }
    }

    #[test]
    fn test_empty_vector_fallbacks() {
        let ctx = sample_context();
        let v = FeatureVector::new(Vec::<(&str, f64)>::new(), Utc::now(), "s");
        let prelude = MetricPrelude::new(&ctx, &DirectHash);
        assert_eq!(sdr(&v, &prelude), 0.0);
        assert_eq!(msi(&v, &DirectHash), 0.0);
        assert_eq!(entropy(&v), 0.0);
        assert_eq!(rfr(&v, &ctx, &prelude, &DirectHash), 0.0);
    }

    #[test]
    fn test_momentum_without_prior_uses_seeded_baseline() {
        let ctx = sample_context();
        let prelude = MetricPrelude::new(&ctx, &DirectHash);
        let value = nmc(&sample_vector(), &ctx, &prelude);
        assert_eq!(value, prelude.momentum_baseline);
        assert!((-0.3..0.3).contains(&value));
    }

    #[test]
    fn test_momentum_with_prior() {
        let v = sample_vector();
        let mut prior = v.clone();
        prior.timestamp = v.timestamp - Duration::hours(2);
        for x in prior.features.values_mut() {
            *x *= 0.5;
        }
        let ctx = sample_context().with_prior(prior);
        let prelude = MetricPrelude::new(&ctx, &DirectHash);
        // magnitude doubled over two hours: +100% / 2h = 0.5 per hour
        let value = nmc(&v, &ctx, &prelude);
        assert!((value - 0.5).abs() < 1e-9, "nmc = {}", value);
    }

    #[test]
    fn test_coherence_identical_prior() {
        let v = sample_vector();
        let ctx = sample_context().with_prior(v.clone());
        assert!((itc(&v, &ctx) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_coherence_opposite_and_zero() {
        let v = sample_vector();
        let mut opposite = v.clone();
        for x in opposite.features.values_mut() {
            *x = -*x;
        }
        let ctx = sample_context().with_prior(opposite);
        assert!(itc(&v, &ctx).abs() < 1e-12);

        let zero = FeatureVector::new([("price_momentum", 0.0)], v.timestamp, "s");
        let ctx = sample_context().with_prior(zero);
        assert_eq!(itc(&v, &ctx), ITC_DEGENERATE);
    }

    #[test]
    fn test_coherence_zero_pads_missing_keys() {
        let ts = Utc::now();
        let v = FeatureVector::new([("a", 1.0)], ts, "s");
        let prior = FeatureVector::new([("b", 1.0)], ts, "s");
        let ctx = sample_context().with_prior(prior);
        // orthogonal after padding: cosine 0 -> 0.5
        assert!((itc(&v, &ctx) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_entropy_uniform_is_one() {
        let v = FeatureVector::new([("a", 0.5), ("b", -0.5), ("c", 0.5), ("d", 0.5)], Utc::now(), "s");
        assert!((entropy(&v) - 1.0).abs() < 1e-12);

        let single = FeatureVector::new([("a", 0.9)], Utc::now(), "s");
        assert_eq!(entropy(&single), 0.0);
    }

    #[test]
    fn test_decay() {
        let ctx = sample_context();
        let mut v = sample_vector();
        v.timestamp = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(decay(&v, &ctx), 1.0);

        v.timestamp = Utc.with_ymd_and_hms(2025, 1, 16, 0, 0, 0).unwrap();
        assert!((decay(&v, &ctx) - (-1.0f64).exp()).abs() < 1e-12);

        v.timestamp = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert!(decay(&v, &ctx) > 0.0);

        let bad = Context::new("s", "not-a-date");
        assert_eq!(decay(&v, &bad), 1.0);
    }

    #[test]
    fn test_rune_flux_needs_runes() {
        let ctx = sample_context();
        let prelude = MetricPrelude::new(&ctx, &DirectHash);
        assert_eq!(rfr(&sample_vector(), &ctx, &prelude, &DirectHash), 0.0);

        let ctx = ctx.with_runes(vec!["fehu".into(), "uruz".into()]);
        let prelude = MetricPrelude::new(&ctx, &DirectHash);
        let value = rfr(&sample_vector(), &ctx, &prelude, &DirectHash);
        assert!((0.0..=1.0).contains(&value));
    }

    #[test]
    fn test_resonance_archetype_list() {
        let default_prelude = MetricPrelude::new(&sample_context(), &DirectHash);
        assert_eq!(default_prelude.archetype_angles.len(), DEFAULT_ARCHETYPES.len());

        let custom = sample_context().with_archetypes(vec!["hero".into()]);
        let custom_prelude = MetricPrelude::new(&custom, &DirectHash);
        assert_eq!(custom_prelude.archetype_angles.len(), 1);
        assert_eq!(custom_prelude.archetype_angles[0].0, "hero");
    }

    #[test]
    fn test_empty_archetype_list_uses_defaults() {
        let v = sample_vector();
        let empty = sample_context().with_archetypes(vec![]);
        let empty_prelude = MetricPrelude::new(&empty, &DirectHash);
        let default_prelude = MetricPrelude::new(&sample_context(), &DirectHash);
        assert_eq!(empty_prelude, default_prelude);
        assert_eq!(
            arf(&v, &empty, &empty_prelude, &DirectHash),
            arf(&v, &sample_context(), &default_prelude, &DirectHash)
        );
        assert_eq!(archetypes(&empty), archetypes(&sample_context()));
    }

    #[test]
    fn test_saturation_scales_with_magnitude() {
        let ts = Utc::now();
        let small = FeatureVector::new([("a", 0.1), ("b", 0.1)], ts, "s");
        let large = FeatureVector::new([("a", 5.0), ("b", 5.0)], ts, "s");
        assert!(msi(&small, &DirectHash) < msi(&large, &DirectHash));
        assert!(msi(&large, &DirectHash) <= 0.02);
    }
}
