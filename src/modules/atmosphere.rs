//! Atmospheric models: jet stream, crosswinds, synchronicity gravity and
//! identity phase.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{archetypes, blend, mean, signal, stream, symbols, ModuleKind};
use crate::hash::HashSource;
use crate::models::{Context, FeatureVector};

// --- Jet stream ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JetStream {
    /// [0,1]
    pub velocity: f64,
    /// Compass bearing in degrees, [0,360).
    pub direction_degrees: f64,
    /// [0,1]
    pub turbulence: f64,
}

/// Tracks the dominant narrative current.
pub fn track_jet_stream<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> JetStream {
    let s = stream(hasher, ctx, ModuleKind::JetStream);
    let velocity = blend(s.unit("velocity"), signal(v, "narrative_velocity"), 0.4);
    let turbulence = blend(s.unit("turbulence"), signal(v, "novelty"), 0.3);

    JetStream {
        velocity,
        direction_degrees: s.range("direction", 0.0, 360.0),
        turbulence,
    }
}

// --- Crosswind -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crosswind {
    pub from: String,
    pub to: String,
    /// [0,1]
    pub shear: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosswindField {
    pub crosswinds: Vec<Crosswind>,
    /// Mean shear, [0,1].
    pub misalignment_index: f64,
}

/// Measures shear between each adjacent pair of archetypes.
///
/// With a single archetype there are no pairs and the field is calm.
pub fn measure_crosswinds<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> CrosswindField {
    let s = stream(hasher, ctx, ModuleKind::Crosswind);
    let polarity_spread = (signal(v, "polarity") - 0.5).abs() * 2.0;

    let names = archetypes(ctx);
    let crosswinds: Vec<Crosswind> = names
        .windows(2)
        .map(|pair| Crosswind {
            shear: blend(
                s.unit(&format!("{}-{}", pair[0], pair[1])),
                polarity_spread,
                0.25,
            ),
            from: pair[0].clone(),
            to: pair[1].clone(),
        })
        .collect();

    CrosswindField {
        misalignment_index: mean(crosswinds.iter().map(|c| c.shear)),
        crosswinds,
    }
}

// --- Synchronicity gravity -------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GravityWell {
    pub anchor: String,
    /// [0,1]
    pub mass: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GravityField {
    /// Sorted by mass, heaviest first.
    pub wells: Vec<GravityWell>,
    /// [0,1]
    pub gravity_strength: f64,
}

/// Places a gravity well on each symbol; coincidences cluster around the
/// heaviest ones.
pub fn map_gravity<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> GravityField {
    let s = stream(hasher, ctx, ModuleKind::SynchronicityGravity);
    let density = signal(v, "symbolic_density");

    let mut wells: Vec<GravityWell> = symbols(ctx)
        .into_iter()
        .map(|anchor| GravityWell {
            mass: blend(s.unit(&anchor), density, 0.35),
            anchor,
        })
        .collect();
    wells.sort_by(|a, b| b.mass.total_cmp(&a.mass));

    let peak = wells.first().map(|w| w.mass).unwrap_or(0.0);
    let strength = 0.6 * mean(wells.iter().map(|w| w.mass)) + 0.4 * peak;

    GravityField {
        wells,
        gravity_strength: strength.clamp(0.0, 1.0),
    }
}

// --- Identity phase --------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityPhaseKind {
    Dissolution,
    Seeking,
    Emergence,
    Integration,
    Expression,
    Transcendence,
}

impl IdentityPhaseKind {
    pub const CYCLE: [IdentityPhaseKind; 6] = [
        IdentityPhaseKind::Dissolution,
        IdentityPhaseKind::Seeking,
        IdentityPhaseKind::Emergence,
        IdentityPhaseKind::Integration,
        IdentityPhaseKind::Expression,
        IdentityPhaseKind::Transcendence,
    ];

    /// The phase that follows; transcendence wraps to dissolution.
    pub fn next(&self) -> Self {
        let idx = Self::CYCLE.iter().position(|p| p == self).unwrap_or(0);
        Self::CYCLE[(idx + 1) % Self::CYCLE.len()]
    }

    pub fn name(&self) -> &'static str {
        match self {
            IdentityPhaseKind::Dissolution => "dissolution",
            IdentityPhaseKind::Seeking => "seeking",
            IdentityPhaseKind::Emergence => "emergence",
            IdentityPhaseKind::Integration => "integration",
            IdentityPhaseKind::Expression => "expression",
            IdentityPhaseKind::Transcendence => "transcendence",
        }
    }
}

impl fmt::Display for IdentityPhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityPhase {
    pub phase: IdentityPhaseKind,
    /// Progress through the current phase, [0,1].
    pub progress: f64,
    pub next_phase: IdentityPhaseKind,
    /// [0,1]
    pub transition_probability: f64,
}

/// Places the collective identity on its six-phase cycle.
pub fn track_identity_phase<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> IdentityPhase {
    let s = stream(hasher, ctx, ModuleKind::IdentityPhase);
    let phase = IdentityPhaseKind::CYCLE[s.index("phase", IdentityPhaseKind::CYCLE.len())];
    let progress = blend(s.unit("progress"), signal(v, "collective_focus"), 0.2);
    let transition = (progress * 0.7 + signal(v, "novelty") * 0.3).clamp(0.0, 1.0);

    IdentityPhase {
        phase,
        progress,
        next_phase: phase.next(),
        transition_probability: transition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::DirectHash;
    use chrono::Utc;

    fn vector() -> FeatureVector {
        FeatureVector::new(
            [
                ("narrative_velocity", 0.9),
                ("symbolic_density", 0.3),
                ("collective_focus", 0.4),
                ("novelty", 0.6),
                ("polarity", 0.1),
            ],
            Utc::now(),
            "s",
        )
    }

    #[test]
    fn test_jet_stream_bounds() {
        for i in 0..25 {
            let ctx = Context::new(format!("jet-{}", i), "2025-02-01");
            let jet = track_jet_stream(&vector(), &ctx, &DirectHash);
            assert!((0.0..=1.0).contains(&jet.velocity));
            assert!((0.0..360.0).contains(&jet.direction_degrees));
            assert!((0.0..=1.0).contains(&jet.turbulence));
        }
    }

    #[test]
    fn test_crosswinds_pair_adjacent_archetypes() {
        let ctx = Context::new("wind", "2025-02-01");
        let field = measure_crosswinds(&vector(), &ctx, &DirectHash);
        assert_eq!(field.crosswinds.len(), 3);
        assert_eq!(field.crosswinds[0].from, "sage");
        assert_eq!(field.crosswinds[0].to, "trickster");

        let single = Context::new("wind", "2025-02-01").with_archetypes(vec!["hero".into()]);
        let calm = measure_crosswinds(&vector(), &single, &DirectHash);
        assert!(calm.crosswinds.is_empty());
        assert_eq!(calm.misalignment_index, 0.0);
    }

    #[test]
    fn test_gravity_wells_sorted() {
        let ctx = Context::new("gravity", "2025-02-01");
        let field = map_gravity(&vector(), &ctx, &DirectHash);
        assert!(field.wells.windows(2).all(|w| w[0].mass >= w[1].mass));
        assert!((0.0..=1.0).contains(&field.gravity_strength));
    }

    #[test]
    fn test_phase_cycle_wraps() {
        assert_eq!(IdentityPhaseKind::Transcendence.next(), IdentityPhaseKind::Dissolution);
        assert_eq!(IdentityPhaseKind::Seeking.next(), IdentityPhaseKind::Emergence);
        assert_eq!(IdentityPhaseKind::Expression.to_string(), "expression");
    }

    #[test]
    fn test_identity_phase_next_matches_cycle() {
        let ctx = Context::new("identity", "2025-02-01");
        let phase = track_identity_phase(&vector(), &ctx, &DirectHash);
        assert_eq!(phase.next_phase, phase.phase.next());
        assert!((0.0..=1.0).contains(&phase.transition_probability));
    }
}
