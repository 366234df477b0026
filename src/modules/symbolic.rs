//! Symbol-level models: decay, shadow pressure, slang, memes, gates.

use serde::{Deserialize, Serialize};

use super::{archetypes, blend, mean, signal, stream, symbols, ModuleKind};
use crate::hash::HashSource;
use crate::models::{Context, FeatureVector};

// --- Temporal decay --------------------------------------------------------

pub const MIN_HALF_LIFE_HOURS: f64 = 6.0;
pub const MAX_HALF_LIFE_HOURS: f64 = 168.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDecay {
    pub symbol: String,
    /// [6,168)
    pub half_life_hours: f64,
    /// Strength left after the symbol's seeded age, (0,1].
    pub remaining: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalDecay {
    pub symbols: Vec<SymbolDecay>,
    pub mean_half_life_hours: f64,
}

/// Assigns each symbol a half-life and the strength it has left.
pub fn model_temporal_decay<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> TemporalDecay {
    let s = stream(hasher, ctx, ModuleKind::TemporalDecay);
    let staying_power = signal(v, "collective_focus");

    let symbols: Vec<SymbolDecay> = symbols(ctx)
        .into_iter()
        .map(|symbol| {
            let base = s.unit(&format!("half-life-{}", symbol));
            let half_life = MIN_HALF_LIFE_HOURS
                + (MAX_HALF_LIFE_HOURS - MIN_HALF_LIFE_HOURS) * blend(base, staying_power, 0.2)
                    .min(0.9999);
            let age = s.range(&format!("age-{}", symbol), 0.0, 72.0);
            SymbolDecay {
                remaining: 0.5f64.powf(age / half_life),
                half_life_hours: half_life,
                symbol,
            }
        })
        .collect();

    TemporalDecay {
        mean_half_life_hours: mean(symbols.iter().map(|d| d.half_life_hours)),
        symbols,
    }
}

// --- Shadow pressure -------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressurePoint {
    pub archetype: String,
    /// [0,1]
    pub pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowField {
    pub points: Vec<PressurePoint>,
    pub dominant_shadow: String,
    /// [0,1]
    pub field_intensity: f64,
}

/// Measures the repressed pressure behind each archetype.
pub fn map_shadow_pressure<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> ShadowField {
    let s = stream(hasher, ctx, ModuleKind::ShadowPressure);
    let darkness = 1.0 - signal(v, "polarity");

    let points: Vec<PressurePoint> = archetypes(ctx)
        .into_iter()
        .map(|archetype| PressurePoint {
            pressure: blend(s.unit(&archetype), darkness, 0.3),
            archetype,
        })
        .collect();

    let dominant_shadow = points
        .iter()
        .fold(None::<&PressurePoint>, |best, p| match best {
            Some(b) if b.pressure >= p.pressure => Some(b),
            _ => Some(p),
        })
        .map(|p| p.archetype.clone())
        .unwrap_or_default();

    let intensity = mean(points.iter().map(|p| p.pressure)) * (0.7 + 0.3 * signal(v, "signal_intensity"));

    ShadowField {
        points,
        dominant_shadow,
        field_intensity: intensity.clamp(0.0, 1.0),
    }
}

// --- Slang mutation --------------------------------------------------------

const SLANG_TERMS: [&str; 8] = [
    "glowcore",
    "doomscroll",
    "mid-arc",
    "vibe-shift",
    "lore-drop",
    "soft-launch",
    "main-character",
    "side-quest",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlangTerm {
    pub term: String,
    /// [0,1]
    pub mutation_rate: f64,
    /// [0,1]
    pub viral_stability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlangForecast {
    pub terms: Vec<SlangTerm>,
    pub mean_mutation_rate: f64,
}

/// Forecasts how fast each tracked term mutates and whether it sticks.
pub fn forecast_slang<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> SlangForecast {
    let s = stream(hasher, ctx, ModuleKind::SlangMutation);
    let novelty = signal(v, "novelty");
    let focus = signal(v, "collective_focus");

    let terms: Vec<SlangTerm> = SLANG_TERMS
        .iter()
        .map(|term| SlangTerm {
            term: term.to_string(),
            mutation_rate: blend(s.unit(&format!("mutation-{}", term)), novelty, 0.3),
            viral_stability: blend(s.unit(&format!("stability-{}", term)), focus, 0.3),
        })
        .collect();

    SlangForecast {
        mean_mutation_rate: mean(terms.iter().map(|t| t.mutation_rate)),
        terms,
    }
}

// --- Meme barometer --------------------------------------------------------

const MEMES: [&str; 6] = [
    "ouroboros",
    "glitch-saint",
    "liminal-mall",
    "void-cat",
    "oracle-bot",
    "mirror-maze",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemeStability {
    Stable,
    Unsettled,
    Volatile,
    Stormy,
}

impl MemeStability {
    /// Classifies an overall pressure reading.
    pub fn classify(pressure: f64) -> Self {
        if pressure < 0.35 {
            MemeStability::Stable
        } else if pressure < 0.5 {
            MemeStability::Unsettled
        } else if pressure < 0.65 {
            MemeStability::Volatile
        } else {
            MemeStability::Stormy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemePressure {
    pub meme: String,
    /// [0,1]
    pub pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemeBarometer {
    pub memes: Vec<MemePressure>,
    /// [0,1]
    pub overall_pressure: f64,
    pub stability: MemeStability,
}

/// Reads the pressure each circulating meme exerts.
pub fn read_meme_barometer<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> MemeBarometer {
    let s = stream(hasher, ctx, ModuleKind::MemeBarometer);
    let velocity = signal(v, "narrative_velocity");

    let memes: Vec<MemePressure> = MEMES
        .iter()
        .map(|meme| MemePressure {
            meme: meme.to_string(),
            pressure: blend(s.unit(meme), velocity, 0.25),
        })
        .collect();

    let overall = mean(memes.iter().map(|m| m.pressure));

    MemeBarometer {
        memes,
        overall_pressure: overall,
        stability: MemeStability::classify(overall),
    }
}

// --- Archetype gates -------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub archetype: String,
    /// [0,1]
    pub openness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeGates {
    pub gates: Vec<Gate>,
    /// Mean openness, [0,1].
    pub gate_index: f64,
    pub most_open: String,
}

impl ArchetypeGates {
    /// Gate with the highest openness, if any archetypes were indexed.
    pub fn widest(&self) -> Option<&Gate> {
        self.gates.iter().find(|g| g.archetype == self.most_open)
    }
}

/// Scores how open each archetype's gate currently is.
pub fn index_archetype_gates<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> ArchetypeGates {
    let s = stream(hasher, ctx, ModuleKind::ArchetypeGates);
    let density = signal(v, "symbolic_density");

    let gates: Vec<Gate> = archetypes(ctx)
        .into_iter()
        .map(|archetype| Gate {
            openness: blend(s.unit(&archetype), density, 0.3),
            archetype,
        })
        .collect();

    let most_open = gates
        .iter()
        .fold(None::<&Gate>, |best, g| match best {
            Some(b) if b.openness >= g.openness => Some(b),
            _ => Some(g),
        })
        .map(|g| g.archetype.clone())
        .unwrap_or_default();

    ArchetypeGates {
        gate_index: mean(gates.iter().map(|g| g.openness)),
        gates,
        most_open,
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
                ("signal_intensity", 0.6),
                ("narrative_velocity", 0.8),
                ("symbolic_density", 0.4),
                ("collective_focus", 0.5),
                ("novelty", 0.7),
                ("polarity", 0.2),
            ],
            Utc::now(),
            "s",
        )
    }

    #[test]
    fn test_decay_half_life_range() {
        let ctx = Context::new("decay-seed", "2025-01-15")
            .with_runes(vec!["fehu".into(), "algiz".into(), "dagaz".into()]);
        let d = model_temporal_decay(&vector(), &ctx, &DirectHash);
        assert_eq!(d.symbols.len(), 3);
        for s in &d.symbols {
            assert!((MIN_HALF_LIFE_HOURS..MAX_HALF_LIFE_HOURS).contains(&s.half_life_hours));
            assert!(s.remaining > 0.0 && s.remaining <= 1.0);
        }
    }

    #[test]
    fn test_decay_uses_default_symbols() {
        let ctx = Context::new("decay-seed", "2025-01-15");
        let d = model_temporal_decay(&vector(), &ctx, &DirectHash);
        assert_eq!(d.symbols.len(), super::super::DEFAULT_SYMBOLS.len());
    }

    #[test]
    fn test_shadow_dominant() {
        let ctx = Context::new("shadow-seed", "2025-01-15");
        let field = map_shadow_pressure(&vector(), &ctx, &DirectHash);
        let max = field.points.iter().map(|p| p.pressure).fold(f64::MIN, f64::max);
        let dominant = field
            .points
            .iter()
            .find(|p| p.archetype == field.dominant_shadow)
            .unwrap();
        assert_eq!(dominant.pressure, max);
        assert!((0.0..=1.0).contains(&field.field_intensity));
    }

    #[test]
    fn test_meme_stability_classes() {
        assert_eq!(MemeStability::classify(0.1), MemeStability::Stable);
        assert_eq!(MemeStability::classify(0.4), MemeStability::Unsettled);
        assert_eq!(MemeStability::classify(0.6), MemeStability::Volatile);
        assert_eq!(MemeStability::classify(0.9), MemeStability::Stormy);
    }

    #[test]
    fn test_barometer_and_slang_bounds() {
        for i in 0..20 {
            let ctx = Context::new(format!("seed-{}", i), "2025-01-15");
            let b = read_meme_barometer(&vector(), &ctx, &DirectHash);
            assert_eq!(b.memes.len(), MEMES.len());
            assert_eq!(b.stability, MemeStability::classify(b.overall_pressure));

            let slang = forecast_slang(&vector(), &ctx, &DirectHash);
            assert_eq!(slang.terms.len(), SLANG_TERMS.len());
            assert!(slang
                .terms
                .iter()
                .all(|t| (0.0..=1.0).contains(&t.viral_stability)));
        }
    }

    #[test]
    fn test_gates_follow_archetypes() {
        let ctx = Context::new("gate-seed", "2025-01-15")
            .with_archetypes(vec!["hero".into(), "mentor".into()]);
        let gates = index_archetype_gates(&vector(), &ctx, &DirectHash);
        assert_eq!(gates.gates.len(), 2);
        assert!(gates.most_open == "hero" || gates.most_open == "mentor");
        assert!((0.0..=1.0).contains(&gates.gate_index));

        let widest = gates.widest().unwrap();
        assert_eq!(widest.archetype, gates.most_open);
        assert!(gates.gates.iter().all(|g| g.openness <= widest.openness));
    }
}
