//! Signal-level detectors: bursts, shapes, affect, absences, forks, hybrids.

use serde::{Deserialize, Serialize};

use super::{archetypes, blend, mean, signal, stream, ModuleKind};
use crate::hash::HashSource;
use crate::models::{Context, FeatureVector};

// --- Microburst -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurstKind {
    Spike,
    Cascade,
    Echo,
    Flare,
}

const BURST_KINDS: [BurstKind; 4] = [
    BurstKind::Spike,
    BurstKind::Cascade,
    BurstKind::Echo,
    BurstKind::Flare,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstEvent {
    pub kind: BurstKind,
    /// [0,1]
    pub intensity: f64,
    /// Minutes past the hour the event is placed at.
    pub offset_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Microburst {
    pub events: Vec<BurstEvent>,
    /// [0,1]
    pub burst_intensity: f64,
}

/// Detects 2 to 6 short-lived event bursts.
pub fn detect_microbursts<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> Microburst {
    let s = stream(hasher, ctx, ModuleKind::Microburst);
    let intensity_signal = signal(v, "signal_intensity");
    let count = 2 + s.index("count", 5);

    let mut events: Vec<BurstEvent> = (0..count)
        .map(|i| BurstEvent {
            kind: BURST_KINDS[s.index(&format!("kind-{}", i), BURST_KINDS.len())],
            intensity: blend(s.unit(&format!("intensity-{}", i)), intensity_signal, 0.3),
            offset_minutes: s.index(&format!("offset-{}", i), 60) as u32,
        })
        .collect();
    events.sort_by_key(|e| e.offset_minutes);

    let velocity = signal(v, "narrative_velocity");
    let burst_intensity =
        (mean(events.iter().map(|e| e.intensity)) * (0.6 + 0.4 * velocity)).clamp(0.0, 1.0);

    Microburst {
        events,
        burst_intensity,
    }
}

// --- Geometry --------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Spiral,
    Lattice,
    Vortex,
    Fractal,
    Mandala,
}

impl Shape {
    pub const ALL: [Shape; 5] = [
        Shape::Spiral,
        Shape::Lattice,
        Shape::Vortex,
        Shape::Fractal,
        Shape::Mandala,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Shape::Spiral => "spiral",
            Shape::Lattice => "lattice",
            Shape::Vortex => "vortex",
            Shape::Fractal => "fractal",
            Shape::Mandala => "mandala",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStrength {
    pub shape: Shape,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub shapes: Vec<ShapeStrength>,
    pub dominant: Shape,
    /// [0,1]
    pub complexity: f64,
    /// [0,1]
    pub stability: f64,
}

/// Scores the five recurring shapes and picks the strongest.
pub fn detect_geometry<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> Geometry {
    let s = stream(hasher, ctx, ModuleKind::Geometry);
    let density = signal(v, "symbolic_density");

    let shapes: Vec<ShapeStrength> = Shape::ALL
        .iter()
        .map(|shape| ShapeStrength {
            shape: *shape,
            strength: blend(s.unit(shape.name()), density, 0.25),
        })
        .collect();

    // first shape wins ties
    let dominant = shapes
        .iter()
        .fold(&shapes[0], |best, c| if c.strength > best.strength { c } else { best })
        .shape;

    let avg = mean(shapes.iter().map(|c| c.strength));
    let spread = mean(shapes.iter().map(|c| (c.strength - avg).powi(2))).sqrt();

    Geometry {
        complexity: (avg * (0.5 + 0.5 * s.unit("complexity"))).clamp(0.0, 1.0),
        stability: (1.0 - 2.0 * spread).clamp(0.0, 1.0),
        dominant,
        shapes,
    }
}

// --- Affect ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Fear,
    Anger,
    Sadness,
    Surprise,
    Anticipation,
}

impl Emotion {
    pub const ALL: [Emotion; 6] = [
        Emotion::Joy,
        Emotion::Fear,
        Emotion::Anger,
        Emotion::Sadness,
        Emotion::Surprise,
        Emotion::Anticipation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Fear => "fear",
            Emotion::Anger => "anger",
            Emotion::Sadness => "sadness",
            Emotion::Surprise => "surprise",
            Emotion::Anticipation => "anticipation",
        }
    }

    /// Contribution to affect temperature. Weights sum to 1.
    fn heat(&self) -> f64 {
        match self {
            Emotion::Joy => 0.2,
            Emotion::Fear => 0.1,
            Emotion::Anger => 0.3,
            Emotion::Sadness => 0.05,
            Emotion::Surprise => 0.2,
            Emotion::Anticipation => 0.15,
        }
    }

    /// Whether the emotion rises with positive polarity.
    fn bright(&self) -> bool {
        matches!(self, Emotion::Joy | Emotion::Surprise | Emotion::Anticipation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Steady,
    Falling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    pub emotion: Emotion,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Affect {
    pub emotions: Vec<EmotionReading>,
    pub dominant: Emotion,
    pub trend: Trend,
    /// [0,1]
    pub temperature: f64,
}

/// Reads six emotion intensities, their trend and overall temperature.
pub fn scan_affect<H: HashSource + ?Sized>(v: &FeatureVector, ctx: &Context, hasher: &H) -> Affect {
    let s = stream(hasher, ctx, ModuleKind::Affect);
    let polarity = signal(v, "polarity");

    let emotions: Vec<EmotionReading> = Emotion::ALL
        .iter()
        .map(|e| {
            let lean = if e.bright() { polarity } else { 1.0 - polarity };
            EmotionReading {
                emotion: *e,
                intensity: blend(s.unit(e.name()), lean, 0.3),
            }
        })
        .collect();

    let dominant = emotions
        .iter()
        .fold(&emotions[0], |best, r| if r.intensity > best.intensity { r } else { best })
        .emotion;

    let drift = s.range("trend", -1.0, 1.0) + (polarity - 0.5) * 0.5;
    let trend = if drift > 0.2 {
        Trend::Rising
    } else if drift < -0.2 {
        Trend::Falling
    } else {
        Trend::Steady
    };

    let temperature: f64 = emotions.iter().map(|r| r.intensity * r.emotion.heat()).sum();

    Affect {
        emotions,
        dominant,
        trend,
        temperature: temperature.clamp(0.0, 1.0),
    }
}

// --- Absence ---------------------------------------------------------------

const ABSENCE_CANDIDATES: [&str; 8] = [
    "ritual", "humor", "dissent", "nostalgia", "wonder", "grief", "play", "silence",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsentSignal {
    pub signal: String,
    /// How strongly the signal would normally be present, [0.3,1).
    pub expected_strength: f64,
    /// [0,1]
    pub void_depth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsenceField {
    pub absent: Vec<AbsentSignal>,
    /// Mean void depth, [0,1].
    pub absence_index: f64,
}

/// Finds expected signals that are conspicuously missing.
pub fn detect_absence<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> AbsenceField {
    let s = stream(hasher, ctx, ModuleKind::Absence);
    let scatter = 1.0 - signal(v, "collective_focus");
    let threshold = 0.25 + 0.3 * scatter;

    let absent: Vec<AbsentSignal> = ABSENCE_CANDIDATES
        .iter()
        .filter(|name| s.chance(name, threshold))
        .map(|name| {
            let expected = s.range(&format!("expected-{}", name), 0.3, 1.0);
            AbsentSignal {
                signal: name.to_string(),
                expected_strength: expected,
                void_depth: (expected * s.unit(&format!("depth-{}", name))).clamp(0.0, 1.0),
            }
        })
        .collect();

    AbsenceField {
        absence_index: mean(absent.iter().map(|a| a.void_depth)),
        absent,
    }
}

// --- Bifurcation -----------------------------------------------------------

const PATH_LABELS: [&str; 6] = [
    "convergence",
    "fragmentation",
    "renewal",
    "escalation",
    "retreat",
    "synthesis",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathBranch {
    pub label: String,
    pub probability: f64,
    /// [-1,1]
    pub momentum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bifurcation {
    /// Exactly two paths; probabilities sum to 1.
    pub paths: Vec<PathBranch>,
    /// Degrees, [30,150).
    pub divergence_angle: f64,
    /// [0,1]
    pub stability: f64,
}

/// Splits the outlook into two divergent paths.
pub fn detect_bifurcation<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> Bifurcation {
    let s = stream(hasher, ctx, ModuleKind::Bifurcation);
    let n = PATH_LABELS.len();
    let first = s.index("first", n);
    let second = (first + 1 + s.index("second", n - 1)) % n;

    let p = blend(s.unit("split"), signal(v, "polarity"), 0.2).clamp(0.05, 0.95);
    let paths = vec![
        PathBranch {
            label: PATH_LABELS[first].to_string(),
            probability: p,
            momentum: s.range("momentum-a", -1.0, 1.0),
        },
        PathBranch {
            label: PATH_LABELS[second].to_string(),
            probability: 1.0 - p,
            momentum: s.range("momentum-b", -1.0, 1.0),
        },
    ];

    Bifurcation {
        paths,
        divergence_angle: 30.0 + 120.0 * s.unit("angle"),
        stability: blend(s.unit("stability"), (2.0 * p - 1.0).abs(), 0.4),
    }
}

// --- Chimera ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hybrid {
    pub components: [String; 2],
    /// [0,1]
    pub fusion_strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChimeraField {
    pub hybrids: Vec<Hybrid>,
    /// [0,1]
    pub emergence_risk: f64,
}

/// Detects fused archetype pairs and the risk of a new form emerging.
pub fn detect_chimeras<H: HashSource + ?Sized>(
    v: &FeatureVector,
    ctx: &Context,
    hasher: &H,
) -> ChimeraField {
    let s = stream(hasher, ctx, ModuleKind::Chimera);
    let names = archetypes(ctx);

    let mut hybrids = Vec::new();
    for (i, a) in names.iter().enumerate() {
        for b in names.iter().skip(i + 1) {
            let pair = format!("{}+{}", a, b);
            if s.chance(&pair, 0.4) {
                hybrids.push(Hybrid {
                    components: [a.clone(), b.clone()],
                    fusion_strength: s.unit(&format!("fusion-{}", pair)),
                });
            }
        }
    }
    hybrids.sort_by(|x, y| y.fusion_strength.total_cmp(&x.fusion_strength));

    let strongest = hybrids.first().map(|h| h.fusion_strength).unwrap_or(0.0);
    let pull = (strongest + signal(v, "novelty")) / 2.0;

    ChimeraField {
        emergence_risk: blend(s.unit("risk"), pull, 0.35),
        hybrids,
    }
}
