//! Layer aggregation.
//!
//! One function per report layer; each reads only the module outputs it
//! needs and never touches the hasher.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::modules::signals::PathBranch;
use crate::modules::{MemePressure, MemeStability, ModuleOutputs, SlangTerm};

/// Maximum entries kept in each front.
pub const FRONT_SIZE: usize = 5;
pub const SLANG_FRONT_THRESHOLD: f64 = 0.3;
pub const MEME_FRONT_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PressureSystemKind {
    ArchetypalRidge,
    ShadowTrough,
    MemeticFront,
}

impl fmt::Display for PressureSystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PressureSystemKind::ArchetypalRidge => write!(f, "archetypal-ridge"),
            PressureSystemKind::ShadowTrough => write!(f, "shadow-trough"),
            PressureSystemKind::MemeticFront => write!(f, "memetic-front"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureSystem {
    pub kind: PressureSystemKind,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroLayer {
    pub systems: Vec<PressureSystem>,
    pub dominant: PressureSystem,
    pub stability: MemeStability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MesoLayer {
    pub coherence: f64,
    pub volatility: f64,
    pub flow_direction_degrees: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEffect {
    pub name: String,
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroLayer {
    pub effects: Vec<LocalEffect>,
    pub local_intensity: f64,
    pub local_coherence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub event: String,
    pub probability: f64,
    /// False for predictions emitted on every run.
    pub conditional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub predictions: Vec<Prediction>,
    /// Mean prediction probability.
    pub confidence: f64,
}

/// Picks the strongest of the three named pressure systems.
///
/// Ties go to the system listed first.
pub fn macro_layer(outputs: &ModuleOutputs) -> MacroLayer {
    let systems = vec![
        PressureSystem {
            kind: PressureSystemKind::ArchetypalRidge,
            strength: outputs.gates.gate_index,
        },
        PressureSystem {
            kind: PressureSystemKind::ShadowTrough,
            strength: outputs.shadow.field_intensity,
        },
        PressureSystem {
            kind: PressureSystemKind::MemeticFront,
            strength: outputs.memes.overall_pressure,
        },
    ];

    let dominant = systems
        .iter()
        .skip(1)
        .fold(systems[0].clone(), |best, s| {
            if s.strength > best.strength {
                s.clone()
            } else {
                best
            }
        });

    MacroLayer {
        systems,
        dominant,
        stability: outputs.memes.stability,
    }
}

pub fn meso_layer(outputs: &ModuleOutputs) -> MesoLayer {
    MesoLayer {
        coherence: (1.0 - outputs.crosswind.misalignment_index).clamp(0.0, 1.0),
        volatility: outputs.jet_stream.turbulence,
        flow_direction_degrees: outputs.jet_stream.direction_degrees,
    }
}

pub fn micro_layer(outputs: &ModuleOutputs) -> MicroLayer {
    let gravity = outputs.gravity.gravity_strength;
    let progress = outputs.identity.progress;
    let velocity = outputs.jet_stream.velocity;

    let effects = vec![
        LocalEffect {
            name: "synchronicity-cluster".to_string(),
            magnitude: gravity * 0.7 + progress * 0.3,
        },
        LocalEffect {
            name: "identity-ripple".to_string(),
            magnitude: progress * 0.6 + velocity * 0.4,
        },
        LocalEffect {
            name: "narrative-eddy".to_string(),
            magnitude: velocity * 0.5 + gravity * 0.5,
        },
    ];

    let local_intensity =
        effects.iter().map(|e| e.magnitude).sum::<f64>() / effects.len() as f64;

    MicroLayer {
        effects,
        local_intensity,
        local_coherence: 1.0 - (gravity - velocity).abs(),
    }
}

/// Terms stable enough to spread, strongest first.
pub fn slang_front(outputs: &ModuleOutputs) -> Vec<SlangTerm> {
    let mut front: Vec<SlangTerm> = outputs
        .slang
        .terms
        .iter()
        .filter(|t| t.viral_stability > SLANG_FRONT_THRESHOLD)
        .cloned()
        .collect();
    front.sort_by(|a, b| b.viral_stability.total_cmp(&a.viral_stability));
    front.truncate(FRONT_SIZE);
    front
}

/// Memes under enough pressure to break through, strongest first.
pub fn meme_front(outputs: &ModuleOutputs) -> Vec<MemePressure> {
    let mut front: Vec<MemePressure> = outputs
        .memes
        .memes
        .iter()
        .filter(|m| m.pressure > MEME_FRONT_THRESHOLD)
        .cloned()
        .collect();
    front.sort_by(|a, b| b.pressure.total_cmp(&a.pressure));
    front.truncate(FRONT_SIZE);
    front
}

pub fn forecast(outputs: &ModuleOutputs) -> Forecast {
    let mut predictions = Vec::new();

    if outputs.microburst.burst_intensity > 0.5 {
        predictions.push(Prediction {
            event: "microburst cascade within the hour".to_string(),
            probability: outputs.microburst.burst_intensity,
            conditional: true,
        });
    }

    if outputs.bifurcation.stability > 0.5 {
        let leading = outputs
            .bifurcation
            .paths
            .iter()
            .fold(None, |best: Option<&PathBranch>, p| match best {
                Some(b) if b.probability >= p.probability => Some(b),
                _ => Some(p),
            })
            .map(|p| p.label.as_str())
            .unwrap_or("dominant path");
        predictions.push(Prediction {
            event: format!("narrative settles on {}", leading),
            probability: outputs.bifurcation.stability,
            conditional: true,
        });
    }

    if outputs.chimera.emergence_risk > 0.6 {
        predictions.push(Prediction {
            event: "hybrid archetype emergence".to_string(),
            probability: outputs.chimera.emergence_risk,
            conditional: true,
        });
    }

    predictions.push(Prediction {
        event: format!(
            "identity transition {} -> {}",
            outputs.identity.phase, outputs.identity.next_phase
        ),
        probability: outputs.identity.transition_probability,
        conditional: false,
    });

    let confidence =
        predictions.iter().map(|p| p.probability).sum::<f64>() / predictions.len() as f64;

    Forecast {
        predictions,
        confidence,
    }
}
