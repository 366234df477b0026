//! Deterministic generator modules.
//!
//! Each module is a pure function of `(FeatureVector, Context, HashSource)`
//! and derives all of its variation from seeded hashes scoped to the
//! module's name, so one seed and date always yield the same output.

pub mod atmosphere;
pub mod signals;
pub mod symbolic;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::{HashSource, SeedStream};
use crate::models::{Context, FeatureVector};

pub use atmosphere::{
    CrosswindField, GravityField, IdentityPhase, IdentityPhaseKind, JetStream,
};
pub use signals::{
    AbsenceField, Affect, Bifurcation, BurstKind, ChimeraField, Emotion, Geometry, Microburst,
    Shape, Trend,
};
pub use symbolic::{
    ArchetypeGates, MemeBarometer, MemeStability, ShadowField, SlangForecast, SlangTerm,
    TemporalDecay, MemePressure,
};

/// Symbols used by decay and gravity when the context carries no runes.
pub const DEFAULT_SYMBOLS: [&str; 5] = ["spiral", "mirror", "key", "flame", "serpent"];

/// Identifies one of the fifteen modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    Microburst,
    Geometry,
    Affect,
    Absence,
    Bifurcation,
    Chimera,
    TemporalDecay,
    ShadowPressure,
    SlangMutation,
    MemeBarometer,
    ArchetypeGates,
    JetStream,
    Crosswind,
    SynchronicityGravity,
    IdentityPhase,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 15] = [
        ModuleKind::Microburst,
        ModuleKind::Geometry,
        ModuleKind::Affect,
        ModuleKind::Absence,
        ModuleKind::Bifurcation,
        ModuleKind::Chimera,
        ModuleKind::TemporalDecay,
        ModuleKind::ShadowPressure,
        ModuleKind::SlangMutation,
        ModuleKind::MemeBarometer,
        ModuleKind::ArchetypeGates,
        ModuleKind::JetStream,
        ModuleKind::Crosswind,
        ModuleKind::SynchronicityGravity,
        ModuleKind::IdentityPhase,
    ];

    /// Scope string used in seeded hash keys.
    pub fn scope(&self) -> &'static str {
        match self {
            ModuleKind::Microburst => "microburst",
            ModuleKind::Geometry => "geometry",
            ModuleKind::Affect => "affect",
            ModuleKind::Absence => "absence",
            ModuleKind::Bifurcation => "bifurcation",
            ModuleKind::Chimera => "chimera",
            ModuleKind::TemporalDecay => "temporal-decay",
            ModuleKind::ShadowPressure => "shadow-pressure",
            ModuleKind::SlangMutation => "slang-mutation",
            ModuleKind::MemeBarometer => "meme-barometer",
            ModuleKind::ArchetypeGates => "archetype-gates",
            ModuleKind::JetStream => "jet-stream",
            ModuleKind::Crosswind => "crosswind",
            ModuleKind::SynchronicityGravity => "synchronicity-gravity",
            ModuleKind::IdentityPhase => "identity-phase",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scope())
    }
}

/// Output of a single module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "module", content = "result", rename_all = "kebab-case")]
pub enum ModuleResult {
    Microburst(Microburst),
    Geometry(Geometry),
    Affect(Affect),
    Absence(AbsenceField),
    Bifurcation(Bifurcation),
    Chimera(ChimeraField),
    TemporalDecay(TemporalDecay),
    ShadowPressure(ShadowField),
    SlangMutation(SlangForecast),
    MemeBarometer(MemeBarometer),
    ArchetypeGates(ArchetypeGates),
    JetStream(JetStream),
    Crosswind(CrosswindField),
    SynchronicityGravity(GravityField),
    IdentityPhase(IdentityPhase),
}

impl ModuleResult {
    pub fn kind(&self) -> ModuleKind {
        match self {
            ModuleResult::Microburst(_) => ModuleKind::Microburst,
            ModuleResult::Geometry(_) => ModuleKind::Geometry,
            ModuleResult::Affect(_) => ModuleKind::Affect,
            ModuleResult::Absence(_) => ModuleKind::Absence,
            ModuleResult::Bifurcation(_) => ModuleKind::Bifurcation,
            ModuleResult::Chimera(_) => ModuleKind::Chimera,
            ModuleResult::TemporalDecay(_) => ModuleKind::TemporalDecay,
            ModuleResult::ShadowPressure(_) => ModuleKind::ShadowPressure,
            ModuleResult::SlangMutation(_) => ModuleKind::SlangMutation,
            ModuleResult::MemeBarometer(_) => ModuleKind::MemeBarometer,
            ModuleResult::ArchetypeGates(_) => ModuleKind::ArchetypeGates,
            ModuleResult::JetStream(_) => ModuleKind::JetStream,
            ModuleResult::Crosswind(_) => ModuleKind::Crosswind,
            ModuleResult::SynchronicityGravity(_) => ModuleKind::SynchronicityGravity,
            ModuleResult::IdentityPhase(_) => ModuleKind::IdentityPhase,
        }
    }
}

/// Typed outputs of every module for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleOutputs {
    pub microburst: Microburst,
    pub geometry: Geometry,
    pub affect: Affect,
    pub absence: AbsenceField,
    pub bifurcation: Bifurcation,
    pub chimera: ChimeraField,
    pub temporal_decay: TemporalDecay,
    pub shadow: ShadowField,
    pub slang: SlangForecast,
    pub memes: MemeBarometer,
    pub gates: ArchetypeGates,
    pub jet_stream: JetStream,
    pub crosswind: CrosswindField,
    pub gravity: GravityField,
    pub identity: IdentityPhase,
}

impl ModuleOutputs {
    /// Runs all fifteen modules against one vector.
    pub fn generate<H: HashSource + ?Sized>(v: &FeatureVector, ctx: &Context, hasher: &H) -> Self {
        Self {
            microburst: signals::detect_microbursts(v, ctx, hasher),
            geometry: signals::detect_geometry(v, ctx, hasher),
            affect: signals::scan_affect(v, ctx, hasher),
            absence: signals::detect_absence(v, ctx, hasher),
            bifurcation: signals::detect_bifurcation(v, ctx, hasher),
            chimera: signals::detect_chimeras(v, ctx, hasher),
            temporal_decay: symbolic::model_temporal_decay(v, ctx, hasher),
            shadow: symbolic::map_shadow_pressure(v, ctx, hasher),
            slang: symbolic::forecast_slang(v, ctx, hasher),
            memes: symbolic::read_meme_barometer(v, ctx, hasher),
            gates: symbolic::index_archetype_gates(v, ctx, hasher),
            jet_stream: atmosphere::track_jet_stream(v, ctx, hasher),
            crosswind: atmosphere::measure_crosswinds(v, ctx, hasher),
            gravity: atmosphere::map_gravity(v, ctx, hasher),
            identity: atmosphere::track_identity_phase(v, ctx, hasher),
        }
    }

    /// The outputs as tagged results, in [`ModuleKind::ALL`] order.
    pub fn results(&self) -> Vec<ModuleResult> {
        vec![
            ModuleResult::Microburst(self.microburst.clone()),
            ModuleResult::Geometry(self.geometry.clone()),
            ModuleResult::Affect(self.affect.clone()),
            ModuleResult::Absence(self.absence.clone()),
            ModuleResult::Bifurcation(self.bifurcation.clone()),
            ModuleResult::Chimera(self.chimera.clone()),
            ModuleResult::TemporalDecay(self.temporal_decay.clone()),
            ModuleResult::ShadowPressure(self.shadow.clone()),
            ModuleResult::SlangMutation(self.slang.clone()),
            ModuleResult::MemeBarometer(self.memes.clone()),
            ModuleResult::ArchetypeGates(self.gates.clone()),
            ModuleResult::JetStream(self.jet_stream.clone()),
            ModuleResult::Crosswind(self.crosswind.clone()),
            ModuleResult::SynchronicityGravity(self.gravity.clone()),
            ModuleResult::IdentityPhase(self.identity.clone()),
        ]
    }
}

/// Reads a derived-vector signal clamped to [0,1]; 0.5 when absent.
pub(crate) fn signal(v: &FeatureVector, field: &str) -> f64 {
    v.get(field)
        .filter(|x| x.is_finite())
        .map(|x| x.clamp(0.0, 1.0))
        .unwrap_or(0.5)
}

/// Weighted mix of a seeded value and a vector signal, clamped to [0,1].
pub(crate) fn blend(seeded: f64, signal: f64, weight: f64) -> f64 {
    (seeded * (1.0 - weight) + signal * weight).clamp(0.0, 1.0)
}

pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

pub(crate) use crate::kernel::archetypes;

/// Scoped seed stream for one module under the context.
pub(crate) fn stream<'a, H: HashSource + ?Sized>(
    hasher: &'a H,
    ctx: &'a Context,
    kind: ModuleKind,
) -> SeedStream<'a, H> {
    SeedStream::new(hasher, &ctx.seed, &ctx.date, kind.scope())
}

pub(crate) fn symbols(ctx: &Context) -> Vec<String> {
    match &ctx.runes {
        Some(list) if !list.is_empty() => list.clone(),
        _ => DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
    }
}
