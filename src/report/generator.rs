//! Markdown and JSON rendering.
//!
//! Renders layered reports, single-vector diagnostics and pipeline
//! envelopes for the CLI.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::kernel::Diagnostics;
use crate::models::{PipelineResult, Provenance};
use crate::modules::ModuleResult;
use crate::orchestrator::{LayeredReport, ReportMetadata};
use crate::pipeline::PipelineKind;

/// Generate a complete Markdown rendering of a layered report.
pub fn generate_markdown_report(report: &LayeredReport) -> String {
    let mut output = String::new();

    output.push_str("# Seedcast Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata, &report.provenance));
    output.push_str(&generate_table_of_contents());
    output.push_str(&generate_macro_section(report));
    output.push_str(&generate_meso_section(report));
    output.push_str(&generate_micro_section(report));
    output.push_str(&generate_fronts_section(report));
    output.push_str(&generate_forecast_section(report));
    output.push_str(&generate_modules_section(&report.modules));
    output.push_str(&generate_provenance_section(&report.provenance));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata, provenance: &Provenance) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Seed:** `{}`\n", provenance.seed));
    section.push_str(&format!("- **Date:** {}\n", provenance.date));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Quality Score:** {:.3}\n", metadata.quality_score));
    section.push_str(&format!("- **Entropy Class:** {}\n", metadata.entropy_class));
    section.push_str(&format!("- **Processing Time:** {}ms\n", metadata.processing_ms));
    section.push('\n');

    section
}

fn generate_table_of_contents() -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    for (title, anchor) in [
        ("Macro Layer", "macro-layer"),
        ("Meso Layer", "meso-layer"),
        ("Micro Layer", "micro-layer"),
        ("Fronts", "fronts"),
        ("Forecast", "forecast"),
        ("Modules", "modules"),
        ("Provenance", "provenance"),
    ] {
        toc.push_str(&format!("- [{}](#{})\n", title, anchor));
    }
    toc.push('\n');

    toc
}

fn generate_macro_section(report: &LayeredReport) -> String {
    let layer = &report.macro_layer;
    let mut section = String::new();

    section.push_str("## Macro Layer\n\n");
    section.push_str(&format!(
        "Dominant system: **{}** ({:.3}), meme climate **{:?}**\n\n",
        layer.dominant.kind, layer.dominant.strength, layer.stability
    ));
    if let Some(note) = gate_note(&report.modules) {
        section.push_str(&format!("Widest gate: {}\n\n", note));
    }
    section.push_str("| System | Strength |\n");
    section.push_str("|:---|:---:|\n");
    for system in &layer.systems {
        section.push_str(&format!("| {} | {:.3} |\n", system.kind, system.strength));
    }
    section.push('\n');

    section
}

fn generate_meso_section(report: &LayeredReport) -> String {
    let layer = &report.meso_layer;
    let mut section = String::new();

    section.push_str("## Meso Layer\n\n");
    section.push_str("| Coherence | Volatility | Flow Direction |\n");
    section.push_str("|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {:.3} | {:.3} | {:.1}° |\n\n",
        layer.coherence, layer.volatility, layer.flow_direction_degrees
    ));

    section
}

fn generate_micro_section(report: &LayeredReport) -> String {
    let layer = &report.micro_layer;
    let mut section = String::new();

    section.push_str("## Micro Layer\n\n");
    section.push_str("| Effect | Magnitude |\n");
    section.push_str("|:---|:---:|\n");
    for effect in &layer.effects {
        section.push_str(&format!("| {} | {:.3} |\n", effect.name, effect.magnitude));
    }
    section.push_str(&format!(
        "\n- **Local Intensity:** {:.3}\n- **Local Coherence:** {:.3}\n\n",
        layer.local_intensity, layer.local_coherence
    ));

    section
}

fn generate_fronts_section(report: &LayeredReport) -> String {
    let mut section = String::new();

    section.push_str("## Fronts\n\n");

    section.push_str("### Slang Front\n\n");
    if report.slang_front.is_empty() {
        section.push_str("No terms are stable enough to spread.\n\n");
    } else {
        section.push_str("| Term | Viral Stability | Mutation Rate |\n");
        section.push_str("|:---|:---:|:---:|\n");
        for term in &report.slang_front {
            section.push_str(&format!(
                "| `{}` | {:.3} | {:.3} |\n",
                term.term, term.viral_stability, term.mutation_rate
            ));
        }
        section.push('\n');
    }

    section.push_str("### Meme Front\n\n");
    if report.meme_front.is_empty() {
        section.push_str("No memes above the pressure threshold.\n\n");
    } else {
        section.push_str("| Meme | Pressure |\n");
        section.push_str("|:---|:---:|\n");
        for meme in &report.meme_front {
            section.push_str(&format!("| {} | {:.3} |\n", meme.meme, meme.pressure));
        }
        section.push('\n');
    }

    section
}

fn generate_forecast_section(report: &LayeredReport) -> String {
    let forecast = &report.forecast;
    let mut section = String::new();

    section.push_str("## Forecast\n\n");
    section.push_str(&format!("Confidence: **{:.3}**\n\n", forecast.confidence));
    for (i, prediction) in forecast.predictions.iter().enumerate() {
        let marker = if prediction.conditional { "" } else { " *(baseline)*" };
        section.push_str(&format!(
            "{}. {} ({:.0}%){}\n",
            i + 1,
            prediction.event,
            prediction.probability * 100.0,
            marker
        ));
    }
    section.push('\n');

    section
}

fn generate_modules_section(modules: &[ModuleResult]) -> String {
    let mut section = String::new();

    section.push_str("## Modules\n\n");
    section.push_str("| Module | Headline |\n");
    section.push_str("|:---|:---|\n");
    for result in modules {
        section.push_str(&format!("| {} | {} |\n", result.kind(), module_headline(result)));
    }
    section.push('\n');

    section
}

/// One-line summary of a module result.
pub fn module_headline(result: &ModuleResult) -> String {
    match result {
        ModuleResult::Microburst(m) => format!(
            "{} events, intensity {:.3}",
            m.events.len(),
            m.burst_intensity
        ),
        ModuleResult::Geometry(g) => format!("{} dominant, stability {:.3}", g.dominant.name(), g.stability),
        ModuleResult::Affect(a) => format!("{} ({:?}), temperature {:.3}", a.dominant.name(), a.trend, a.temperature),
        ModuleResult::Absence(a) => format!("{} absent, index {:.3}", a.absent.len(), a.absence_index),
        ModuleResult::Bifurcation(b) => format!(
            "divergence {:.1}°, stability {:.3}",
            b.divergence_angle, b.stability
        ),
        ModuleResult::Chimera(c) => format!("{} hybrids, emergence risk {:.3}", c.hybrids.len(), c.emergence_risk),
        ModuleResult::TemporalDecay(d) => format!("mean half-life {:.1}h", d.mean_half_life_hours),
        ModuleResult::ShadowPressure(s) => format!(
            "{} dominant, intensity {:.3}",
            s.dominant_shadow, s.field_intensity
        ),
        ModuleResult::SlangMutation(s) => format!("{} terms, mean mutation {:.3}", s.terms.len(), s.mean_mutation_rate),
        ModuleResult::MemeBarometer(m) => format!("{:?}, pressure {:.3}", m.stability, m.overall_pressure),
        ModuleResult::ArchetypeGates(g) => format!("{} most open, index {:.3}", g.most_open, g.gate_index),
        ModuleResult::JetStream(j) => format!(
            "velocity {:.3} at {:.1}°, turbulence {:.3}",
            j.velocity, j.direction_degrees, j.turbulence
        ),
        ModuleResult::Crosswind(c) => format!("{} pairs, misalignment {:.3}", c.crosswinds.len(), c.misalignment_index),
        ModuleResult::SynchronicityGravity(g) => format!("{} wells, strength {:.3}", g.wells.len(), g.gravity_strength),
        ModuleResult::IdentityPhase(p) => format!(
            "{} {:.0}% -> {} ({:.3})",
            p.phase,
            p.progress * 100.0,
            p.next_phase,
            p.transition_probability
        ),
    }
}

/// Short note on the widest archetype gate in a report.
pub fn gate_note(modules: &[ModuleResult]) -> Option<String> {
    modules.iter().find_map(|result| match result {
        ModuleResult::ArchetypeGates(gates) => gates
            .widest()
            .map(|g| format!("{} gate open at {:.0}%", g.archetype, g.openness * 100.0)),
        _ => None,
    })
}

fn generate_provenance_section(provenance: &Provenance) -> String {
    let mut section = String::new();

    section.push_str("## Provenance\n\n");
    section.push_str(&format!("- **Seed:** `{}`\n", provenance.seed));
    section.push_str(&format!("- **Date:** {}\n", provenance.date));
    section.push_str(&format!("- **Runes:** {}\n", list_or_default(&provenance.runes)));
    section.push_str(&format!(
        "- **Archetypes:** {}\n",
        list_or_default(&provenance.archetypes)
    ));
    section.push_str(&format!("- **Version:** {}\n\n", provenance.version));

    section
}

fn list_or_default(items: &[String]) -> String {
    if items.is_empty() {
        "(defaults)".to_string()
    } else {
        items.join(", ")
    }
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Generated by seedcast. Identical seed, date and inputs reproduce this report.*\n");

    footer
}

/// Markdown for one vector's diagnostics.
pub fn generate_diagnostics_markdown(diagnostics: &Diagnostics) -> String {
    let mut output = String::new();

    output.push_str("# Seedcast Diagnostics\n\n");
    output.push_str(&format!(
        "- **Computed:** {}\n- **Quality Score:** {:.3}\n\n",
        diagnostics.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        diagnostics.quality_score
    ));

    output.push_str("| Metric | Value |\n");
    output.push_str("|:---|:---:|\n");
    for (name, value) in diagnostics.metrics.named() {
        output.push_str(&format!("| {} | {:.4} |\n", name, value));
    }
    output.push('\n');

    if diagnostics.is_healthy() {
        output.push_str("No metric crossed its warning threshold.\n");
    } else {
        output.push_str("## Warnings\n\n");
        for warning in &diagnostics.warnings {
            output.push_str(&format!("- ⚠️ {}\n", warning));
        }
    }

    output
}

/// Markdown for a pipeline envelope.
///
/// Metric-snapshot data renders as diagnostics and composite-report data as
/// a layered report; other payloads are embedded as JSON.
pub fn generate_envelope_markdown(kind: PipelineKind, result: &PipelineResult) -> Result<String> {
    let mut output = String::new();

    output.push_str(&format!("# Pipeline `{}`\n\n", kind));
    let status = if result.success { "✅ success" } else { "❌ failure" };
    output.push_str(&format!("- **Status:** {}\n", status));
    output.push_str(&format!("- **Duration:** {}ms\n", result.metrics.duration_ms));
    for (label, value) in [
        ("Quality", result.metrics.quality),
        ("Drift", result.metrics.drift),
        ("Entropy", result.metrics.entropy),
    ] {
        if let Some(v) = value {
            output.push_str(&format!("- **{}:** {:.4}\n", label, v));
        }
    }
    if let Some(ref provenance) = result.provenance {
        output.push_str(&format!(
            "- **Execution:** `{}` (seed `{}`)\n",
            provenance.execution_id, provenance.seed
        ));
    }
    output.push('\n');

    if let Some(ref error) = result.error {
        output.push_str(&format!("> **Error:** {}\n\n", error));
    }

    let Some(ref data) = result.data else {
        return Ok(output);
    };

    let rendered = match kind {
        PipelineKind::MetricSnapshot => serde_json::from_value::<Diagnostics>(data.clone())
            .ok()
            .map(|d| generate_diagnostics_markdown(&d)),
        PipelineKind::CompositeReport => serde_json::from_value::<LayeredReport>(data.clone())
            .ok()
            .map(|r| generate_markdown_report(&r)),
        PipelineKind::DriftWatch | PipelineKind::BatchDiagnostics => None,
    };

    match rendered {
        Some(markdown) => output.push_str(&markdown),
        None => {
            output.push_str("```json\n");
            output.push_str(&serde_json::to_string_pretty(data)?);
            output.push_str("\n```\n");
        }
    }

    Ok(output)
}

/// Pretty JSON for any serializable output.
pub fn generate_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

/// Write rendered output to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ComputationCache;
    use crate::kernel::diagnose;
    use crate::hash::DirectHash;
    use crate::models::{Context as SeedContext, FeatureVector};
    use crate::orchestrator::{ModuleOrchestrator, OrchestratorInput};
    use crate::pipeline::{PipelineRegistry, StaticSnapshot, UpstreamSnapshot};
    use crate::scheduler::ExecutionContext;
    use chrono::Utc;
    use std::sync::Arc;

    fn create_test_report() -> LayeredReport {
        let mut input = OrchestratorInput::new("render-seed", "2025-01-15");
        input.archetypes = Some(vec!["hero".into(), "sage".into()]);
        ModuleOrchestrator::new(Arc::new(ComputationCache::new())).generate_report(&input)
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Seedcast Report"));
        assert!(markdown.contains("## Macro Layer"));
        assert!(markdown.contains("## Meso Layer"));
        assert!(markdown.contains("## Micro Layer"));
        assert!(markdown.contains("## Forecast"));
        assert!(markdown.contains("`render-seed`"));
        assert!(markdown.contains("hero, sage"));
        assert!(markdown.contains("synchronicity-gravity"));
        assert!(markdown.contains("identity transition"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json(&report).unwrap();
        assert!(json.contains("\"macro_layer\""));
        assert!(json.contains("\"seeded-deterministic\""));

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["provenance"]["version"], "1.0.0");
    }

    #[test]
    fn test_diagnostics_markdown() {
        let v = FeatureVector::new([("a", 0.5), ("b", 0.25)], Utc::now(), "s");
        let d = diagnose(&v, &SeedContext::new("s", "2025-01-15"), &DirectHash);
        let markdown = generate_diagnostics_markdown(&d);
        assert!(markdown.contains("| ITC |"));
        assert!(markdown.contains("Quality Score"));
    }

    #[test]
    fn test_failure_envelope_markdown() {
        let result = PipelineResult::failure("snapshot batch is empty", 4);
        let markdown = generate_envelope_markdown(PipelineKind::BatchDiagnostics, &result).unwrap();
        assert!(markdown.contains("❌ failure"));
        assert!(markdown.contains("snapshot batch is empty"));
        assert!(!markdown.contains("```json"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        write_report("# hello\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hello\n");
    }

    #[test]
    fn test_gate_note_reads_report_modules() {
        let report = create_test_report();
        let note = gate_note(&report.modules).unwrap();
        assert!(note.contains("gate open"));
        assert!(note.starts_with("hero") || note.starts_with("sage"));
        assert!(generate_markdown_report(&report).contains("Widest gate: "));
        assert!(gate_note(&[]).is_none());
    }

    #[test]
    fn test_envelope_markdown_renders_typed_payloads() {
        let registry = PipelineRegistry::new(
            Arc::new(ComputationCache::new()),
            Arc::new(StaticSnapshot::new(
                serde_json::from_str::<UpstreamSnapshot>(include_str!("../../fixtures/snapshot.json"))
                    .unwrap(),
            )),
        );
        let ctx = ExecutionContext {
            task_id: "render".to_string(),
            execution_id: "exec-render".to_string(),
            seed: "render-seed".to_string(),
            date: "2025-01-15".to_string(),
            started_at: Utc::now(),
        };
        let render = |kind: PipelineKind| {
            let result = tokio_test::block_on(registry.run(kind, ctx.clone()));
            assert!(result.success);
            generate_envelope_markdown(kind, &result).unwrap()
        };

        let snapshot = render(PipelineKind::MetricSnapshot);
        assert!(snapshot.contains("# Seedcast Diagnostics"));
        assert!(snapshot.contains("| ITC |"));
        assert!(!snapshot.contains("```json"));

        let composite = render(PipelineKind::CompositeReport);
        assert!(composite.contains("# Seedcast Report"));
        assert!(composite.contains("## Macro Layer"));

        let drift = render(PipelineKind::DriftWatch);
        assert!(drift.contains("```json"));
        assert!(drift.contains("`exec-render`"));
    }
}
