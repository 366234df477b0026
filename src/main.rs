//! Seedcast - deterministic seed-derived analytics
//!
//! A CLI that computes reproducible metric sets and layered reports from a
//! seed, a date and an upstream snapshot, and runs them as scheduled
//! pipelines.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, snapshot file, output, etc.)
//!   2 - A pipeline ran but reported failure

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use seedcast::cache::ComputationCache;
use seedcast::cli::{Args, Mode, OutputFormat};
use seedcast::config::{Config, DEFAULT_CONFIG_FILE};
use seedcast::orchestrator::{ModuleOrchestrator, OrchestratorInput};
use seedcast::pipeline::{PipelineKind, PipelineRegistry, StaticSnapshot, UpstreamSnapshot};
use seedcast::report;
use seedcast::scheduler::{ExecutionContext, ExecutionStatus, TaskScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so `[general] verbose` can raise the log level
    let loaded = load_config(&args);
    let config_verbose = loaded
        .as_ref()
        .map(|(config, _)| config.general.verbose)
        .unwrap_or(false);

    // Initialize logging
    init_logging(&args, config_verbose);

    info!("Seedcast v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let outcome = match loaded {
        Ok((config, origin)) => {
            origin.log();
            run(args, config).await
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .seedcast.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", DEFAULT_CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to pin the seed, change triggers, or disable pipelines.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config_verbose: bool) {
    let level = args.log_level(config_verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Dispatch to the selected mode. Returns the exit code.
async fn run(args: Args, mut config: Config) -> Result<i32> {
    config.merge_with_args(&args);

    match args.mode() {
        Mode::ListPipelines => {
            list_pipelines();
            Ok(0)
        }
        Mode::Pipeline(kind) => run_pipeline(kind, &args, &config).await,
        Mode::Report => run_report(&args, &config),
        Mode::Serve => serve(&args, &config).await,
    }
}

fn list_pipelines() {
    println!("📋 Available pipelines:\n");
    for kind in PipelineKind::ALL {
        println!(
            "   {:<18} {:<28} {}",
            kind.name(),
            kind.default_trigger().to_string(),
            kind.description()
        );
    }
}

/// Run one pipeline once against the snapshot.
async fn run_pipeline(kind: PipelineKind, args: &Args, config: &Config) -> Result<i32> {
    let registry = build_registry(args, config)?;
    let run_ctx = config.context_source().next_context();
    let ctx = ExecutionContext {
        task_id: kind.name().to_string(),
        execution_id: uuid::Uuid::new_v4().to_string(),
        seed: run_ctx.seed,
        date: run_ctx.date,
        started_at: Utc::now(),
    };

    info!("Running pipeline '{}' (seed '{}', date {})", kind, ctx.seed, ctx.date);
    let result = registry.run(kind, ctx).await;

    let rendered = match config.general.format {
        OutputFormat::Json => report::generate_json(&result)?,
        OutputFormat::Markdown => report::generate_envelope_markdown(kind, &result)?,
    };
    emit(&rendered, config)?;

    if result.success {
        Ok(0)
    } else {
        eprintln!("\n⛔ Pipeline '{}' reported failure (exit code 2).", kind);
        Ok(2)
    }
}

/// Render a layered report for the configured seed and date.
fn run_report(args: &Args, config: &Config) -> Result<i32> {
    let snapshot = load_snapshot(args, config)?;
    let run_ctx = config.context_source().next_context();

    let input = OrchestratorInput {
        seed: run_ctx.seed,
        date: run_ctx.date,
        runes: snapshot.runes,
        archetypes: snapshot.archetypes,
        upstream: snapshot.upstream,
    };

    let orchestrator = ModuleOrchestrator::new(Arc::new(ComputationCache::new()))
        .with_timestamp_mode(config.kernel.timestamp_mode);
    let report = orchestrator.generate_report(&input);
    if let Some(note) = report::gate_note(&report.modules) {
        debug!("{}", note);
    }

    let rendered = match config.general.format {
        OutputFormat::Json => report::generate_json(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };
    emit(&rendered, config)?;

    info!(
        "Report for '{}' ready: quality {:.3}, dominant {}",
        report.provenance.seed, report.metadata.quality_score, report.macro_layer.dominant.kind
    );
    Ok(0)
}

/// Run the scheduler until the duration elapses or Ctrl-C.
async fn serve(args: &Args, config: &Config) -> Result<i32> {
    let registry = build_registry(args, config)?;
    let scheduler = TaskScheduler::new(config.context_source());

    for (kind, trigger, enabled) in config.scheduled_pipelines() {
        info!("Registering '{}' on {} (enabled: {})", kind, trigger, enabled);
        scheduler.register_task(registry.task(kind, trigger, enabled));
    }

    if config.scheduler.run_on_start {
        for task in scheduler.list_tasks().into_iter().filter(|t| t.enabled) {
            let execution = scheduler.trigger_task(&task.id).await?;
            info!("Initial run of '{}': {}", task.id, execution.status);
        }
    }

    scheduler.start();
    let status = scheduler.status();
    println!(
        "⏱️  Scheduler running: {} tasks, {} enabled. Press Ctrl-C to stop.",
        status.tasks, status.enabled
    );

    match config.scheduler.run_duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("Run duration of {}s elapsed", secs);
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Interrupted");
        }
    }

    scheduler.stop();

    let in_flight = scheduler.status().in_flight;
    if in_flight > 0 {
        info!("{} executions still running; their results are not in this summary", in_flight);
    }

    let executions = scheduler.recent_executions(usize::MAX);
    let failed = executions
        .iter()
        .filter(|e| e.status == ExecutionStatus::Failed)
        .count();
    let cache = registry.cache().stats();

    println!("\n📊 Scheduler Summary:");
    println!("   Executions: {} ({} failed)", executions.len(), failed);
    for execution in executions.iter().take(10) {
        println!(
            "   - {} {} {}ms",
            execution.task_id,
            execution.status,
            execution.duration_ms.unwrap_or(0)
        );
    }
    println!(
        "   Cache: {} metric sets, {} hits, {} misses",
        cache.metric_entries, cache.hits, cache.misses
    );

    Ok(0)
}

fn build_registry(args: &Args, config: &Config) -> Result<PipelineRegistry> {
    let snapshot = load_snapshot(args, config)?;
    Ok(PipelineRegistry::new(
        Arc::new(ComputationCache::new()),
        Arc::new(StaticSnapshot::new(snapshot)),
    )
    .with_timestamp_mode(config.kernel.timestamp_mode))
}

/// Load the snapshot file, filling tag lists from config defaults.
fn load_snapshot(args: &Args, config: &Config) -> Result<UpstreamSnapshot> {
    let mut snapshot = match args.snapshot {
        Some(ref path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read snapshot file: {}", path.display()))?;
            serde_json::from_str::<UpstreamSnapshot>(&content)
                .with_context(|| format!("Failed to parse snapshot file: {}", path.display()))?
        }
        None => {
            debug!("No snapshot file given, using an empty snapshot");
            UpstreamSnapshot::default()
        }
    };

    if snapshot.archetypes.is_none() {
        snapshot.archetypes = config.kernel.default_archetypes.clone();
    }
    if snapshot.runes.is_none() {
        snapshot.runes = config.kernel.default_runes.clone();
    }

    Ok(snapshot)
}

/// Print to stdout or write to the configured output file.
fn emit(content: &str, config: &Config) -> Result<()> {
    match config.general.output {
        Some(ref output) => {
            let path = Path::new(output);
            report::write_report(content, path)?;
            println!("✅ Output saved to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

/// Where the configuration came from, logged once tracing is up.
enum ConfigOrigin {
    Explicit(PathBuf),
    DefaultFile,
    Defaults,
    Fallback(anyhow::Error),
}

impl ConfigOrigin {
    fn log(&self) {
        match self {
            ConfigOrigin::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigOrigin::DefaultFile => info!("Loaded default config from {}", DEFAULT_CONFIG_FILE),
            ConfigOrigin::Defaults => debug!("No config file found, using defaults"),
            ConfigOrigin::Fallback(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigOrigin::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigOrigin::Defaults)),
        Err(e) => Ok((Config::default(), ConfigOrigin::Fallback(e))),
    }
}
