//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.seedcast.toml` files.

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::cli::OutputFormat;
use crate::models::TimestampMode;
use crate::pipeline::PipelineKind;
use crate::scheduler::{ContextSource, DailyContext, PinnedContext, Trigger};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".seedcast.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Kernel and module defaults.
    #[serde(default)]
    pub kernel: KernelConfig,

    /// Seed and date source.
    #[serde(default)]
    pub context: ContextConfig,

    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Pipelines registered when serving.
    #[serde(default = "default_pipelines")]
    pub pipelines: Vec<PipelineConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            kernel: KernelConfig::default(),
            context: ContextConfig::default(),
            scheduler: SchedulerConfig::default(),
            pipelines: default_pipelines(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Output file path. Stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Timestamp policy for vectors built from snapshots.
    #[serde(default)]
    pub timestamp_mode: TimestampMode,

    /// Archetypes used when a snapshot names none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_archetypes: Option<Vec<String>>,

    /// Runes used when a snapshot names none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_runes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedMode {
    /// A new `daily-<date>` seed each local day.
    #[default]
    Daily,
    /// The configured seed and date for every run.
    Pinned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub seed_mode: SeedMode,

    /// Seed used in pinned mode.
    #[serde(default = "default_seed")]
    pub seed: String,

    /// Date used in pinned mode. Today when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            seed_mode: SeedMode::default(),
            seed: default_seed(),
            date: None,
        }
    }
}

fn default_seed() -> String {
    "seedcast".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Trigger every enabled pipeline once before arming timers.
    #[serde(default)]
    pub run_on_start: bool,

    /// Seconds to serve before stopping. Until Ctrl-C when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_duration_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_on_start: false,
            run_duration_secs: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One scheduled pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,

    /// Overrides the pipeline's default trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_pipelines() -> Vec<PipelineConfig> {
    PipelineKind::ALL
        .iter()
        .map(|kind| PipelineConfig {
            name: kind.name().to_string(),
            trigger: None,
            enabled: true,
        })
        .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.seedcast.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings when given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        // An explicit seed pins the context
        if let Some(ref seed) = args.seed {
            self.context.seed = seed.clone();
            self.context.seed_mode = SeedMode::Pinned;
        }
        if let Some(ref date) = args.date {
            self.context.date = Some(date.clone());
            self.context.seed_mode = SeedMode::Pinned;
        }

        if let Some(format) = args.format {
            self.general.format = format;
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }
        if let Some(duration) = args.duration {
            self.scheduler.run_duration_secs = Some(duration);
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// The seed and date source for scheduled runs.
    pub fn context_source(&self) -> Arc<dyn ContextSource> {
        match self.context.seed_mode {
            SeedMode::Daily => Arc::new(DailyContext),
            SeedMode::Pinned => Arc::new(PinnedContext::new(
                self.context.seed.clone(),
                self.pinned_date(),
            )),
        }
    }

    /// Configured date, or today's local date.
    pub fn pinned_date(&self) -> String {
        self.context
            .date
            .clone()
            .unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string())
    }

    /// Pipelines to register, with unknown names logged and skipped.
    pub fn scheduled_pipelines(&self) -> Vec<(PipelineKind, Trigger, bool)> {
        self.pipelines
            .iter()
            .filter_map(|entry| match entry.name.parse::<PipelineKind>() {
                Ok(kind) => {
                    let trigger = entry.trigger.clone().unwrap_or_else(|| kind.default_trigger());
                    Some((kind, trigger, entry.enabled))
                }
                Err(e) => {
                    warn!("Skipping pipeline entry: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
