//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::parse_context_date;
use crate::pipeline::PipelineKind;

/// Seedcast - deterministic seed-derived analytics and scheduled pipelines
///
/// Computes reproducible metric sets and layered reports from a seed, a
/// date and an upstream snapshot, and runs them on cron, interval or
/// calendar triggers.
///
/// Examples:
///   seedcast --list-pipelines
///   seedcast --pipeline metric-snapshot --snapshot snapshot.json
///   seedcast --report --seed alpha --date 2025-01-15 --format json
///   seedcast --serve --duration 600
///   seedcast --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .seedcast.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON file holding the upstream snapshot
    ///
    /// Features, optional prior and batch vectors, upstream metrics and tags.
    /// An empty snapshot is used when omitted.
    #[arg(short, long, value_name = "FILE", env = "SEEDCAST_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Seed for every derivation. Pins the context.
    #[arg(long, env = "SEEDCAST_SEED")]
    pub seed: Option<String>,

    /// Context date (YYYY-MM-DD or RFC 3339). Pins the context.
    #[arg(short, long)]
    pub date: Option<String>,

    /// Run one pipeline once and print its envelope
    #[arg(short, long, value_name = "NAME")]
    pub pipeline: Option<String>,

    /// Render a layered report for the seed and date
    #[arg(short, long)]
    pub report: bool,

    /// Run the scheduler with every configured pipeline
    #[arg(long)]
    pub serve: bool,

    /// Seconds to serve before stopping (default: until Ctrl-C)
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// List the available pipelines and their default triggers
    #[arg(long)]
    pub list_pipelines: bool,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .seedcast.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for rendered results.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// What a single invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    ListPipelines,
    Pipeline(PipelineKind),
    Report,
    Serve,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        let modes = [
            self.list_pipelines,
            self.pipeline.is_some(),
            self.report,
            self.serve,
        ]
        .iter()
        .filter(|m| **m)
        .count();
        if modes == 0 {
            return Err(
                "Nothing to do: pass --pipeline, --report, --serve or --list-pipelines".to_string(),
            );
        }
        if modes > 1 {
            return Err(
                "--pipeline, --report, --serve and --list-pipelines are mutually exclusive"
                    .to_string(),
            );
        }

        if let Some(ref name) = self.pipeline {
            name.parse::<PipelineKind>().map_err(|e| e.to_string())?;
        }

        if let Some(ref date) = self.date {
            parse_context_date(date).map_err(|e| e.to_string())?;
        }

        if let Some(ref seed) = self.seed {
            if seed.trim().is_empty() {
                return Err("Seed must not be empty".to_string());
            }
        }

        if self.duration.is_some() && !self.serve {
            return Err("--duration only applies to --serve".to_string());
        }
        if self.duration == Some(0) {
            return Err("Duration must be at least 1 second".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref snapshot) = self.snapshot {
            if !snapshot.is_file() {
                return Err(format!("Snapshot file does not exist: {}", snapshot.display()));
            }
        }

        Ok(())
    }

    /// The selected mode. Call after [`Args::validate`].
    pub fn mode(&self) -> Mode {
        if let Some(kind) = self.pipeline.as_deref().and_then(|n| n.parse().ok()) {
            Mode::Pipeline(kind)
        } else if self.report {
            Mode::Report
        } else if self.serve {
            Mode::Serve
        } else {
            Mode::ListPipelines
        }
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `--quiet` wins over a config file that asks for verbose output.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            snapshot: None,
            seed: Some("test-seed".to_string()),
            date: Some("2025-01-15".to_string()),
            pipeline: None,
            report: true,
            serve: false,
            duration: None,
            list_pipelines: false,
            format: None,
            output: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_valid_report_args() {
        let args = make_args();
        assert!(args.validate().is_ok());
        assert_eq!(args.mode(), Mode::Report);
    }

    #[test]
    fn test_validation_requires_one_mode() {
        let mut args = make_args();
        args.report = false;
        assert!(args.validate().is_err());

        args.report = true;
        args.serve = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_unknown_pipeline() {
        let mut args = make_args();
        args.report = false;
        args.pipeline = Some("weather".to_string());
        assert!(args.validate().unwrap_err().contains("weather"));

        args.pipeline = Some("drift-watch".to_string());
        assert!(args.validate().is_ok());
        assert_eq!(args.mode(), Mode::Pipeline(PipelineKind::DriftWatch));
    }

    #[test]
    fn test_validation_invalid_date() {
        let mut args = make_args();
        args.date = Some("15/01/2025".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_duration_needs_serve() {
        let mut args = make_args();
        args.duration = Some(10);
        assert!(args.validate().is_err());

        args.report = false;
        args.serve = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.report = false;
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
