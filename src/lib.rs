//! Seedcast library.
//!
//! Deterministic seed-derived analytics: a metric kernel over feature
//! vectors, a memoizing cache, fifteen generator modules with layered
//! report aggregation, and a trigger-based task scheduler that runs the
//! analytics as pipelines.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod kernel;
pub mod models;
pub mod modules;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod scheduler;

pub use error::{Result, SeedcastError};
