//! Command-line front end for the surge load generator.
//!
//! This crate provides:
//! - YAML scenario files with per-step JSON bodies
//! - Placeholder expansion in bodies (random numbers, choices, previous response fields)
//! - Table, JSON and CSV rendering of the final snapshot

pub mod body;
pub mod config;
pub mod report;

pub use body::{BodySetup, BodyTemplate};
pub use config::{DebugConfig, ScenarioFile, StepConfig};
pub use report::ResultsReport;

use surge_core::LoadTest;

/// Build a ready-to-run load test from a scenario file.
pub fn build_load_test(file: &ScenarioFile) -> anyhow::Result<LoadTest> {
    let scenario = file.scenario()?;
    let setup = file.setup()?;
    Ok(LoadTest::new(file.run_config(), scenario).with_setup(setup))
}
