//! Scenario-driven HTTP load generation engine.
//!
//! This crate provides:
//! - An ordered, cyclic scenario of request templates
//! - Virtual users that replay the scenario against a target service
//! - A single-consumer aggregator fed through bounded event channels
//! - Per-second sampling of request and byte rates into HDR histograms
//! - A final [`Snapshot`] of latency, throughput and error totals

pub mod aggregator;
pub mod config;
pub mod error;
pub mod event;
pub mod histogram;
pub mod request;
pub mod runner;
pub mod scenario;
pub mod snapshot;
pub mod worker;

pub use aggregator::{Aggregator, RunState};
pub use config::RunConfig;
pub use error::{ErrorKind, SetupError, SurgeError, SurgeResult, TransportError};
pub use histogram::BoundedHistogram;
pub use request::{NoopSetup, RequestContext, RequestSetup, ResponseRecord};
pub use runner::LoadTest;
pub use scenario::{Scenario, ScenarioCursor, Template};
pub use snapshot::{format_big_num, format_bytes, HistogramSummary, Snapshot, Totals};
