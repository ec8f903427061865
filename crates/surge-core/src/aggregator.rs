//! Single-consumer metrics aggregation.
//!
//! All counters and histograms live here and are mutated only by the run
//! controller's loop; workers talk to it exclusively through event channels.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::{SurgeResult, TransportError};
use crate::histogram::BoundedHistogram;
use crate::request::ResponseRecord;
use crate::snapshot::{Snapshot, Totals};

/// Lifecycle of a run. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
}

/// Rolling per-second counters, drained on every sampler tick.
#[derive(Debug, Default, Clone, Copy)]
struct Sampler {
    responses: u64,
    bytes: u64,
}

impl Sampler {
    fn add(&mut self, bytes: u64) {
        self.responses += 1;
        self.bytes += bytes;
    }

    fn take(&mut self) -> (u64, u64) {
        let sample = (self.responses, self.bytes);
        *self = Self::default();
        sample
    }
}

/// Collects metrics during load test execution.
#[derive(Debug)]
pub struct Aggregator {
    state: RunState,
    name: String,
    concurrent_users: u32,
    pipelining: u32,
    started_at: DateTime<Utc>,
    start: Instant,
    stopped: Option<Instant>,
    latency: BoundedHistogram,
    requests: BoundedHistogram,
    throughput: BoundedHistogram,
    sampler: Sampler,
    totals: Totals,
    debug_error: bool,
    debug_response: bool,
}

impl Aggregator {
    /// Create an aggregator in the `Running` state.
    pub fn new(config: &RunConfig) -> SurgeResult<Self> {
        Ok(Self {
            state: RunState::Running,
            name: config.name.clone(),
            concurrent_users: config.concurrent_users,
            pipelining: config.pipelining,
            started_at: Utc::now(),
            start: Instant::now(),
            stopped: None,
            latency: BoundedHistogram::latency()?,
            requests: BoundedHistogram::requests()?,
            throughput: BoundedHistogram::throughput()?,
            sampler: Sampler::default(),
            totals: Totals::default(),
            debug_error: config.debug_error,
            debug_response: config.debug_response,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn latency(&self) -> &BoundedHistogram {
        &self.latency
    }

    pub fn requests(&self) -> &BoundedHistogram {
        &self.requests
    }

    pub fn throughput(&self) -> &BoundedHistogram {
        &self.throughput
    }

    /// Record a completed response. Latency is only recorded for 2xx statuses.
    pub fn on_response(&mut self, record: &ResponseRecord) {
        if self.state == RunState::Stopped {
            return;
        }

        self.totals.total_requests += 1;
        self.totals.total_bytes += record.size;

        if record.is_success() {
            self.latency.record(record.latency_ms);
            self.totals.responses_2xx += 1;
            self.sampler.add(record.size);
            if self.debug_response {
                info!(
                    target: "surge::debug",
                    status = record.status,
                    body = %record.body,
                    "debug 2xx response"
                );
            }
        } else {
            self.totals.responses_non_2xx += 1;
            if self.debug_error {
                info!(
                    target: "surge::debug",
                    status = record.status,
                    body = %record.body,
                    "debug non 2xx response"
                );
            }
        }
    }

    /// Record a transport failure.
    pub fn on_error(&mut self, error: &TransportError) {
        if self.state == RunState::Stopped {
            return;
        }

        self.totals.errors += 1;
        if error.is_timeout() {
            self.totals.timeouts += 1;
        }
        if self.debug_error {
            info!(
                target: "surge::debug",
                error = %error,
                timeout = error.is_timeout(),
                "debug error"
            );
        }
    }

    /// Move the current second's counters into the windowed histograms.
    pub fn on_tick(&mut self) {
        if self.state == RunState::Stopped {
            return;
        }

        let (responses, bytes) = self.sampler.take();
        self.requests.record(responses);
        self.throughput.record(bytes);
        debug!(responses, bytes, "Sampled one second");
    }

    /// Transition to `Stopped`. Returns `true` only on the first call.
    ///
    /// The incomplete current second is discarded.
    pub fn stop(&mut self) -> bool {
        if self.state == RunState::Stopped {
            return false;
        }
        self.state = RunState::Stopped;
        self.stopped = Some(Instant::now());
        true
    }

    /// Generate the final test results.
    pub fn snapshot(&self) -> Snapshot {
        let elapsed = self
            .stopped
            .unwrap_or_else(Instant::now)
            .duration_since(self.start);

        Snapshot {
            name: self.name.clone(),
            started_at: self.started_at.to_rfc3339(),
            duration_secs: elapsed.as_secs_f64(),
            concurrent_users: self.concurrent_users,
            pipelining: self.pipelining,
            latency_ms: self.latency.summary(),
            requests_per_sec: self.requests.summary(),
            bytes_per_sec: self.throughput.summary(),
            totals: self.totals,
        }
    }
}
