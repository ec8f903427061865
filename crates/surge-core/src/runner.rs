//! Run controller: spawns virtual users, drives the aggregator loop and stops
//! the run when the duration timer fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::info;

use crate::aggregator::Aggregator;
use crate::config::RunConfig;
use crate::error::{SetupError, SurgeResult};
use crate::event::{self, EventReceiver};
use crate::request::{NoopSetup, RequestContext, RequestSetup, ResponseRecord};
use crate::scenario::{Scenario, Template};
use crate::snapshot::Snapshot;
use crate::worker::{build_client, Sender};

/// Interval of the requests/sec and bytes/sec sampler.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// A configured load test, ready to run.
pub struct LoadTest {
    config: RunConfig,
    scenario: Scenario,
    setup: Arc<dyn RequestSetup>,
}

impl LoadTest {
    /// Create a load test that sends every template unmodified.
    pub fn new(config: RunConfig, scenario: Scenario) -> Self {
        Self {
            config,
            scenario,
            setup: Arc::new(NoopSetup),
        }
    }

    /// Use a custom setup hook.
    pub fn with_setup<S: RequestSetup>(mut self, setup: S) -> Self {
        self.setup = Arc::new(setup);
        self
    }

    /// Use a closure as the setup hook.
    pub fn with_setup_fn<F>(self, setup: F) -> Self
    where
        F: Fn(&Template, &mut RequestContext, Option<&ResponseRecord>) -> Result<(), SetupError>
            + Send
            + Sync
            + 'static,
    {
        self.with_setup(setup)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Run the load test.
    ///
    /// Returns `None` without spawning anything when the scenario is empty.
    /// Otherwise runs for the configured duration and returns the final snapshot.
    /// Worker tasks are aborted once the snapshot is taken.
    pub async fn run(&self) -> SurgeResult<Option<Snapshot>> {
        self.config.validate()?;

        if self.scenario.is_empty() {
            info!("No load test templates, nothing to run");
            return Ok(None);
        }

        let users = self.config.concurrent_users;
        let pipelining = self.config.pipelining;

        let mut aggregator = Aggregator::new(&self.config)?;
        let (events, mut receiver) = event::channel(self.config.channel_capacity());
        let base_url: Arc<str> = Arc::from(self.config.base_url.as_str());

        info!(
            name = %self.config.name,
            base_url = %self.config.base_url,
            users,
            pipelining,
            templates = self.scenario.len(),
            duration_secs = self.config.run_duration.as_secs_f64(),
            "Starting load test"
        );

        let mut workers = JoinSet::new();
        for user in 0..users {
            let client = build_client(&self.config)?;
            for lane in 0..pipelining {
                let sender = Sender::new(
                    user,
                    lane,
                    self.scenario.clone(),
                    base_url.clone(),
                    client.clone(),
                    self.setup.clone(),
                    events.clone(),
                    self.config.debug_request,
                );
                workers.spawn(sender.run());
            }
        }
        // Senders hold their own clones.
        drop(events);

        drive(&mut aggregator, &mut receiver, self.config.run_duration).await;
        let snapshot = aggregator.snapshot();

        // Abandon the workers; they are never signalled to stop cooperatively.
        workers.abort_all();

        info!(
            total_requests = snapshot.totals.total_requests,
            errors = snapshot.totals.errors,
            duration_secs = snapshot.duration_secs,
            "Load test complete"
        );

        Ok(Some(snapshot))
    }
}

/// Consume events until the duration timer fires, sampling once per second.
async fn drive(aggregator: &mut Aggregator, events: &mut EventReceiver, run_duration: Duration) {
    let deadline = sleep(run_duration);
    tokio::pin!(deadline);

    let mut ticker = interval_at(Instant::now() + SAMPLE_INTERVAL, SAMPLE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut responses_open = true;
    let mut errors_open = true;

    loop {
        tokio::select! {
            _ = &mut deadline => {
                aggregator.stop();
                return;
            }
            _ = ticker.tick() => aggregator.on_tick(),
            response = events.responses.recv(), if responses_open => match response {
                Some(record) => aggregator.on_response(&record),
                None => responses_open = false,
            },
            error = events.errors.recv(), if errors_open => match error {
                Some(error) => aggregator.on_error(&error),
                None => errors_open = false,
            },
        }
    }
}
