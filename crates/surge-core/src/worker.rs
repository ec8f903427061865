//! Virtual user sender loop.
//!
//! Each sender replays the scenario forever: advance the cursor, build the
//! request, run the setup hook, send, and emit exactly one event per
//! completed network attempt. Setup failures restart the cycle silently.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{info, trace};

use crate::config::RunConfig;
use crate::error::{SurgeResult, TransportError};
use crate::event::{ChannelClosed, EventSender};
use crate::request::{response_size, RequestContext, RequestSetup, ResponseRecord};
use crate::scenario::{Scenario, ScenarioCursor};

/// What one iteration of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The setup hook refused; nothing was sent and the cursor restarted.
    SetupFailed,
    /// The call failed at the transport level; an error event was emitted.
    Failed,
    /// The call completed; a response event was emitted.
    Completed,
}

/// Build the client owned by one virtual user.
pub fn build_client(config: &RunConfig) -> SurgeResult<Client> {
    let client = Client::builder()
        .pool_max_idle_per_host(config.pipelining as usize)
        .build()?;
    Ok(client)
}

/// One independent sender. A virtual user runs `pipelining` of these over a shared client.
pub struct Sender {
    user: u32,
    lane: u32,
    scenario: Scenario,
    base_url: Arc<str>,
    client: Client,
    setup: Arc<dyn RequestSetup>,
    events: EventSender,
    debug_request: bool,

    cursor: ScenarioCursor,
    request: RequestContext,
    previous: Option<Arc<ResponseRecord>>,
}

impl Sender {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user: u32,
        lane: u32,
        scenario: Scenario,
        base_url: Arc<str>,
        client: Client,
        setup: Arc<dyn RequestSetup>,
        events: EventSender,
        debug_request: bool,
    ) -> Self {
        let cursor = scenario.cursor();
        Self {
            user,
            lane,
            scenario,
            base_url,
            client,
            setup,
            events,
            debug_request,
            cursor,
            request: RequestContext::new(),
            previous: None,
        }
    }

    /// Loop until the aggregator goes away or the task is aborted.
    pub async fn run(mut self) {
        trace!(user = self.user, lane = self.lane, "Sender started");
        while self.step().await.is_ok() {}
        trace!(user = self.user, lane = self.lane, "Sender stopped");
    }

    /// Index of the template the last step used, `None` before the first step
    /// or right after a setup failure.
    pub fn position(&self) -> Option<usize> {
        self.cursor.position()
    }

    /// Run one iteration.
    pub async fn step(&mut self) -> Result<StepOutcome, ChannelClosed> {
        let advance = self.cursor.advance();
        if advance.wrapped {
            self.previous = None;
        }
        let template = &self.scenario.templates()[advance.index];

        let prepared = self
            .request
            .apply_template(template, &self.base_url)
            .and_then(|_| {
                self.setup
                    .setup(template, &mut self.request, self.previous.as_deref())
            });

        if let Err(err) = prepared {
            trace!(
                user = self.user,
                template = %template.id,
                error = %err,
                "Setup failed, restarting scenario"
            );
            self.cursor.restart();
            self.previous = None;
            // No network I/O on this path, so give other tasks a turn.
            tokio::task::yield_now().await;
            return Ok(StepOutcome::SetupFailed);
        }

        if self.debug_request {
            info!(
                target: "surge::debug",
                method = %self.request.method(),
                url = %self.request.url(),
                body = %self.request.body_text(),
                "debug request"
            );
        }

        match execute(&self.client, &self.request, template.timeout()).await {
            Ok(record) => {
                let record = Arc::new(record);
                self.previous = Some(record.clone());
                self.events.response(record).await?;
                Ok(StepOutcome::Completed)
            }
            Err(err) => {
                self.previous = None;
                self.events.error(err).await?;
                Ok(StepOutcome::Failed)
            }
        }
    }
}

/// Send one request and read the full body.
async fn execute(
    client: &Client,
    request: &RequestContext,
    timeout: Duration,
) -> Result<ResponseRecord, TransportError> {
    let start = Instant::now();

    let response = request
        .to_request(client)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| TransportError::classify(&e))?;

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|e| TransportError::classify(&e))?;

    let latency_ms = start.elapsed().as_millis() as u64;
    let size = response_size(body.len(), &headers);

    Ok(ResponseRecord::new(
        status,
        latency_ms,
        size,
        String::from_utf8_lossy(&body).into_owned(),
    ))
}
