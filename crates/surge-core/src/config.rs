//! Run configuration.

use std::time::Duration;

use reqwest::Url;

use crate::error::{SurgeError, SurgeResult};

/// Parameters of a single load test run. Immutable once the run starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Label carried into the final snapshot.
    pub name: String,
    /// Target base address; template paths are appended verbatim.
    pub base_url: String,
    /// Number of virtual users.
    pub concurrent_users: u32,
    /// Wall-clock length of the run.
    pub run_duration: Duration,
    /// Independent senders per virtual user, all sharing the user's client.
    pub pipelining: u32,
    /// Log transport errors and non-2xx bodies as they arrive.
    pub debug_error: bool,
    /// Log each request before it is sent.
    pub debug_request: bool,
    /// Log the body of each 2xx response.
    pub debug_response: bool,
}

impl RunConfig {
    pub fn new(base_url: impl Into<String>, concurrent_users: u32, run_duration: Duration) -> Self {
        Self {
            name: "surge".to_string(),
            base_url: base_url.into(),
            concurrent_users,
            run_duration,
            pipelining: 1,
            debug_error: false,
            debug_request: false,
            debug_response: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_pipelining(mut self, pipelining: u32) -> Self {
        self.pipelining = pipelining;
        self
    }

    pub fn with_debug(mut self, error: bool, request: bool, response: bool) -> Self {
        self.debug_error = error;
        self.debug_request = request;
        self.debug_response = response;
        self
    }

    /// Capacity of each event channel.
    pub fn channel_capacity(&self) -> usize {
        2 * self.concurrent_users as usize * self.pipelining as usize
    }

    /// Validate configuration.
    pub fn validate(&self) -> SurgeResult<()> {
        if self.concurrent_users == 0 {
            return Err(SurgeError::InvalidConfig(
                "concurrent_users must be > 0".to_string(),
            ));
        }
        if self.run_duration.is_zero() {
            return Err(SurgeError::InvalidConfig(
                "run_duration must be > 0".to_string(),
            ));
        }
        if self.pipelining == 0 {
            return Err(SurgeError::InvalidConfig(
                "pipelining must be > 0".to_string(),
            ));
        }

        let url = Url::parse(&self.base_url).map_err(|e| {
            SurgeError::InvalidConfig(format!("base_url '{}': {}", self.base_url, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(SurgeError::InvalidConfig(format!(
                "base_url scheme must be http or https, got '{}'",
                other
            ))),
        }
    }
}
