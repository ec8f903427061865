//! Scenario file loading and validation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use surge_core::{RunConfig, Scenario, Template};

use crate::body::{BodySetup, BodyTemplate};

/// Load test scenario loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_url: String,
    pub concurrent_users: u32,
    pub duration_secs: u64,
    #[serde(default = "default_pipelining")]
    pub pipelining: u32,
    #[serde(default)]
    pub seed: Option<u64>, // Optional RNG seed for reproducible bodies
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

fn default_pipelining() -> u32 {
    1
}

/// Which events are logged as they arrive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebugConfig {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub request: bool,
    #[serde(default)]
    pub response: bool,
}

/// One scenario step: the request template fields plus an optional JSON body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub id: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl StepConfig {
    /// The request template this step sends.
    pub fn template(&self) -> Template {
        Template {
            id: self.id.clone(),
            path: self.path.clone(),
            method: self.method.clone(),
            timeout_ms: self.timeout_ms,
            headers: self.headers.clone(),
        }
    }
}

impl ScenarioFile {
    /// Load a scenario from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validate the scenario, including every body template.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.duration_secs == 0 {
            anyhow::bail!("duration_secs must be > 0");
        }
        if self.concurrent_users == 0 {
            anyhow::bail!("concurrent_users must be > 0");
        }
        if self.pipelining == 0 {
            anyhow::bail!("pipelining must be > 0");
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                anyhow::bail!("duplicate step id {:?}", step.id);
            }
        }

        self.run_config().validate()?;
        self.scenario()?;
        self.setup()?;
        Ok(())
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig::new(
            self.base_url.clone(),
            self.concurrent_users,
            Duration::from_secs(self.duration_secs),
        )
        .with_name(self.name.clone())
        .with_pipelining(self.pipelining)
        .with_debug(self.debug.error, self.debug.request, self.debug.response)
    }

    pub fn scenario(&self) -> anyhow::Result<Scenario> {
        let templates = self.steps.iter().map(StepConfig::template).collect();
        Ok(Scenario::new(templates)?)
    }

    /// Build the body setup hook from the steps that carry a body.
    pub fn setup(&self) -> anyhow::Result<BodySetup> {
        let mut bodies = HashMap::new();
        for step in &self.steps {
            if let Some(body) = &step.body {
                let parsed = BodyTemplate::parse(body)
                    .with_context(|| format!("step {:?} has an invalid body", step.id))?;
                bodies.insert(step.id.clone(), parsed);
            }
        }
        Ok(BodySetup::new(bodies, self.seed))
    }
}
