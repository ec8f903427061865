//! Scenario model: an ordered, cyclic sequence of request templates.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::error::{SurgeError, SurgeResult};

/// Timeout applied when a template leaves it unset.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// A single request template in a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Template {
    pub id: String,
    pub path: String,
    /// HTTP method; GET when missing or empty.
    #[serde(default)]
    pub method: Option<String>,
    /// Per-call timeout in milliseconds; 0 means [`DEFAULT_TIMEOUT`].
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Template {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Per-call timeout, rounded up to whole milliseconds. `Duration::ZERO` means the default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let mut millis = timeout.as_millis();
        if timeout.subsec_nanos() % 1_000_000 != 0 {
            millis += 1;
        }
        self.timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The HTTP method, defaulting to GET.
    pub fn method(&self) -> Method {
        match self.method.as_deref() {
            None | Some("") => Method::GET,
            Some(m) => Method::from_bytes(m.as_bytes()).unwrap_or(Method::GET),
        }
    }

    /// The per-call timeout, defaulting to 3 seconds.
    pub fn timeout(&self) -> Duration {
        if self.timeout_ms == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_millis(self.timeout_ms)
        }
    }

    /// Full target address: plain concatenation of base and path.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.path)
    }

    fn validate(&self) -> SurgeResult<()> {
        let invalid = |message: String| SurgeError::InvalidTemplate {
            id: self.id.clone(),
            message,
        };

        if let Some(method) = self.method.as_deref().filter(|m| !m.is_empty()) {
            Method::from_bytes(method.as_bytes())
                .map_err(|_| invalid(format!("invalid method '{}'", method)))?;
        }
        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| invalid(format!("invalid header name '{}'", name)))?;
            HeaderValue::from_str(value)
                .map_err(|_| invalid(format!("invalid value for header '{}'", name)))?;
        }
        Ok(())
    }
}

/// Immutable ordered list of templates, cheap to clone across workers.
#[derive(Debug, Clone)]
pub struct Scenario {
    templates: Arc<[Template]>,
}

impl Scenario {
    /// Build a scenario, rejecting templates whose method or headers are not valid HTTP.
    pub fn new(templates: Vec<Template>) -> SurgeResult<Self> {
        for template in &templates {
            template.validate()?;
        }
        Ok(Self {
            templates: templates.into(),
        })
    }

    pub fn empty() -> Self {
        Self {
            templates: Vec::new().into(),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Template> {
        self.templates.get(index)
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// A fresh cursor positioned before the first template.
    pub fn cursor(&self) -> ScenarioCursor {
        ScenarioCursor::new(self.len())
    }
}

/// Result of advancing a [`ScenarioCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub index: usize,
    /// The cursor ran past the last template and wrapped to 0.
    pub wrapped: bool,
}

/// Position of one sender within the scenario cycle.
#[derive(Debug, Clone)]
pub struct ScenarioCursor {
    position: Option<usize>,
    len: usize,
}

impl ScenarioCursor {
    pub fn new(len: usize) -> Self {
        Self {
            position: None,
            len,
        }
    }

    /// Move to the next template, wrapping to 0 past the end.
    pub fn advance(&mut self) -> Advance {
        let mut index = self.position.map_or(0, |p| p + 1);
        let wrapped = index >= self.len;
        if wrapped {
            index = 0;
        }
        self.position = Some(index);
        Advance { index, wrapped }
    }

    /// Go back to "before first" so the next advance lands on template 0.
    pub fn restart(&mut self) {
        self.position = None;
    }

    /// Current template index, `None` before the first advance.
    pub fn position(&self) -> Option<usize> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_defaults() {
        let template = Template::new("0", "/api");
        assert_eq!(template.method(), Method::GET);
        assert_eq!(template.timeout(), Duration::from_secs(3));
        assert_eq!(template.url("http://localhost:8080"), "http://localhost:8080/api");

        let template = Template::new("1", "/register")
            .with_method("POST")
            .with_timeout(Duration::from_secs(6));
        assert_eq!(template.method(), Method::POST);
        assert_eq!(template.timeout(), Duration::from_secs(6));
    }

    #[test]
    fn test_sub_millisecond_timeout_is_kept() {
        let template = Template::new("0", "/").with_timeout(Duration::from_micros(500));
        assert_eq!(template.timeout_ms, 1);
        assert_eq!(template.timeout(), Duration::from_millis(1));

        let template = Template::new("0", "/").with_timeout(Duration::from_micros(1500));
        assert_eq!(template.timeout(), Duration::from_millis(2));

        let template = Template::new("0", "/").with_timeout(Duration::ZERO);
        assert_eq!(template.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let template = Template::new("0", "/").with_timeout(Duration::MAX);
        assert_eq!(template.timeout_ms, u64::MAX);
    }

    #[test]
    fn test_template_rejects_unknown_fields() {
        let yaml = "id: \"0\"\npath: /x\ntimeout: 6000\n";
        assert!(serde_yaml::from_str::<Template>(yaml).is_err());

        let yaml = "id: \"0\"\npath: /x\nurl_path: /y\n";
        assert!(serde_yaml::from_str::<Template>(yaml).is_err());
    }

    #[test]
    fn test_empty_method_is_get() {
        let template = Template::new("0", "/").with_method("");
        assert_eq!(template.method(), Method::GET);
    }

    #[test]
    fn test_url_is_plain_concatenation() {
        let template = Template::new("0", "/search?q=a b");
        assert_eq!(template.url("http://host/"), "http://host//search?q=a b");
    }

    #[test]
    fn test_scenario_rejects_invalid_method() {
        let result = Scenario::new(vec![Template::new("bad", "/").with_method("GE T")]);
        assert!(matches!(
            result,
            Err(SurgeError::InvalidTemplate { ref id, .. }) if id == "bad"
        ));
    }

    #[test]
    fn test_scenario_rejects_invalid_header() {
        let result = Scenario::new(vec![Template::new("h", "/").with_header("Bad Header", "x")]);
        assert!(result.is_err());

        let result = Scenario::new(vec![Template::new("h", "/").with_header("X-Ok", "line\nbreak")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cursor_cycles_without_skipping() {
        let mut cursor = ScenarioCursor::new(3);
        assert_eq!(cursor.position(), None);

        let indices: Vec<usize> = (0..7).map(|_| cursor.advance().index).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_cursor_reports_wrap() {
        let mut cursor = ScenarioCursor::new(2);
        assert!(!cursor.advance().wrapped);
        assert!(!cursor.advance().wrapped);
        let step = cursor.advance();
        assert_eq!(step.index, 0);
        assert!(step.wrapped);
    }

    #[test]
    fn test_cursor_restart_returns_to_first() {
        let mut cursor = ScenarioCursor::new(3);
        cursor.advance();
        cursor.advance();
        cursor.restart();
        assert_eq!(cursor.position(), None);

        let step = cursor.advance();
        assert_eq!(step.index, 0);
        assert!(!step.wrapped);
    }

    #[test]
    fn test_template_from_yaml() {
        let yaml = r#"
- id: "0"
  path: /register
  method: POST
  timeout_ms: 6000
  headers:
    Content-Type: application/json; charset=UTF-8
- id: "1"
  path: /profile
"#;
        let templates: Vec<Template> = serde_yaml::from_str(yaml).unwrap();
        let scenario = Scenario::new(templates).unwrap();
        assert_eq!(scenario.len(), 2);

        let first = scenario.get(0).unwrap();
        assert_eq!(first.method(), Method::POST);
        assert_eq!(first.timeout(), Duration::from_secs(6));
        assert_eq!(
            first.headers.get("Content-Type").map(String::as_str),
            Some("application/json; charset=UTF-8")
        );

        let second = scenario.get(1).unwrap();
        assert_eq!(second.method(), Method::GET);
        assert_eq!(second.timeout(), DEFAULT_TIMEOUT);
    }
}
