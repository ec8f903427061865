//! Per-iteration request state, response records and the setup hook.

use std::borrow::Cow;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SetupError;
use crate::scenario::Template;

/// Mutable request built from a template and then customized by the setup hook.
///
/// Each sender owns exactly one and resets it at the start of every iteration.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            method: Method::GET,
            url: String::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything back to an empty GET.
    pub fn reset(&mut self) {
        self.method = Method::GET;
        self.url.clear();
        self.headers.clear();
        self.body = Bytes::new();
    }

    /// Reset, then load URL, method and headers from a template.
    pub fn apply_template(&mut self, template: &Template, base_url: &str) -> Result<(), SetupError> {
        self.reset();
        self.set_url(template.url(base_url));
        self.set_method(template.method());
        self.set_headers(&template.headers)
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Append one header, keeping any existing values under the same name.
    pub fn insert_header(&mut self, name: &str, value: &str) -> Result<(), SetupError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| SetupError::new(format!("invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| SetupError::new(format!("invalid value for header '{}'", name)))?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Append every header of a map.
    pub fn set_headers<'a, I>(&mut self, headers: I) -> Result<(), SetupError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (name, value) in headers {
            self.insert_header(name, value)?;
        }
        Ok(())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Serialize `value` as the JSON request body.
    pub fn set_body_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SetupError> {
        let body = serde_json::to_vec(value)
            .map_err(|e| SetupError::new(format!("failed to encode JSON body: {}", e)))?;
        self.body = Bytes::from(body);
        Ok(())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub(crate) fn to_request(&self, client: &Client) -> RequestBuilder {
        let builder = client
            .request(self.method.clone(), self.url.as_str())
            .headers(self.headers.clone());
        if self.body.is_empty() {
            builder
        } else {
            builder.body(self.body.clone())
        }
    }
}

/// One completed network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub status: u16,
    pub latency_ms: u64,
    /// Body length plus approximate header bytes.
    pub size: u64,
    pub body: String,
}

impl ResponseRecord {
    pub fn new(status: u16, latency_ms: u64, size: u64, body: impl Into<String>) -> Self {
        Self {
            status,
            latency_ms,
            size,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parse the body as JSON.
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Approximate on-the-wire size of a response: body + 2, and key + value + 2 per header.
pub fn response_size(body_len: usize, headers: &HeaderMap) -> u64 {
    let header_bytes: usize = headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.as_bytes().len() + 2)
        .sum();
    (body_len + 2 + header_bytes) as u64
}

/// Customizes a request before it is sent.
///
/// Invoked once per iteration with the template, the request already loaded from
/// that template, and the previous response of this sender (if the previous
/// iteration completed and the cycle did not wrap). Returning an error skips the
/// send and restarts the scenario at its first template.
pub trait RequestSetup: Send + Sync + 'static {
    fn setup(
        &self,
        template: &Template,
        request: &mut RequestContext,
        previous: Option<&ResponseRecord>,
    ) -> Result<(), SetupError>;
}

impl<F> RequestSetup for F
where
    F: Fn(&Template, &mut RequestContext, Option<&ResponseRecord>) -> Result<(), SetupError>
        + Send
        + Sync
        + 'static,
{
    fn setup(
        &self,
        template: &Template,
        request: &mut RequestContext,
        previous: Option<&ResponseRecord>,
    ) -> Result<(), SetupError> {
        self(template, request, previous)
    }
}

/// Sends every template as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSetup;

impl RequestSetup for NoopSetup {
    fn setup(
        &self,
        _template: &Template,
        _request: &mut RequestContext,
        _previous: Option<&ResponseRecord>,
    ) -> Result<(), SetupError> {
        Ok(())
    }
}
