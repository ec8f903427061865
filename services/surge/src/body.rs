//! JSON body templates with placeholder expansion.
//!
//! String leaves of a step body may embed placeholders:
//!
//! - `{{rand:MIN:MAX}}` a uniform integer in `MIN..=MAX`
//! - `{{choice:a|b|c}}` one of the listed alternatives
//! - `{{prev:FIELD}}` a top-level field of the previous JSON response
//!
//! A string that consists of exactly one `rand` or `prev` placeholder keeps
//! the JSON type of the produced value instead of becoming a string.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context};
use rand::prelude::*;
use serde_json::{Map, Value};
use surge_core::{RequestContext, RequestSetup, ResponseRecord, SetupError, Template};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
enum Placeholder {
    Rand { min: i64, max: i64 },
    Choice(Vec<String>),
    Prev(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Text(Vec<Segment>),
    Array(Vec<Node>),
    Object(Vec<(String, Node)>),
}

impl Node {
    fn parse(value: &Value) -> anyhow::Result<Self> {
        Ok(match value {
            Value::String(s) => {
                let segments = parse_segments(s)?;
                if segments.iter().all(|s| matches!(s, Segment::Text(_))) {
                    Node::Literal(value.clone())
                } else {
                    Node::Text(segments)
                }
            }
            Value::Array(items) => {
                Node::Array(items.iter().map(Node::parse).collect::<anyhow::Result<_>>()?)
            }
            Value::Object(fields) => Node::Object(
                fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), Node::parse(v)?)))
                    .collect::<anyhow::Result<_>>()?,
            ),
            other => Node::Literal(other.clone()),
        })
    }

    fn uses_previous(&self) -> bool {
        match self {
            Node::Literal(_) => false,
            Node::Text(segments) => segments
                .iter()
                .any(|s| matches!(s, Segment::Placeholder(Placeholder::Prev(_)))),
            Node::Array(items) => items.iter().any(Node::uses_previous),
            Node::Object(fields) => fields.iter().any(|(_, v)| v.uses_previous()),
        }
    }

    fn render<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        previous: Option<&Value>,
    ) -> Result<Value, SetupError> {
        match self {
            Node::Literal(value) => Ok(value.clone()),
            Node::Text(segments) => render_text(segments, rng, previous),
            Node::Array(items) => items
                .iter()
                .map(|item| item.render(rng, previous))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Node::Object(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (key, value) in fields {
                    map.insert(key.clone(), value.render(rng, previous)?);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

/// A parsed step body, ready to be rendered once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyTemplate {
    root: Node,
}

impl BodyTemplate {
    /// Parse a JSON value, rejecting malformed placeholders.
    pub fn parse(value: &Value) -> anyhow::Result<Self> {
        Ok(Self {
            root: Node::parse(value)?,
        })
    }

    /// Whether rendering needs the previous response.
    pub fn uses_previous(&self) -> bool {
        self.root.uses_previous()
    }

    /// Produce a concrete JSON value.
    pub fn render<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        previous: Option<&Value>,
    ) -> Result<Value, SetupError> {
        self.root.render(rng, previous)
    }
}

fn parse_segments(input: &str) -> anyhow::Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_string()));
        }
        let after = &rest[start + OPEN.len()..];
        let end = after
            .find(CLOSE)
            .ok_or_else(|| anyhow!("unterminated placeholder in {:?}", input))?;
        let inner = after[..end].trim();
        segments.push(Segment::Placeholder(
            parse_placeholder(inner).with_context(|| format!("in {:?}", input))?,
        ));
        rest = &after[end + CLOSE.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    Ok(segments)
}

fn parse_placeholder(inner: &str) -> anyhow::Result<Placeholder> {
    let (kind, args) = inner
        .split_once(':')
        .ok_or_else(|| anyhow!("placeholder {{{{{}}}}} has no arguments", inner))?;

    match kind {
        "rand" => {
            let (min, max) = args
                .split_once(':')
                .ok_or_else(|| anyhow!("rand expects MIN:MAX, got {:?}", args))?;
            let min: i64 = min.trim().parse().context("invalid rand minimum")?;
            let max: i64 = max.trim().parse().context("invalid rand maximum")?;
            if min > max {
                bail!("rand minimum {} exceeds maximum {}", min, max);
            }
            Ok(Placeholder::Rand { min, max })
        }
        "choice" => {
            let options: Vec<String> = args.split('|').map(str::to_string).collect();
            if options.iter().all(String::is_empty) {
                bail!("choice needs at least one option");
            }
            Ok(Placeholder::Choice(options))
        }
        "prev" => {
            let field = args.trim();
            if field.is_empty() {
                bail!("prev needs a field name");
            }
            Ok(Placeholder::Prev(field.to_string()))
        }
        other => bail!("unknown placeholder kind {:?}", other),
    }
}

fn render_text<R: Rng + ?Sized>(
    segments: &[Segment],
    rng: &mut R,
    previous: Option<&Value>,
) -> Result<Value, SetupError> {
    if let [Segment::Placeholder(placeholder)] = segments {
        match placeholder {
            Placeholder::Rand { .. } | Placeholder::Prev(_) => {
                return expand(placeholder, rng, previous);
            }
            Placeholder::Choice(_) => {}
        }
    }

    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(placeholder) => match expand(placeholder, rng, previous)? {
                Value::String(s) => out.push_str(&s),
                other => out.push_str(&other.to_string()),
            },
        }
    }
    Ok(Value::String(out))
}

fn expand<R: Rng + ?Sized>(
    placeholder: &Placeholder,
    rng: &mut R,
    previous: Option<&Value>,
) -> Result<Value, SetupError> {
    match placeholder {
        Placeholder::Rand { min, max } => Ok(Value::from(rng.gen_range(*min..=*max))),
        Placeholder::Choice(options) => options
            .choose(rng)
            .map(|s| Value::String(s.clone()))
            .ok_or_else(|| SetupError::new("choice has no options")),
        Placeholder::Prev(field) => previous
            .and_then(|body| body.get(field))
            .cloned()
            .ok_or_else(|| SetupError::new(format!("previous response has no field {:?}", field))),
    }
}

/// Request setup hook that fills step bodies from their templates.
///
/// Steps are looked up by template id; steps without a body are left alone.
/// Unseeded setups draw from each thread's own RNG, so senders never contend.
/// A seeded setup shares one `StdRng` behind a lock.
pub struct BodySetup {
    bodies: HashMap<String, BodyTemplate>,
    seeded: Option<Mutex<StdRng>>,
}

impl BodySetup {
    pub fn new(bodies: HashMap<String, BodyTemplate>, seed: Option<u64>) -> Self {
        Self {
            bodies,
            seeded: seed.map(|seed| Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded.is_some()
    }

    fn render(&self, body: &BodyTemplate, previous: Option<&Value>) -> Result<Value, SetupError> {
        match &self.seeded {
            Some(rng) => {
                let mut rng = rng
                    .lock()
                    .map_err(|_| SetupError::new("body rng lock poisoned"))?;
                body.render(&mut *rng, previous)
            }
            None => body.render(&mut thread_rng(), previous),
        }
    }
}

impl RequestSetup for BodySetup {
    fn setup(
        &self,
        template: &Template,
        request: &mut RequestContext,
        previous: Option<&ResponseRecord>,
    ) -> Result<(), SetupError> {
        let Some(body) = self.bodies.get(&template.id) else {
            return Ok(());
        };

        let previous = if body.uses_previous() {
            previous.and_then(|p| p.body_json::<Value>().ok())
        } else {
            None
        };

        let value = self.render(body, previous.as_ref())?;

        if !request.headers().contains_key("content-type") {
            request.insert_header("content-type", "application/json")?;
        }
        request.set_body_json(&value)
    }
}
