//! Query definition languages and parameter bindings

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ProxyError, ProxyResult};

/// Language a query definition is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryLanguage {
    /// Structured JSON form
    Json,
    /// Textual query language
    N1ql,
}

impl QueryLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::N1ql => "n1ql",
        }
    }
}

fn whitespace_run() -> ProxyResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\s+"))
        .as_ref()
        .map_err(|e| ProxyError::Internal(format!("Invalid whitespace pattern: {}", e)))
}

/// Normalize a definition before it is sent for compilation
///
/// Query text has every whitespace run collapsed to a single space, so
/// definitions differing only in spacing compile identically. JSON
/// definitions pass through untouched.
pub fn normalize_definition(language: QueryLanguage, definition: &str) -> ProxyResult<String> {
    match language {
        QueryLanguage::N1ql => Ok(whitespace_run()?.replace_all(definition, " ").into_owned()),
        QueryLanguage::Json => Ok(definition.to_string()),
    }
}

/// Immutable snapshot of bound query parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with `name` bound to `value`
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
