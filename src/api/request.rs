use super::context::Context;
use super::error::{ApiError, Result};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// One query entry: a single value, or a list (repeated keys, rest params)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    One(String),
    Many(Vec<String>),
}

impl QueryValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::One(value) => Some(value),
            QueryValue::Many(_) => None,
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            QueryValue::One(value) => vec![value.clone()],
            QueryValue::Many(values) => values.clone(),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::One(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::One(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        QueryValue::Many(values)
    }
}

/// HTTP-like request handed to API handlers
///
/// `query` carries the URL query, resolved path parameters and the
/// unconsumed path (`path`). `context` exposes per-request context fields.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, QueryValue>,
    pub body: JsonValue,
    context: Context,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            body: JsonValue::Null,
            context: Context::default(),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Merge query pairs; repeated names become lists
    pub fn with_query_pairs<I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in pairs {
            let merged = match self.query.remove(&name) {
                None => QueryValue::One(value),
                Some(existing) => {
                    let mut values = existing.to_vec();
                    values.push(value);
                    QueryValue::Many(values)
                }
            };
            self.query.insert(name, merged);
        }
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = body;
        self
    }

    pub(crate) fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Non-empty `/`-separated path segments, percent-decoded
    ///
    /// Splitting happens before decoding, so an encoded `%2F` stays inside
    /// its segment. Invalid UTF-8 is replaced rather than rejected.
    pub fn segments(&self) -> Vec<String> {
        self.path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes()))
                    .into_owned()
            })
            .collect()
    }

    /// Single-valued query entry
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).and_then(QueryValue::as_str)
    }

    pub fn require_param(&self, name: &str) -> Result<&str> {
        self.param(name)
            .ok_or_else(|| ApiError::BadRequest(format!("missing parameter '{}'", name)))
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}
