//! Shared types used across the stub broker crates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key under which request payloads carry the plan selector.
pub const PLAN_ID_KEY: &str = "plan_id";

/// The category under which behaviors are scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Catalog,
    Provision,
    Fetch,
    Update,
    Deprovision,
    Bind,
    Unbind,
}

impl OperationType {
    pub const ALL: [OperationType; 7] = [
        OperationType::Catalog,
        OperationType::Provision,
        OperationType::Fetch,
        OperationType::Update,
        OperationType::Deprovision,
        OperationType::Bind,
        OperationType::Unbind,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Catalog => "catalog",
            OperationType::Provision => "provision",
            OperationType::Fetch => "fetch",
            OperationType::Update => "update",
            OperationType::Deprovision => "deprovision",
            OperationType::Bind => "bind",
            OperationType::Unbind => "unbind",
        }
    }

    /// Catalog behaviors are a single descriptor, not a per-plan table.
    pub fn is_per_plan(&self) -> bool {
        !matches!(self, OperationType::Catalog)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which branch of a fetch behavior a poll lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    InProgress,
    Finished,
}

impl FetchState {
    /// `finished` once the poll count strictly exceeds the threshold.
    pub fn for_poll(count: u64, threshold: u64) -> Self {
        if count > threshold {
            FetchState::Finished
        } else {
            FetchState::InProgress
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchState::InProgress => "in_progress",
            FetchState::Finished => "finished",
        }
    }
}

/// A single value inside a request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<PayloadValue>),
    Map(BTreeMap<String, PayloadValue>),
}

impl PayloadValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::String(s.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        PayloadValue::String(s)
    }
}

impl From<bool> for PayloadValue {
    fn from(b: bool) -> Self {
        PayloadValue::Bool(b)
    }
}

impl From<i64> for PayloadValue {
    fn from(n: i64) -> Self {
        PayloadValue::Number(n.into())
    }
}

/// Key/value payload supplied by provision, update, and bind requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, PayloadValue>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a JSON object. Anything other than an object is rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PayloadValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// The plan selector, if present and a string.
    pub fn plan_id(&self) -> Option<&str> {
        self.get(PLAN_ID_KEY).and_then(PayloadValue::as_str)
    }

    /// Overwrite top-level keys with those from `patch`. Nested maps are
    /// replaced, not merged.
    pub fn merge_shallow(&mut self, patch: Payload) {
        self.0.extend(patch.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PayloadValue)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, PayloadValue>> for Payload {
    fn from(map: BTreeMap<String, PayloadValue>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<PayloadValue>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
