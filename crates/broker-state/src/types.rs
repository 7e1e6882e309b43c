//! Domain types for the stub broker.
//!
//! Instances and bindings live in one registry namespace; behavior
//! descriptors are the scripted replies replayed by the API layer. All
//! types round-trip through the JSON shapes used by the config endpoints.

use std::time::Duration;

use broker_core::{FetchState, Payload};
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, BrokerResult};

/// Identifier shared by instances and bindings.
pub type EntryId = String;

// ── Registry records ───────────────────────────────────────────────

/// A simulated service instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInstance {
    provision_data: Payload,
    #[serde(default)]
    fetch_count: u64,
    #[serde(default)]
    deleted: bool,
}

impl ServiceInstance {
    pub fn new(provision_data: Payload) -> Self {
        Self {
            provision_data,
            fetch_count: 0,
            deleted: false,
        }
    }

    pub fn provision_data(&self) -> &Payload {
        &self.provision_data
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.provision_data.plan_id()
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_count
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Merge `patch` into the provision data and restart polling.
    pub fn apply_update(&mut self, patch: Payload) {
        self.provision_data.merge_shallow(patch);
        self.fetch_count = 0;
    }

    /// Soft delete: the record stays, polling restarts.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.fetch_count = 0;
    }

    /// Count one status poll and return the new count.
    pub fn record_fetch(&mut self) -> u64 {
        self.fetch_count = self.fetch_count.saturating_add(1);
        self.fetch_count
    }
}

/// A simulated service binding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BindingRecord {
    pub binding_data: Payload,
    pub instance_id: EntryId,
}

impl BindingRecord {
    /// Plan selector from the binding's own payload.
    pub fn plan_id(&self) -> Option<&str> {
        self.binding_data.plan_id()
    }
}

/// One slot of the shared instance/binding namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RegistryEntry {
    Instance(ServiceInstance),
    Binding(BindingRecord),
}

impl RegistryEntry {
    pub fn as_instance(&self) -> Option<&ServiceInstance> {
        match self {
            RegistryEntry::Instance(instance) => Some(instance),
            RegistryEntry::Binding(_) => None,
        }
    }

    pub fn as_binding(&self) -> Option<&BindingRecord> {
        match self {
            RegistryEntry::Binding(binding) => Some(binding),
            RegistryEntry::Instance(_) => None,
        }
    }
}

// ── Behaviors ──────────────────────────────────────────────────────

/// Body replayed for a scripted reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Structured document, serialized on replay.
    Json(serde_json::Value),
    /// Opaque passthrough, sent byte for byte.
    Raw(String),
    /// Neither `body` nor `raw_body` was scripted.
    Empty,
}

impl ResponseBody {
    pub fn render(&self) -> String {
        match self {
            ResponseBody::Json(value) => value.to_string(),
            ResponseBody::Raw(raw) => raw.clone(),
            ResponseBody::Empty => String::new(),
        }
    }
}

/// A scripted `{status, sleep_seconds, body | raw_body}` reply.
///
/// The delay is converted once, when the descriptor is built, so replaying
/// it cannot fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DescriptorWire", into = "DescriptorWire")]
pub struct BehaviorDescriptor {
    pub status: u16,
    pub body: ResponseBody,
    /// As written, `None` when the key was absent.
    sleep_seconds: Option<serde_json::Number>,
    delay: Duration,
    /// Keys the broker does not interpret, kept for snapshots.
    extra: serde_json::Map<String, serde_json::Value>,
}

impl BehaviorDescriptor {
    fn new(status: u16, body: ResponseBody) -> Self {
        Self {
            status,
            body,
            sleep_seconds: None,
            delay: Duration::ZERO,
            extra: serde_json::Map::new(),
        }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::new(status, ResponseBody::Json(body))
    }

    pub fn raw(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, ResponseBody::Raw(body.into()))
    }

    /// Set the scripted delay. Values no `Duration` can hold are rejected.
    pub fn with_sleep(mut self, seconds: f64) -> BrokerResult<Self> {
        let number = serde_json::Number::from_f64(seconds)
            .ok_or_else(|| BrokerError::MalformedDocument(invalid_sleep(seconds)))?;
        self.delay = sleep_delay(&number).map_err(BrokerError::MalformedDocument)?;
        self.sleep_seconds = Some(number);
        Ok(self)
    }

    pub fn sleep_seconds(&self) -> Option<&serde_json::Number> {
        self.sleep_seconds.as_ref()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Materialize the descriptor as a reply.
    pub fn to_reply(&self) -> Reply {
        Reply {
            status: self.status,
            delay: self.delay,
            body: self.body.clone(),
        }
    }
}

fn invalid_sleep(value: impl std::fmt::Display) -> String {
    format!("sleep_seconds must be a non-negative number of seconds that fits a duration, got {value}")
}

fn sleep_delay(number: &serde_json::Number) -> Result<Duration, String> {
    number
        .as_f64()
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
        .ok_or_else(|| invalid_sleep(number))
}

#[derive(Serialize, Deserialize)]
struct DescriptorWire {
    status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sleep_seconds: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_body: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl TryFrom<DescriptorWire> for BehaviorDescriptor {
    type Error = String;

    fn try_from(wire: DescriptorWire) -> Result<Self, Self::Error> {
        let delay = match &wire.sleep_seconds {
            Some(number) => sleep_delay(number)?,
            None => Duration::ZERO,
        };
        let body = match (wire.body, wire.raw_body) {
            (Some(_), Some(_)) => {
                return Err("behavior sets both body and raw_body".to_string());
            }
            (Some(body), None) => ResponseBody::Json(body),
            (None, Some(raw)) => ResponseBody::Raw(raw),
            (None, None) => ResponseBody::Empty,
        };
        Ok(Self {
            status: wire.status,
            body,
            sleep_seconds: wire.sleep_seconds,
            delay,
            extra: wire.extra,
        })
    }
}

impl From<BehaviorDescriptor> for DescriptorWire {
    fn from(descriptor: BehaviorDescriptor) -> Self {
        let (body, raw_body) = match descriptor.body {
            ResponseBody::Json(value) => (Some(value), None),
            ResponseBody::Raw(raw) => (None, Some(raw)),
            ResponseBody::Empty => (None, None),
        };
        Self {
            status: descriptor.status,
            sleep_seconds: descriptor.sleep_seconds,
            body,
            raw_body,
            extra: descriptor.extra,
        }
    }
}

/// The two-state fetch behavior for one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchBehavior {
    pub in_progress: BehaviorDescriptor,
    pub finished: BehaviorDescriptor,
}

impl FetchBehavior {
    pub fn select(&self, state: FetchState) -> &BehaviorDescriptor {
        match state {
            FetchState::InProgress => &self.in_progress,
            FetchState::Finished => &self.finished,
        }
    }
}

// ── Replies ────────────────────────────────────────────────────────

/// What the engine hands back to the adapter: replay status, wait `delay`,
/// send `body`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub delay: Duration,
    pub body: ResponseBody,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
            body: ResponseBody::Json(body),
        }
    }

    /// Reject statuses no HTTP stack can send.
    pub fn checked_status(&self) -> BrokerResult<u16> {
        if (100..=999).contains(&self.status) {
            Ok(self.status)
        } else {
            Err(BrokerError::InvalidStatus(self.status))
        }
    }
}
