//! ConfigStore: the broker's whole mutable state behind one lock.
//!
//! Holds the behavior table, the instance registry, and global settings.
//! The store is `Clone` + `Send` + `Sync` (backed by `Arc<Mutex<_>>`) and is
//! handed to the engine and the API layer explicitly; there is no global.
//!
//! Every mutation takes the single store-wide lock. Nothing sleeps while
//! holding it: scripted delays are applied by the caller after the engine
//! has returned its reply.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use broker_core::document;
use serde_json::{Map, Value};
use tracing::debug;

use crate::behavior::BehaviorTable;
use crate::error::{BrokerError, BrokerResult};
use crate::registry::InstanceRegistry;
use crate::types::{EntryId, RegistryEntry, ServiceInstance};

pub const MAX_FETCH_KEY: &str = "max_fetch_service_instance_requests";
pub const BEHAVIORS_KEY: &str = "behaviors";
pub const SERVICE_INSTANCES_KEY: &str = "service_instances";
pub const SERVICE_BINDINGS_KEY: &str = "service_bindings";

/// Polls answered with `in_progress` before `finished`, when unset.
pub const DEFAULT_MAX_FETCH_REQUESTS: u64 = 1;

/// Everything one broker document describes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerState {
    max_fetch_service_instance_requests: Option<u64>,
    pub behaviors: BehaviorTable,
    pub registry: InstanceRegistry,
    /// Unrecognized top-level keys, kept for snapshots.
    extra: Map<String, Value>,
}

/// A validated, not yet applied, top-level document update.
#[derive(Debug, Default)]
struct StatePatch {
    max_fetch: Option<Option<u64>>,
    behaviors: Option<BehaviorTable>,
    entries: Option<HashMap<EntryId, RegistryEntry>>,
    extra: Map<String, Value>,
}

impl StatePatch {
    fn parse(document: Value) -> BrokerResult<Self> {
        let Value::Object(fields) = document else {
            return Err(BrokerError::MalformedDocument(
                "top level must be a JSON object".to_string(),
            ));
        };

        let mut patch = StatePatch::default();
        for (key, value) in fields {
            match key.as_str() {
                MAX_FETCH_KEY => {
                    patch.max_fetch = Some(decode(MAX_FETCH_KEY, value)?);
                }
                BEHAVIORS_KEY => {
                    patch.behaviors = Some(decode(BEHAVIORS_KEY, value)?);
                }
                SERVICE_INSTANCES_KEY => {
                    let entries: Option<HashMap<EntryId, RegistryEntry>> =
                        decode(SERVICE_INSTANCES_KEY, value)?;
                    patch.entries = Some(entries.unwrap_or_default());
                }
                _ => {
                    patch.extra.insert(key, value);
                }
            }
        }
        Ok(patch)
    }
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, value: Value) -> BrokerResult<T> {
    serde_json::from_value(value)
        .map_err(|e| BrokerError::MalformedDocument(format!("{key}: {e}")))
}

impl BrokerState {
    /// Build a fresh state from a complete document.
    pub fn from_document(document: Value) -> BrokerResult<Self> {
        let mut state = BrokerState::default();
        state.apply(StatePatch::parse(document)?);
        Ok(state)
    }

    /// Effective poll threshold.
    pub fn max_fetch_requests(&self) -> u64 {
        self.max_fetch_service_instance_requests
            .unwrap_or(DEFAULT_MAX_FETCH_REQUESTS)
    }

    fn apply(&mut self, patch: StatePatch) {
        if let Some(max_fetch) = patch.max_fetch {
            self.max_fetch_service_instance_requests = max_fetch;
        }
        if let Some(behaviors) = patch.behaviors {
            self.behaviors = behaviors;
        }
        if let Some(entries) = patch.entries {
            for (id, entry) in entries {
                self.registry.insert(id, entry);
            }
        }
        self.extra.extend(patch.extra);
    }

    /// Every key, including instances and bindings.
    pub fn snapshot(&self) -> BrokerResult<Value> {
        let mut doc = self.extra.clone();
        if let Some(max_fetch) = self.max_fetch_service_instance_requests {
            doc.insert(MAX_FETCH_KEY.to_string(), Value::from(max_fetch));
        }
        doc.insert(
            BEHAVIORS_KEY.to_string(),
            serde_json::to_value(&self.behaviors).map_err(BrokerError::Snapshot)?,
        );
        let mut entries = Map::new();
        for (id, entry) in self.registry.iter() {
            entries.insert(
                id.clone(),
                serde_json::to_value(entry).map_err(BrokerError::Snapshot)?,
            );
        }
        doc.insert(SERVICE_INSTANCES_KEY.to_string(), Value::Object(entries));
        Ok(Value::Object(doc))
    }

    /// Settings and behaviors only.
    pub fn snapshot_without_instances(&self) -> BrokerResult<Value> {
        let mut doc = self.snapshot()?;
        if let Value::Object(fields) = &mut doc {
            fields.remove(SERVICE_INSTANCES_KEY);
            fields.remove(SERVICE_BINDINGS_KEY);
        }
        Ok(doc)
    }
}

/// Thread-safe handle to the broker state.
#[derive(Clone)]
pub struct ConfigStore {
    state: Arc<Mutex<BrokerState>>,
    bootstrap: Arc<Value>,
}

impl ConfigStore {
    /// Open a store from a bootstrap document. `reset` returns to it.
    pub fn open(bootstrap: Value) -> BrokerResult<Self> {
        let state = BrokerState::from_document(bootstrap.clone())?;
        debug!(
            max_fetch = state.max_fetch_requests(),
            instances = state.registry.len(),
            "config store opened"
        );
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            bootstrap: Arc::new(bootstrap),
        })
    }

    /// Open a store from the embedded default document.
    pub fn open_default() -> BrokerResult<Self> {
        Self::open(document::embedded_document())
    }

    fn lock(&self) -> BrokerResult<MutexGuard<'_, BrokerState>> {
        self.state.lock().map_err(|_| BrokerError::Poisoned)
    }

    /// Run `f` with exclusive access to the state.
    pub fn with_state<R>(
        &self,
        f: impl FnOnce(&mut BrokerState) -> BrokerResult<R>,
    ) -> BrokerResult<R> {
        let mut state = self.lock()?;
        f(&mut state)
    }

    /// Swap in a whole new document. The registry is rebuilt from the
    /// document's own `service_instances`.
    pub fn replace(&self, document: Value) -> BrokerResult<()> {
        let fresh = BrokerState::from_document(document)?;
        let mut state = self.lock()?;
        *state = fresh;
        debug!("config store replaced");
        Ok(())
    }

    /// Shallow-merge top-level keys. `service_instances` entries are merged
    /// into the registry by id. Returns the resulting settings snapshot.
    pub fn merge(&self, partial: Value) -> BrokerResult<Value> {
        let patch = StatePatch::parse(partial)?;
        let mut state = self.lock()?;
        state.apply(patch);
        debug!(instances = state.registry.len(), "config store merged");
        state.snapshot_without_instances()
    }

    /// Discard everything and reload the bootstrap document.
    pub fn reset(&self) -> BrokerResult<Value> {
        let fresh = BrokerState::from_document(self.bootstrap.as_ref().clone())?;
        let mut state = self.lock()?;
        *state = fresh;
        debug!("config store reset to bootstrap");
        state.snapshot_without_instances()
    }

    pub fn snapshot(&self) -> BrokerResult<Value> {
        self.lock()?.snapshot()
    }

    pub fn snapshot_without_instances(&self) -> BrokerResult<Value> {
        self.lock()?.snapshot_without_instances()
    }

    pub fn bootstrap(&self) -> &Value {
        &self.bootstrap
    }

    pub fn instance(&self, id: &str) -> BrokerResult<Option<ServiceInstance>> {
        Ok(self.lock()?.registry.get(id).cloned())
    }
}
