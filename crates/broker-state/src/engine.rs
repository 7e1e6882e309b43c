//! SimulationEngine: turns broker operations into scripted replies.
//!
//! Each operation runs to completion under the store lock and returns a
//! [`Reply`] without waiting; the caller applies `reply.delay` afterwards so
//! concurrent requests never queue behind a scripted sleep.
//!
//! Absent ids are fatal only for `update`. Fetch, deprovision, and unbind of
//! an unknown id each produce a well-formed reply instead.

use broker_core::{FetchState, OperationType, Payload};
use serde_json::json;
use tracing::debug;

use crate::error::BrokerResult;
use crate::store::ConfigStore;
use crate::types::Reply;

/// Drives the instance lifecycle simulation against a [`ConfigStore`].
#[derive(Clone)]
pub struct SimulationEngine {
    store: ConfigStore,
}

impl SimulationEngine {
    pub fn new(store: ConfigStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// The catalog descriptor, regardless of plan.
    pub fn catalog(&self) -> BrokerResult<Reply> {
        self.store
            .with_state(|state| Ok(state.behaviors.catalog()?.to_reply()))
    }

    /// Create (or overwrite) an instance and replay its provision behavior.
    pub fn provision(&self, id: &str, payload: Payload) -> BrokerResult<Reply> {
        self.store.with_state(|state| {
            let instance = state.registry.create(id, payload);
            let behavior = state
                .behaviors
                .descriptor(OperationType::Provision, instance.plan_id())?;
            Ok(behavior.to_reply())
        })
    }

    /// Count a poll and replay the matching branch of the fetch behavior.
    pub fn fetch_status(&self, id: &str) -> BrokerResult<Reply> {
        self.store.with_state(|state| {
            let threshold = state.max_fetch_requests();
            let Some((count, plan_id)) = state.registry.record_fetch(id) else {
                debug!(%id, "fetch for unknown service instance");
                return Ok(instance_not_found(id));
            };

            let poll_state = FetchState::for_poll(count, threshold);
            debug!(%id, count, threshold, state = poll_state.as_str(), "service instance polled");
            let behavior = state.behaviors.fetch(plan_id.as_deref())?;
            Ok(behavior.select(poll_state).to_reply())
        })
    }

    /// Merge `payload` into an existing instance. Unknown ids are an error.
    pub fn update(&self, id: &str, payload: Payload) -> BrokerResult<Reply> {
        self.store.with_state(|state| {
            let instance = state.registry.update(id, payload)?;
            let plan_id = instance.plan_id().map(str::to_string);
            let behavior = state
                .behaviors
                .descriptor(OperationType::Update, plan_id.as_deref())?;
            Ok(behavior.to_reply())
        })
    }

    /// Soft-delete the instance if it exists; unknown ids replay the
    /// plan-less deprovision behavior.
    pub fn deprovision(&self, id: &str) -> BrokerResult<Reply> {
        self.store.with_state(|state| {
            let plan_id = match state.registry.delete(id) {
                Some(instance) => instance.plan_id().map(str::to_string),
                None => {
                    debug!(%id, "deprovision for unknown service instance");
                    None
                }
            };
            let behavior = state
                .behaviors
                .descriptor(OperationType::Deprovision, plan_id.as_deref())?;
            Ok(behavior.to_reply())
        })
    }

    /// Record a binding. The plan comes from the binding payload, never from
    /// the parent instance.
    pub fn bind(&self, instance_id: &str, binding_id: &str, payload: Payload) -> BrokerResult<Reply> {
        self.store.with_state(|state| {
            let binding = state
                .registry
                .create_binding(instance_id, binding_id, payload);
            let behavior = state
                .behaviors
                .descriptor(OperationType::Bind, binding.plan_id())?;
            Ok(behavior.to_reply())
        })
    }

    /// Remove the binding if it exists and replay the unbind behavior.
    pub fn unbind(&self, binding_id: &str) -> BrokerResult<Reply> {
        self.store.with_state(|state| {
            let removed = state.registry.delete_binding(binding_id);
            if removed.is_none() {
                debug!(%binding_id, "unbind for unknown service binding");
            }
            let plan_id = removed.as_ref().and_then(|b| b.plan_id());
            let behavior = state.behaviors.descriptor(OperationType::Unbind, plan_id)?;
            Ok(behavior.to_reply())
        })
    }
}

/// The success envelope carrying a failed last operation, sent when a
/// status poll names an instance the broker never saw.
fn instance_not_found(id: &str) -> Reply {
    Reply::json(
        200,
        json!({
            "last_operation": {
                "state": "failed",
                "description": format!("Broker could not find service instance by the given id {id}"),
            }
        }),
    )
}
