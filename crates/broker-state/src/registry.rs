//! InstanceRegistry: simulated instances and bindings in one namespace.
//!
//! Instances are soft-deleted (the record stays and keeps its id occupied);
//! bindings are removed outright. A registry dump therefore lists
//! deprovisioned instances but never unbound bindings.

use std::collections::HashMap;

use broker_core::Payload;
use tracing::debug;

use crate::error::{BrokerError, BrokerResult};
use crate::types::{BindingRecord, EntryId, RegistryEntry, ServiceInstance};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceRegistry {
    entries: HashMap<EntryId, RegistryEntry>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Create an instance, replacing whatever held `id` before.
    pub fn create(&mut self, id: &str, provision_data: Payload) -> ServiceInstance {
        let instance = ServiceInstance::new(provision_data);
        self.entries
            .insert(id.to_string(), RegistryEntry::Instance(instance.clone()));
        debug!(%id, "service instance created");
        instance
    }

    /// Look up an instance. Bindings stored under `id` read as absent.
    pub fn get(&self, id: &str) -> Option<&ServiceInstance> {
        self.entries.get(id).and_then(RegistryEntry::as_instance)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut ServiceInstance> {
        match self.entries.get_mut(id) {
            Some(RegistryEntry::Instance(instance)) => Some(instance),
            _ => None,
        }
    }

    /// Merge `patch` into an existing instance and restart its polling.
    pub fn update(&mut self, id: &str, patch: Payload) -> BrokerResult<&ServiceInstance> {
        let instance = self
            .get_mut(id)
            .ok_or_else(|| BrokerError::InstanceNotFound(id.to_string()))?;
        instance.apply_update(patch);
        debug!(%id, "service instance updated");
        Ok(instance)
    }

    /// Soft-delete an instance. Absent ids are not an error.
    pub fn delete(&mut self, id: &str) -> Option<&ServiceInstance> {
        let instance = self.get_mut(id)?;
        instance.mark_deleted();
        debug!(%id, "service instance marked deleted");
        Some(instance)
    }

    /// Count a status poll. Returns the new count and the instance's plan.
    pub fn record_fetch(&mut self, id: &str) -> Option<(u64, Option<String>)> {
        let instance = self.get_mut(id)?;
        let count = instance.record_fetch();
        Some((count, instance.plan_id().map(str::to_string)))
    }

    // ── Bindings ───────────────────────────────────────────────────

    /// Create a binding, replacing whatever held `binding_id` before.
    pub fn create_binding(
        &mut self,
        instance_id: &str,
        binding_id: &str,
        binding_data: Payload,
    ) -> BindingRecord {
        let record = BindingRecord {
            binding_data,
            instance_id: instance_id.to_string(),
        };
        self.entries
            .insert(binding_id.to_string(), RegistryEntry::Binding(record.clone()));
        debug!(%instance_id, %binding_id, "service binding created");
        record
    }

    pub fn get_binding(&self, binding_id: &str) -> Option<&BindingRecord> {
        self.entries.get(binding_id).and_then(RegistryEntry::as_binding)
    }

    /// Remove a binding. An instance stored under `binding_id` is left alone.
    pub fn delete_binding(&mut self, binding_id: &str) -> Option<BindingRecord> {
        if self.get_binding(binding_id).is_none() {
            return None;
        }
        match self.entries.remove(binding_id) {
            Some(RegistryEntry::Binding(binding)) => {
                debug!(%binding_id, "service binding removed");
                Some(binding)
            }
            _ => None,
        }
    }

    // ── Bulk access ────────────────────────────────────────────────

    /// Insert a re-hydrated entry, overwriting by id.
    pub fn insert(&mut self, id: impl Into<EntryId>, entry: RegistryEntry) {
        self.entries.insert(id.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntryId, &RegistryEntry)> {
        self.entries.iter()
    }
}

impl FromIterator<(EntryId, RegistryEntry)> for InstanceRegistry {
    fn from_iter<I: IntoIterator<Item = (EntryId, RegistryEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
