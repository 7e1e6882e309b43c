//! BehaviorTable: scripted replies keyed by operation type and plan id.
//!
//! Lookups never mutate. A plan id without an explicit entry falls back to
//! the operation's `default` entry; only when neither exists is the lookup
//! an error.

use std::collections::BTreeMap;

use broker_core::OperationType;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BrokerError, BrokerResult};
use crate::types::{BehaviorDescriptor, FetchBehavior};

/// Plan key used when no explicit plan entry matches.
pub const DEFAULT_PLAN: &str = "default";

/// Per-operation entries keyed by plan id (or `default`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanTable<T>(BTreeMap<String, T>);

/// How a plan lookup was satisfied.
#[derive(Debug)]
pub enum PlanMatch<'a, T> {
    Explicit(&'a T),
    Default(&'a T),
    Missing,
}

impl<T> PlanTable<T> {
    pub fn lookup(&self, plan_id: Option<&str>) -> PlanMatch<'_, T> {
        if let Some(entry) = plan_id.and_then(|plan| self.0.get(plan)) {
            return PlanMatch::Explicit(entry);
        }
        match self.0.get(DEFAULT_PLAN) {
            Some(entry) => PlanMatch::Default(entry),
            None => PlanMatch::Missing,
        }
    }

    pub fn has_default(&self) -> bool {
        self.0.contains_key(DEFAULT_PLAN)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for PlanTable<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A resolved behavior: a single descriptor, or the two-state fetch map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedBehavior<'a> {
    Single(&'a BehaviorDescriptor),
    Polling(&'a FetchBehavior),
}

/// Something the table cannot answer for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BehaviorGap {
    /// No entry at all for the operation.
    Missing(OperationType),
    /// Entries exist, but unknown plans have nothing to fall back to.
    NoDefault(OperationType),
}

/// The `behaviors` section of the broker document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<BehaviorDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provision: Option<PlanTable<BehaviorDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch: Option<PlanTable<FetchBehavior>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<PlanTable<BehaviorDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprovision: Option<PlanTable<BehaviorDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<PlanTable<BehaviorDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unbind: Option<PlanTable<BehaviorDescriptor>>,
}

impl BehaviorTable {
    /// Resolve the behavior for `operation` and `plan_id`.
    ///
    /// `catalog` ignores the plan id. `fetch` yields both poll branches;
    /// the caller picks one.
    pub fn resolve(
        &self,
        operation: OperationType,
        plan_id: Option<&str>,
    ) -> BrokerResult<ResolvedBehavior<'_>> {
        match operation {
            OperationType::Catalog => self.catalog().map(ResolvedBehavior::Single),
            OperationType::Fetch => self.fetch(plan_id).map(ResolvedBehavior::Polling),
            _ => self
                .descriptor(operation, plan_id)
                .map(ResolvedBehavior::Single),
        }
    }

    pub fn catalog(&self) -> BrokerResult<&BehaviorDescriptor> {
        self.catalog.as_ref().ok_or(BrokerError::MissingBehavior {
            operation: OperationType::Catalog,
            plan_id: None,
        })
    }

    /// Single-descriptor lookup for every operation except `fetch`.
    pub fn descriptor(
        &self,
        operation: OperationType,
        plan_id: Option<&str>,
    ) -> BrokerResult<&BehaviorDescriptor> {
        if operation == OperationType::Catalog {
            return self.catalog();
        }
        pick(operation, self.descriptor_table(operation), plan_id)
    }

    pub fn fetch(&self, plan_id: Option<&str>) -> BrokerResult<&FetchBehavior> {
        pick(OperationType::Fetch, self.fetch.as_ref(), plan_id)
    }

    fn descriptor_table(&self, operation: OperationType) -> Option<&PlanTable<BehaviorDescriptor>> {
        match operation {
            OperationType::Provision => self.provision.as_ref(),
            OperationType::Update => self.update.as_ref(),
            OperationType::Deprovision => self.deprovision.as_ref(),
            OperationType::Bind => self.bind.as_ref(),
            OperationType::Unbind => self.unbind.as_ref(),
            OperationType::Catalog | OperationType::Fetch => None,
        }
    }

    /// Operations the table cannot answer, or can only answer for listed plans.
    pub fn gaps(&self) -> Vec<BehaviorGap> {
        let mut gaps = Vec::new();
        if self.catalog.is_none() {
            gaps.push(BehaviorGap::Missing(OperationType::Catalog));
        }
        for operation in OperationType::ALL.into_iter().filter(|op| op.is_per_plan()) {
            let coverage = match operation {
                OperationType::Fetch => self.fetch.as_ref().map(|t| (t.is_empty(), t.has_default())),
                _ => self
                    .descriptor_table(operation)
                    .map(|t| (t.is_empty(), t.has_default())),
            };
            match coverage {
                None | Some((true, _)) => gaps.push(BehaviorGap::Missing(operation)),
                Some((false, false)) => gaps.push(BehaviorGap::NoDefault(operation)),
                Some((false, true)) => {}
            }
        }
        gaps
    }
}

fn pick<'a, T>(
    operation: OperationType,
    table: Option<&'a PlanTable<T>>,
    plan_id: Option<&str>,
) -> BrokerResult<&'a T> {
    let table = table
        .filter(|t| !t.is_empty())
        .ok_or_else(|| BrokerError::MissingBehavior {
            operation,
            plan_id: plan_id.map(str::to_string),
        })?;

    match table.lookup(plan_id) {
        PlanMatch::Explicit(entry) => Ok(entry),
        PlanMatch::Default(entry) => {
            info!(%operation, plan_id = ?plan_id, "could not find response for plan id, using default");
            Ok(entry)
        }
        PlanMatch::Missing => Err(BrokerError::MissingPlanBehavior {
            operation,
            plan_id: plan_id.map(str::to_string),
        }),
    }
}
