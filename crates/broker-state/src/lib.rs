//! broker-state: the simulation core of the stub broker.
//!
//! Scripted replies come from a [`BehaviorTable`]; simulated instances and
//! bindings live in an [`InstanceRegistry`]; both are owned by a
//! [`ConfigStore`] that the [`SimulationEngine`] drives.
//!
//! # Architecture
//!
//! The store is a single `Arc<Mutex<BrokerState>>`. Engine operations are
//! synchronous and short: they mutate the registry, resolve a behavior, and
//! return a [`Reply`]. Callers apply the reply's delay after the lock is
//! released.

pub mod behavior;
pub mod engine;
pub mod error;
pub mod registry;
pub mod store;
pub mod types;

pub use behavior::{BehaviorGap, BehaviorTable, PlanTable, ResolvedBehavior, DEFAULT_PLAN};
pub use engine::SimulationEngine;
pub use error::{BrokerError, BrokerResult};
pub use registry::InstanceRegistry;
pub use store::{BrokerState, ConfigStore};
pub use types::*;
