//! Reconciliation engine for AIDeployment resources
//!
//! One pass converges the Deployment, Service, and (when endpoints are
//! declared) Ingress of a workload toward its declaration, then reports the
//! workload's readiness back on the AIDeployment status.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod merge;
pub mod reconcile;
pub mod resolver;
pub mod resources;
pub mod status;

pub use client::{ClusterClient, KubeClusterClient};
pub use controller::{error_policy, reconcile, Context, ControllerSettings};
pub use merge::OwnedFields;
pub use reconcile::{reconcile_pass, PassGuard, PassOutcome};
pub use resolver::{resolve_all, CatalogModelResolver, ModelResolver};
