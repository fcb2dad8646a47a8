//! One reconciliation pass
//!
//! For each owned kind in order (Deployment, Service, Ingress) the pass reads
//! the live object, creates it when missing, and otherwise re-reads a fresh
//! copy and replaces it with the owned fields merged in. Readiness is judged
//! from the Deployment only when it already existed.
//!
//! All desired objects are synthesized before the first cluster call, so an
//! invalid declaration fails without mutating anything. A failed call fails
//! the pass; mutations already applied are left in place for the next pass.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aideploy_common::crd::{AIDeployment, AIDeploymentStatus, WorkloadStatus};
use aideploy_common::{Error, Result};
use aideploy_engine::MLEngine;

use crate::client::ClusterClient;
use crate::merge::OwnedFields;
use crate::resources::{desired_ingress, desired_service};
use crate::status::{derive_status, is_status_unchanged};

// =============================================================================
// Pass guard
// =============================================================================

/// Cancellation and deadline for one pass.
///
/// Checked before every cluster call and raced against it while it runs.
#[derive(Clone, Debug, Default)]
pub struct PassGuard {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl PassGuard {
    /// Guard tied to `token`, expiring `timeout` from now when given
    pub fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            token,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Guard that never cancels or expires
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Replace the deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The underlying cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run one cluster call under the guard
    pub async fn run<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled {
                operation: operation.to_string(),
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::DeadlineExceeded {
                operation: operation.to_string(),
            });
        }

        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(Error::Cancelled {
                    operation: operation.to_string(),
                }),
                result = tokio::time::timeout_at(deadline, call) => {
                    result.map_err(|_| Error::DeadlineExceeded {
                        operation: operation.to_string(),
                    })?
                }
            },
            None => tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(Error::Cancelled {
                    operation: operation.to_string(),
                }),
                result = call => result,
            },
        }
    }
}

// =============================================================================
// Per-kind dispatch
// =============================================================================

/// Kinds the pass owns, dispatched onto the matching [`ClusterClient`] calls
#[async_trait]
trait OwnedKind: OwnedFields + Clone + Send + Sync + Sized {
    const KIND: &'static str;

    async fn get(client: &dyn ClusterClient, ns: &str, name: &str) -> Result<Option<Self>>;
    async fn create(client: &dyn ClusterClient, ns: &str, obj: &Self) -> Result<Self>;
    async fn update(client: &dyn ClusterClient, ns: &str, obj: &Self) -> Result<Self>;
}

#[async_trait]
impl OwnedKind for Deployment {
    const KIND: &'static str = "deployment";

    async fn get(client: &dyn ClusterClient, ns: &str, name: &str) -> Result<Option<Self>> {
        client.get_deployment(ns, name).await
    }
    async fn create(client: &dyn ClusterClient, ns: &str, obj: &Self) -> Result<Self> {
        client.create_deployment(ns, obj).await
    }
    async fn update(client: &dyn ClusterClient, ns: &str, obj: &Self) -> Result<Self> {
        client.update_deployment(ns, obj).await
    }
}

#[async_trait]
impl OwnedKind for Service {
    const KIND: &'static str = "service";

    async fn get(client: &dyn ClusterClient, ns: &str, name: &str) -> Result<Option<Self>> {
        client.get_service(ns, name).await
    }
    async fn create(client: &dyn ClusterClient, ns: &str, obj: &Self) -> Result<Self> {
        client.create_service(ns, obj).await
    }
    async fn update(client: &dyn ClusterClient, ns: &str, obj: &Self) -> Result<Self> {
        client.update_service(ns, obj).await
    }
}

#[async_trait]
impl OwnedKind for Ingress {
    const KIND: &'static str = "ingress";

    async fn get(client: &dyn ClusterClient, ns: &str, name: &str) -> Result<Option<Self>> {
        client.get_ingress(ns, name).await
    }
    async fn create(client: &dyn ClusterClient, ns: &str, obj: &Self) -> Result<Self> {
        client.create_ingress(ns, obj).await
    }
    async fn update(client: &dyn ClusterClient, ns: &str, obj: &Self) -> Result<Self> {
        client.update_ingress(ns, obj).await
    }
}

/// What converging one object did
enum Converged<K> {
    Created,
    /// Updated; carries the fresh copy read just before the update
    Updated(K),
}

async fn converge<K: OwnedKind>(
    client: &dyn ClusterClient,
    guard: &PassGuard,
    namespace: &str,
    name: &str,
    desired: &K,
) -> Result<Converged<K>> {
    let live = guard
        .run(&format!("get {}", K::KIND), K::get(client, namespace, name))
        .await?;

    if live.is_none() {
        guard
            .run(&format!("create {}", K::KIND), K::create(client, namespace, desired))
            .await?;
        info!(kind = K::KIND, %namespace, %name, "created");
        return Ok(Converged::Created);
    }

    // Re-read so the update carries the latest resourceVersion
    let fresh = guard
        .run(&format!("get {}", K::KIND), K::get(client, namespace, name))
        .await?
        .ok_or_else(|| {
            Error::internal_with_context(
                "reconciler",
                format!("{} {namespace}/{name} disappeared during update", K::KIND),
            )
        })?;
    let merged = fresh.clone().merge_owned_fields(desired);
    guard
        .run(&format!("update {}", K::KIND), K::update(client, namespace, &merged))
        .await?;
    debug!(kind = K::KIND, %namespace, %name, "updated");
    Ok(Converged::Updated(fresh))
}

// =============================================================================
// Pass
// =============================================================================

/// Result of a successful pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Whether the workload should be looked at again soon
    pub fast_requeue: bool,
    /// Readiness judged this pass, `None` on first creation
    pub status: Option<WorkloadStatus>,
}

/// Converge the owned objects of `ai` toward the output of `engine`.
pub async fn reconcile_pass(
    ai: &AIDeployment,
    client: &dyn ClusterClient,
    engine: &dyn MLEngine,
    guard: &PassGuard,
) -> Result<PassOutcome> {
    let name = ai.name_any();
    let namespace = ai.require_namespace()?;

    let deployment = engine.build_deployment(ai)?;
    let service = desired_service(ai, &deployment, engine.port());
    let ingress = desired_ingress(ai, &service);

    let mut outcome = PassOutcome::default();

    if let Converged::Updated(observed) =
        converge(client, guard, &namespace, &name, &deployment).await?
    {
        let judgment = derive_status(&observed);
        outcome.fast_requeue = judgment.fast_requeue;
        outcome.status = Some(judgment.status);
        write_status(ai, client, guard, &namespace, judgment.status).await;
    }

    converge(client, guard, &namespace, &name, &service).await?;

    if let Some(ingress) = ingress {
        converge(client, guard, &namespace, &name, &ingress).await?;
    }

    Ok(outcome)
}

/// Best-effort status write; failures are logged and never fail the pass
async fn write_status(
    ai: &AIDeployment,
    client: &dyn ClusterClient,
    guard: &PassGuard,
    namespace: &str,
    status: WorkloadStatus,
) {
    if is_status_unchanged(ai, status) {
        debug!(%status, "status unchanged, skipping update");
        return;
    }

    let name = ai.name_any();
    let patch = AIDeploymentStatus { status };
    match guard
        .run(
            "patch status",
            client.patch_workload_status(namespace, &name, &patch),
        )
        .await
    {
        Ok(()) => info!(%status, "updated workload status"),
        Err(e) => warn!(error = %e, %status, "failed to update workload status"),
    }
}
