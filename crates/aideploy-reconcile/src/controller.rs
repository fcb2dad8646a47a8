//! AIDeployment controller
//!
//! Glue between the kube-runtime controller and one reconciliation pass:
//! resolve the declared models, build the engine, run the pass under a
//! guard, and translate the outcome into a requeue decision.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use aideploy_common::crd::AIDeployment;
use aideploy_common::Error;
use aideploy_engine::{EngineRegistry, MLEngine};

use crate::client::ClusterClient;
use crate::reconcile::{reconcile_pass, PassGuard};
use crate::resolver::{resolve_all, ModelResolver};

/// Requeue intervals and pass limits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Requeue after a pass that left the workload settled
    pub ready_requeue: Duration,
    /// Requeue while the workload is not yet ready
    pub fast_requeue: Duration,
    /// Requeue after a retryable failure
    pub error_requeue: Duration,
    /// Upper bound on one pass; unbounded when `None`
    pub pass_timeout: Option<Duration>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            ready_requeue: Duration::from_secs(60),
            fast_requeue: Duration::from_secs(5),
            error_requeue: Duration::from_secs(30),
            pass_timeout: None,
        }
    }
}

/// Shared state for every reconcile call
pub struct Context {
    /// Cluster access
    pub client: Arc<dyn ClusterClient>,
    /// Model reference resolution
    pub resolver: Arc<dyn ModelResolver>,
    /// Engines by name
    pub registry: EngineRegistry,
    /// Requeue intervals
    pub settings: ControllerSettings,
    /// Cancelled on shutdown; aborts in-flight passes
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a context with a fresh shutdown token
    pub fn new(
        client: Arc<dyn ClusterClient>,
        resolver: Arc<dyn ModelResolver>,
        registry: EngineRegistry,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            client,
            resolver,
            registry,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    fn guard(&self) -> PassGuard {
        PassGuard::new(self.shutdown.child_token(), self.settings.pass_timeout)
    }
}

/// Reconcile one AIDeployment
#[instrument(skip(ai, ctx), fields(deployment = %ai.name_any()))]
pub async fn reconcile(ai: Arc<AIDeployment>, ctx: Arc<Context>) -> Result<Action, Error> {
    debug!(engine = %ai.spec.engine.name, models = ai.spec.models.len(), "reconciling");

    let models = resolve_all(ctx.resolver.as_ref(), &ai).await?;
    let engine = ctx.registry.build(&ai, models)?;
    let outcome = reconcile_pass(&ai, ctx.client.as_ref(), &engine, &ctx.guard()).await?;

    if outcome.fast_requeue {
        info!(engine = engine.name(), "workload not ready yet");
        Ok(Action::requeue(ctx.settings.fast_requeue))
    } else {
        Ok(Action::requeue(ctx.settings.ready_requeue))
    }
}

/// Error policy for the AIDeployment controller
///
/// Conflicts requeue on the fast interval, other retryable errors (API
/// failures, deadlines) after the error interval; validation errors wait for
/// the resource to change.
pub fn error_policy(ai: Arc<AIDeployment>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        deployment = %ai.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_conflict() {
        debug!("conflicting write, retrying on the fast interval");
        Action::requeue(ctx.settings.fast_requeue)
    } else if error.is_retryable() {
        Action::requeue(ctx.settings.error_requeue)
    } else {
        Action::await_change()
    }
}
