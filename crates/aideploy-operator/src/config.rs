//! Controller configuration from flags and environment

use std::path::PathBuf;
use std::time::Duration;

use aideploy_engine::EngineConfig;
use aideploy_reconcile::ControllerSettings;
use clap::Args;

/// Controller flags; every flag can also be set through its environment variable
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct ControllerArgs {
    /// Only watch AIDeployments in this namespace (default: all namespaces)
    #[arg(long, env = "AIDEPLOY_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// YAML file overriding built-in engine defaults (images, ports, probes)
    #[arg(long, env = "AIDEPLOY_ENGINE_CONFIG")]
    pub engine_config: Option<PathBuf>,

    /// Seconds before re-checking a settled workload
    #[arg(long, env = "AIDEPLOY_READY_REQUEUE_SECS", default_value_t = 60)]
    pub ready_requeue_secs: u64,

    /// Seconds before re-checking a workload that is not ready yet
    #[arg(long, env = "AIDEPLOY_FAST_REQUEUE_SECS", default_value_t = 5)]
    pub fast_requeue_secs: u64,

    /// Seconds before retrying after a retryable failure
    #[arg(long, env = "AIDEPLOY_ERROR_REQUEUE_SECS", default_value_t = 30)]
    pub error_requeue_secs: u64,

    /// Upper bound on one reconciliation pass, in seconds
    #[arg(long, env = "AIDEPLOY_PASS_TIMEOUT_SECS")]
    pub pass_timeout_secs: Option<u64>,
}

impl ControllerArgs {
    /// Requeue intervals and pass timeout
    pub fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            ready_requeue: Duration::from_secs(self.ready_requeue_secs),
            fast_requeue: Duration::from_secs(self.fast_requeue_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            pass_timeout: self.pass_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Engine defaults, from the override file when one is given
    pub fn engine_config(&self) -> aideploy_common::Result<EngineConfig> {
        match &self.engine_config {
            Some(path) => EngineConfig::load(path),
            None => Ok(EngineConfig::default()),
        }
    }
}
