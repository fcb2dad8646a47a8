//! Workload readiness derived from the observed Deployment

use aideploy_common::crd::{AIDeployment, WorkloadStatus};
use k8s_openapi::api::apps::v1::Deployment;

/// Readiness judgment for one pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusJudgment {
    /// Status to report on the AIDeployment
    pub status: WorkloadStatus,
    /// Whether the controller should look again soon
    pub fast_requeue: bool,
}

/// Judge readiness from an observed Deployment.
///
/// Zero (or unreported) available replicas is `NotReady` with a fast requeue;
/// anything else is `Ready`.
pub fn derive_status(observed: &Deployment) -> StatusJudgment {
    let available = observed
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);

    if available == 0 {
        StatusJudgment {
            status: WorkloadStatus::NotReady,
            fast_requeue: true,
        }
    } else {
        StatusJudgment {
            status: WorkloadStatus::Ready,
            fast_requeue: false,
        }
    }
}

/// Whether the AIDeployment already reports `status`, so the write can be skipped
pub(crate) fn is_status_unchanged(ai: &AIDeployment, status: WorkloadStatus) -> bool {
    ai.status
        .as_ref()
        .map(|s| s.status == status)
        .unwrap_or(false)
}
