//! Health-check defaults and the user override overlay
//!
//! Every engine carries an explicit [`ProbeTable`]: the HTTP path and all
//! timing fields for its startup, readiness, and liveness probes. User
//! overrides from `spec.deployment.*Probe` replace individual timing fields;
//! the probe target (path and port) always comes from the engine.

use aideploy_common::crd::{DeploymentOptions, ProbeOverride};
use k8s_openapi::api::core::v1::{Container, HTTPGetAction, Probe};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};

/// Timing fields of one probe; unspecified fields take Kubernetes defaults
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeTiming {
    /// Seconds after container start before the first probe
    pub initial_delay_seconds: i32,
    /// Seconds between probes
    pub period_seconds: i32,
    /// Seconds before a probe times out
    pub timeout_seconds: i32,
    /// Consecutive successes to be considered healthy again
    pub success_threshold: i32,
    /// Consecutive failures to be considered unhealthy
    pub failure_threshold: i32,
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self {
            initial_delay_seconds: 0,
            period_seconds: 10,
            timeout_seconds: 1,
            success_threshold: 1,
            failure_threshold: 3,
        }
    }
}

/// Default HTTP probe for one probe kind
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeDefault {
    /// HTTP path probed on the serving port
    pub path: String,
    /// Timing fields
    #[serde(flatten)]
    pub timing: ProbeTiming,
}

impl ProbeDefault {
    /// Probe on `path` with the given timings
    pub fn new(path: impl Into<String>, timing: ProbeTiming) -> Self {
        Self {
            path: path.into(),
            timing,
        }
    }
}

/// Startup, readiness, and liveness defaults of one engine
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeTable {
    /// Startup probe default
    pub startup: ProbeDefault,
    /// Readiness probe default
    pub readiness: ProbeDefault,
    /// Liveness probe default
    pub liveness: ProbeDefault,
}

/// The three probes of a serving container
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerProbes {
    /// Startup probe
    pub startup: Probe,
    /// Readiness probe
    pub readiness: Probe,
    /// Liveness probe
    pub liveness: Probe,
}

impl ContainerProbes {
    /// Install all three probes on `container`
    pub fn apply(self, container: &mut Container) {
        container.startup_probe = Some(self.startup);
        container.readiness_probe = Some(self.readiness);
        container.liveness_probe = Some(self.liveness);
    }
}

impl ProbeTable {
    /// Build the container probes for `port`, overlaying the user overrides
    /// declared in `options`
    pub fn build(&self, port: i32, options: &DeploymentOptions) -> ContainerProbes {
        ContainerProbes {
            startup: overlay_probe(&self.startup, port, options.startup_probe.as_ref()),
            readiness: overlay_probe(&self.readiness, port, options.readiness_probe.as_ref()),
            liveness: overlay_probe(&self.liveness, port, options.liveness_probe.as_ref()),
        }
    }
}

/// Merge a user override onto an engine default probe.
///
/// A timing field is overridden when the user set it to a non-zero value.
/// `initialDelaySeconds` is the exception: an explicit zero is honored.
pub fn overlay_probe(default: &ProbeDefault, port: i32, user: Option<&ProbeOverride>) -> Probe {
    let mut timing = default.timing.clone();

    if let Some(user) = user {
        if let Some(delay) = user.initial_delay_seconds {
            timing.initial_delay_seconds = delay;
        }
        overlay_nonzero(&mut timing.period_seconds, user.period_seconds);
        overlay_nonzero(&mut timing.timeout_seconds, user.timeout_seconds);
        overlay_nonzero(&mut timing.success_threshold, user.success_threshold);
        overlay_nonzero(&mut timing.failure_threshold, user.failure_threshold);
    }

    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(default.path.clone()),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(timing.initial_delay_seconds),
        period_seconds: Some(timing.period_seconds),
        timeout_seconds: Some(timing.timeout_seconds),
        success_threshold: Some(timing.success_threshold),
        failure_threshold: Some(timing.failure_threshold),
        ..Default::default()
    }
}

fn overlay_nonzero(target: &mut i32, value: Option<i32>) {
    if let Some(v) = value.filter(|v| *v != 0) {
        *target = v;
    }
}
