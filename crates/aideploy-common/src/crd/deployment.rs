//! AIDeployment CRD types
//!
//! An `AIDeployment` declares one model-serving workload: which inference
//! engine to run, which models to load, how to shape the pod, and which
//! domains to expose. The operator converges a Deployment, a Service and
//! (when endpoints are declared) an Ingress from it.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, PodTemplateSpec, ResourceRequirements};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::model::AIModel;

// =============================================================================
// Status
// =============================================================================

/// Observed readiness of an AIDeployment's serving workload
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum WorkloadStatus {
    /// Not yet evaluated (first pass, or Deployment just created)
    #[default]
    Unknown,
    /// Deployment exists but has no available replicas
    NotReady,
    /// Deployment has at least one available replica
    Ready,
}

impl std::fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::NotReady => write!(f, "NotReady"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// Status of an AIDeployment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AIDeploymentStatus {
    /// Readiness of the serving workload
    #[serde(default)]
    pub status: WorkloadStatus,
}

// =============================================================================
// Spec building blocks
// =============================================================================

/// Inference engine selection
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AIEngine {
    /// Registered engine name (e.g. "triton", "vllm")
    pub name: String,

    /// Free-form engine options (imageTag, imageRepository, dtype, quantization, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// Externally reachable domain for the workload
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Fully qualified host name routed to the workload
    pub domain: String,
}

/// Health-check override; only the fields that are set replace engine defaults.
///
/// The probe target (path and port) always comes from the engine.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOverride {
    /// Seconds after container start before the probe begins; an explicit 0 is honored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_seconds: Option<i32>,

    /// Seconds between probe attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_seconds: Option<i32>,

    /// Seconds before a probe attempt times out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,

    /// Consecutive successes required after a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<i32>,

    /// Consecutive failures before the probe is considered failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<i32>,
}

/// Accelerator programming interface
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AcceleratorInterface {
    /// NVIDIA CUDA
    #[default]
    #[serde(rename = "CUDA")]
    Cuda,
}

/// Minimum accelerator capability version
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcceleratorVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    #[serde(default)]
    pub minor: u32,
}

/// Accelerator requirement for the serving container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Accelerator {
    /// Programming interface the engine needs
    #[serde(default)]
    pub interface: AcceleratorInterface,

    /// Minimum compute capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<AcceleratorVersion>,
}

/// Pod-level customization of the generated Deployment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOptions {
    /// Replica count (engine decides the default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Base pod template; the engine adds its containers and volumes on top
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,

    /// Extra pod labels (override defaults on collision)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Extra pod annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Resource requests and limits for the serving container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Accelerator requirement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator: Option<Accelerator>,

    /// Startup probe override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_probe: Option<ProbeOverride>,

    /// Readiness probe override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<ProbeOverride>,

    /// Liveness probe override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<ProbeOverride>,
}

/// Service customization
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOptions {
    /// Extra Service labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Extra Service annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Ingress customization
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressOptions {
    /// Terminate TLS for all declared domains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,

    /// Extra Ingress labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Extra Ingress annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl IngressOptions {
    /// Whether TLS is enabled (defaults to off)
    pub fn tls_enabled(&self) -> bool {
        self.tls.unwrap_or(false)
    }
}

// =============================================================================
// CRD
// =============================================================================

/// Declared AI model-serving workload
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aideploy.dev",
    version = "v1alpha1",
    kind = "AIDeployment",
    plural = "aideployments",
    shortname = "aid",
    namespaced,
    status = "AIDeploymentStatus",
    printcolumn = r#"{"name":"Engine","type":"string","jsonPath":".spec.engine.name"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AIDeploymentSpec {
    /// Inference engine and its options
    pub engine: AIEngine,

    /// Domains to expose through an Ingress
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoint: Vec<Endpoint>,

    /// Models to serve, in order
    #[serde(default)]
    pub models: Vec<AIModel>,

    /// Deployment customization
    #[serde(default)]
    pub deployment: DeploymentOptions,

    /// Service customization
    #[serde(default)]
    pub service: ServiceOptions,

    /// Ingress customization
    #[serde(default)]
    pub ingress: IngressOptions,

    /// Environment passed verbatim to engines that accept it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

impl AIDeployment {
    /// Current workload status, `Unknown` when never written
    pub fn workload_status(&self) -> WorkloadStatus {
        self.status
            .as_ref()
            .map(|s| s.status)
            .unwrap_or_default()
    }

    /// Namespace of the workload; every owned object lives there.
    ///
    /// A cluster-scoped copy (no namespace) is a validation error.
    pub fn require_namespace(&self) -> crate::Result<String> {
        self.namespace().ok_or_else(|| {
            crate::Error::validation_for_field(
                self.name_any(),
                "metadata.namespace",
                "AIDeployment has no namespace",
            )
        })
    }

    /// Declared endpoint domains, deduplicated in declaration order
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = Vec::with_capacity(self.spec.endpoint.len());
        for endpoint in &self.spec.endpoint {
            if !domains.contains(&endpoint.domain) {
                domains.push(endpoint.domain.clone());
            }
        }
        domains
    }
}
