//! Common types for aideploy: CRDs, errors, labels, and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod labels;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for aideploy custom resources
pub const API_GROUP: &str = "aideploy.dev";

/// Field manager / controller name used for owned resources and status patches
pub const CONTROLLER_NAME: &str = "aideploy-operator";

/// Label and annotation key identifying the AIDeployment a resource belongs to
pub const DEPLOYMENT_LABEL_KEY: &str = "aideploy.dev/deployment";

/// Standard Kubernetes managed-by label key
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value for the managed-by label on resources created by this operator
pub const LABEL_MANAGED_BY_AIDEPLOY: &str = "aideploy";

/// Name of the serving container in every engine-built pod
pub const CONTAINER_ENGINE_NAME: &str = "engine";

/// Extended resource name for NVIDIA GPUs
pub const NVIDIA_GPU_RESOURCE: &str = "nvidia.com/gpu";

/// Runtime class used for accelerator workloads
pub const NVIDIA_RUNTIME_CLASS: &str = "nvidia";
