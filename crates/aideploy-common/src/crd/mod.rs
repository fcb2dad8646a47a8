//! Custom Resource Definitions for aideploy
//!
//! - [`AIDeployment`]: declared model-serving workload (engine, models, exposure)
//! - [`AIModelMap`]: catalog of model variants referenced by `modelMapRef`

mod deployment;
mod model;

pub use deployment::{
    AIDeployment, AIDeploymentSpec, AIDeploymentStatus, AIEngine, Accelerator,
    AcceleratorInterface, AcceleratorVersion, DeploymentOptions, Endpoint, IngressOptions,
    ProbeOverride, ServiceOptions, WorkloadStatus,
};
pub use model::{
    AIModel, AIModelMap, AIModelMapReference, AIModelMapSpec, AIModelSpec, AIModelVariant,
    DataType, ModelReference, Quantization, ResolvedModel,
};
