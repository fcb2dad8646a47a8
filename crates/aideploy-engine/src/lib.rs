//! Inference engine builders for aideploy
//!
//! Turns a declared [`AIDeployment`](aideploy_common::crd::AIDeployment) plus
//! its resolved models into the concrete Deployment for one inference
//! backend. Engines are looked up by name in an [`EngineRegistry`].

#![deny(missing_docs)]

pub mod config;
pub mod engine;
pub mod probe;
pub mod provisioner;
pub mod triton;
pub mod vllm;

pub use config::{EngineConfig, EngineDefaults};
pub use engine::{Engine, EngineFactory, EngineRegistry, MLEngine};
pub use triton::TritonEngine;
pub use vllm::VllmEngine;

/// Engine option: image tag override
pub const OPTION_IMAGE_TAG: &str = "imageTag";

/// Engine option: image repository override
pub const OPTION_IMAGE_REPOSITORY: &str = "imageRepository";

/// Engine option: weight data type (`--dtype`)
pub const OPTION_DTYPE: &str = "dtype";

/// Engine option: quantization scheme (`--quantization`)
pub const OPTION_QUANTIZATION: &str = "quantization";

/// Engine option: maximum context length (`--max-model-len`)
pub const OPTION_MAX_MODEL_LEN: &str = "maxModelLen";

/// Engine option: fraction of GPU memory to reserve (`--gpu-memory-utilization`)
pub const OPTION_GPU_MEMORY_UTILIZATION: &str = "gpuMemoryUtilization";
