//! Per-engine defaults
//!
//! Image coordinates, serving port, and probe tables for each built-in
//! engine. The built-in values can be replaced per engine from a YAML file
//! passed to the operator (`--engine-config`); an engine block in the file
//! replaces that engine's defaults wholesale.

use std::collections::BTreeMap;
use std::path::Path;

use aideploy_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::probe::{ProbeDefault, ProbeTable, ProbeTiming};
use crate::{OPTION_IMAGE_REPOSITORY, OPTION_IMAGE_TAG};

/// Defaults for one engine
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineDefaults {
    /// Image repository used when `imageRepository` is not set
    pub image_repository: String,
    /// Image tag used when `imageTag` is not set
    pub image_tag: String,
    /// HTTP serving port
    pub port: i32,
    /// Metrics port, exposed on the container when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<i32>,
    /// Probe defaults
    pub probes: ProbeTable,
}

impl EngineDefaults {
    /// Built-in defaults for the generic multi-model server
    pub fn triton() -> Self {
        Self {
            image_repository: "nvcr.io/nvidia/tritonserver".to_string(),
            image_tag: "24.01-py3".to_string(),
            port: 8000,
            metrics_port: Some(8002),
            probes: ProbeTable {
                startup: ProbeDefault::new(
                    "/v2/health/ready",
                    ProbeTiming {
                        period_seconds: 10,
                        failure_threshold: 30,
                        ..Default::default()
                    },
                ),
                readiness: ProbeDefault::new(
                    "/v2/health/ready",
                    ProbeTiming {
                        initial_delay_seconds: 5,
                        period_seconds: 5,
                        failure_threshold: 3,
                        ..Default::default()
                    },
                ),
                liveness: ProbeDefault::new(
                    "/v2/health/live",
                    ProbeTiming {
                        initial_delay_seconds: 15,
                        period_seconds: 10,
                        timeout_seconds: 25,
                        failure_threshold: 3,
                        ..Default::default()
                    },
                ),
            },
        }
    }

    /// Built-in defaults for the single-model accelerator server
    pub fn vllm() -> Self {
        Self {
            image_repository: "vllm/vllm-openai".to_string(),
            image_tag: "latest".to_string(),
            port: 8000,
            metrics_port: None,
            probes: ProbeTable {
                startup: ProbeDefault::new(
                    "/health",
                    ProbeTiming {
                        initial_delay_seconds: 3,
                        period_seconds: 1,
                        failure_threshold: 120,
                        ..Default::default()
                    },
                ),
                readiness: ProbeDefault::new(
                    "/health",
                    ProbeTiming {
                        failure_threshold: 3,
                        ..Default::default()
                    },
                ),
                liveness: ProbeDefault::new(
                    "/health",
                    ProbeTiming {
                        period_seconds: 30,
                        timeout_seconds: 15,
                        failure_threshold: 10,
                        ..Default::default()
                    },
                ),
            },
        }
    }

    /// Image reference honoring the `imageRepository` and `imageTag` options.
    ///
    /// Empty option values count as unset.
    pub fn image(&self, options: &BTreeMap<String, String>) -> String {
        let repository = option(options, OPTION_IMAGE_REPOSITORY).unwrap_or(&self.image_repository);
        let tag = option(options, OPTION_IMAGE_TAG).unwrap_or(&self.image_tag);
        format!("{repository}:{tag}")
    }
}

/// Non-empty value of an engine option
pub(crate) fn option<'a>(options: &'a BTreeMap<String, String>, key: &str) -> Option<&'a String> {
    options.get(key).filter(|v| !v.is_empty())
}

/// Defaults for every built-in engine
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Generic multi-model server
    #[serde(default = "EngineDefaults::triton")]
    pub triton: EngineDefaults,
    /// Single-model accelerator server
    #[serde(default = "EngineDefaults::vllm")]
    pub vllm: EngineDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            triton: EngineDefaults::triton(),
            vllm: EngineDefaults::vllm(),
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document; missing engine blocks keep built-in defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::serialization(format!("invalid engine config: {e}")))
    }

    /// Load from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::internal_with_context(
                "engine-config",
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        Self::from_yaml(&content)
    }
}
