//! Model declarations and the AIModelMap catalog CRD
//!
//! A model in an AIDeployment is either declared inline (URI plus optional
//! quantization and data type) or referenced by `modelMapRef`, which names an
//! AIModelMap in the same namespace and a variant within it. References are
//! resolved into [`ResolvedModel`] before any engine sees them.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Weight quantization scheme the engine should load the model with
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    /// Activation-aware weight quantization
    Awq,
    /// GPTQ post-training quantization
    Gptq,
    /// SqueezeLLM
    SqueezeLlm,
    /// 8-bit floating point
    Fp8,
}

impl Quantization {
    /// Engine argument spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Awq => "awq",
            Self::Gptq => "gptq",
            Self::SqueezeLlm => "squeezellm",
            Self::Fp8 => "fp8",
        }
    }
}

/// Numeric type used for weights and activations
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Let the engine pick
    Auto,
    /// Alias of float16
    Half,
    /// IEEE half precision
    Float16,
    /// Brain floating point
    Bfloat16,
    /// Alias of float32
    Float,
    /// IEEE single precision
    Float32,
}

impl DataType {
    /// Engine argument spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Half => "half",
            Self::Float16 => "float16",
            Self::Bfloat16 => "bfloat16",
            Self::Float => "float",
            Self::Float32 => "float32",
        }
    }
}

/// Concrete model location and loading hints
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AIModelSpec {
    /// Model location: an http(s) URL for download-based engines, or a
    /// registry identifier (e.g. `microsoft/phi-2`) for engines that fetch
    /// models themselves
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,

    /// Quantization scheme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<Quantization>,

    /// Weight data type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
}

/// Reference to a variant inside an AIModelMap
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AIModelMapReference {
    /// AIModelMap name (same namespace as the AIDeployment)
    pub name: String,

    /// Variant key within the map
    pub variant: String,
}

impl std::fmt::Display for AIModelMapReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.variant)
    }
}

/// One model entry in an AIDeployment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AIModel {
    /// Model name used for on-disk layout and init container naming
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Inline model declaration
    #[serde(flatten)]
    pub spec: AIModelSpec,

    /// Catalog reference; takes precedence over the inline fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_map_ref: Option<AIModelMapReference>,
}

/// Where a declared model comes from
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModelReference<'a> {
    /// Declared inline on the AIDeployment
    Inline(&'a AIModelSpec),
    /// Looked up in an AIModelMap
    Catalog(&'a AIModelMapReference),
}

impl AIModel {
    /// Inline model with only a URI
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            spec: AIModelSpec {
                uri: uri.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Model referencing an AIModelMap variant
    pub fn from_map(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            model_map_ref: Some(AIModelMapReference {
                name: name.into(),
                variant: variant.into(),
            }),
            ..Default::default()
        }
    }

    /// The declared source, `None` when neither a URI nor a reference is set
    pub fn reference(&self) -> Option<ModelReference<'_>> {
        match (&self.model_map_ref, self.spec.uri.is_empty()) {
            (Some(map_ref), _) => Some(ModelReference::Catalog(map_ref)),
            (None, false) => Some(ModelReference::Inline(&self.spec)),
            (None, true) => None,
        }
    }
}

/// A model with its reference resolved; this is what engines consume
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedModel {
    /// Model name, unique within the deployment
    pub name: String,
    /// Concrete location
    pub uri: String,
    /// Quantization scheme
    pub quantization: Option<Quantization>,
    /// Weight data type
    pub data_type: Option<DataType>,
}

impl ResolvedModel {
    /// Resolved model with only a name and URI
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            quantization: None,
            data_type: None,
        }
    }

    /// Resolve from a name and a concrete model spec
    pub fn from_spec(name: impl Into<String>, spec: &AIModelSpec) -> Self {
        Self {
            name: name.into(),
            uri: spec.uri.clone(),
            quantization: spec.quantization,
            data_type: spec.data_type,
        }
    }
}

// =============================================================================
// AIModelMap CRD
// =============================================================================

/// One variant of a catalogued model
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AIModelVariant {
    /// Variant key (e.g. "original", "awq")
    pub variant: String,

    /// Engine this variant is intended for; empty matches any engine
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub engine: String,

    /// Concrete model location and hints
    #[serde(flatten)]
    pub spec: AIModelSpec,
}

/// Catalog of model variants
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aideploy.dev",
    version = "v1alpha1",
    kind = "AIModelMap",
    plural = "aimodelmaps",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AIModelMapSpec {
    /// Available variants
    #[serde(default)]
    pub variants: Vec<AIModelVariant>,
}

impl AIModelMapSpec {
    /// Find a variant for `engine`, preferring an engine-specific entry over
    /// an engine-agnostic one
    pub fn find(&self, variant: &str, engine: &str) -> Option<&AIModelVariant> {
        let mut fallback = None;
        for candidate in self.variants.iter().filter(|v| v.variant == variant) {
            if candidate.engine == engine {
                return Some(candidate);
            }
            if candidate.engine.is_empty() && fallback.is_none() {
                fallback = Some(candidate);
            }
        }
        fallback
    }
}
