//! Engine contract, variant enum, and name-keyed registry
//!
//! Every backend implements [`MLEngine`]: it reports its serving port and
//! builds the desired Deployment for an owner. [`Engine`] is the closed set of
//! built-in backends; [`EngineRegistry`] maps `spec.engine.name` to the
//! factory that constructs one.

use std::collections::BTreeMap;

use aideploy_common::crd::{AIDeployment, DeploymentOptions, ResolvedModel};
use aideploy_common::labels::{default_labels, merge_maps, owner_references};
use aideploy_common::{Error, Result, NVIDIA_GPU_RESOURCE};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use tracing::debug;

use crate::config::EngineConfig;
use crate::triton::TritonEngine;
use crate::vllm::VllmEngine;

/// Registry name of the generic multi-model server
pub const ENGINE_TRITON: &str = "triton";

/// Registry name of the single-model accelerator server
pub const ENGINE_VLLM: &str = "vllm";

/// Uniform contract of an inference backend
pub trait MLEngine: Send + Sync {
    /// Registry name of the backend
    fn name(&self) -> &'static str;

    /// HTTP serving port of the main container
    fn port(&self) -> i32;

    /// Desired Deployment, owned by `owner`
    fn build_deployment(&self, owner: &AIDeployment) -> Result<Deployment>;
}

/// A constructed engine
#[derive(Clone, Debug)]
pub enum Engine {
    /// Generic multi-model server
    Triton(TritonEngine),
    /// Single-model accelerator server
    Vllm(VllmEngine),
}

impl MLEngine for Engine {
    fn name(&self) -> &'static str {
        match self {
            Engine::Triton(e) => e.name(),
            Engine::Vllm(e) => e.name(),
        }
    }

    fn port(&self) -> i32 {
        match self {
            Engine::Triton(e) => e.port(),
            Engine::Vllm(e) => e.port(),
        }
    }

    fn build_deployment(&self, owner: &AIDeployment) -> Result<Deployment> {
        match self {
            Engine::Triton(e) => e.build_deployment(owner),
            Engine::Vllm(e) => e.build_deployment(owner),
        }
    }
}

/// Constructor for one engine variant
pub type EngineFactory = fn(&AIDeployment, Vec<ResolvedModel>, &EngineConfig) -> Result<Engine>;

fn triton_factory(
    ai: &AIDeployment,
    models: Vec<ResolvedModel>,
    config: &EngineConfig,
) -> Result<Engine> {
    TritonEngine::new(ai, models, config.triton.clone()).map(Engine::Triton)
}

fn vllm_factory(
    ai: &AIDeployment,
    models: Vec<ResolvedModel>,
    config: &EngineConfig,
) -> Result<Engine> {
    VllmEngine::new(ai, models, config.vllm.clone()).map(Engine::Vllm)
}

/// Engine factories keyed by name
#[derive(Clone)]
pub struct EngineRegistry {
    config: EngineConfig,
    factories: BTreeMap<String, EngineFactory>,
}

impl EngineRegistry {
    /// Registry with the built-in engines
    pub fn new(config: EngineConfig) -> Self {
        let mut registry = Self::empty(config);
        registry.register(ENGINE_TRITON, triton_factory);
        registry.register(ENGINE_VLLM, vllm_factory);
        registry
    }

    /// Registry with no engines
    pub fn empty(config: EngineConfig) -> Self {
        Self {
            config,
            factories: BTreeMap::new(),
        }
    }

    /// Register `factory` under `name`, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, factory: EngineFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Registered engine names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Engine defaults shared by all factories
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Construct the engine named by `ai.spec.engine.name`
    pub fn build(&self, ai: &AIDeployment, models: Vec<ResolvedModel>) -> Result<Engine> {
        let name = ai.spec.engine.name.as_str();
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownEngine {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        debug!(engine = name, models = models.len(), "building engine");
        factory(ai, models, &self.config)
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}

// =============================================================================
// Pod assembly shared by the built-in engines
// =============================================================================

/// Identity of the workload an engine builds for
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct WorkloadRef {
    pub name: String,
    pub namespace: Option<String>,
}

impl WorkloadRef {
    pub(crate) fn of(ai: &AIDeployment) -> Self {
        Self {
            name: ai.name_any(),
            namespace: ai.namespace(),
        }
    }
}

/// Deep copy of the user's base pod template, or an empty one
pub(crate) fn base_template(options: &DeploymentOptions) -> PodTemplateSpec {
    options.pod_template.clone().unwrap_or_default()
}

/// Wrap a finished pod template into the Deployment for `workload`.
///
/// Pod labels are merge(defaults, template, user); pod annotations are
/// merge(template, user). The selector is always the default label set.
pub(crate) fn assemble_deployment(
    owner: &AIDeployment,
    workload: &WorkloadRef,
    options: &DeploymentOptions,
    mut template: PodTemplateSpec,
    replicas: Option<i32>,
) -> Deployment {
    let defaults = default_labels(&workload.name);
    let mut pod_meta = template.metadata.take().unwrap_or_default();
    let template_labels = pod_meta.labels.take().unwrap_or_default();
    let template_annotations = pod_meta.annotations.take().unwrap_or_default();

    pod_meta.labels = Some(merge_maps([&defaults, &template_labels, &options.labels]));
    pod_meta.annotations =
        non_empty(merge_maps([&template_annotations, &options.annotations]));
    template.metadata = Some(pod_meta);

    Deployment {
        metadata: ObjectMeta {
            name: Some(workload.name.clone()),
            namespace: workload.namespace.clone(),
            owner_references: non_empty_vec(owner_references(owner)),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas,
            selector: LabelSelector {
                match_labels: Some(defaults),
                ..Default::default()
            },
            template,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// User resources for the serving container, plus one GPU when `gpu` is set
pub(crate) fn serving_resources(
    user: Option<&ResourceRequirements>,
    gpu: bool,
) -> Option<ResourceRequirements> {
    let mut resources = user.cloned().unwrap_or_default();
    if gpu {
        let one = Quantity("1".to_string());
        resources
            .requests
            .get_or_insert_with(BTreeMap::new)
            .insert(NVIDIA_GPU_RESOURCE.to_string(), one.clone());
        resources
            .limits
            .get_or_insert_with(BTreeMap::new)
            .insert(NVIDIA_GPU_RESOURCE.to_string(), one);
    }
    (resources != ResourceRequirements::default()).then_some(resources)
}

/// Place the serving container into `pod`.
///
/// A template container with the same name is the base: fields the engine
/// sets win, everything else (security context, extra mounts, env) is kept.
pub(crate) fn install_serving_container(pod: &mut PodSpec, container: Container) {
    match pod.containers.iter().position(|c| c.name == container.name) {
        Some(index) => {
            let base = pod.containers.remove(index);
            debug!(container = %container.name, "merging into template container");
            pod.containers.insert(index, overlay_container(base, container));
        }
        None => pod.containers.push(container),
    }
}

/// Insert `containers`, replacing any with the same name in place
pub(crate) fn upsert_containers(target: &mut Vec<Container>, containers: Vec<Container>) {
    for container in containers {
        match target.iter_mut().find(|c| c.name == container.name) {
            Some(existing) => *existing = container,
            None => target.push(container),
        }
    }
}

fn overlay_container(mut base: Container, ours: Container) -> Container {
    base.image = ours.image.or(base.image);
    base.image_pull_policy = ours.image_pull_policy.or(base.image_pull_policy);
    base.command = ours.command.or(base.command);
    base.args = ours.args.or(base.args);
    base.ports = ours.ports.or(base.ports);
    base.resources = ours.resources.or(base.resources);
    base.startup_probe = ours.startup_probe.or(base.startup_probe);
    base.readiness_probe = ours.readiness_probe.or(base.readiness_probe);
    base.liveness_probe = ours.liveness_probe.or(base.liveness_probe);
    base.env = merge_keyed(base.env, ours.env, |e: &EnvVar| e.name.as_str());
    base.volume_mounts = merge_keyed(base.volume_mounts, ours.volume_mounts, |m: &VolumeMount| {
        m.mount_path.as_str()
    });
    base
}

/// `base` entries whose key `ours` does not redefine, followed by `ours`
fn merge_keyed<T>(
    base: Option<Vec<T>>,
    ours: Option<Vec<T>>,
    key: impl Fn(&T) -> &str,
) -> Option<Vec<T>> {
    let Some(ours) = ours else {
        return base;
    };
    let mut merged: Vec<T> = base
        .unwrap_or_default()
        .into_iter()
        .filter(|b| !ours.iter().any(|o| key(o) == key(b)))
        .collect();
    merged.extend(ours);
    Some(merged)
}

fn non_empty(map: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!map.is_empty()).then_some(map)
}

fn non_empty_vec<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}
