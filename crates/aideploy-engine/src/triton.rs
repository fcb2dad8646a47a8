//! Generic multi-model inference server
//!
//! Serves any number of models from a shared model repository volume. Each
//! model is downloaded by its own init container before the server starts.

use aideploy_common::crd::{AIDeployment, AIDeploymentSpec, ResolvedModel};
use aideploy_common::{Result, CONTAINER_ENGINE_NAME, NVIDIA_RUNTIME_CLASS};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, ContainerPort};
use tracing::debug;

use crate::config::EngineDefaults;
use crate::engine::{
    assemble_deployment, base_template, install_serving_container, serving_resources,
    upsert_containers, MLEngine, WorkloadRef, ENGINE_TRITON,
};
use crate::provisioner::{
    ensure_models_volume, init_container_for, models_mount, ModelSource, MODELS_MOUNT_PATH,
};

/// Generic multi-model server engine
#[derive(Clone, Debug)]
pub struct TritonEngine {
    workload: WorkloadRef,
    spec: AIDeploymentSpec,
    models: Vec<ResolvedModel>,
    defaults: EngineDefaults,
}

impl TritonEngine {
    /// Capture the declaration and resolved models.
    ///
    /// Fails with `InvalidModelUri` when any model cannot be downloaded.
    pub fn new(
        ai: &AIDeployment,
        models: Vec<ResolvedModel>,
        defaults: EngineDefaults,
    ) -> Result<Self> {
        for model in &models {
            ModelSource::classify(model)?;
        }
        Ok(Self {
            workload: WorkloadRef::of(ai),
            spec: ai.spec.clone(),
            models,
            defaults,
        })
    }

    fn image(&self) -> String {
        self.defaults.image(&self.spec.engine.options)
    }

    fn serving_container(&self, image: String) -> Container {
        let options = &self.spec.deployment;
        let accelerated = options.accelerator.is_some();

        let mut ports = vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: self.port(),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }];
        if let Some(metrics_port) = self.defaults.metrics_port {
            ports.push(ContainerPort {
                name: Some("metrics".to_string()),
                container_port: metrics_port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            });
        }

        let mut container = Container {
            name: CONTAINER_ENGINE_NAME.to_string(),
            image: Some(image),
            image_pull_policy: Some("Always".to_string()),
            args: Some(vec![
                "tritonserver".to_string(),
                format!("--model-repository={MODELS_MOUNT_PATH}"),
            ]),
            ports: Some(ports),
            resources: serving_resources(options.resources.as_ref(), accelerated),
            volume_mounts: Some(vec![models_mount(MODELS_MOUNT_PATH)]),
            ..Default::default()
        };
        self.defaults
            .probes
            .build(self.port(), options)
            .apply(&mut container);
        container
    }
}

impl MLEngine for TritonEngine {
    fn name(&self) -> &'static str {
        ENGINE_TRITON
    }

    fn port(&self) -> i32 {
        self.defaults.port
    }

    fn build_deployment(&self, owner: &AIDeployment) -> Result<Deployment> {
        let options = &self.spec.deployment;
        let image = self.image();
        debug!(
            deployment = %self.workload.name,
            %image,
            models = self.models.len(),
            "building triton deployment"
        );

        let init_containers = self
            .models
            .iter()
            .map(|model| init_container_for(model, &image))
            .collect::<Result<Vec<_>>>()?;

        let mut template = base_template(options);
        let pod = template.spec.get_or_insert_with(Default::default);
        pod.automount_service_account_token = Some(false);
        ensure_models_volume(pod.volumes.get_or_insert_with(Vec::new));
        upsert_containers(pod.init_containers.get_or_insert_with(Vec::new), init_containers);
        install_serving_container(pod, self.serving_container(image));
        if options.accelerator.is_some() {
            pod.runtime_class_name = Some(NVIDIA_RUNTIME_CLASS.to_string());
        }

        Ok(assemble_deployment(
            owner,
            &self.workload,
            options,
            template,
            options.replicas,
        ))
    }
}
