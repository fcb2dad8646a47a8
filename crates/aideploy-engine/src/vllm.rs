//! Single-model accelerator inference server
//!
//! Serves exactly one model, which the server fetches itself from a model
//! registry into a cache volume. Always runs on one NVIDIA GPU.

use aideploy_common::crd::{AIDeployment, AIDeploymentSpec, ResolvedModel};
use aideploy_common::{Error, Result, CONTAINER_ENGINE_NAME, NVIDIA_RUNTIME_CLASS};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, ContainerPort};
use tracing::debug;

use crate::config::{option, EngineDefaults};
use crate::engine::{
    assemble_deployment, base_template, install_serving_container, serving_resources, MLEngine,
    WorkloadRef, ENGINE_VLLM,
};
use crate::provisioner::{ensure_models_volume, models_mount};
use crate::{
    OPTION_DTYPE, OPTION_GPU_MEMORY_UTILIZATION, OPTION_MAX_MODEL_LEN, OPTION_QUANTIZATION,
};

/// Cache directory the server downloads models into
const CACHE_MOUNT_PATH: &str = "/root/.cache/huggingface";

/// Single-model accelerator server engine
#[derive(Clone, Debug)]
pub struct VllmEngine {
    workload: WorkloadRef,
    spec: AIDeploymentSpec,
    model: ResolvedModel,
    defaults: EngineDefaults,
}

impl VllmEngine {
    /// Capture the declaration and its only model.
    ///
    /// Fails with `ModelsNotSpecified` for zero models and `OnlyOneModel`
    /// for more than one.
    pub fn new(
        ai: &AIDeployment,
        mut models: Vec<ResolvedModel>,
        defaults: EngineDefaults,
    ) -> Result<Self> {
        let model = match models.len() {
            0 => return Err(Error::ModelsNotSpecified),
            1 => models.remove(0),
            count => return Err(Error::OnlyOneModel { count }),
        };
        let workload = WorkloadRef::of(ai);
        reject_extra_containers(&workload, &ai.spec)?;
        Ok(Self {
            workload,
            spec: ai.spec.clone(),
            model,
            defaults,
        })
    }

    /// Server arguments: the model, then data type and quantization (engine
    /// options win over model tags), then recognized tuning flags
    fn args(&self) -> Vec<String> {
        let options = &self.spec.engine.options;
        let mut args = vec!["--model".to_string(), self.model.uri.clone()];

        let dtype = option(options, OPTION_DTYPE)
            .cloned()
            .or_else(|| self.model.data_type.map(|d| d.as_str().to_string()));
        if let Some(dtype) = dtype {
            args.extend(["--dtype".to_string(), dtype]);
        }

        let quantization = option(options, OPTION_QUANTIZATION)
            .cloned()
            .or_else(|| self.model.quantization.map(|q| q.as_str().to_string()));
        if let Some(quantization) = quantization {
            args.extend(["--quantization".to_string(), quantization]);
        }

        for (key, flag) in [
            (OPTION_MAX_MODEL_LEN, "--max-model-len"),
            (OPTION_GPU_MEMORY_UTILIZATION, "--gpu-memory-utilization"),
        ] {
            if let Some(value) = option(options, key) {
                args.extend([flag.to_string(), value.clone()]);
            }
        }
        args
    }
}

/// The server runs alone in its pod; a template may only pre-shape the
/// engine container itself
fn reject_extra_containers(workload: &WorkloadRef, spec: &AIDeploymentSpec) -> Result<()> {
    let containers = spec
        .deployment
        .pod_template
        .as_ref()
        .and_then(|t| t.spec.as_ref())
        .map(|p| p.containers.as_slice())
        .unwrap_or_default();
    match containers.iter().find(|c| c.name != CONTAINER_ENGINE_NAME) {
        Some(extra) => Err(Error::validation_for_field(
            workload.name.clone(),
            "spec.deployment.podTemplate.spec.containers",
            format!(
                "container {:?} is not supported, only {CONTAINER_ENGINE_NAME:?} may be declared",
                extra.name
            ),
        )),
        None => Ok(()),
    }
}

impl MLEngine for VllmEngine {
    fn name(&self) -> &'static str {
        ENGINE_VLLM
    }

    fn port(&self) -> i32 {
        self.defaults.port
    }

    fn build_deployment(&self, owner: &AIDeployment) -> Result<Deployment> {
        let options = &self.spec.deployment;
        let image = self.defaults.image(&self.spec.engine.options);
        debug!(
            deployment = %self.workload.name,
            model = %self.model.uri,
            %image,
            "building vllm deployment"
        );

        let mut container = Container {
            name: CONTAINER_ENGINE_NAME.to_string(),
            image: Some(image),
            image_pull_policy: Some("Always".to_string()),
            args: Some(self.args()),
            env: (!self.spec.env.is_empty()).then(|| self.spec.env.clone()),
            ports: Some(vec![ContainerPort {
                name: Some("http".to_string()),
                container_port: self.port(),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            resources: serving_resources(options.resources.as_ref(), true),
            volume_mounts: Some(vec![models_mount(CACHE_MOUNT_PATH)]),
            ..Default::default()
        };
        self.defaults
            .probes
            .build(self.port(), options)
            .apply(&mut container);

        let mut template = base_template(options);
        let pod = template.spec.get_or_insert_with(Default::default);
        pod.automount_service_account_token = Some(false);
        pod.runtime_class_name = Some(NVIDIA_RUNTIME_CLASS.to_string());
        ensure_models_volume(pod.volumes.get_or_insert_with(Vec::new));
        install_serving_container(pod, container);

        Ok(assemble_deployment(
            owner,
            &self.workload,
            options,
            template,
            Some(options.replicas.unwrap_or(1)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aideploy_common::crd::{AIEngine, DataType, ProbeOverride, Quantization};
    use aideploy_common::NVIDIA_GPU_RESOURCE;
    use k8s_openapi::api::core::v1::{
        EmptyDirVolumeSource, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements, Volume,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;

    fn vllm_deployment() -> AIDeployment {
        let mut ai = AIDeployment::new(
            "phi",
            AIDeploymentSpec {
                engine: AIEngine {
                    name: "vllm".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        ai.metadata.namespace = Some("default".to_string());
        ai
    }

    fn phi() -> ResolvedModel {
        ResolvedModel::new("phi-original", "microsoft/phi-2")
    }

    fn build(ai: &AIDeployment, model: ResolvedModel) -> Deployment {
        VllmEngine::new(ai, vec![model], EngineDefaults::vllm())
            .unwrap()
            .build_deployment(ai)
            .unwrap()
    }

    fn pod_spec(deployment: &Deployment) -> &PodSpec {
        deployment
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .unwrap()
    }

    /// Story: the engine refuses anything but exactly one model
    #[test]
    fn story_model_cardinality_is_enforced() {
        let ai = vllm_deployment();
        let err = VllmEngine::new(&ai, vec![], EngineDefaults::vllm()).unwrap_err();
        assert!(matches!(err, Error::ModelsNotSpecified));

        let err = VllmEngine::new(&ai, vec![phi(), phi()], EngineDefaults::vllm()).unwrap_err();
        assert!(matches!(err, Error::OnlyOneModel { count: 2 }));
        assert!(err.is_validation());
    }

    #[test]
    fn plain_model_yields_only_model_args() {
        let ai = vllm_deployment();
        let deployment = build(&ai, phi());
        let pod = pod_spec(&deployment);
        let main = &pod.containers[0];

        assert_eq!(
            main.args,
            Some(vec!["--model".to_string(), "microsoft/phi-2".to_string()])
        );
        assert!(main.name.starts_with("engine"));
        assert_eq!(main.image.as_deref(), Some("vllm/vllm-openai:latest"));
        assert_eq!(pod.runtime_class_name.as_deref(), Some("nvidia"));
        assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(1));

        let mounts = main.volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].mount_path, "/root/.cache/huggingface");
    }

    #[test]
    fn options_add_dtype_and_quantization() {
        let mut ai = vllm_deployment();
        ai.spec.engine.options = BTreeMap::from([
            ("dtype".to_string(), "float16".to_string()),
            ("quantization".to_string(), "awq".to_string()),
            ("maxModelLen".to_string(), "4096".to_string()),
        ]);
        let deployment = build(&ai, phi());
        let args = pod_spec(&deployment).containers[0].args.clone().unwrap();
        assert_eq!(
            args,
            vec![
                "--model",
                "microsoft/phi-2",
                "--dtype",
                "float16",
                "--quantization",
                "awq",
                "--max-model-len",
                "4096"
            ]
        );
    }

    #[test]
    fn model_tags_fill_in_missing_options() {
        let mut ai = vllm_deployment();
        ai.spec
            .engine
            .options
            .insert("dtype".to_string(), "bfloat16".to_string());
        let mut model = phi();
        model.data_type = Some(DataType::Float16);
        model.quantization = Some(Quantization::Gptq);

        let deployment = build(&ai, model);
        let args = pod_spec(&deployment).containers[0].args.clone().unwrap();
        assert_eq!(
            args,
            vec![
                "--model",
                "microsoft/phi-2",
                "--dtype",
                "bfloat16",
                "--quantization",
                "gptq"
            ]
        );
    }

    #[test]
    fn gpu_is_requested_alongside_user_resources() {
        let mut ai = vllm_deployment();
        ai.spec.deployment.resources = Some(ResourceRequirements {
            requests: Some(BTreeMap::from([(
                "memory".to_string(),
                Quantity("70Mi".to_string()),
            )])),
            ..Default::default()
        });
        let deployment = build(&ai, phi());
        let resources = pod_spec(&deployment).containers[0]
            .resources
            .clone()
            .unwrap();
        let requests = resources.requests.unwrap();
        assert_eq!(requests["memory"], Quantity("70Mi".to_string()));
        assert_eq!(requests[NVIDIA_GPU_RESOURCE], Quantity("1".to_string()));
        assert_eq!(
            resources.limits.unwrap()[NVIDIA_GPU_RESOURCE],
            Quantity("1".to_string())
        );
    }

    /// Story: user probe overrides merge field-wise onto the server defaults
    #[test]
    fn story_probe_overrides_merge_with_defaults() {
        let mut ai = vllm_deployment();
        ai.spec.deployment.startup_probe = Some(ProbeOverride {
            initial_delay_seconds: Some(66),
            period_seconds: Some(33),
            timeout_seconds: Some(12),
            failure_threshold: Some(13),
            ..Default::default()
        });
        ai.spec.deployment.readiness_probe = Some(ProbeOverride {
            success_threshold: Some(14),
            ..Default::default()
        });
        ai.spec.deployment.liveness_probe = Some(ProbeOverride {
            period_seconds: Some(21),
            ..Default::default()
        });

        let deployment = build(&ai, phi());
        let main = &pod_spec(&deployment).containers[0];

        let startup = main.startup_probe.as_ref().unwrap();
        assert_eq!(startup.initial_delay_seconds, Some(66));
        assert_eq!(startup.period_seconds, Some(33));
        assert_eq!(startup.timeout_seconds, Some(12));
        assert_eq!(startup.failure_threshold, Some(13));

        let readiness = main.readiness_probe.as_ref().unwrap();
        assert_eq!(readiness.failure_threshold, Some(3));
        assert_eq!(readiness.success_threshold, Some(14));

        let liveness = main.liveness_probe.as_ref().unwrap();
        assert_eq!(liveness.period_seconds, Some(21));
        assert_eq!(liveness.timeout_seconds, Some(15));
        assert_eq!(liveness.failure_threshold, Some(10));
    }

    #[test]
    fn default_probes_without_overrides() {
        let ai = vllm_deployment();
        let deployment = build(&ai, phi());
        let main = &pod_spec(&deployment).containers[0];

        let startup = main.startup_probe.as_ref().unwrap();
        assert_eq!(startup.initial_delay_seconds, Some(3));
        assert_eq!(startup.period_seconds, Some(1));
        assert_eq!(startup.failure_threshold, Some(120));

        let liveness = main.liveness_probe.as_ref().unwrap();
        assert_eq!(liveness.period_seconds, Some(30));
        assert_eq!(liveness.timeout_seconds, Some(15));
        assert_eq!(liveness.failure_threshold, Some(10));
    }

    #[test]
    fn env_is_passed_verbatim() {
        let mut ai = vllm_deployment();
        ai.spec.env = vec![EnvVar {
            name: "HF_TOKEN".to_string(),
            value: Some("secret".to_string()),
            ..Default::default()
        }];
        let deployment = build(&ai, phi());
        assert_eq!(pod_spec(&deployment).containers[0].env, Some(ai.spec.env.clone()));
    }

    #[test]
    fn replicas_are_honored() {
        let mut ai = vllm_deployment();
        ai.spec.deployment.replicas = Some(4);
        let deployment = build(&ai, phi());
        assert_eq!(deployment.spec.unwrap().replicas, Some(4));
    }

    fn with_template(ai: &mut AIDeployment, containers: Vec<Container>, volumes: Vec<Volume>) {
        ai.spec.deployment.pod_template = Some(PodTemplateSpec {
            spec: Some(PodSpec {
                containers,
                volumes: Some(volumes),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    /// Story: a sidecar in the template is refused before anything is built
    #[test]
    fn story_template_sidecar_is_rejected() {
        let mut ai = vllm_deployment();
        with_template(
            &mut ai,
            vec![Container {
                name: "sidecar".to_string(),
                ..Default::default()
            }],
            vec![],
        );
        let err = VllmEngine::new(&ai, vec![phi()], EngineDefaults::vllm()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("sidecar"));
    }

    #[test]
    fn template_engine_container_and_models_volume_are_not_duplicated() {
        let mut ai = vllm_deployment();
        with_template(
            &mut ai,
            vec![Container {
                name: "engine".to_string(),
                env: Some(vec![EnvVar {
                    name: "VLLM_LOGGING_LEVEL".to_string(),
                    value: Some("DEBUG".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            vec![Volume {
                name: "models".to_string(),
                empty_dir: Some(EmptyDirVolumeSource {
                    medium: Some("Memory".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        );
        let deployment = build(&ai, phi());
        let pod = pod_spec(&deployment);

        assert_eq!(pod.containers.len(), 1);
        let main = &pod.containers[0];
        assert_eq!(main.image.as_deref(), Some("vllm/vllm-openai:latest"));
        assert_eq!(main.env.as_ref().unwrap()[0].name, "VLLM_LOGGING_LEVEL");

        let volumes = pod.volumes.as_ref().unwrap();
        let models: Vec<&Volume> = volumes.iter().filter(|v| v.name == "models").collect();
        assert_eq!(models.len(), 1);
        assert_eq!(
            models[0].empty_dir.as_ref().unwrap().medium.as_deref(),
            Some("Memory")
        );
    }
}
