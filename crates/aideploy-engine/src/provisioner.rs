//! Model provisioning through init containers
//!
//! Download-based engines fetch each model into a shared `emptyDir` volume
//! before the server starts. The model URI decides the download strategy.

use aideploy_common::crd::ResolvedModel;
use aideploy_common::{Error, Result};
use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, EnvVar, Volume, VolumeMount};
use tracing::debug;

/// Name of the shared model volume
pub const MODELS_VOLUME: &str = "models";

/// Mount path of the shared model volume in download-based engines
pub const MODELS_MOUNT_PATH: &str = "/models";

/// Download command for a single model file, placed in version directory `1`
const SINGLE_FILE_COMMAND: &str =
    "curl --create-dirs -O --output-dir /models/$MODEL_NAME/1 $MODEL_PATH";

/// Download-and-extract command for a model archive
const ARCHIVE_COMMAND: &str = "curl -s -L $MODEL_PATH | tar xvz - -C /models";

/// How a model is fetched into the shared volume
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelSource {
    /// A single file downloaded as-is
    SingleFile,
    /// A tar archive extracted into the volume root
    Archive,
}

impl ModelSource {
    /// Classify a model by its URI
    pub fn classify(model: &ResolvedModel) -> Result<Self> {
        let uri = model.uri.as_str();
        if !(uri.starts_with("http://") || uri.starts_with("https://")) {
            return Err(Error::InvalidModelUri {
                model: model.name.clone(),
                uri: model.uri.clone(),
            });
        }
        if uri.contains(".tar") {
            Ok(Self::Archive)
        } else {
            Ok(Self::SingleFile)
        }
    }

    fn command(&self) -> &'static str {
        match self {
            Self::SingleFile => SINGLE_FILE_COMMAND,
            Self::Archive => ARCHIVE_COMMAND,
        }
    }
}

/// Init container that downloads `model` with the engine `image`
pub fn init_container_for(model: &ResolvedModel, image: &str) -> Result<Container> {
    let source = ModelSource::classify(model)?;

    Ok(Container {
        name: format!("init-{}", model.name),
        image: Some(image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        command: Some(vec!["sh".to_string(), "-c".to_string()]),
        args: Some(vec![source.command().to_string()]),
        env: Some(vec![
            EnvVar {
                name: "MODEL_NAME".to_string(),
                value: Some(model.name.clone()),
                ..Default::default()
            },
            EnvVar {
                name: "MODEL_PATH".to_string(),
                value: Some(model.uri.clone()),
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![models_mount(MODELS_MOUNT_PATH)]),
        ..Default::default()
    })
}

/// The shared `emptyDir` model volume
pub fn models_volume() -> Volume {
    Volume {
        name: MODELS_VOLUME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// Add the shared model volume unless the template already declares one.
///
/// A template volume named `models` (a PVC holding pre-fetched weights, say)
/// is reused as-is.
pub fn ensure_models_volume(volumes: &mut Vec<Volume>) {
    if volumes.iter().any(|v| v.name == MODELS_VOLUME) {
        debug!(volume = MODELS_VOLUME, "reusing template volume");
        return;
    }
    volumes.push(models_volume());
}

/// Mount of the shared model volume at `path`
pub fn models_mount(path: &str) -> VolumeMount {
    VolumeMount {
        name: MODELS_VOLUME.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}
