//! Model reference resolution
//!
//! Turns each declared [`AIModel`] into a [`ResolvedModel`]. Inline models
//! resolve directly; `modelMapRef` entries are looked up in an AIModelMap in
//! the workload's namespace, preferring the variant registered for the
//! workload's engine.

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use aideploy_common::crd::{
    AIDeployment, AIModel, AIModelMap, AIModelMapReference, ModelReference, ResolvedModel,
};
use aideploy_common::{Error, Result};

use crate::client::ClusterClient;

/// Resolves one declared model
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelResolver: Send + Sync {
    /// Resolve the model at `index` of `ai.spec.models`
    async fn resolve(&self, ai: &AIDeployment, index: usize, model: &AIModel)
        -> Result<ResolvedModel>;
}

/// Resolve every model of `ai`, in declaration order
pub async fn resolve_all(
    resolver: &dyn ModelResolver,
    ai: &AIDeployment,
) -> Result<Vec<ResolvedModel>> {
    let mut resolved = Vec::with_capacity(ai.spec.models.len());
    for (index, model) in ai.spec.models.iter().enumerate() {
        resolved.push(resolver.resolve(ai, index, model).await?);
    }
    Ok(resolved)
}

/// Resolve an inline model; unnamed models are called `model-<index>`
pub fn resolve_inline(ai: &AIDeployment, index: usize, model: &AIModel) -> Result<ResolvedModel> {
    match model.reference() {
        Some(ModelReference::Inline(spec)) => Ok(ResolvedModel::from_spec(
            model_name(model, || format!("model-{index}")),
            spec,
        )),
        Some(ModelReference::Catalog(reference)) => Err(Error::model_resolution(
            reference.to_string(),
            "model map references need a catalog lookup",
        )),
        None => Err(missing_source(ai, index)),
    }
}

/// Resolve a catalog reference against a fetched AIModelMap.
///
/// Unnamed models are called `<map>-<variant>`.
pub fn resolve_from_map(
    map: &AIModelMap,
    reference: &AIModelMapReference,
    engine: &str,
    model: &AIModel,
) -> Result<ResolvedModel> {
    let variant = map.spec.find(&reference.variant, engine).ok_or_else(|| {
        Error::model_resolution(
            reference.to_string(),
            format!("variant {:?} not found for engine {engine:?}", reference.variant),
        )
    })?;
    if variant.spec.uri.is_empty() {
        return Err(Error::model_resolution(
            reference.to_string(),
            "variant has no uri",
        ));
    }
    Ok(ResolvedModel::from_spec(
        model_name(model, || format!("{}-{}", reference.name, reference.variant)),
        &variant.spec,
    ))
}

fn model_name(model: &AIModel, fallback: impl FnOnce() -> String) -> String {
    model
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(fallback)
}

fn missing_source(ai: &AIDeployment, index: usize) -> Error {
    Error::validation_for_field(
        ai.name_any(),
        format!("spec.models[{index}]"),
        "model requires either uri or modelMapRef",
    )
}

/// [`ModelResolver`] looking catalog references up through the cluster
#[derive(Clone)]
pub struct CatalogModelResolver {
    client: Arc<dyn ClusterClient>,
}

impl CatalogModelResolver {
    /// Resolve catalog references with `client`
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ModelResolver for CatalogModelResolver {
    async fn resolve(
        &self,
        ai: &AIDeployment,
        index: usize,
        model: &AIModel,
    ) -> Result<ResolvedModel> {
        let reference = match model.reference() {
            Some(ModelReference::Catalog(reference)) => reference,
            _ => return resolve_inline(ai, index, model),
        };

        let namespace = ai.require_namespace()?;
        // Retryable: the map may be created later
        let map = self
            .client
            .get_model_map(&namespace, &reference.name)
            .await?
            .ok_or_else(|| {
                Error::model_resolution(
                    reference.to_string(),
                    format!("AIModelMap {namespace}/{} not found", reference.name),
                )
            })?;

        let resolved = resolve_from_map(&map, reference, &ai.spec.engine.name, model)?;
        debug!(reference = %reference, uri = %resolved.uri, "resolved model map reference");
        Ok(resolved)
    }
}
