//! In-memory cluster for reconciliation tests
//!
//! Stores objects by (namespace, name), bumps resourceVersion on every write,
//! rejects stale updates with 409 and duplicate creates with 409, and can
//! inject latency or status-write failures.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use aideploy_common::crd::{
    AIDeployment, AIDeploymentStatus, AIModel, AIModelMap, ResolvedModel,
};
use aideploy_common::{Error, Result};
use aideploy_reconcile::resolver::resolve_inline;
use aideploy_reconcile::{ClusterClient, ModelResolver};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;
use kube::ResourceExt;

type Key = (String, String);

#[derive(Default)]
struct State {
    deployments: BTreeMap<Key, Deployment>,
    services: BTreeMap<Key, Service>,
    ingresses: BTreeMap<Key, Ingress>,
    model_maps: BTreeMap<Key, AIModelMap>,
    statuses: Vec<(Key, AIDeploymentStatus)>,
    mutations: usize,
    next_version: u64,
    next_ip: u8,
}

/// Fake API server
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    latency: Option<Duration>,
    fail_status_writes: bool,
}

fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube {
        source: kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} (fake)"),
            reason: reason.to_string(),
            code,
        }),
    }
}

fn key(namespace: &str, meta: &ObjectMeta) -> Key {
    (
        namespace.to_string(),
        meta.name.clone().unwrap_or_default(),
    )
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` first
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Status patches fail with a 500
    pub fn failing_status_writes(mut self) -> Self {
        self.fail_status_writes = true;
        self
    }

    /// Seed an AIModelMap into its own namespace
    pub fn with_model_map(mut self, map: AIModelMap) -> Self {
        let key = (map.namespace().unwrap_or_default(), map.name_any());
        self.state.get_mut().unwrap().model_maps.insert(key, map);
        self
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        let state = self.state.lock().unwrap();
        state
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        let state = self.state.lock().unwrap();
        state
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn ingress(&self, namespace: &str, name: &str) -> Option<Ingress> {
        let state = self.state.lock().unwrap();
        state
            .ingresses
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// (deployments, services, ingresses)
    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().unwrap();
        (
            state.deployments.len(),
            state.services.len(),
            state.ingresses.len(),
        )
    }

    /// Number of successful creates and updates
    pub fn mutations(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    /// Status patches written so far
    pub fn statuses(&self) -> Vec<AIDeploymentStatus> {
        let state = self.state.lock().unwrap();
        state.statuses.iter().map(|(_, s)| s.clone()).collect()
    }

    /// Simulate the Deployment controller reporting available replicas
    pub fn set_available_replicas(&self, namespace: &str, name: &str, available: i32) {
        let mut state = self.state.lock().unwrap();
        if let Some(deployment) = state
            .deployments
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            deployment.status = Some(DeploymentStatus {
                available_replicas: Some(available),
                ..Default::default()
            });
        }
    }

    /// Simulate another actor annotating the live Deployment
    pub fn annotate_deployment(&self, namespace: &str, name: &str, key: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        let next = bump(&mut state.next_version);
        if let Some(deployment) = state
            .deployments
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            deployment
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.to_string());
            deployment.metadata.resource_version = Some(next);
        }
    }
}

fn bump(counter: &mut u64) -> String {
    *counter += 1;
    counter.to_string()
}

fn create_in<K: Clone>(
    store: &mut BTreeMap<Key, K>,
    version: &mut u64,
    key: Key,
    mut obj: K,
    meta: impl Fn(&mut K) -> &mut ObjectMeta,
) -> Result<K> {
    if store.contains_key(&key) {
        return Err(api_error(409, "AlreadyExists"));
    }
    let m = meta(&mut obj);
    m.namespace = Some(key.0.clone());
    m.resource_version = Some(bump(version));
    m.uid = Some(format!("uid-{}-{}", key.0, key.1));
    store.insert(key, obj.clone());
    Ok(obj)
}

fn update_in<K: Clone>(
    store: &mut BTreeMap<Key, K>,
    version: &mut u64,
    key: Key,
    mut obj: K,
    meta: impl Fn(&mut K) -> &mut ObjectMeta,
) -> Result<K> {
    let current = store
        .get_mut(&key)
        .ok_or_else(|| api_error(404, "NotFound"))?;
    let current_version = meta(&mut *current).resource_version.clone();
    if meta(&mut obj).resource_version != current_version {
        return Err(api_error(409, "Conflict"));
    }
    meta(&mut obj).resource_version = Some(bump(version));
    *current = obj.clone();
    Ok(obj)
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        self.delay().await;
        Ok(self.deployment(namespace, name))
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let created = create_in(
            &mut state.deployments,
            &mut state.next_version,
            key(namespace, &deployment.metadata),
            deployment.clone(),
            |d| &mut d.metadata,
        )?;
        state.mutations += 1;
        Ok(created)
    }

    async fn update_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let updated = update_in(
            &mut state.deployments,
            &mut state.next_version,
            key(namespace, &deployment.metadata),
            deployment.clone(),
            |d| &mut d.metadata,
        )?;
        state.mutations += 1;
        Ok(updated)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        self.delay().await;
        Ok(self.service(namespace, name))
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        state.next_ip += 1;
        let mut service = service.clone();
        let spec = service.spec.get_or_insert_with(Default::default);
        let ip = format!("10.96.0.{}", state.next_ip);
        spec.cluster_ip = Some(ip.clone());
        spec.cluster_ips = Some(vec![ip]);
        let created = create_in(
            &mut state.services,
            &mut state.next_version,
            key(namespace, &service.metadata),
            service,
            |s| &mut s.metadata,
        )?;
        state.mutations += 1;
        Ok(created)
    }

    async fn update_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let live_ip = state
            .services
            .get(&key(namespace, &service.metadata))
            .and_then(|s| s.spec.as_ref())
            .and_then(|s| s.cluster_ip.clone());
        let requested_ip = service.spec.as_ref().and_then(|s| s.cluster_ip.clone());
        if live_ip != requested_ip {
            return Err(api_error(422, "Invalid: spec.clusterIP is immutable"));
        }
        let updated = update_in(
            &mut state.services,
            &mut state.next_version,
            key(namespace, &service.metadata),
            service.clone(),
            |s| &mut s.metadata,
        )?;
        state.mutations += 1;
        Ok(updated)
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>> {
        self.delay().await;
        Ok(self.ingress(namespace, name))
    }

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let created = create_in(
            &mut state.ingresses,
            &mut state.next_version,
            key(namespace, &ingress.metadata),
            ingress.clone(),
            |i| &mut i.metadata,
        )?;
        state.mutations += 1;
        Ok(created)
    }

    async fn update_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let updated = update_in(
            &mut state.ingresses,
            &mut state.next_version,
            key(namespace, &ingress.metadata),
            ingress.clone(),
            |i| &mut i.metadata,
        )?;
        state.mutations += 1;
        Ok(updated)
    }

    async fn get_model_map(&self, namespace: &str, name: &str) -> Result<Option<AIModelMap>> {
        self.delay().await;
        let state = self.state.lock().unwrap();
        Ok(state
            .model_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn patch_workload_status(
        &self,
        namespace: &str,
        name: &str,
        status: &AIDeploymentStatus,
    ) -> Result<()> {
        self.delay().await;
        if self.fail_status_writes {
            return Err(api_error(500, "InternalError"));
        }
        let mut state = self.state.lock().unwrap();
        state
            .statuses
            .push(((namespace.to_string(), name.to_string()), status.clone()));
        Ok(())
    }
}

/// Resolver for inline models only
pub struct InlineResolver;

#[async_trait]
impl ModelResolver for InlineResolver {
    async fn resolve(
        &self,
        ai: &AIDeployment,
        index: usize,
        model: &AIModel,
    ) -> Result<ResolvedModel> {
        resolve_inline(ai, index, model)
    }
}
