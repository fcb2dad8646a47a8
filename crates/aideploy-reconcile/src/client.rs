//! Cluster access for the reconciler
//!
//! [`ClusterClient`] is the narrow set of API calls one pass makes. Reads
//! report a missing object as `Ok(None)`; every other failure is an error.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use aideploy_common::crd::{AIDeployment, AIDeploymentStatus, AIModelMap};
use aideploy_common::{Error, CONTROLLER_NAME};

/// Kubernetes operations needed by one reconciliation pass
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Get a Deployment, `None` when it does not exist
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Option<Deployment>, Error>;

    /// Create a Deployment
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, Error>;

    /// Replace a Deployment; the object's resourceVersion guards the write
    async fn update_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, Error>;

    /// Get a Service, `None` when it does not exist
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error>;

    /// Create a Service
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, Error>;

    /// Replace a Service
    async fn update_service(&self, namespace: &str, service: &Service) -> Result<Service, Error>;

    /// Get an Ingress, `None` when it does not exist
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, Error>;

    /// Create an Ingress
    async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress, Error>;

    /// Replace an Ingress
    async fn update_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress, Error>;

    /// Get an AIModelMap, `None` when it does not exist
    async fn get_model_map(&self, namespace: &str, name: &str)
        -> Result<Option<AIModelMap>, Error>;

    /// Merge-patch the status subresource of an AIDeployment
    async fn patch_workload_status(
        &self,
        namespace: &str,
        name: &str,
        status: &AIDeploymentStatus,
    ) -> Result<(), Error>;
}

/// [`ClusterClient`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create<K>(&self, namespace: &str, obj: &K) -> Result<K, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
    {
        let params = PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        };
        let created = self.api::<K>(namespace).create(&params, obj).await?;
        debug!(kind = %K::kind(&()), namespace, name = ?obj.meta().name, "created");
        Ok(created)
    }

    async fn replace<K>(&self, namespace: &str, obj: &K) -> Result<K, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
    {
        let name = obj
            .meta()
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("cluster-client", "object has no name"))?;
        let params = PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        };
        let replaced = self.api::<K>(namespace).replace(name, &params, obj).await?;
        debug!(kind = %K::kind(&()), namespace, name, "updated");
        Ok(replaced)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        self.get(namespace, name).await
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, Error> {
        self.create(namespace, deployment).await
    }

    async fn update_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, Error> {
        self.replace(namespace, deployment).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error> {
        self.get(namespace, name).await
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, Error> {
        self.create(namespace, service).await
    }

    async fn update_service(&self, namespace: &str, service: &Service) -> Result<Service, Error> {
        self.replace(namespace, service).await
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, Error> {
        self.get(namespace, name).await
    }

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress, Error> {
        self.create(namespace, ingress).await
    }

    async fn update_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress, Error> {
        self.replace(namespace, ingress).await
    }

    async fn get_model_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AIModelMap>, Error> {
        self.get(namespace, name).await
    }

    async fn patch_workload_status(
        &self,
        namespace: &str,
        name: &str,
        status: &AIDeploymentStatus,
    ) -> Result<(), Error> {
        let api: Api<AIDeployment> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(
            name,
            &PatchParams::apply(CONTROLLER_NAME),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}
