//! Merging desired state onto live objects
//!
//! The reconciler owns each object's `spec` and the labels and annotations it
//! sets. Everything else on the live object (resourceVersion, status, other
//! controllers' metadata, server-allocated fields) survives an update.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Objects whose reconciler-owned fields can be merged onto a live copy
pub trait OwnedFields: Sized {
    /// Return `live` with the owned fields of `desired` applied
    fn merge_owned_fields(self, desired: &Self) -> Self;
}

impl OwnedFields for Deployment {
    fn merge_owned_fields(mut self, desired: &Self) -> Self {
        merge_owned_metadata(&mut self.metadata, &desired.metadata);
        self.spec = desired.spec.clone();
        self
    }
}

impl OwnedFields for Service {
    fn merge_owned_fields(mut self, desired: &Self) -> Self {
        merge_owned_metadata(&mut self.metadata, &desired.metadata);

        let live_spec = self.spec.take().unwrap_or_default();
        let mut spec = desired.spec.clone().unwrap_or_default();
        // Allocated by the API server and immutable once set
        if spec.cluster_ip.is_none() {
            spec.cluster_ip = live_spec.cluster_ip;
        }
        if spec.cluster_ips.is_none() {
            spec.cluster_ips = live_spec.cluster_ips;
        }
        if spec.ip_families.is_none() {
            spec.ip_families = live_spec.ip_families;
        }
        if spec.ip_family_policy.is_none() {
            spec.ip_family_policy = live_spec.ip_family_policy;
        }
        self.spec = Some(spec);
        self
    }
}

impl OwnedFields for Ingress {
    fn merge_owned_fields(mut self, desired: &Self) -> Self {
        merge_owned_metadata(&mut self.metadata, &desired.metadata);
        self.spec = desired.spec.clone();
        self
    }
}

/// Apply desired labels and annotations over the live ones; keys set by
/// others are kept
fn merge_owned_metadata(live: &mut ObjectMeta, desired: &ObjectMeta) {
    overlay(&mut live.labels, desired.labels.as_ref());
    overlay(&mut live.annotations, desired.annotations.as_ref());
    if live.owner_references.is_none() {
        live.owner_references = desired.owner_references.clone();
    }
}

fn overlay(
    live: &mut Option<BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) {
    let Some(desired) = desired.filter(|d| !d.is_empty()) else {
        return;
    };
    let map = live.get_or_insert_with(BTreeMap::new);
    map.extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use k8s_openapi::api::networking::v1::IngressSpec;

    fn meta(resource_version: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some("demo".to_string()),
            namespace: Some("ml".to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn deployment_spec_replaced_status_and_version_kept() {
        let live = Deployment {
            metadata: meta("42"),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                available_replicas: Some(1),
                ..Default::default()
            }),
        };
        let desired = Deployment {
            metadata: ObjectMeta {
                name: Some("demo".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                ..Default::default()
            }),
            status: None,
        };

        let merged = live.merge_owned_fields(&desired);
        assert_eq!(merged.spec.unwrap().replicas, Some(3));
        assert_eq!(merged.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(merged.status.unwrap().available_replicas, Some(1));
    }

    #[test]
    fn foreign_metadata_survives() {
        let mut live = Deployment {
            metadata: meta("1"),
            ..Default::default()
        };
        live.metadata.annotations = Some(BTreeMap::from([(
            "deployment.kubernetes.io/revision".to_string(),
            "7".to_string(),
        )]));
        let mut desired = Deployment::default();
        desired.metadata.annotations =
            Some(BTreeMap::from([("team".to_string(), "ml".to_string())]));

        let merged = live.merge_owned_fields(&desired);
        let annotations = merged.metadata.annotations.unwrap();
        assert_eq!(annotations["deployment.kubernetes.io/revision"], "7");
        assert_eq!(annotations["team"], "ml");
    }

    #[test]
    fn service_keeps_allocated_cluster_ip() {
        let live = Service {
            metadata: meta("5"),
            spec: Some(ServiceSpec {
                cluster_ip: Some("10.0.0.12".to_string()),
                cluster_ips: Some(vec!["10.0.0.12".to_string()]),
                ports: Some(vec![ServicePort {
                    port: 80,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        };
        let desired = Service {
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port: 8000,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = live.merge_owned_fields(&desired);
        let spec = merged.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.12"));
        assert_eq!(spec.cluster_ips, Some(vec!["10.0.0.12".to_string()]));
        assert_eq!(spec.ports.unwrap()[0].port, 8000);
    }

    #[test]
    fn ingress_spec_replaced() {
        let live = Ingress {
            metadata: meta("3"),
            spec: Some(IngressSpec {
                ingress_class_name: Some("old".to_string()),
                ..Default::default()
            }),
            status: None,
        };
        let desired = Ingress {
            spec: Some(IngressSpec::default()),
            ..Default::default()
        };
        let merged = live.merge_owned_fields(&desired);
        assert_eq!(merged.spec.unwrap().ingress_class_name, None);
        assert_eq!(merged.metadata.resource_version.as_deref(), Some("3"));
    }
}
