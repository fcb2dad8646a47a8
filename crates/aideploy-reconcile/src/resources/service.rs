use aideploy_common::crd::AIDeployment;
use aideploy_common::labels::{default_annotations, default_labels, merge_maps, owner_references};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::HTTP_PORT_NAME;

/// Desired Service fronting `deployment` on the engine's serving `port`.
///
/// Selects exactly the Deployment's pod-template labels.
pub fn desired_service(owner: &AIDeployment, deployment: &Deployment, port: i32) -> Service {
    let name = owner.name_any();
    let selector = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.labels.clone());

    Service {
        metadata: ObjectMeta {
            name: deployment.metadata.name.clone(),
            namespace: deployment.metadata.namespace.clone(),
            labels: Some(merge_maps([
                &default_labels(&name),
                &owner.spec.service.labels,
            ])),
            annotations: Some(merge_maps([
                &default_annotations(&name),
                &owner.spec.service.annotations,
            ])),
            owner_references: Some(owner_references(owner)).filter(|r| !r.is_empty()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector,
            ports: Some(vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}
