use aideploy_common::crd::AIDeployment;
use aideploy_common::labels::{default_annotations, default_labels, merge_maps, owner_references};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

/// Desired Ingress routing every declared domain to `service`.
///
/// `None` when the workload declares no endpoints. Duplicate domains
/// collapse to one rule. With TLS enabled a single TLS entry covers all
/// domains using the `<service>-tls` secret.
pub fn desired_ingress(owner: &AIDeployment, service: &Service) -> Option<Ingress> {
    let domains = owner.domains();
    if domains.is_empty() {
        return None;
    }

    let name = owner.name_any();
    let service_name = service.metadata.name.clone().unwrap_or_else(|| name.clone());
    let port = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|p| p.first())
        .map(|p| p.port);

    let rules = domains
        .iter()
        .map(|domain| IngressRule {
            host: Some(domain.clone()),
            http: Some(HTTPIngressRuleValue {
                paths: vec![HTTPIngressPath {
                    path: Some("/".to_string()),
                    path_type: "Prefix".to_string(),
                    backend: IngressBackend {
                        service: Some(IngressServiceBackend {
                            name: service_name.clone(),
                            port: port.map(|number| ServiceBackendPort {
                                number: Some(number),
                                name: None,
                            }),
                        }),
                        resource: None,
                    },
                }],
            }),
        })
        .collect();

    let tls = owner.spec.ingress.tls_enabled().then(|| {
        vec![IngressTLS {
            hosts: Some(domains.clone()),
            secret_name: Some(format!("{service_name}-tls")),
        }]
    });

    Some(Ingress {
        metadata: ObjectMeta {
            name: service.metadata.name.clone(),
            namespace: service.metadata.namespace.clone(),
            labels: Some(merge_maps([
                &default_labels(&name),
                &owner.spec.ingress.labels,
            ])),
            annotations: Some(merge_maps([
                &default_annotations(&name),
                &owner.spec.ingress.annotations,
            ])),
            owner_references: Some(owner_references(owner)).filter(|r| !r.is_empty()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(rules),
            tls,
            ..Default::default()
        }),
        status: None,
    })
}
