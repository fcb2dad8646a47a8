//! Label, annotation, and owner-reference helpers
//!
//! Every resource the operator creates carries the same default label set,
//! which also serves as the Deployment's pod selector. Merges always apply
//! defaults first and user overrides last.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

use crate::{DEPLOYMENT_LABEL_KEY, LABEL_MANAGED_BY, LABEL_MANAGED_BY_AIDEPLOY};

/// Default labels for every resource belonging to the named AIDeployment.
///
/// Deterministic in `name`; used verbatim as the Deployment selector, so the
/// set must never change for an existing workload.
pub fn default_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (DEPLOYMENT_LABEL_KEY.to_string(), name.to_string()),
        (
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_AIDEPLOY.to_string(),
        ),
    ])
}

/// Default annotations for Services and Ingresses of the named AIDeployment
pub fn default_annotations(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(DEPLOYMENT_LABEL_KEY.to_string(), name.to_string())])
}

/// Merge maps left to right; later maps win on key collision.
pub fn merge_maps<'a>(
    maps: impl IntoIterator<Item = &'a BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for map in maps {
        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Controller owner reference pointing at `owner`, for cascading deletion.
///
/// Empty when the owner has not been persisted yet (no UID).
pub fn owner_references<K>(owner: &K) -> Vec<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&()).into_iter().collect()
}
