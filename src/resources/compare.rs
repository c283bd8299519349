use crate::resources::metadata::set_controller_reference;
use crate::resources::policy::quantity_nanos;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, ResourceRequirements, Service, ServicePort, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Canonical ordering for collections the API server may return in any order.
pub trait CanonicalOrder {
    fn canonical_cmp(&self, other: &Self) -> Ordering;
}

impl CanonicalOrder for ContainerPort {
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.container_port.cmp(&other.container_port)
    }
}

impl CanonicalOrder for ServicePort {
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.port.cmp(&other.port)
    }
}

impl CanonicalOrder for EnvVar {
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl CanonicalOrder for VolumeMount {
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// Returns a stably sorted copy of `items`.
pub fn normalize_by<T, F>(items: &[T], compare: F) -> Vec<T>
where
    T: Clone,
    F: FnMut(&T, &T) -> Ordering,
{
    let mut sorted = items.to_vec();
    sorted.sort_by(compare);
    sorted
}

pub fn normalize<T: CanonicalOrder + Clone>(items: &[T]) -> Vec<T> {
    normalize_by(items, T::canonical_cmp)
}

/// Reports whether two unordered collections differ materially.
///
/// Ordering is ignored; every other field of every element is compared.
pub fn differs<T: CanonicalOrder + Clone + PartialEq>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return true;
    }

    normalize(a)
        .iter()
        .zip(normalize(b).iter())
        .any(|(x, y)| x != y)
}

pub fn container_ports_differ(a: &[ContainerPort], b: &[ContainerPort]) -> bool {
    differs(a, b)
}

pub fn service_ports_differ(a: &[ServicePort], b: &[ServicePort]) -> bool {
    differs(a, b)
}

pub fn envs_differ(a: &[EnvVar], b: &[EnvVar]) -> bool {
    differs(a, b)
}

pub fn volume_mounts_differ(a: &[VolumeMount], b: &[VolumeMount]) -> bool {
    differs(a, b)
}

/// Compares two values by their JSON encoding.
///
/// Treats a failed encoding as a difference. Field order within the encoding
/// matters, so unordered collections need a dedicated comparer.
pub fn differs_by_encoding<A: Serialize + ?Sized, B: Serialize + ?Sized>(a: &A, b: &B) -> bool {
    let a = match serde_json::to_vec(a) {
        Ok(bytes) => bytes,
        Err(_) => return true,
    };
    let b = match serde_json::to_vec(b) {
        Ok(bytes) => bytes,
        Err(_) => return true,
    };
    a != b
}

fn optional_differs<T: CanonicalOrder + Clone + PartialEq>(a: &Option<Vec<T>>, b: &Option<Vec<T>>) -> bool {
    differs(a.as_deref().unwrap_or_default(), b.as_deref().unwrap_or_default())
}

/// Fields the API server fills in on read-back only count when the desired object sets them.
fn defaulted_differs<T: PartialEq>(existing: &Option<T>, desired: &Option<T>) -> bool {
    desired.is_some() && existing != desired
}

fn quantities_differ(
    existing: Option<&BTreeMap<String, Quantity>>,
    desired: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let (existing, desired) = (existing.unwrap_or(&empty), desired.unwrap_or(&empty));

    existing.len() != desired.len()
        || desired.iter().any(|(dimension, quantity)| match existing.get(dimension) {
            Some(current) => match (quantity_nanos(current), quantity_nanos(quantity)) {
                (Ok(a), Ok(b)) => a != b,
                _ => current.0 != quantity.0,
            },
            None => true,
        })
}

/// Compares requests and limits by value, so "1024Mi" and "1Gi" are equal.
pub fn resources_differ(existing: Option<&ResourceRequirements>, desired: Option<&ResourceRequirements>) -> bool {
    let empty = ResourceRequirements::default();
    let (existing, desired) = (existing.unwrap_or(&empty), desired.unwrap_or(&empty));

    quantities_differ(existing.requests.as_ref(), desired.requests.as_ref())
        || quantities_differ(existing.limits.as_ref(), desired.limits.as_ref())
        || differs_by_encoding(&existing.claims, &desired.claims)
}

fn container_differs(existing: &Container, desired: &Container) -> bool {
    existing.name != desired.name
        || existing.image != desired.image
        || defaulted_differs(&existing.image_pull_policy, &desired.image_pull_policy)
        || optional_differs(&existing.ports, &desired.ports)
        || optional_differs(&existing.env, &desired.env)
        || optional_differs(&existing.volume_mounts, &desired.volume_mounts)
        || resources_differ(existing.resources.as_ref(), desired.resources.as_ref())
}

fn pod_spec_differs(existing: &PodSpec, desired: &PodSpec) -> bool {
    if existing.containers.len() != desired.containers.len() {
        return true;
    }

    defaulted_differs(&existing.scheduler_name, &desired.scheduler_name)
        || defaulted_differs(&existing.dns_policy, &desired.dns_policy)
        || differs_by_encoding(&existing.dns_config, &desired.dns_config)
        || differs_by_encoding(&existing.affinity, &desired.affinity)
        || existing
            .containers
            .iter()
            .zip(desired.containers.iter())
            .any(|(e, d)| container_differs(e, d))
}

/// Decides whether a live deployment has drifted from its desired specification.
pub fn deployment_needs_update(existing: &Deployment, desired: &Deployment) -> bool {
    let (existing_spec, desired_spec) = match (&existing.spec, &desired.spec) {
        (Some(e), Some(d)) => (e, d),
        (None, None) => return false,
        _ => return true,
    };

    if existing_spec.replicas != desired_spec.replicas {
        debug!("replica count differs");
        return true;
    }

    let existing_labels = existing_spec.template.metadata.as_ref().and_then(|m| m.labels.as_ref());
    let desired_labels = desired_spec.template.metadata.as_ref().and_then(|m| m.labels.as_ref());
    if existing_labels != desired_labels {
        debug!("pod template labels differ");
        return true;
    }

    match (&existing_spec.template.spec, &desired_spec.template.spec) {
        (Some(e), Some(d)) => pod_spec_differs(e, d),
        (None, None) => false,
        _ => true,
    }
}

pub fn service_needs_update(existing: &Service, desired: &Service) -> bool {
    let (existing_spec, desired_spec) = match (&existing.spec, &desired.spec) {
        (Some(e), Some(d)) => (e, d),
        (None, None) => return false,
        _ => return true,
    };

    existing_spec.selector != desired_spec.selector
        || optional_differs(&existing_spec.ports, &desired_spec.ports)
}

/// Returns the object to submit when replacing `existing` with `desired`.
///
/// Identity and externally-owned metadata of the live object survive; the spec,
/// managed labels and controller reference come from the desired object.
pub fn merge_for_update(existing: &Deployment, desired: &Deployment) -> Deployment {
    let mut updated = existing.clone();

    if let Some(labels) = &desired.metadata.labels {
        let current = updated.metadata.labels.get_or_insert_with(Default::default);
        for (k, v) in labels {
            current.insert(k.clone(), v.clone());
        }
    }

    let controller: Option<&OwnerReference> = desired
        .metadata
        .owner_references
        .iter()
        .flatten()
        .find(|r| r.controller == Some(true));
    if let Some(owner) = controller {
        set_controller_reference(&mut updated.metadata, owner);
    }

    updated.spec = desired.spec.clone();
    updated.status = None;
    updated
}
