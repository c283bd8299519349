use crate::util::config::OperatorConfig;
use crate::util::errors::{Error, Result};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::core::TypeMeta;
use kube::Resource;
use std::collections::BTreeMap;

// see https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

pub const MANAGED_BY: &str = "splunk-operator";

const KUBECTL_ANNOTATION_PREFIX: &str = "kubectl.kubernetes.io/";

/// The (component, name, identifier) triple naming one managed workload role.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RoleIdentity {
    pub component: String,
    pub name: String,
    pub identifier: String,
}

impl RoleIdentity {
    pub fn new(component: &str, name: &str, identifier: &str) -> Self {
        RoleIdentity {
            component: component.to_string(),
            name: name.to_string(),
            identifier: identifier.to_string(),
        }
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        labels(&self.component, &self.name, &self.identifier)
    }

    pub fn part_of(&self) -> String {
        splunk_name(&self.identifier, &self.component)
    }

    pub fn instance(&self) -> String {
        splunk_name(&self.identifier, &self.name)
    }
}

/// Formats the `splunk-<identifier>-<suffix>` names shared by labels and resources.
pub fn splunk_name(identifier: &str, suffix: &str) -> String {
    format!("splunk-{}-{}", identifier, suffix)
}

/// Returns the labels to use for managed components.
pub fn labels(component: &str, name: &str, identifier: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (LABEL_COMPONENT.to_string(), component.to_string()),
        (LABEL_NAME.to_string(), name.to_string()),
        (LABEL_PART_OF.to_string(), splunk_name(identifier, component)),
        (LABEL_INSTANCE.to_string(), splunk_name(identifier, name)),
    ])
}

/// Builds a controller owner reference from a parent's type and object metadata.
///
/// An owner reference with an empty kind is accepted by the API server but never
/// garbage collected, so missing type metadata is an error.
pub fn as_owner(types: Option<&TypeMeta>, meta: &ObjectMeta) -> Result<OwnerReference> {
    let types = types.ok_or_else(|| {
        Error::InvalidParentReference(format!(
            "parent '{}' has no type metadata",
            meta.name.as_deref().unwrap_or_default()
        ))
    })?;

    if types.api_version.is_empty() || types.kind.is_empty() {
        return Err(Error::InvalidParentReference(format!(
            "parent '{}' is missing apiVersion or kind",
            meta.name.as_deref().unwrap_or_default()
        )));
    }

    Ok(OwnerReference {
        api_version: types.api_version.clone(),
        kind: types.kind.clone(),
        name: meta.name.clone().unwrap_or_default(),
        uid: meta.uid.clone().unwrap_or_default(),
        controller: Some(true),
        ..Default::default()
    })
}

pub fn as_owner_of<K: Resource>(parent: &K, dt: &K::DynamicType) -> Result<OwnerReference> {
    let types = TypeMeta {
        api_version: K::api_version(dt).to_string(),
        kind: K::kind(dt).to_string(),
    };
    as_owner(Some(&types), parent.meta())
}

/// Makes `owner` the single controller of `meta`, keeping references from other owners.
pub fn set_controller_reference(meta: &mut ObjectMeta, owner: &OwnerReference) {
    let mut refs: Vec<OwnerReference> = meta
        .owner_references
        .take()
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.controller != Some(true) && r.uid != owner.uid)
        .collect();

    let mut owner = owner.clone();
    owner.controller = Some(true);
    refs.push(owner);

    meta.owner_references = Some(refs);
}

/// Copies a parent's labels and annotations onto a child, skipping kubectl bookkeeping.
pub fn append_parent_meta(child: &mut ObjectMeta, parent: &ObjectMeta) {
    if let Some(labels) = &parent.labels {
        let child_labels = child.labels.get_or_insert_with(BTreeMap::new);
        for (k, v) in labels {
            child_labels.insert(k.clone(), v.clone());
        }
    }

    if let Some(annotations) = &parent.annotations {
        let child_annotations = child.annotations.get_or_insert_with(BTreeMap::new);
        for (k, v) in annotations {
            if !k.starts_with(KUBECTL_ANNOTATION_PREFIX) {
                child_annotations.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Returns the fully qualified domain name for a Kubernetes service.
pub fn service_fqdn(namespace: &str, name: &str, config: &OperatorConfig) -> String {
    format!("{}.{}.svc.{}", name, namespace, config.cluster_domain())
}
