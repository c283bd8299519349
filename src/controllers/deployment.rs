use crate::api::v1alpha2::SplunkEnterprise;
use crate::controllers::store::ObjectStore;
use crate::resources::affinity::add_anti_affinity;
use crate::resources::compare::{deployment_needs_update, merge_for_update, normalize};
use crate::resources::metadata::{as_owner_of, set_controller_reference, splunk_name, RoleIdentity};
use crate::resources::policy::validate_common_spec;
use crate::resources::secrets::{build_secrets, SecretGenerator};
use crate::util::config::OperatorConfig;
use crate::util::errors::{Error, Result};

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, EnvVar, PodDNSConfig, PodSpec, PodTemplateSpec, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::info;

pub const SPLUNK_CONTAINER: &str = "splunk";
pub const DNS_CLUSTER_FIRST: &str = "ClusterFirst";
const DEFAULT_PORT_PROTOCOL: &str = "TCP";

// ports inside the deployments that istio should leave alone
const ISTIO_EXCLUDED_OUTBOUND_PORTS: [i32; 8] = [8089, 8191, 9997, 7777, 9000, 17000, 17500, 19000];

pub fn deployment_name(role: &RoleIdentity) -> String {
    splunk_name(&role.identifier, &role.component)
}

/// Returns the istio sidecar annotations for a pod template exposing `ports`.
pub fn istio_annotations(ports: &[ContainerPort]) -> BTreeMap<String, String> {
    let exclude_outbound = ISTIO_EXCLUDED_OUTBOUND_PORTS
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let include_inbound = normalize(ports)
        .iter()
        .map(|p| p.container_port)
        .filter(|p| !ISTIO_EXCLUDED_OUTBOUND_PORTS.contains(p))
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");

    BTreeMap::from([
        (
            "traffic.sidecar.istio.io/excludeOutboundPorts".to_string(),
            exclude_outbound,
        ),
        (
            "traffic.sidecar.istio.io/includeInboundPorts".to_string(),
            include_inbound,
        ),
    ])
}

/// Builds the desired deployment for one Splunk role of `parent`.
///
/// The parent's common spec is validated first, so every field the API server
/// would otherwise default is set explicitly on the result.
pub fn build_deployment(
    parent: &SplunkEnterprise,
    role: &RoleIdentity,
    replicas: i32,
    env: Vec<EnvVar>,
    ports: Vec<ContainerPort>,
    dns_searches: Option<Vec<String>>,
    config: &OperatorConfig,
) -> Result<Deployment> {
    let labels = role.labels();
    let common = validate_common_spec(&parent.spec.common, &config.default_resources, config)?;

    let ports = ports
        .into_iter()
        .map(|mut port| {
            port.protocol.get_or_insert_with(|| DEFAULT_PORT_PROTOCOL.to_string());
            port
        })
        .collect::<Vec<_>>();

    let mut pod_spec = PodSpec {
        containers: vec![Container {
            name: SPLUNK_CONTAINER.to_string(),
            image: Some(common.image_or_default()),
            image_pull_policy: Some(common.image_pull_policy.clone()),
            resources: Some(common.resources.clone()),
            ports: Some(ports.clone()),
            env: Some(env),
            ..Default::default()
        }],
        scheduler_name: Some(common.scheduler_name.clone()),
        dns_policy: Some(DNS_CLUSTER_FIRST.to_string()),
        affinity: Some(add_anti_affinity(
            common.affinity.as_ref(),
            &role.identifier,
            &role.name,
        )),
        ..Default::default()
    };

    if let Some(searches) = dns_searches.filter(|s| !s.is_empty()) {
        pod_spec.dns_config = Some(PodDNSConfig {
            searches: Some(searches),
            ..Default::default()
        });
    }

    let mut metadata = ObjectMeta {
        name: Some(deployment_name(role)),
        namespace: parent.namespace(),
        labels: Some(labels.clone()),
        ..Default::default()
    };
    set_controller_reference(&mut metadata, &as_owner_of(parent, &())?);

    Ok(Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(istio_annotations(&ports)),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Builds the desired deployment and submits it for creation.
///
/// Errors from the store are returned as-is; retrying is left to the next reconcile pass.
pub async fn create_deployment<S: ObjectStore>(
    store: &S,
    parent: &SplunkEnterprise,
    role: &RoleIdentity,
    replicas: i32,
    env: Vec<EnvVar>,
    ports: Vec<ContainerPort>,
    dns_searches: Option<Vec<String>>,
    config: &OperatorConfig,
) -> Result<Deployment> {
    let deployment = build_deployment(parent, role, replicas, env, ports, dns_searches, config)?;
    let namespace = deployment.namespace().unwrap_or_default();

    info!(
        "Creating Deployment '{}' in namespace '{}'",
        deployment.name_any(),
        namespace
    );
    store
        .create(&namespace, &deployment)
        .await
        .map_err(Error::KubeError)
}

/// Creates the credential secret for `identifier`. Only called on first provisioning.
pub async fn create_secrets<S: ObjectStore>(
    store: &S,
    parent: &SplunkEnterprise,
    identifier: &str,
    generator: &SecretGenerator,
) -> Result<Secret> {
    let namespace = parent.namespace().unwrap_or_default();
    let secret = build_secrets(identifier, &namespace, &as_owner_of(parent, &())?, generator)?;

    info!("Creating Secret '{}' in namespace '{}'", secret.name_any(), namespace);
    store.create(&namespace, &secret).await.map_err(Error::KubeError)
}

/// What the reconcile loop should do with a role's deployment.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Create(Deployment),
    Update(Deployment),
    UpToDate,
}

pub fn plan_deployment(existing: Option<&Deployment>, desired: Deployment) -> Action {
    let name = desired.name_any();
    match existing {
        None => Action::Create(desired),
        Some(existing) if deployment_needs_update(existing, &desired) => {
            info!("Deployment '{}' has drifted", name);
            Action::Update(merge_for_update(existing, &desired))
        }
        Some(_) => {
            info!("Deployment '{}' is up to date", name);
            Action::UpToDate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha2::{CommonSpec, SplunkEnterpriseSpec};
    use crate::resources::policy::default_resources;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn config() -> OperatorConfig {
        OperatorConfig {
            default_resources: default_resources("100m", "512Mi", "4", "1024Mi").unwrap(),
            ..Default::default()
        }
    }

    fn parent() -> SplunkEnterprise {
        let mut cr = SplunkEnterprise::new(
            "stack1",
            SplunkEnterpriseSpec {
                common: CommonSpec {
                    image: "splunk/splunk:9.1".to_string(),
                    image_pull_policy: "Always".to_string(),
                    scheduler_name: "default-scheduler".to_string(),
                    ..Default::default()
                },
            },
        );
        cr.metadata.namespace = Some("splunk".to_string());
        cr.metadata.uid = Some("uid-1".to_string());
        cr
    }

    fn port(n: i32) -> ContainerPort {
        ContainerPort {
            container_port: n,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_deployment_name() {
        assert_eq!(
            deployment_name(&RoleIdentity::new("indexer", "cluster", "abc")),
            "splunk-abc-indexer"
        );
    }

    #[test]
    fn test_istio_annotations() {
        let annotations = istio_annotations(&[port(9997), port(8000), port(8089), port(8088)]);
        assert_eq!(
            annotations["traffic.sidecar.istio.io/excludeOutboundPorts"],
            "8089,8191,9997,7777,9000,17000,17500,19000"
        );
        assert_eq!(annotations["traffic.sidecar.istio.io/includeInboundPorts"], "8000,8088");
    }

    #[test]
    fn test_build_deployment_dns_searches() {
        let role = RoleIdentity::new("search-head", "search-head", "abc");

        let deployment = build_deployment(
            &parent(),
            &role,
            1,
            vec![],
            vec![],
            Some(vec!["splunk.svc.cluster.local".to_string()]),
            &config(),
        )
        .unwrap();
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.dns_policy.as_deref(), Some("ClusterFirst"));
        assert_eq!(
            pod.dns_config.unwrap().searches,
            Some(vec!["splunk.svc.cluster.local".to_string()])
        );

        for searches in [None, Some(vec![])] {
            let deployment = build_deployment(&parent(), &role, 1, vec![], vec![], searches, &config()).unwrap();
            let pod = deployment.spec.unwrap().template.spec.unwrap();
            assert_eq!(pod.dns_policy.as_deref(), Some("ClusterFirst"));
            assert!(pod.dns_config.is_none());
        }
    }

    #[test]
    fn test_build_deployment_uses_common_spec() {
        let role = RoleIdentity::new("indexer", "cluster", "abc");
        let deployment = build_deployment(&parent(), &role, 3, vec![], vec![port(8089)], None, &config()).unwrap();

        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.scheduler_name.as_deref(), Some("default-scheduler"));
        let container = &pod.containers[0];
        assert_eq!(container.name, "splunk");
        assert_eq!(container.image.as_deref(), Some("splunk/splunk:9.1"));
        assert_eq!(container.image_pull_policy.as_deref(), Some("Always"));

        let terms = pod
            .affinity
            .and_then(|a| a.pod_anti_affinity)
            .and_then(|a| a.preferred_during_scheduling_ignored_during_execution)
            .unwrap();
        assert_eq!(terms.len(), 1);
    }

    #[test]
    fn test_build_deployment_is_deterministic() {
        let role = RoleIdentity::new("indexer", "cluster", "abc");
        let a = build_deployment(&parent(), &role, 3, vec![], vec![port(8089)], None, &config()).unwrap();
        let b = build_deployment(&parent(), &role, 3, vec![], vec![port(8089)], None, &config()).unwrap();
        assert_eq!(a, b);
        assert!(!deployment_needs_update(&a, &b));
    }

    #[test]
    fn test_plan_deployment() {
        let role = RoleIdentity::new("indexer", "cluster", "abc");
        let desired = build_deployment(&parent(), &role, 3, vec![], vec![port(8089)], None, &config()).unwrap();

        assert_eq!(
            plan_deployment(None, desired.clone()),
            Action::Create(desired.clone())
        );

        let mut live = desired.clone();
        live.metadata.uid = Some("live-uid".to_string());
        assert_eq!(plan_deployment(Some(&live), desired.clone()), Action::UpToDate);

        let scaled_down = build_deployment(&parent(), &role, 1, vec![], vec![port(8089)], None, &config()).unwrap();
        match plan_deployment(Some(&live), scaled_down) {
            Action::Update(update) => {
                assert_eq!(update.metadata.uid.as_deref(), Some("live-uid"));
                assert_eq!(update.spec.unwrap().replicas, Some(1));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_build_deployment_rejects_invalid_pull_policy() {
        let mut cr = parent();
        cr.spec.common.image_pull_policy = "Sometimes".to_string();
        let role = RoleIdentity::new("indexer", "cluster", "abc");

        let err = build_deployment(&cr, &role, 3, vec![], vec![port(8089)], None, &config()).unwrap_err();
        assert!(matches!(err, Error::InvalidImagePullPolicy(ref v) if v == "Sometimes"));
    }

    #[test]
    fn test_build_deployment_sets_server_defaults() {
        let mut cr = parent();
        cr.spec.common.image_pull_policy = String::new();
        cr.spec.common.scheduler_name = String::new();
        let role = RoleIdentity::new("indexer", "cluster", "abc");
        let untyped = ContainerPort {
            container_port: 8089,
            ..Default::default()
        };

        let deployment = build_deployment(&cr, &role, 3, vec![], vec![untyped], None, &config()).unwrap();
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.dns_policy.as_deref(), Some("ClusterFirst"));
        assert_eq!(pod.scheduler_name.as_deref(), Some("default-scheduler"));
        let container = &pod.containers[0];
        assert_eq!(container.image_pull_policy.as_deref(), Some("IfNotPresent"));
        assert_eq!(container.ports.as_ref().unwrap()[0].protocol.as_deref(), Some("TCP"));

        let requests = container.resources.as_ref().and_then(|r| r.requests.as_ref()).unwrap();
        assert_eq!(requests["memory"], Quantity("512Mi".to_string()));
    }

    #[test]
    fn test_plan_deployment_ignores_server_read_back() {
        let role = RoleIdentity::new("indexer", "cluster", "abc");
        let desired = build_deployment(&parent(), &role, 3, vec![], vec![port(8089)], None, &config()).unwrap();

        // the API server canonicalizes quantities and fills in unset defaults
        let mut live = desired.clone();
        live.metadata.uid = Some("live-uid".to_string());
        if let Some(spec) = live.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
            spec.restart_policy = Some("Always".to_string());
            let resources = spec.containers[0].resources.get_or_insert_with(Default::default);
            resources
                .limits
                .get_or_insert_with(BTreeMap::new)
                .insert("memory".to_string(), Quantity("1Gi".to_string()));
            resources
                .requests
                .get_or_insert_with(BTreeMap::new)
                .insert("cpu".to_string(), Quantity("0.1".to_string()));
        }
        assert_eq!(plan_deployment(Some(&live), desired.clone()), Action::UpToDate);

        let mut resized = live.clone();
        if let Some(spec) = resized.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
            if let Some(limits) = spec.containers[0].resources.as_mut().and_then(|r| r.limits.as_mut()) {
                limits.insert("memory".to_string(), Quantity("2Gi".to_string()));
            }
        }
        assert!(matches!(plan_deployment(Some(&resized), desired), Action::Update(_)));
    }
}
