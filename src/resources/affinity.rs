use crate::resources::metadata::{splunk_name, LABEL_INSTANCE};

use k8s_openapi::api::core::v1::{Affinity, PodAffinityTerm, PodAntiAffinity, WeightedPodAffinityTerm};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

pub const ANTI_AFFINITY_WEIGHT: i32 = 100;
pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Returns `affinity` with a preferred anti-affinity term spreading pods of the same
/// role instance across nodes. Existing terms are kept and the input is not modified.
pub fn add_anti_affinity(affinity: Option<&Affinity>, identifier: &str, role_label: &str) -> Affinity {
    let mut affinity = affinity.cloned().unwrap_or_default();

    let term = WeightedPodAffinityTerm {
        weight: ANTI_AFFINITY_WEIGHT,
        pod_affinity_term: PodAffinityTerm {
            label_selector: Some(LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: LABEL_INSTANCE.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![splunk_name(identifier, role_label)]),
                }]),
                ..Default::default()
            }),
            topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
            ..Default::default()
        },
    };

    affinity
        .pod_anti_affinity
        .get_or_insert_with(PodAntiAffinity::default)
        .preferred_during_scheduling_ignored_during_execution
        .get_or_insert_with(Vec::new)
        .push(term);

    affinity
}
