use k8s_openapi::api::core::v1::ResourceRequirements;
use std::env;

pub const CLUSTER_DOMAIN_ENV: &str = "CLUSTER_DOMAIN";
pub const IMAGE_PULL_POLICY_ENV: &str = "IMAGE_PULL_POLICY";

pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Environment overrides and defaults consumed while building desired state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperatorConfig {
    pub cluster_domain: Option<String>,
    pub image_pull_policy: Option<String>,
    /// Requests and limits applied to roles that leave them unset
    pub default_resources: ResourceRequirements,
}

impl OperatorConfig {
    pub fn from_env() -> Self {
        OperatorConfig {
            cluster_domain: non_empty_var(CLUSTER_DOMAIN_ENV),
            image_pull_policy: non_empty_var(IMAGE_PULL_POLICY_ENV),
            default_resources: ResourceRequirements::default(),
        }
    }

    pub fn cluster_domain(&self) -> &str {
        self.cluster_domain.as_deref().unwrap_or(DEFAULT_CLUSTER_DOMAIN)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
