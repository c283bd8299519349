use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub static SPLUNK_IMAGE: &str = "splunk/splunk";

/// Operator-facing fields shared by every Splunk role.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonSpec {
    /// Container image for all Splunk pods
    #[serde(default)]
    pub image: String,
    /// "Always" or "IfNotPresent"; empty falls back to the operator default
    #[serde(default)]
    pub image_pull_policy: String,
    /// Name of the scheduler used to place pods
    #[serde(default)]
    pub scheduler_name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
    /// Caller-supplied scheduling constraints; anti-affinity is appended, never replaced
    pub affinity: Option<Affinity>,
}

/// Generate the Kubernetes wrapper struct `SplunkEnterprise` from our Spec
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "SplunkEnterprise",
    group = "enterprise.splunk.com",
    version = "v1alpha2",
    namespaced
)]
#[kube(shortname = "enterprise")]
#[serde(rename_all = "camelCase")]
pub struct SplunkEnterpriseSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
}

impl CommonSpec {
    pub fn image_or_default(&self) -> String {
        if self.image.is_empty() {
            SPLUNK_IMAGE.to_string()
        } else {
            self.image.clone()
        }
    }
}
