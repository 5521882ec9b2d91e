//! # DeploymentTarget and DeploymentTargetClaim
//!
//! A claim is a request for a cluster; a target is the offer that satisfies it. Once the
//! pair is bound, the target carries the credentials an Environment referencing the claim
//! should use.

use serde::{Deserialize, Serialize};

/// DeploymentTargetClaim Custom Resource Definition
#[derive(
    kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "DeploymentTargetClaim",
    group = "appstudio.redhat.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::DeploymentTargetClaimStatus",
    shortname = "dtc",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTargetClaimSpec {
    #[serde(default)]
    pub deployment_target_class_name: String,
    /// Name of the DeploymentTarget this claim is bound to, once bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTargetClaimStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<DeploymentTargetClaimPhase>,
}

/// Lifecycle phase of a claim; only `Bound` is actionable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum DeploymentTargetClaimPhase {
    Pending,
    Bound,
    Lost,
}

impl DeploymentTargetClaim {
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.phase)
            .is_some_and(|phase| phase == DeploymentTargetClaimPhase::Bound)
    }

    #[must_use]
    pub fn target_name(&self) -> Option<&str> {
        self.spec.target_name.as_deref().filter(|name| !name.is_empty())
    }
}

/// DeploymentTarget Custom Resource Definition
#[derive(
    kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "DeploymentTarget",
    group = "appstudio.redhat.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::DeploymentTargetStatus",
    shortname = "dt",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTargetSpec {
    #[serde(default)]
    pub deployment_target_class_name: String,
    #[serde(rename = "kubernetesCredentials")]
    pub kubernetes_cluster_credentials: DeploymentTargetKubernetesClusterCredentials,
    /// Name of the claim this target is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_ref: Option<String>,
}

/// Authoritative cluster credentials of a bound target
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTargetKubernetesClusterCredentials {
    #[serde(default)]
    pub default_namespace: String,
    #[serde(rename = "apiURL")]
    pub api_url: String,
    /// Secret in the target's namespace holding the cluster credentials
    pub cluster_credentials_secret: String,
    #[serde(default, rename = "allowInsecureSkipTLSVerify")]
    pub allow_insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTargetStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl DeploymentTarget {
    #[must_use]
    pub fn claim_ref(&self) -> Option<&str> {
        self.spec.claim_ref.as_deref().filter(|name| !name.is_empty())
    }
}
