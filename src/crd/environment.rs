//! # Environment
//!
//! The primary resource watched by this controller.
//!
//! An Environment gets its cluster credentials from exactly one place: either a
//! DeploymentTargetClaim (`spec.configuration.target.deploymentTargetClaim.claimName`) or the
//! inline `spec.unstableConfigurationFields` block. Setting both is a user error.

use crate::crd::Condition;
use serde::{Deserialize, Serialize};

/// Environment Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: appstudio.redhat.com/v1alpha1
/// kind: Environment
/// metadata:
///   name: staging
///   namespace: team-a
/// spec:
///   displayName: Staging
///   unstableConfigurationFields:
///     kubernetesCredentials:
///       apiURL: https://api.staging.example.com:6443
///       clusterCredentialsSecret: staging-credentials
///       targetNamespace: team-a-staging
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "Environment",
    group = "appstudio.redhat.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::EnvironmentStatus",
    printcolumn = r#"{"name":"Error", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ErrorOccurred\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    /// Human readable name of the Environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// How promotion into this Environment is performed (Manual, AppStudioAutomated)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_strategy: Option<String>,
    /// Environment this one is promoted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_environment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Target configuration, including the DeploymentTargetClaim reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<EnvironmentConfiguration>,
    /// Raw cluster credentials, mutually exclusive with a DeploymentTargetClaim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unstable_configuration_fields: Option<UnstableEnvironmentConfiguration>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<EnvironmentTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentTarget {
    pub deployment_target_claim: DeploymentTargetClaimConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTargetClaimConfig {
    /// Name of a DeploymentTargetClaim in the Environment's namespace
    pub claim_name: String,
}

/// Inline cluster configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnstableEnvironmentConfiguration {
    /// Kubernetes or OpenShift
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<String>,
    #[serde(rename = "kubernetesCredentials")]
    pub kubernetes_cluster_credentials: KubernetesClusterCredentials,
}

/// Credentials and scope for the target cluster
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesClusterCredentials {
    /// Namespace deployments go to on the target cluster
    #[serde(default)]
    pub target_namespace: String,
    /// API URL of the target cluster
    #[serde(rename = "apiURL")]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_domain: Option<String>,
    /// Name of the Secret (same namespace as the Environment) holding the cluster credentials
    pub cluster_credentials_secret: String,
    #[serde(default, rename = "allowInsecureSkipTLSVerify")]
    pub allow_insecure_skip_tls_verify: bool,
    /// Namespaces the GitOps engine may deploy to; empty means cluster-wide
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    /// Whether cluster-scoped resources may be managed
    #[serde(default)]
    pub cluster_resources: bool,
}

impl Environment {
    /// The referenced DeploymentTargetClaim, if one is configured and non-empty
    #[must_use]
    pub fn claim_name(&self) -> Option<&str> {
        self.spec
            .configuration
            .as_ref()
            .and_then(|c| c.target.as_ref())
            .map(|t| t.deployment_target_claim.claim_name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// The inline credentials block, if configured
    #[must_use]
    pub fn inline_configuration(&self) -> Option<&KubernetesClusterCredentials> {
        self.spec
            .unstable_configuration_fields
            .as_ref()
            .map(|u| &u.kubernetes_cluster_credentials)
    }

    /// True when both a claim and inline credentials are configured
    #[must_use]
    pub fn has_conflicting_sources(&self) -> bool {
        self.claim_name().is_some() && self.spec.unstable_configuration_fields.is_some()
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|status| status.conditions.as_slice())
            .unwrap_or_default()
    }
}
