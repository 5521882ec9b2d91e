//! # GitOpsDeploymentManagedEnvironment
//!
//! The derived resource consumed by the GitOps engine. One exists per Environment that has
//! resolvable credentials, named `managed-environment-<environment>` in the Environment's
//! namespace and owned by it.

use crate::constants::{MANAGED_ENVIRONMENT_PREFIX, MANAGED_ENVIRONMENT_SECRET_PREFIX};
use serde::{Deserialize, Serialize};

/// GitOpsDeploymentManagedEnvironment Custom Resource Definition
#[derive(
    kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "GitOpsDeploymentManagedEnvironment",
    group = "managed-gitops.redhat.com",
    version = "v1alpha1",
    namespaced,
    shortname = "gdme"
)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsDeploymentManagedEnvironmentSpec {
    #[serde(rename = "apiURL")]
    pub api_url: String,
    /// Secret holding the credentials the GitOps engine uses
    #[serde(rename = "credentialsSecret")]
    pub cluster_credentials_secret: String,
    #[serde(default, rename = "allowInsecureSkipTLSVerify")]
    pub allow_insecure_skip_tls_verify: bool,
    #[serde(default)]
    pub cluster_resources: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
}

/// Name of the ManagedEnvironment derived from the named Environment
#[must_use]
pub fn managed_environment_name(environment_name: &str) -> String {
    format!("{MANAGED_ENVIRONMENT_PREFIX}{environment_name}")
}

/// Name of the Secret mirrored for the named Environment
#[must_use]
pub fn managed_environment_secret_name(environment_name: &str) -> String {
    format!("{MANAGED_ENVIRONMENT_SECRET_PREFIX}{environment_name}")
}
