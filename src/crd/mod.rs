//! # Custom Resource Definitions
//!
//! CRD types for the Environment controller.
//!
//! ## Module Structure
//!
//! - `environment.rs` - The primary `Environment` resource
//! - `deployment_target.rs` - `DeploymentTargetClaim` and `DeploymentTarget`
//! - `managed_environment.rs` - The derived `GitOpsDeploymentManagedEnvironment` and naming helpers
//! - `status.rs` - Status and condition types

mod deployment_target;
mod environment;
mod managed_environment;
mod status;

use kube::CustomResourceExt;

// Re-export all public types
pub use deployment_target::{
    DeploymentTarget, DeploymentTargetClaim, DeploymentTargetClaimPhase, DeploymentTargetClaimSpec,
    DeploymentTargetClaimStatus, DeploymentTargetKubernetesClusterCredentials,
    DeploymentTargetSpec, DeploymentTargetStatus,
};
pub use environment::{
    DeploymentTargetClaimConfig, Environment, EnvironmentConfiguration, EnvironmentSpec,
    EnvironmentTarget, KubernetesClusterCredentials, UnstableEnvironmentConfiguration,
};
pub use managed_environment::{
    managed_environment_name, managed_environment_secret_name, GitOpsDeploymentManagedEnvironment,
    GitOpsDeploymentManagedEnvironmentSpec,
};
pub use status::{Condition, ConditionStatus, EnvironmentStatus};

/// Render every CRD this controller works with as a multi-document YAML stream
///
/// # Errors
///
/// Returns an error if a CRD cannot be serialized.
pub fn render_crds() -> Result<String, serde_yaml::Error> {
    let documents = [
        serde_yaml::to_string(&Environment::crd())?,
        serde_yaml::to_string(&DeploymentTargetClaim::crd())?,
        serde_yaml::to_string(&DeploymentTarget::crd())?,
        serde_yaml::to_string(&GitOpsDeploymentManagedEnvironment::crd())?,
    ];
    Ok(documents.join("---\n"))
}
