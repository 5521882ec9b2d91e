//! # Desired State
//!
//! Computes the GitOpsDeploymentManagedEnvironment an Environment should have.
//!
//! Credentials come from one of two places:
//!
//! 1. **Claim**: the Environment references a DeploymentTargetClaim. Once the claim is
//!    `Bound`, the DeploymentTarget bound to it supplies the API URL, TLS flag and
//!    credential secret. Unless that secret is already of the managed type, its data is
//!    mirrored into `managed-environment-secret-<env>`, which the result then points at.
//! 2. **Inline**: `spec.unstableConfigurationFields.kubernetesCredentials` is used as-is.
//!
//! Namespaces and the cluster-resources flag always come from the inline block when present.
//!
//! User errors (missing claim, no bound target, missing secret) are raised as the
//! `ErrorOccurred` condition before returning.

use crate::constants::{
    MANAGED_ENVIRONMENT_SECRET_LABEL, MANAGED_ENVIRONMENT_SECRET_TYPE, REASON_ERROR_OCCURRED,
};
use crate::controller::reconciler::binding::select_target;
use crate::controller::reconciler::client::EnvironmentClient;
use crate::controller::reconciler::conditions;
use crate::controller::reconciler::types::DesiredState;
use crate::crd::{
    managed_environment_name, managed_environment_secret_name, Environment,
    GitOpsDeploymentManagedEnvironment, GitOpsDeploymentManagedEnvironmentSpec,
};
use crate::observability::{log_resource_change, ResourceChange};
use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const MSG_CONFLICTING_SOURCES: &str = "Environment is invalid since it cannot have both DeploymentTargetClaim and credentials configuration set";
pub const MSG_CLAIM_NOT_FOUND: &str =
    "DeploymentTargetClaim not found while generating the desired Environment resource";
pub const MSG_TARGET_NOT_FOUND: &str = "DeploymentTarget not found for DeploymentTargetClaim";

#[must_use]
pub fn secret_not_found_message(secret_name: &str) -> String {
    format!("the secret {secret_name} referenced by the Environment resource was not found")
}

/// Owner reference pointing at `env`
///
/// `controller` also sets `controller` and `blockOwnerDeletion`.
#[must_use]
pub fn environment_owner_reference(env: &Environment, controller: bool) -> OwnerReference {
    OwnerReference {
        api_version: Environment::api_version(&()).into_owned(),
        kind: Environment::kind(&()).into_owned(),
        name: env.name_any(),
        uid: env.uid().unwrap_or_default(),
        controller: controller.then_some(true),
        block_owner_deletion: controller.then_some(true),
    }
}

/// Compute the desired ManagedEnvironment for `env`
///
/// Condition changes are written through `client` and reflected on `env`.
pub async fn generate_desired_state(
    client: &dyn EnvironmentClient,
    env: &mut Environment,
) -> DesiredState {
    match generate(client, env).await {
        Ok(state) => state,
        Err(e) => DesiredState::Retry(e),
    }
}

async fn generate(client: &dyn EnvironmentClient, env: &mut Environment) -> Result<DesiredState> {
    let namespace = env.namespace().unwrap_or_default();

    let (mut spec, claim_driven) = if let Some(claim_name) = env.claim_name().map(str::to_owned) {
        info!(claim = claim_name.as_str(), "Environment is configured with a DeploymentTargetClaim");
        match credentials_from_claim(client, env, &namespace, &claim_name).await? {
            ClaimCredentials::Found(spec) => (spec, true),
            ClaimCredentials::Pending => return Ok(DesiredState::Ready(None)),
            ClaimCredentials::Invalid => return Ok(DesiredState::Done),
        }
    } else if let Some(inline) = env.inline_configuration() {
        info!("Using the cluster credentials specified in the Environment");
        (
            GitOpsDeploymentManagedEnvironmentSpec {
                api_url: inline.api_url.clone(),
                cluster_credentials_secret: inline.cluster_credentials_secret.clone(),
                allow_insecure_skip_tls_verify: inline.allow_insecure_skip_tls_verify,
                ..GitOpsDeploymentManagedEnvironmentSpec::default()
            },
            false,
        )
    } else {
        info!("Environment neither has cluster credentials nor DeploymentTargetClaim configured");
        return Ok(DesiredState::Ready(None));
    };

    if let Some(inline) = env.inline_configuration() {
        spec.cluster_resources = inline.cluster_resources;
        spec.namespaces = inline.namespaces.clone();
    }

    let source_name = spec.cluster_credentials_secret.clone();
    if source_name.is_empty() {
        return Ok(handle_missing_secret(client, env, &namespace, &source_name).await);
    }
    let source = client
        .get_secret(&namespace, &source_name)
        .await
        .with_context(|| format!("unable to retrieve the secret {source_name}"))?;

    let Some(source) = source else {
        return Ok(handle_missing_secret(client, env, &namespace, &source_name).await);
    };

    let source_is_managed = source.type_.as_deref() == Some(MANAGED_ENVIRONMENT_SECRET_TYPE);
    if claim_driven && !source_is_managed {
        spec.cluster_credentials_secret = mirror_secret(client, env, &source).await?;
    }

    conditions::resolve(client, env, REASON_ERROR_OCCURRED)
        .await
        .context("unable to update environment status condition")?;

    let mut managed =
        GitOpsDeploymentManagedEnvironment::new(&managed_environment_name(&env.name_any()), spec);
    managed.metadata.namespace = Some(namespace);
    managed.metadata.owner_references = Some(vec![environment_owner_reference(env, false)]);

    Ok(DesiredState::Ready(Some(managed)))
}

enum ClaimCredentials {
    Found(GitOpsDeploymentManagedEnvironmentSpec),
    /// Claim exists but is not bound yet
    Pending,
    /// Claim or target missing; the error condition has been raised
    Invalid,
}

/// Resolve credentials through a claim and its bound target
async fn credentials_from_claim(
    client: &dyn EnvironmentClient,
    env: &mut Environment,
    namespace: &str,
    claim_name: &str,
) -> Result<ClaimCredentials> {
    let claim = client
        .get_claim(namespace, claim_name)
        .await
        .with_context(|| format!("unable to retrieve DeploymentTargetClaim {claim_name}"))?;

    let Some(claim) = claim else {
        warn!(claim = claim_name, "{MSG_CLAIM_NOT_FOUND}");
        conditions::raise(client, env, MSG_CLAIM_NOT_FOUND, REASON_ERROR_OCCURRED)
            .await
            .context("unable to update environment status condition")?;
        return Ok(ClaimCredentials::Invalid);
    };

    conditions::resolve(client, env, REASON_ERROR_OCCURRED)
        .await
        .context("unable to update environment status condition")?;

    if !claim.is_bound() {
        info!(
            claim = claim_name,
            "Waiting until the DeploymentTargetClaim associated with Environment reaches Bound phase"
        );
        return Ok(ClaimCredentials::Pending);
    }

    let targets = client
        .list_targets(namespace)
        .await
        .context("unable to list DeploymentTargets")?;

    let Some(target) = select_target(&claim, &targets) else {
        warn!(claim = claim_name, "{MSG_TARGET_NOT_FOUND}");
        conditions::raise(client, env, MSG_TARGET_NOT_FOUND, REASON_ERROR_OCCURRED)
            .await
            .context("unable to update environment status condition")?;
        return Ok(ClaimCredentials::Invalid);
    };

    info!(
        target = target.name_any().as_str(),
        "Using the cluster credentials from the DeploymentTarget"
    );
    let credentials = &target.spec.kubernetes_cluster_credentials;
    Ok(ClaimCredentials::Found(GitOpsDeploymentManagedEnvironmentSpec {
        api_url: credentials.api_url.clone(),
        cluster_credentials_secret: credentials.cluster_credentials_secret.clone(),
        allow_insecure_skip_tls_verify: credentials.allow_insecure_skip_tls_verify,
        ..GitOpsDeploymentManagedEnvironmentSpec::default()
    }))
}

/// Raise the missing-secret condition and drop any stale mirror; always ends in a retry
async fn handle_missing_secret(
    client: &dyn EnvironmentClient,
    env: &mut Environment,
    namespace: &str,
    source_name: &str,
) -> DesiredState {
    let message = secret_not_found_message(source_name);
    if let Err(e) = conditions::raise(client, env, &message, REASON_ERROR_OCCURRED).await {
        return DesiredState::Retry(
            anyhow::Error::new(e).context("unable to update environment status condition"),
        );
    }

    let env_name = env.name_any();
    let managed_secret = managed_environment_secret_name(&env_name);
    match client.delete_secret(namespace, &managed_secret).await {
        Ok(()) => log_resource_change("Secret", namespace, &managed_secret, ResourceChange::Deleted),
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            return DesiredState::Retry(anyhow::Error::new(e).context(format!(
                "unable to delete the secret for managed Environment: {env_name}"
            )));
        }
    }

    DesiredState::Retry(anyhow!(
        "the secret '{source_name}' referenced by the Environment resource was not found"
    ))
}

/// Copy `source`'s data into the Environment's managed secret, returning its name
async fn mirror_secret(
    client: &dyn EnvironmentClient,
    env: &Environment,
    source: &Secret,
) -> Result<String> {
    let namespace = env.namespace().unwrap_or_default();
    let env_name = env.name_any();
    let name = managed_environment_secret_name(&env_name);

    let existing = client
        .get_secret(&namespace, &name)
        .await
        .with_context(|| format!("failed to fetch the secret {name} for managed Environment"))?;

    match existing {
        None => {
            let secret = Secret {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(namespace.clone()),
                    labels: Some(BTreeMap::from([(
                        MANAGED_ENVIRONMENT_SECRET_LABEL.to_string(),
                        env_name.clone(),
                    )])),
                    owner_references: Some(vec![environment_owner_reference(env, true)]),
                    ..ObjectMeta::default()
                },
                type_: Some(MANAGED_ENVIRONMENT_SECRET_TYPE.to_string()),
                data: source.data.clone(),
                ..Secret::default()
            };
            client.create_secret(&secret).await.with_context(|| {
                format!("failed to create a secret for managed Environment {env_name}")
            })?;
            log_resource_change("Secret", &namespace, &name, ResourceChange::Created);
        }
        Some(mut current) if current.data != source.data => {
            current.data.clone_from(&source.data);
            client.update_secret(&current).await.with_context(|| {
                format!("failed to update the secret for managed Environment {env_name}")
            })?;
            log_resource_change("Secret", &namespace, &name, ResourceChange::Modified);
        }
        Some(_) => debug!(secret = name.as_str(), "managed secret is up to date"),
    }

    Ok(name)
}
