//! # Event Mappers
//!
//! Translate a change on a related kind into the Environments that must be reconciled.
//!
//! Mappers run synchronously inside the watch stream and read from the [`EnvironmentIndex`].
//! A failed lookup maps to no Environments and is logged; the related Claim/Target watch or the
//! next resync will usually trigger the same Environment again.

use crate::constants::{
    LEGACY_ENVIRONMENT_OWNER_GROUP, MANAGED_ENVIRONMENT_SECRET_LABEL,
    MANAGED_ENVIRONMENT_SECRET_TYPE, OPAQUE_SECRET_TYPE,
};
use crate::controller::reconciler::binding::{binding_match, select_target};
use crate::controller::reconciler::index::{EnvironmentIndex, IndexError};
use crate::crd::{
    DeploymentTarget, DeploymentTargetClaim, Environment, GitOpsDeploymentManagedEnvironment,
};
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Secret;
use kube::{Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use std::collections::BTreeSet;
use tracing::warn;

fn environment_ref(namespace: &str, name: &str) -> ObjectRef<Environment> {
    ObjectRef::new(name).within(namespace)
}

fn record(source: &str, refs: Vec<ObjectRef<Environment>>) -> Vec<ObjectRef<Environment>> {
    metrics::increment_mapped_requests(source, refs.len());
    refs
}

fn lookup_failed(source: &str, namespace: &str, error: &IndexError) -> Vec<ObjectRef<Environment>> {
    warn!(
        mapper.source = source,
        resource.namespace = namespace,
        error = %error,
        "failed to look up Environments in the mapping function"
    );
    Vec::new()
}

/// API group of an `apiVersion` string (`group/version`, or empty for the core group)
fn api_group(api_version: &str) -> &str {
    api_version
        .rsplit_once('/')
        .map_or("", |(group, _)| group)
}

/// Environments that own `managed`
#[must_use]
pub fn environments_for_managed_environment(
    managed: &GitOpsDeploymentManagedEnvironment,
) -> Vec<ObjectRef<Environment>> {
    let namespace = managed.namespace().unwrap_or_default();
    let kind = Environment::kind(&());
    let group = Environment::group(&());

    let refs = managed
        .owner_references()
        .iter()
        .filter(|owner| {
            // ManagedEnvironments created by older releases carry the legacy group
            let owner_group = api_group(&owner.api_version);
            owner.kind == kind && (owner_group == group || owner_group == LEGACY_ENVIRONMENT_OWNER_GROUP)
        })
        .map(|owner| environment_ref(&namespace, &owner.name))
        .collect();
    record("GitOpsDeploymentManagedEnvironment", refs)
}

/// Environments in the claim's namespace that reference it
#[must_use]
pub fn environments_for_claim(
    index: &dyn EnvironmentIndex,
    claim: &DeploymentTargetClaim,
) -> Vec<ObjectRef<Environment>> {
    const SOURCE: &str = "DeploymentTargetClaim";
    let namespace = claim.namespace().unwrap_or_default();
    let claim_name = claim.name_any();

    let environments = match index.environments(&namespace) {
        Ok(environments) => environments,
        Err(e) => return lookup_failed(SOURCE, &namespace, &e),
    };

    let refs = environments
        .iter()
        .filter(|env| env.claim_name() == Some(claim_name.as_str()))
        .map(|env| environment_ref(&namespace, &env.name_any()))
        .collect();
    record(SOURCE, refs)
}

/// Environments whose claim is bound to `target` in either direction
#[must_use]
pub fn environments_for_target(
    index: &dyn EnvironmentIndex,
    target: &DeploymentTarget,
) -> Vec<ObjectRef<Environment>> {
    const SOURCE: &str = "DeploymentTarget";
    let namespace = target.namespace().unwrap_or_default();

    let claims = match index.claims(&namespace) {
        Ok(claims) => claims,
        Err(e) => return lookup_failed(SOURCE, &namespace, &e),
    };
    let bound_claims: BTreeSet<String> = claims
        .iter()
        .filter(|claim| binding_match(claim, target).is_some())
        .map(|claim| claim.name_any())
        .collect();
    if bound_claims.is_empty() {
        return record(SOURCE, Vec::new());
    }

    let environments = match index.environments(&namespace) {
        Ok(environments) => environments,
        Err(e) => return lookup_failed(SOURCE, &namespace, &e),
    };

    let refs = environments
        .iter()
        .filter(|env| env.claim_name().is_some_and(|name| bound_claims.contains(name)))
        .map(|env| environment_ref(&namespace, &env.name_any()))
        .collect();
    record(SOURCE, refs)
}

/// Environments whose credentials come from `secret`
///
/// Managed secrets map straight to the Environment named by their label. Opaque secrets map to
/// every claim-driven Environment whose bound target references the secret. Other secret types
/// are ignored.
#[must_use]
pub fn environments_for_secret(
    index: &dyn EnvironmentIndex,
    secret: &Secret,
) -> Vec<ObjectRef<Environment>> {
    const SOURCE: &str = "Secret";
    let namespace = secret.namespace().unwrap_or_default();

    match secret.type_.as_deref() {
        Some(MANAGED_ENVIRONMENT_SECRET_TYPE) => {
            let refs = secret
                .labels()
                .get(MANAGED_ENVIRONMENT_SECRET_LABEL)
                .filter(|name| !name.is_empty())
                .map(|name| vec![environment_ref(&namespace, name)])
                .unwrap_or_default();
            return record(SOURCE, refs);
        }
        Some(OPAQUE_SECRET_TYPE) => {}
        _ => return Vec::new(),
    }

    let secret_name = secret.name_any();
    let lookup = || -> Result<Vec<ObjectRef<Environment>>, IndexError> {
        let environments = index.environments(&namespace)?;
        let targets = index.targets(&namespace)?;

        let mut refs = Vec::new();
        for env in &environments {
            let Some(claim_name) = env.claim_name() else {
                continue;
            };
            let Some(claim) = index.claim(&namespace, claim_name)? else {
                continue;
            };
            let uses_secret = select_target(&claim, &targets).is_some_and(|target| {
                target.spec.kubernetes_cluster_credentials.cluster_credentials_secret
                    == secret_name
            });
            if uses_secret {
                refs.push(environment_ref(&namespace, &env.name_any()));
            }
        }
        Ok(refs)
    };

    match lookup() {
        Ok(refs) => record(SOURCE, refs),
        Err(e) => lookup_failed(SOURCE, &namespace, &e),
    }
}
