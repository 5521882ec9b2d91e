//! # Reconciliation Logic
//!
//! Drives an Environment's GitOpsDeploymentManagedEnvironment towards the desired state.
//!
//! Reconciliation is keyed by namespace/name and always re-reads the Environment, so the same
//! entry point serves watch events, mapped events from related kinds, and Environment
//! deletions (where the object is already gone and the ManagedEnvironment must be removed).

use crate::constants::REASON_ERROR_OCCURRED;
use crate::controller::reconciler::client::EnvironmentClient;
use crate::controller::reconciler::conditions;
use crate::controller::reconciler::desired::{generate_desired_state, MSG_CONFLICTING_SOURCES};
use crate::controller::reconciler::types::{resource_key, DesiredState, Reconciler, ReconcilerError};
use crate::crd::{managed_environment_name, Environment, GitOpsDeploymentManagedEnvironment};
use crate::observability::{log_resource_change, metrics, ResourceChange};
use anyhow::Context;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, Instrument};

const MANAGED_ENVIRONMENT_KIND: &str = "GitOpsDeploymentManagedEnvironment";

/// Controller entry point
///
/// Errors are handled by `error_policy()`, which owns the per-Environment backoff.
pub async fn reconcile(
    env: Arc<Environment>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let namespace = env.namespace().unwrap_or_default();
    let name = env.name_any();

    let span = tracing::span!(
        tracing::Level::INFO,
        "reconcile",
        resource.kind = "Environment",
        resource.namespace = namespace.as_str(),
        resource.name = name.as_str(),
    );

    async {
        let start = Instant::now();
        metrics::increment_reconciliations();

        let result = ctx.reconcile_key(&namespace, &name).await;

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        match &result {
            Ok(_) => ctx.reset_backoff(&resource_key(&namespace, &name)),
            Err(_) => metrics::increment_reconciliation_errors(),
        }
        result
    }
    .instrument(span)
    .await
}

impl Reconciler {
    /// Reconcile the Environment `namespace/name`
    ///
    /// # Errors
    ///
    /// Returns an error for failures a later attempt may fix. User errors are recorded on the
    /// Environment's conditions and reported as success.
    pub async fn reconcile_key(&self, namespace: &str, name: &str) -> Result<Action, ReconcilerError> {
        let client = self.client.as_ref();

        if namespace_is_terminating(client, namespace).await? {
            debug!("namespace is being deleted, skipping reconciliation");
            return Ok(Action::await_change());
        }

        let env = client
            .get_environment(namespace, name)
            .await
            .context("unable to retrieve Environment resource")?;

        let Some(mut env) = env else {
            return delete_managed_environment(client, namespace, name).await;
        };

        info!("Reconciling Environment");

        if env.has_conflicting_sources() {
            conditions::raise(client, &mut env, MSG_CONFLICTING_SOURCES, REASON_ERROR_OCCURRED)
                .await
                .context("unable to update environment status condition")?;
            return Ok(Action::await_change());
        }

        let desired = match generate_desired_state(client, &mut env).await {
            DesiredState::Retry(e) => {
                return Err(e
                    .context("unable to generate desired GitOps Deployment Managed Environment")
                    .into());
            }
            DesiredState::Done => return Ok(Action::await_change()),
            DesiredState::Ready(None) => {
                conditions::resolve(client, &mut env, REASON_ERROR_OCCURRED)
                    .await
                    .context("unable to update environment status condition")?;
                return Ok(Action::await_change());
            }
            DesiredState::Ready(Some(desired)) => desired,
        };

        apply_managed_environment(client, &mut env, desired).await
    }
}

/// True when the namespace is gone or has a deletion timestamp
async fn namespace_is_terminating(
    client: &dyn EnvironmentClient,
    namespace: &str,
) -> Result<bool, ReconcilerError> {
    let ns = client
        .get_namespace(namespace)
        .await
        .with_context(|| format!("unable to retrieve namespace {namespace}"))?;
    Ok(ns.map_or(true, |ns| ns.metadata.deletion_timestamp.is_some()))
}

/// Remove the ManagedEnvironment of an Environment that no longer exists
async fn delete_managed_environment(
    client: &dyn EnvironmentClient,
    namespace: &str,
    env_name: &str,
) -> Result<Action, ReconcilerError> {
    let name = managed_environment_name(env_name);
    let existing = client
        .get_managed_environment(namespace, &name)
        .await
        .context("unable to retrieve GitOpsDeploymentManagedEnvironment")?;

    if existing.is_none() {
        debug!("Environment not found and no GitOpsDeploymentManagedEnvironment to clean up");
        return Ok(Action::await_change());
    }

    info!(managed_environment = name.as_str(), "Environment deleted, deleting GitOpsDeploymentManagedEnvironment");
    match client.delete_managed_environment(namespace, &name).await {
        Ok(()) => {
            log_resource_change(MANAGED_ENVIRONMENT_KIND, namespace, &name, ResourceChange::Deleted);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context("unable to delete GitOpsDeploymentManagedEnvironment")
                .into());
        }
    }
    Ok(Action::await_change())
}

/// Create the ManagedEnvironment, or update its spec when it drifted
async fn apply_managed_environment(
    client: &dyn EnvironmentClient,
    env: &mut Environment,
    desired: GitOpsDeploymentManagedEnvironment,
) -> Result<Action, ReconcilerError> {
    let namespace = desired.namespace().unwrap_or_default();
    let name = desired.name_any();

    let current = client
        .get_managed_environment(&namespace, &name)
        .await
        .context("unable to retrieve GitOpsDeploymentManagedEnvironment")?;

    let Some(mut current) = current else {
        info!(managed_environment = name.as_str(), "Creating GitOpsDeploymentManagedEnvironment");
        client
            .create_managed_environment(&desired)
            .await
            .context("unable to create new GitOpsDeploymentManagedEnvironment")?;
        log_resource_change(MANAGED_ENVIRONMENT_KIND, &namespace, &name, ResourceChange::Created);
        return Ok(Action::await_change());
    };

    conditions::resolve(client, env, REASON_ERROR_OCCURRED)
        .await
        .context("unable to update environment status condition")?;

    if current.spec == desired.spec {
        debug!(managed_environment = name.as_str(), "GitOpsDeploymentManagedEnvironment is up to date");
        return Ok(Action::await_change());
    }

    info!(managed_environment = name.as_str(), "Updating GitOpsDeploymentManagedEnvironment");
    current.spec = desired.spec;
    client
        .replace_managed_environment(&current)
        .await
        .context("unable to update existing GitOpsDeploymentManagedEnvironment")?;
    log_resource_change(MANAGED_ENVIRONMENT_KIND, &namespace, &name, ResourceChange::Modified);

    Ok(Action::await_change())
}
