//! # Watch Loop
//!
//! Controller watch loop for Environment resources.
//!
//! Besides Environments themselves, the controller watches every kind an Environment's
//! desired state depends on and maps their changes back to Environments:
//!
//! | Watched kind                          | Mapper                                  |
//! |---------------------------------------|-----------------------------------------|
//! | `GitOpsDeploymentManagedEnvironment`  | owner references                        |
//! | `DeploymentTargetClaim`               | Environments referencing the claim      |
//! | `DeploymentTarget`                    | Environments whose claim it is bound to |
//! | `Secret`                              | managed-secret label, or claim/target   |
//!
//! The controller only reconciles objects still present in its cache, so Environment
//! deletions are picked up by a separate watcher that calls the key-based reconcile. That
//! watcher diffs each relist against the keys it knew, so deletions missed while the watch
//! was down are cleaned up too.

use crate::config::ControllerConfig;
use crate::constants::{WATCH_THROTTLE_BACKOFF_MAX_MS, WATCH_THROTTLE_BACKOFF_START_MS};
use crate::controller::reconciler::mappers::{
    environments_for_claim, environments_for_managed_environment, environments_for_secret,
    environments_for_target,
};
use crate::controller::reconciler::{reconcile, EnvironmentIndex, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::{
    DeploymentTarget, DeploymentTargetClaim, Environment, GitOpsDeploymentManagedEnvironment,
};
use crate::runtime::error_policy::{handle_controller_error, handle_reconciliation_error};
use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use kube_runtime::controller::Config as ControllerSettings;
use kube_runtime::{watcher, Controller, WatchStreamExt};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

/// Api for `K`, limited to `namespace` when one is configured
pub fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the controller watch loop
///
/// Restarts the controller whenever its stream ends, until shutdown marks the server as
/// not ready.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    index: Arc<dyn EnvironmentIndex>,
    server_state: Arc<ServerState>,
    config: &ControllerConfig,
) -> Result<(), anyhow::Error> {
    let namespace = config.watch_namespace.as_deref();
    let environments: Api<Environment> = scoped_api(&client, namespace);
    let managed: Api<GitOpsDeploymentManagedEnvironment> = scoped_api(&client, namespace);
    let claims: Api<DeploymentTargetClaim> = scoped_api(&client, namespace);
    let targets: Api<DeploymentTarget> = scoped_api(&client, namespace);
    let secrets: Api<Secret> = scoped_api(&client, namespace);

    spawn_shutdown_handler(Arc::clone(&server_state));
    spawn_deletion_watch(environments.clone(), Arc::clone(&reconciler));

    let backoff_ms = Arc::new(AtomicU64::new(WATCH_THROTTLE_BACKOFF_START_MS));
    let restart_delay = config.watch_restart_delay_duration();

    loop {
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        let claim_index = Arc::clone(&index);
        let target_index = Arc::clone(&index);
        let secret_index = Arc::clone(&index);
        let stream_backoff = Arc::clone(&backoff_ms);

        info!(
            watch_namespace = namespace.unwrap_or("<all>"),
            max_concurrent_reconciliations = config.max_concurrent_reconciliations,
            "Starting controller watch loop..."
        );
        let controller = Controller::new(environments.clone(), watcher::Config::default())
            .with_config(ControllerSettings::default().concurrency(config.max_concurrent_reconciliations))
            .watches(managed.clone(), watcher::Config::default(), |managed| {
                environments_for_managed_environment(&managed)
            })
            .watches(claims.clone(), watcher::Config::default(), move |claim| {
                environments_for_claim(claim_index.as_ref(), &claim)
            })
            .watches(targets.clone(), watcher::Config::default(), move |target| {
                environments_for_target(target_index.as_ref(), &target)
            })
            .watches(secrets.clone(), watcher::Config::default(), move |secret| {
                environments_for_secret(secret_index.as_ref(), &secret)
            })
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .filter_map(move |event| {
                let backoff = Arc::clone(&stream_backoff);
                async move {
                    match event {
                        Ok((obj, _action)) => {
                            backoff.store(WATCH_THROTTLE_BACKOFF_START_MS, Ordering::Relaxed);
                            debug!(
                                resource.name = obj.name.as_str(),
                                resource.namespace = obj.namespace.as_deref().unwrap_or_default(),
                                "watch.event.reconciled"
                            );
                            Some(())
                        }
                        Err(e) => {
                            handle_controller_error(
                                &e,
                                &backoff,
                                WATCH_THROTTLE_BACKOFF_MAX_MS,
                                restart_delay,
                            )
                            .await;
                            None
                        }
                    }
                }
            })
            .for_each(|()| futures::future::ready(()));

        controller.instrument(watch_span).await;

        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Mark the server not ready on SIGINT/SIGTERM
fn spawn_shutdown_handler(server_state: Arc<ServerState>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        server_state.set_ready(false);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Environment keys seen by the deletion watcher
///
/// A relist replaces the known set on `InitDone`. Keys missing from the new list were deleted
/// while the watch was down and are reported like live deletions.
#[derive(Debug, Default)]
pub struct DeletionTracker {
    known: BTreeSet<(String, String)>,
    relisted: Option<BTreeSet<(String, String)>>,
}

impl DeletionTracker {
    /// Apply a watch event and return the `(namespace, name)` keys that were deleted
    pub fn observe(&mut self, event: &watcher::Event<Environment>) -> Vec<(String, String)> {
        match event {
            watcher::Event::Apply(env) => {
                self.known.insert(environment_key(env));
                Vec::new()
            }
            watcher::Event::Delete(env) => {
                let key = environment_key(env);
                self.known.remove(&key);
                vec![key]
            }
            watcher::Event::Init => {
                self.relisted = Some(BTreeSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(env) => {
                self.relisted
                    .get_or_insert_with(BTreeSet::new)
                    .insert(environment_key(env));
                Vec::new()
            }
            watcher::Event::InitDone => {
                let listed = self.relisted.take().unwrap_or_default();
                let previous = std::mem::replace(&mut self.known, listed);
                previous
                    .into_iter()
                    .filter(|key| !self.known.contains(key))
                    .collect()
            }
        }
    }
}

fn environment_key(env: &Environment) -> (String, String) {
    (env.namespace().unwrap_or_default(), env.name_any())
}

/// Reconcile Environments by key when they are deleted
///
/// Removes the ManagedEnvironment without relying on the cluster's garbage collector.
fn spawn_deletion_watch(environments: Api<Environment>, reconciler: Arc<Reconciler>) {
    tokio::spawn(async move {
        let stream = watcher(environments, watcher::Config::default()).default_backoff();
        pin_mut!(stream);
        let mut tracker = DeletionTracker::default();

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Environment deletion watch error");
                    continue;
                }
            };

            for (namespace, name) in tracker.observe(&event) {
                let span = tracing::span!(
                    tracing::Level::INFO,
                    "controller.watch.environment_deleted",
                    resource.name = name.as_str(),
                    resource.namespace = namespace.as_str(),
                );
                if let Err(e) = reconciler
                    .reconcile_key(&namespace, &name)
                    .instrument(span)
                    .await
                {
                    // the ManagedEnvironment keeps its owner reference, so garbage
                    // collection still removes it if this attempt fails
                    error!(
                        resource.name = name.as_str(),
                        resource.namespace = namespace.as_str(),
                        error = %e,
                        "failed to clean up after Environment deletion"
                    );
                }
            }
        }

        warn!("Environment deletion watch ended");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::fake::fixtures;

    fn key(namespace: &str, name: &str) -> (String, String) {
        (namespace.to_string(), name.to_string())
    }

    fn relist(tracker: &mut DeletionTracker, envs: &[Environment]) -> Vec<(String, String)> {
        let mut deleted = tracker.observe(&watcher::Event::Init);
        for env in envs {
            deleted.extend(tracker.observe(&watcher::Event::InitApply(env.clone())));
        }
        deleted.extend(tracker.observe(&watcher::Event::InitDone));
        deleted
    }

    #[test]
    fn test_live_delete_is_reported() {
        let mut tracker = DeletionTracker::default();
        let dev = fixtures::environment("team-a", "dev");

        assert!(relist(&mut tracker, std::slice::from_ref(&dev)).is_empty());
        assert_eq!(
            tracker.observe(&watcher::Event::Delete(dev)),
            vec![key("team-a", "dev")]
        );
    }

    #[test]
    fn test_deletion_during_relist_gap_is_reported() {
        let mut tracker = DeletionTracker::default();
        let dev = fixtures::environment("team-a", "dev");
        let prod = fixtures::environment("team-a", "prod");
        relist(&mut tracker, &[dev.clone()]);
        tracker.observe(&watcher::Event::Apply(prod.clone()));

        // both were deleted, then prod came back, while the watch was down
        let deleted = relist(&mut tracker, &[prod]);

        assert_eq!(deleted, vec![key("team-a", "dev")]);
    }

    #[test]
    fn test_first_list_reports_nothing() {
        let mut tracker = DeletionTracker::default();
        let envs = [
            fixtures::environment("team-a", "dev"),
            fixtures::environment("team-b", "dev"),
        ];

        assert!(relist(&mut tracker, &envs).is_empty());
        assert!(relist(&mut tracker, &envs).is_empty());
    }
}
