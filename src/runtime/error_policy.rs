//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{resource_key, BackoffState, Reconciler, ReconcilerError};
use crate::crd::Environment;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::{self, Action};
use kube_runtime::watcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per Environment, so one failing Environment does not slow down
/// the others. The state is reset by the reconciler after the next success.
pub fn handle_reconciliation_error(
    env: Arc<Environment>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = env.name_any();
    let namespace = env.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {:?}", namespace, name, error);

    let key = resource_key(&namespace, &name);
    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(key)
                .or_insert_with(|| BackoffState::new(ctx.backoff_min_secs, ctx.backoff_max_secs));
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using maximum backoff", e);
            (ctx.backoff_max_secs, 0)
        }
    };

    info!(
        backoff_seconds,
        error_count, "Retrying with Fibonacci backoff"
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Coarse classification of a controller stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: credentials or RBAC revoked
    Unauthorized,
    /// 410: resource version too old, the watch relists
    Expired,
    /// 429: API server throttling or storage reinitializing
    Throttled,
    /// 404: a watched CRD is missing or an object vanished
    NotFound,
    Other,
}

/// Classify a stream error from its debug rendering
///
/// 404 is checked before 401 since a plain-text 404 body surfaces as a serde error that
/// also mentions the failed watch.
#[must_use]
pub fn classify_watch_error(error: &str) -> WatchErrorKind {
    let is_not_found =
        error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found");
    if is_not_found {
        WatchErrorKind::NotFound
    } else if error.contains("401") || error.contains("Unauthorized") {
        WatchErrorKind::Unauthorized
    } else if error.contains("410")
        || error.contains("too old resource version")
        || error.contains("Expired")
        || error.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error.contains("429")
        || error.contains("storage is (re)initializing")
        || error.contains("TooManyRequests")
    {
        WatchErrorKind::Throttled
    } else {
        WatchErrorKind::Other
    }
}

/// Controller stream error, as yielded by `Controller::run`
pub type ControllerError = controller::Error<ReconcilerError, watcher::Error>;

/// Handle an error yielded by the controller stream
///
/// A failed reconcile only concerns its own Environment and is already requeued with backoff by
/// [`handle_reconciliation_error`], so it is logged and never delays the stream. Everything
/// else comes from the watches and goes through [`handle_watch_stream_error`].
///
/// Returns `true` when the error was only logged.
pub async fn handle_controller_error(
    error: &ControllerError,
    backoff_ms: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> bool {
    match error {
        controller::Error::ReconcilerFailed(e, obj) => {
            debug!(
                resource.name = obj.name.as_str(),
                resource.namespace = obj.namespace.as_deref().unwrap_or_default(),
                error = %e,
                "reconcile failed, requeued with backoff"
            );
            true
        }
        controller::Error::ObjectNotFound(obj) => {
            debug!(
                resource.name = obj.name.as_str(),
                resource.namespace = obj.namespace.as_deref().unwrap_or_default(),
                "object left the cache before it was reconciled"
            );
            true
        }
        other => {
            let rendered = format!("{other:?}");
            handle_watch_stream_error(&rendered, backoff_ms, max_backoff_ms, watch_restart_delay)
                .await
        }
    }
}

/// Handle a watch error surfaced through the controller stream
///
/// The watchers retry on their own backoff. Delays here hold the stream back while the API
/// server is throttling or RBAC is broken.
///
/// Returns `true` when the error was only logged and `false` when it was treated as a watch
/// failure.
pub async fn handle_watch_stream_error(
    error: &str,
    backoff_ms: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> bool {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error
    );

    async {
        match classify_watch_error(error) {
            WatchErrorKind::Unauthorized => {
                error!(
                    "Watch authentication failed (401 Unauthorized) - check the controller's ServiceAccount and RBAC bindings"
                );
                warn!(
                    "Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                    watch_restart_delay.as_secs()
                );
                tokio::time::sleep(watch_restart_delay).await;
                false
            }
            WatchErrorKind::Expired => {
                warn!(error_type = "410", "Watch resource version expired, watch will restart");
                false
            }
            WatchErrorKind::Throttled => {
                let current = backoff_ms.load(Ordering::Relaxed);
                warn!(
                    "API server throttling (429), backing off for {}ms before restart...",
                    current
                );
                tokio::time::sleep(Duration::from_millis(current)).await;
                backoff_ms.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
                false
            }
            WatchErrorKind::NotFound => {
                warn!(
                    "Resource not found (404) - expected when an object was deleted; if it persists, check that the CRDs are installed"
                );
                true
            }
            WatchErrorKind::Other => {
                error!("Controller stream error: {}", error);
                tokio::time::sleep(watch_restart_delay).await;
                false
            }
        }
    }
    .instrument(error_span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::reconciler::fake::{fixtures, FakeClient};
    use crate::controller::reconciler::EnvironmentClient;

    fn reconciler() -> Arc<Reconciler> {
        let client: Arc<dyn EnvironmentClient> = Arc::new(FakeClient::new());
        Arc::new(Reconciler::new(client, &ControllerConfig::default()))
    }

    fn failure() -> ReconcilerError {
        ReconcilerError::ReconciliationFailed(anyhow::anyhow!("boom"))
    }

    #[test]
    fn test_backoff_grows_per_environment() {
        let ctx = reconciler();
        let env = Arc::new(fixtures::environment("team-a", "dev"));
        let other = Arc::new(fixtures::environment("team-a", "prod"));

        let delays: Vec<Action> = (0..4)
            .map(|_| handle_reconciliation_error(Arc::clone(&env), &failure(), Arc::clone(&ctx)))
            .collect();
        assert_eq!(delays[0], Action::requeue(Duration::from_secs(5)));
        assert_eq!(delays[1], Action::requeue(Duration::from_secs(5)));
        assert_eq!(delays[2], Action::requeue(Duration::from_secs(10)));
        assert_eq!(delays[3], Action::requeue(Duration::from_secs(15)));

        // a different Environment starts from the minimum
        assert_eq!(
            handle_reconciliation_error(other, &failure(), Arc::clone(&ctx)),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_reset_backoff_starts_over() {
        let ctx = reconciler();
        let env = Arc::new(fixtures::environment("team-a", "dev"));
        for _ in 0..3 {
            handle_reconciliation_error(Arc::clone(&env), &failure(), Arc::clone(&ctx));
        }

        ctx.reset_backoff(&resource_key("team-a", "dev"));

        assert_eq!(
            handle_reconciliation_error(env, &failure(), ctx),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_classify_watch_error() {
        assert_eq!(classify_watch_error("ObjectNotFound: environments"), WatchErrorKind::NotFound);
        assert_eq!(classify_watch_error("WatchFailed: 401 Unauthorized"), WatchErrorKind::Unauthorized);
        assert_eq!(classify_watch_error("410: too old resource version"), WatchErrorKind::Expired);
        assert_eq!(classify_watch_error("429 TooManyRequests"), WatchErrorKind::Throttled);
        assert_eq!(classify_watch_error("connection reset by peer"), WatchErrorKind::Other);
    }

    #[tokio::test]
    async fn test_throttling_doubles_backoff_up_to_max() {
        let backoff = Arc::new(AtomicU64::new(1));
        let keep = handle_watch_stream_error("429", &backoff, 3, Duration::ZERO).await;
        assert!(!keep);
        assert_eq!(backoff.load(Ordering::Relaxed), 2);

        handle_watch_stream_error("429", &backoff, 3, Duration::ZERO).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_reconcile_failure_does_not_hold_the_stream() {
        let backoff = Arc::new(AtomicU64::new(1));
        let error: ControllerError = controller::Error::ReconcilerFailed(
            ReconcilerError::ReconciliationFailed(anyhow::anyhow!(
                "conflict writing GitOpsDeploymentManagedEnvironment team-a/managed-environment-dev"
            )),
            kube_runtime::reflector::ObjectRef::<Environment>::new("dev")
                .within("team-a")
                .erase(),
        );

        let handled = tokio::time::timeout(
            Duration::from_secs(1),
            handle_controller_error(&error, &backoff, 3, Duration::from_secs(60)),
        )
        .await;

        assert_eq!(handled.ok(), Some(true));
        assert_eq!(backoff.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_not_found_keeps_stream() {
        let backoff = Arc::new(AtomicU64::new(1));
        assert!(handle_watch_stream_error("404 not found", &backoff, 3, Duration::ZERO).await);
    }
}
