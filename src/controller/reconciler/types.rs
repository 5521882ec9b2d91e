//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::client::EnvironmentClient;
use crate::crd::GitOpsDeploymentManagedEnvironment;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

/// Outcome of computing the desired ManagedEnvironment for an Environment
#[derive(Debug)]
pub enum DesiredState {
    /// Something failed that a later attempt may fix; the caller should requeue
    Retry(anyhow::Error),
    /// A user error was recorded as a condition; nothing more to do until the inputs change
    Done,
    /// The desired resource, or `None` when the Environment should have no ManagedEnvironment
    Ready(Option<GitOpsDeploymentManagedEnvironment>),
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared reconciliation context
#[derive(Clone)]
pub struct Reconciler {
    pub client: Arc<dyn EnvironmentClient>,
    // Backoff state per Environment (namespace/name), owned by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("backoff_min_secs", &self.backoff_min_secs)
            .field("backoff_max_secs", &self.backoff_max_secs)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(client: Arc<dyn EnvironmentClient>, config: &ControllerConfig) -> Self {
        let (backoff_min_secs, backoff_max_secs) = config.backoff_bounds();
        Self {
            client,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            backoff_min_secs,
            backoff_max_secs,
        }
    }

    /// Forget the error history of an Environment after it reconciled cleanly
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(key) {
                state.reset();
            }
        }
    }
}

/// Key used for per-Environment bookkeeping
#[must_use]
pub fn resource_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
