//! # Environment Index
//!
//! Synchronous, cache-backed lookups used by the event mappers. Mappers run inside the
//! watch stream and cannot await, so they read from reflector stores instead of the API.
//!
//! Until a reflector has delivered its initial list the corresponding store is incomplete;
//! lookups against it return [`IndexError::NotSynced`] rather than a partial answer.

use crate::crd::{DeploymentTarget, DeploymentTargetClaim, Environment};
use futures::{pin_mut, StreamExt};
use kube::api::Api;
use kube::{Resource, ResourceExt};
use kube_runtime::reflector::{self, ObjectRef, Store};
use kube_runtime::{watcher, WatchStreamExt};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("{0} cache has not completed its initial sync")]
    NotSynced(&'static str),
    #[error("index unavailable: {0}")]
    Unavailable(String),
}

#[cfg_attr(test, automock)]
pub trait EnvironmentIndex: Send + Sync {
    fn environments(&self, namespace: &str) -> Result<Vec<Arc<Environment>>, IndexError>;

    fn claims(&self, namespace: &str) -> Result<Vec<Arc<DeploymentTargetClaim>>, IndexError>;

    fn targets(&self, namespace: &str) -> Result<Vec<Arc<DeploymentTarget>>, IndexError>;

    fn claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Arc<DeploymentTargetClaim>>, IndexError>;
}

/// A reflector store plus a flag set once its initial list has been applied
#[derive(Clone)]
pub struct CachedKind<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    kind: &'static str,
    store: Store<K>,
    synced: Arc<AtomicBool>,
}

impl<K> Debug for CachedKind<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedKind")
            .field("kind", &self.kind)
            .field("synced", &self.synced.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<K> CachedKind<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    #[must_use]
    pub fn new(kind: &'static str, store: Store<K>, synced: Arc<AtomicBool>) -> Self {
        Self {
            kind,
            store,
            synced,
        }
    }

    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Relaxed)
    }

    fn store(&self) -> Result<&Store<K>, IndexError> {
        if self.is_synced() {
            Ok(&self.store)
        } else {
            Err(IndexError::NotSynced(self.kind))
        }
    }

    fn in_namespace(&self, namespace: &str) -> Result<Vec<Arc<K>>, IndexError> {
        Ok(self
            .store()?
            .state()
            .into_iter()
            .filter(|obj| obj.namespace().as_deref() == Some(namespace))
            .collect())
    }
}

/// Spawn a reflector for `api` and return its cache
///
/// The returned cache reports itself synced after the first `InitDone` event.
pub fn spawn_reflector<K>(kind: &'static str, api: Api<K>) -> CachedKind<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let (reader, writer) = reflector::store();
    let synced = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&synced);

    tokio::spawn(async move {
        let stream = reflector::reflector(
            writer,
            watcher(api, watcher::Config::default()).default_backoff(),
        );
        pin_mut!(stream);

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::InitDone) => {
                    if !flag.swap(true, Ordering::Relaxed) {
                        info!(resource.kind = kind, "reflector cache synced");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(resource.kind = kind, error = %e, "reflector watch error");
                }
            }
        }

        warn!(resource.kind = kind, "reflector stream ended");
    });

    CachedKind::new(kind, reader, synced)
}

/// [`EnvironmentIndex`] backed by reflector stores
#[derive(Debug, Clone)]
pub struct StoreIndex {
    environments: CachedKind<Environment>,
    claims: CachedKind<DeploymentTargetClaim>,
    targets: CachedKind<DeploymentTarget>,
}

impl StoreIndex {
    #[must_use]
    pub fn new(
        environments: CachedKind<Environment>,
        claims: CachedKind<DeploymentTargetClaim>,
        targets: CachedKind<DeploymentTarget>,
    ) -> Self {
        Self {
            environments,
            claims,
            targets,
        }
    }
}

impl EnvironmentIndex for StoreIndex {
    fn environments(&self, namespace: &str) -> Result<Vec<Arc<Environment>>, IndexError> {
        self.environments.in_namespace(namespace)
    }

    fn claims(&self, namespace: &str) -> Result<Vec<Arc<DeploymentTargetClaim>>, IndexError> {
        self.claims.in_namespace(namespace)
    }

    fn targets(&self, namespace: &str) -> Result<Vec<Arc<DeploymentTarget>>, IndexError> {
        self.targets.in_namespace(namespace)
    }

    fn claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Arc<DeploymentTargetClaim>>, IndexError> {
        Ok(self
            .claims
            .store()?
            .get(&ObjectRef::new(name).within(namespace)))
    }
}
