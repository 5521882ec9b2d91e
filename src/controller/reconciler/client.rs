//! # Cluster Access
//!
//! Every API call the reconciler performs goes through [`EnvironmentClient`], so the
//! reconciliation logic can run against an in-memory client in tests.
//!
//! Gets return `Ok(None)` when the object does not exist. Writes against a missing object
//! return [`ClientError::NotFound`], and an optimistic-concurrency failure (HTTP 409)
//! returns [`ClientError::Conflict`].

use crate::constants::FIELD_MANAGER;
use crate::crd::{
    Condition, DeploymentTarget, DeploymentTargetClaim, Environment,
    GitOpsDeploymentManagedEnvironment,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict writing {0}: the object was modified concurrently")]
    Conflict(String),
    #[error("Kubernetes API error: {0}")]
    Api(#[source] kube::Error),
    #[error("API unavailable: {0}")]
    Unavailable(String),
}

impl ClientError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Classify a kube error for the object described by `what`
fn classify(error: kube::Error, what: impl FnOnce() -> String) -> ClientError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 404 => ClientError::NotFound(what()),
        kube::Error::Api(api_err) if api_err.code == 409 => ClientError::Conflict(what()),
        other => ClientError::Api(other),
    }
}

/// Turn a 404 on a get into `Ok(None)`
fn optional<K>(result: Result<K, kube::Error>, what: impl FnOnce() -> String) -> Result<Option<K>, ClientError> {
    match result {
        Ok(object) => Ok(Some(object)),
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
        Err(e) => Err(classify(e, what)),
    }
}

#[async_trait]
pub trait EnvironmentClient: Send + Sync {
    /// Fetch a Namespace (cluster scoped)
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClientError>;

    async fn get_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Environment>, ClientError>;

    /// Replace the Environment's condition list through the status subresource
    async fn patch_environment_conditions(
        &self,
        namespace: &str,
        name: &str,
        conditions: &[Condition],
    ) -> Result<(), ClientError>;

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DeploymentTargetClaim>, ClientError>;

    async fn list_targets(&self, namespace: &str) -> Result<Vec<DeploymentTarget>, ClientError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ClientError>;

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, ClientError>;

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, ClientError>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClientError>;

    async fn get_managed_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GitOpsDeploymentManagedEnvironment>, ClientError>;

    async fn create_managed_environment(
        &self,
        managed: &GitOpsDeploymentManagedEnvironment,
    ) -> Result<GitOpsDeploymentManagedEnvironment, ClientError>;

    /// Replace a ManagedEnvironment; the object's resourceVersion guards against lost updates
    async fn replace_managed_environment(
        &self,
        managed: &GitOpsDeploymentManagedEnvironment,
    ) -> Result<GitOpsDeploymentManagedEnvironment, ClientError>;

    async fn delete_managed_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError>;
}

/// [`EnvironmentClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeEnvironmentClient {
    client: Client,
}

impl std::fmt::Debug for KubeEnvironmentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEnvironmentClient").finish_non_exhaustive()
    }
}

impl KubeEnvironmentClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn object_key(metadata: &kube::api::ObjectMeta) -> Result<(&str, &str), ClientError> {
    let namespace = metadata
        .namespace
        .as_deref()
        .ok_or_else(|| ClientError::Unavailable("object has no namespace".to_string()))?;
    let name = metadata
        .name
        .as_deref()
        .ok_or_else(|| ClientError::Unavailable("object has no name".to_string()))?;
    Ok((namespace, name))
}

#[async_trait]
impl EnvironmentClient for KubeEnvironmentClient {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClientError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        optional(api.get(name).await, || format!("Namespace {name}"))
    }

    async fn get_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Environment>, ClientError> {
        let api: Api<Environment> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await, || format!("Environment {namespace}/{name}"))
    }

    async fn patch_environment_conditions(
        &self,
        namespace: &str,
        name: &str,
        conditions: &[Condition],
    ) -> Result<(), ClientError> {
        let api: Api<Environment> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "status": {
                "conditions": conditions
            }
        });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| classify(e, || format!("Environment {namespace}/{name}")))
    }

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DeploymentTargetClaim>, ClientError> {
        let api: Api<DeploymentTargetClaim> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await, || {
            format!("DeploymentTargetClaim {namespace}/{name}")
        })
    }

    async fn list_targets(&self, namespace: &str) -> Result<Vec<DeploymentTarget>, ClientError> {
        let api: Api<DeploymentTarget> = Api::namespaced(self.client.clone(), namespace);
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| classify(e, || format!("DeploymentTargets in {namespace}")))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ClientError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await, || format!("Secret {namespace}/{name}"))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, ClientError> {
        let (namespace, name) = object_key(&secret.metadata)?;
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), secret)
            .await
            .map_err(|e| classify(e, || format!("Secret {namespace}/{name}")))
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, ClientError> {
        let (namespace, name) = object_key(&secret.metadata)?;
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), secret)
            .await
            .map_err(|e| classify(e, || format!("Secret {namespace}/{name}")))
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| classify(e, || format!("Secret {namespace}/{name}")))
    }

    async fn get_managed_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GitOpsDeploymentManagedEnvironment>, ClientError> {
        let api: Api<GitOpsDeploymentManagedEnvironment> =
            Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await, || {
            format!("GitOpsDeploymentManagedEnvironment {namespace}/{name}")
        })
    }

    async fn create_managed_environment(
        &self,
        managed: &GitOpsDeploymentManagedEnvironment,
    ) -> Result<GitOpsDeploymentManagedEnvironment, ClientError> {
        let (namespace, name) = object_key(&managed.metadata)?;
        let api: Api<GitOpsDeploymentManagedEnvironment> =
            Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), managed)
            .await
            .map_err(|e| {
                classify(e, || {
                    format!("GitOpsDeploymentManagedEnvironment {namespace}/{name}")
                })
            })
    }

    async fn replace_managed_environment(
        &self,
        managed: &GitOpsDeploymentManagedEnvironment,
    ) -> Result<GitOpsDeploymentManagedEnvironment, ClientError> {
        let (namespace, name) = object_key(&managed.metadata)?;
        let api: Api<GitOpsDeploymentManagedEnvironment> =
            Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), managed)
            .await
            .map_err(|e| {
                classify(e, || {
                    format!("GitOpsDeploymentManagedEnvironment {namespace}/{name}")
                })
            })
    }

    async fn delete_managed_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError> {
        let api: Api<GitOpsDeploymentManagedEnvironment> =
            Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| {
                classify(e, || {
                    format!("GitOpsDeploymentManagedEnvironment {namespace}/{name}")
                })
            })
    }
}
