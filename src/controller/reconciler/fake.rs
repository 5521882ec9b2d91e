//! In-memory [`EnvironmentClient`] for unit tests.
//!
//! Objects are keyed by namespace/name, writes are recorded in order, and `replace` calls
//! enforce resourceVersion like the API server does.

use crate::controller::reconciler::client::{ClientError, EnvironmentClient};
use crate::crd::{
    Condition, DeploymentTarget, DeploymentTargetClaim, Environment,
    GitOpsDeploymentManagedEnvironment,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Mutex;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// A mutating call observed by the fake
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    EnvironmentStatus {
        name: String,
        conditions: Vec<Condition>,
    },
    SecretCreated(String),
    SecretUpdated(String),
    SecretDeleted(String),
    ManagedEnvironmentCreated(String),
    ManagedEnvironmentReplaced(String),
    ManagedEnvironmentDeleted(String),
}

impl Write {
    /// True for writes to anything other than Environment status
    pub fn is_resource_write(&self) -> bool {
        !matches!(self, Write::EnvironmentStatus { .. })
    }
}

#[derive(Debug, Default)]
struct State {
    namespaces: BTreeMap<String, Namespace>,
    environments: BTreeMap<Key, Environment>,
    claims: BTreeMap<Key, DeploymentTargetClaim>,
    targets: BTreeMap<Key, DeploymentTarget>,
    secrets: BTreeMap<Key, Secret>,
    managed: BTreeMap<Key, GitOpsDeploymentManagedEnvironment>,
    writes: Vec<Write>,
    next_version: u64,
    fail_status_writes: bool,
    fail_target_list: bool,
    fail_claim_get: bool,
    fail_environment_get: bool,
    fail_managed_writes: bool,
    fail_secret_writes: bool,
    conflict_on_replace: bool,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

#[derive(Debug, Default)]
pub struct FakeClient {
    state: Mutex<State>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn put_namespace(&self, name: &str) {
        self.with_state(|s| {
            s.namespaces.insert(
                name.to_string(),
                Namespace {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        ..ObjectMeta::default()
                    },
                    ..Namespace::default()
                },
            );
        });
    }

    /// Mark a namespace as being deleted
    pub fn terminate_namespace(&self, name: &str) {
        let terminating: Namespace = serde_json::from_value(serde_json::json!({
            "metadata": {
                "name": name,
                "deletionTimestamp": "2024-01-01T00:00:00Z"
            },
            "status": { "phase": "Terminating" }
        }))
        .unwrap();
        self.with_state(|s| {
            s.namespaces.insert(name.to_string(), terminating);
        });
    }

    /// Store an Environment, creating its namespace if needed
    pub fn put_environment(&self, env: Environment) {
        let namespace = env.namespace().unwrap_or_default();
        if !self.with_state(|s| s.namespaces.contains_key(&namespace)) {
            self.put_namespace(&namespace);
        }
        self.with_state(|s| {
            s.environments.insert(key(&namespace, &env.name_any()), env);
        });
    }

    pub fn remove_environment(&self, namespace: &str, name: &str) {
        self.with_state(|s| s.environments.remove(&key(namespace, name)));
    }

    pub fn put_claim(&self, claim: DeploymentTargetClaim) {
        self.with_state(|s| {
            s.claims
                .insert(key(&claim.namespace().unwrap_or_default(), &claim.name_any()), claim);
        });
    }

    pub fn put_target(&self, target: DeploymentTarget) {
        self.with_state(|s| {
            s.targets.insert(
                key(&target.namespace().unwrap_or_default(), &target.name_any()),
                target,
            );
        });
    }

    pub fn put_secret(&self, secret: Secret) {
        self.with_state(|s| {
            s.secrets.insert(
                key(&secret.namespace().unwrap_or_default(), &secret.name_any()),
                secret,
            );
        });
    }

    pub fn remove_secret(&self, namespace: &str, name: &str) {
        self.with_state(|s| s.secrets.remove(&key(namespace, name)));
    }

    pub fn put_managed_environment(&self, mut managed: GitOpsDeploymentManagedEnvironment) {
        self.with_state(|s| {
            managed.metadata.resource_version = Some(s.bump_version());
            s.managed.insert(
                key(&managed.namespace().unwrap_or_default(), &managed.name_any()),
                managed,
            );
        });
    }

    pub fn environment(&self, namespace: &str, name: &str) -> Option<Environment> {
        self.with_state(|s| s.environments.get(&key(namespace, name)).cloned())
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.with_state(|s| s.secrets.get(&key(namespace, name)).cloned())
    }

    pub fn managed_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<GitOpsDeploymentManagedEnvironment> {
        self.with_state(|s| s.managed.get(&key(namespace, name)).cloned())
    }

    pub fn writes(&self) -> Vec<Write> {
        self.with_state(|s| s.writes.clone())
    }

    pub fn resource_writes(&self) -> Vec<Write> {
        self.with_state(|s| {
            s.writes
                .iter()
                .filter(|w| w.is_resource_write())
                .cloned()
                .collect()
        })
    }

    pub fn clear_writes(&self) {
        self.with_state(|s| s.writes.clear());
    }

    pub fn fail_status_writes(&self) {
        self.with_state(|s| s.fail_status_writes = true);
    }

    pub fn fail_target_list(&self) {
        self.with_state(|s| s.fail_target_list = true);
    }

    pub fn fail_claim_get(&self) {
        self.with_state(|s| s.fail_claim_get = true);
    }

    pub fn fail_environment_get(&self) {
        self.with_state(|s| s.fail_environment_get = true);
    }

    pub fn fail_managed_writes(&self) {
        self.with_state(|s| s.fail_managed_writes = true);
    }

    pub fn fail_secret_writes(&self) {
        self.with_state(|s| s.fail_secret_writes = true);
    }

    /// Make replaces fail as if another writer bumped the resourceVersion first
    pub fn conflict_on_replace(&self) {
        self.with_state(|s| s.conflict_on_replace = true);
    }
}

fn unavailable(what: &str) -> ClientError {
    ClientError::Unavailable(format!("injected failure: {what}"))
}

fn object_key(meta: &ObjectMeta) -> Key {
    key(
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default(),
    )
}

#[async_trait]
impl EnvironmentClient for FakeClient {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClientError> {
        Ok(self.with_state(|s| s.namespaces.get(name).cloned()))
    }

    async fn get_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Environment>, ClientError> {
        self.with_state(|s| {
            if s.fail_environment_get {
                return Err(unavailable("get environment"));
            }
            Ok(s.environments.get(&key(namespace, name)).cloned())
        })
    }

    async fn patch_environment_conditions(
        &self,
        namespace: &str,
        name: &str,
        conditions: &[Condition],
    ) -> Result<(), ClientError> {
        self.with_state(|s| {
            if s.fail_status_writes {
                return Err(unavailable("patch environment status"));
            }
            let env = s
                .environments
                .get_mut(&key(namespace, name))
                .ok_or_else(|| ClientError::NotFound(format!("Environment {namespace}/{name}")))?;
            env.status.get_or_insert_with(Default::default).conditions = conditions.to_vec();
            s.writes.push(Write::EnvironmentStatus {
                name: name.to_string(),
                conditions: conditions.to_vec(),
            });
            Ok(())
        })
    }

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DeploymentTargetClaim>, ClientError> {
        self.with_state(|s| {
            if s.fail_claim_get {
                return Err(unavailable("get claim"));
            }
            Ok(s.claims.get(&key(namespace, name)).cloned())
        })
    }

    async fn list_targets(&self, namespace: &str) -> Result<Vec<DeploymentTarget>, ClientError> {
        self.with_state(|s| {
            if s.fail_target_list {
                return Err(unavailable("list targets"));
            }
            Ok(s.targets
                .iter()
                .filter(|((ns, _), _)| ns == namespace)
                .map(|(_, t)| t.clone())
                .collect())
        })
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ClientError> {
        // the API server rejects the request before looking anything up
        if name.is_empty() {
            return Err(ClientError::Unavailable("resource name may not be empty".to_string()));
        }
        Ok(self.with_state(|s| s.secrets.get(&key(namespace, name)).cloned()))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, ClientError> {
        self.with_state(|s| {
            if s.fail_secret_writes {
                return Err(unavailable("create secret"));
            }
            let k = object_key(&secret.metadata);
            if s.secrets.contains_key(&k) {
                return Err(ClientError::Conflict(format!("Secret {}/{}", k.0, k.1)));
            }
            let mut stored = secret.clone();
            stored.metadata.resource_version = Some(s.bump_version());
            s.secrets.insert(k.clone(), stored.clone());
            s.writes.push(Write::SecretCreated(k.1));
            Ok(stored)
        })
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, ClientError> {
        self.with_state(|s| {
            if s.fail_secret_writes {
                return Err(unavailable("update secret"));
            }
            let k = object_key(&secret.metadata);
            let current = s
                .secrets
                .get(&k)
                .ok_or_else(|| ClientError::NotFound(format!("Secret {}/{}", k.0, k.1)))?;
            if secret.metadata.resource_version.is_some()
                && secret.metadata.resource_version != current.metadata.resource_version
            {
                return Err(ClientError::Conflict(format!("Secret {}/{}", k.0, k.1)));
            }
            let mut stored = secret.clone();
            stored.metadata.resource_version = Some(s.bump_version());
            s.secrets.insert(k.clone(), stored.clone());
            s.writes.push(Write::SecretUpdated(k.1));
            Ok(stored)
        })
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        self.with_state(|s| {
            s.secrets
                .remove(&key(namespace, name))
                .ok_or_else(|| ClientError::NotFound(format!("Secret {namespace}/{name}")))?;
            s.writes.push(Write::SecretDeleted(name.to_string()));
            Ok(())
        })
    }

    async fn get_managed_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GitOpsDeploymentManagedEnvironment>, ClientError> {
        Ok(self.with_state(|s| s.managed.get(&key(namespace, name)).cloned()))
    }

    async fn create_managed_environment(
        &self,
        managed: &GitOpsDeploymentManagedEnvironment,
    ) -> Result<GitOpsDeploymentManagedEnvironment, ClientError> {
        self.with_state(|s| {
            if s.fail_managed_writes {
                return Err(unavailable("create managed environment"));
            }
            let k = object_key(&managed.metadata);
            if s.managed.contains_key(&k) {
                return Err(ClientError::Conflict(format!(
                    "GitOpsDeploymentManagedEnvironment {}/{}",
                    k.0, k.1
                )));
            }
            let mut stored = managed.clone();
            stored.metadata.resource_version = Some(s.bump_version());
            s.managed.insert(k.clone(), stored.clone());
            s.writes.push(Write::ManagedEnvironmentCreated(k.1));
            Ok(stored)
        })
    }

    async fn replace_managed_environment(
        &self,
        managed: &GitOpsDeploymentManagedEnvironment,
    ) -> Result<GitOpsDeploymentManagedEnvironment, ClientError> {
        self.with_state(|s| {
            if s.fail_managed_writes {
                return Err(unavailable("replace managed environment"));
            }
            let k = object_key(&managed.metadata);
            let current = s.managed.get(&k).ok_or_else(|| {
                ClientError::NotFound(format!("GitOpsDeploymentManagedEnvironment {}/{}", k.0, k.1))
            })?;
            if s.conflict_on_replace
                || managed.metadata.resource_version != current.metadata.resource_version
            {
                return Err(ClientError::Conflict(format!(
                    "GitOpsDeploymentManagedEnvironment {}/{}",
                    k.0, k.1
                )));
            }
            let mut stored = managed.clone();
            stored.metadata.resource_version = Some(s.bump_version());
            s.managed.insert(k.clone(), stored.clone());
            s.writes.push(Write::ManagedEnvironmentReplaced(k.1));
            Ok(stored)
        })
    }

    async fn delete_managed_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError> {
        self.with_state(|s| {
            if s.fail_managed_writes {
                return Err(unavailable("delete managed environment"));
            }
            s.managed.remove(&key(namespace, name)).ok_or_else(|| {
                ClientError::NotFound(format!(
                    "GitOpsDeploymentManagedEnvironment {namespace}/{name}"
                ))
            })?;
            s.writes
                .push(Write::ManagedEnvironmentDeleted(name.to_string()));
            Ok(())
        })
    }
}

/// Builders for the objects the reconciler reads
pub mod fixtures {
    use crate::crd::{
        DeploymentTarget, DeploymentTargetClaim, DeploymentTargetClaimConfig,
        DeploymentTargetClaimPhase, DeploymentTargetClaimSpec, DeploymentTargetClaimStatus,
        DeploymentTargetKubernetesClusterCredentials, DeploymentTargetSpec, Environment,
        EnvironmentConfiguration, EnvironmentSpec, EnvironmentTarget,
        KubernetesClusterCredentials, UnstableEnvironmentConfiguration,
    };
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    pub const API_URL: &str = "https://api.staging.example.com:6443";
    pub const TARGET_API_URL: &str = "https://api.target.example.com:6443";

    fn meta(namespace: &str, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{namespace}-{name}")),
            ..ObjectMeta::default()
        }
    }

    /// Environment with neither a claim nor inline credentials
    pub fn environment(namespace: &str, name: &str) -> Environment {
        let mut env = Environment::new(name, EnvironmentSpec::default());
        env.metadata = meta(namespace, name);
        env
    }

    pub fn inline_environment(namespace: &str, name: &str, secret: &str) -> Environment {
        let mut env = environment(namespace, name);
        env.spec.unstable_configuration_fields = Some(UnstableEnvironmentConfiguration {
            cluster_type: None,
            kubernetes_cluster_credentials: KubernetesClusterCredentials {
                target_namespace: "team-a-staging".to_string(),
                api_url: API_URL.to_string(),
                ingress_domain: None,
                cluster_credentials_secret: secret.to_string(),
                allow_insecure_skip_tls_verify: true,
                namespaces: vec!["team-a-staging".to_string(), "team-a-tools".to_string()],
                cluster_resources: false,
            },
        });
        env
    }

    pub fn claim_environment(namespace: &str, name: &str, claim: &str) -> Environment {
        let mut env = environment(namespace, name);
        env.spec.configuration = Some(EnvironmentConfiguration {
            target: Some(EnvironmentTarget {
                deployment_target_claim: DeploymentTargetClaimConfig {
                    claim_name: claim.to_string(),
                },
            }),
        });
        env
    }

    pub fn claim(
        namespace: &str,
        name: &str,
        target_name: Option<&str>,
        phase: Option<DeploymentTargetClaimPhase>,
    ) -> DeploymentTargetClaim {
        let mut claim = DeploymentTargetClaim::new(
            name,
            DeploymentTargetClaimSpec {
                deployment_target_class_name: "isolation-level-namespace".to_string(),
                target_name: target_name.map(str::to_string),
            },
        );
        claim.metadata = meta(namespace, name);
        claim.status = Some(DeploymentTargetClaimStatus { phase });
        claim
    }

    pub fn bound_claim(namespace: &str, name: &str, target_name: &str) -> DeploymentTargetClaim {
        claim(
            namespace,
            name,
            Some(target_name),
            Some(DeploymentTargetClaimPhase::Bound),
        )
    }

    pub fn target(namespace: &str, name: &str, claim_ref: Option<&str>, secret: &str) -> DeploymentTarget {
        let mut target = DeploymentTarget::new(
            name,
            DeploymentTargetSpec {
                deployment_target_class_name: "isolation-level-namespace".to_string(),
                kubernetes_cluster_credentials: DeploymentTargetKubernetesClusterCredentials {
                    default_namespace: "team-a-dev".to_string(),
                    api_url: TARGET_API_URL.to_string(),
                    cluster_credentials_secret: secret.to_string(),
                    allow_insecure_skip_tls_verify: false,
                },
                claim_ref: claim_ref.map(str::to_string),
            },
        );
        target.metadata = meta(namespace, name);
        target
    }

    pub fn secret(namespace: &str, name: &str, secret_type: &str, data: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: meta(namespace, name),
            type_: Some(secret_type.to_string()),
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Secret::default()
        }
    }
}
