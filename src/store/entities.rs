//! # Entities
//!
//! Rows of the credentials store. Field limits mirror the relational schema the store
//! replaces: every `String` column has a maximum length in characters, and some columns
//! must not be empty.

use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_ID_LENGTH: usize = 48;
pub const MAX_NAME_LENGTH: usize = 256;
pub const MAX_HOST_LENGTH: usize = 512;
pub const MAX_KUBE_CONFIG_LENGTH: usize = 65_000;
pub const MAX_KUBE_CONFIG_CONTEXT_LENGTH: usize = 64;
pub const MAX_BEARER_TOKEN_LENGTH: usize = 2048;
pub const MAX_SERVICE_ACCOUNT_NAMESPACE_LENGTH: usize = 128;
pub const MAX_REPOSITORY_URL_LENGTH: usize = 512;
pub const MAX_REPOSITORY_USER_LENGTH: usize = 256;
pub const MAX_REPOSITORY_SECRET_LENGTH: usize = 1024;
pub const MAX_SECRET_OBJECT_LENGTH: usize = 48;

/// A row that can be kept in an [`EntityStore`](crate::store::EntityStore)
pub trait Entity: Clone + Send + Sync + 'static {
    /// Table name, used in error messages
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Record the sequence number and creation time assigned on insert
    fn set_created(&mut self, seq_id: i64, created_on: DateTime<Utc>);

    /// Copy the insert-time fields from the stored row
    fn preserve_created(&mut self, existing: &Self);

    /// Check not-null columns and column lengths
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyField`] or [`StoreError::MaxLength`] naming the first
    /// offending field.
    fn validate(&self) -> Result<(), StoreError>;
}

fn check_length(
    kind: &'static str,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), StoreError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(StoreError::MaxLength {
            kind,
            field,
            max,
            actual,
        });
    }
    Ok(())
}

fn check_required(
    kind: &'static str,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::EmptyField { kind, field });
    }
    check_length(kind, field, value, max)
}

/// Credentials for reaching a cluster
///
/// Either a kubeconfig plus context, or a service account bearer token plus its namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCredentials {
    pub id: String,
    pub seq_id: i64,
    /// API URL of the cluster
    pub host: String,
    pub kube_config: String,
    pub kube_config_context: String,
    pub service_account_bearer_token: String,
    pub service_account_ns: String,
    pub allow_insecure_skip_tls_verify: bool,
}

impl Entity for ClusterCredentials {
    const KIND: &'static str = "ClusterCredentials";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn set_created(&mut self, seq_id: i64, _created_on: DateTime<Utc>) {
        self.seq_id = seq_id;
    }

    fn preserve_created(&mut self, existing: &Self) {
        self.seq_id = existing.seq_id;
    }

    fn validate(&self) -> Result<(), StoreError> {
        let kind = Self::KIND;
        check_length(kind, "id", &self.id, MAX_ID_LENGTH)?;
        check_length(kind, "host", &self.host, MAX_HOST_LENGTH)?;
        check_length(kind, "kube_config", &self.kube_config, MAX_KUBE_CONFIG_LENGTH)?;
        check_length(
            kind,
            "kube_config_context",
            &self.kube_config_context,
            MAX_KUBE_CONFIG_CONTEXT_LENGTH,
        )?;
        check_length(
            kind,
            "service_account_bearer_token",
            &self.service_account_bearer_token,
            MAX_BEARER_TOKEN_LENGTH,
        )?;
        check_length(
            kind,
            "service_account_ns",
            &self.service_account_ns,
            MAX_SERVICE_ACCOUNT_NAMESPACE_LENGTH,
        )
    }
}

/// A cluster the GitOps engine deploys to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedEnvironmentRecord {
    pub id: String,
    pub seq_id: i64,
    /// Human readable name
    pub name: String,
    /// Row of [`ClusterCredentials`] used to reach the cluster
    pub cluster_credentials_id: String,
    pub created_on: Option<DateTime<Utc>>,
}

impl Entity for ManagedEnvironmentRecord {
    const KIND: &'static str = "ManagedEnvironment";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn set_created(&mut self, seq_id: i64, created_on: DateTime<Utc>) {
        self.seq_id = seq_id;
        self.created_on = Some(created_on);
    }

    fn preserve_created(&mut self, existing: &Self) {
        self.seq_id = existing.seq_id;
        self.created_on = existing.created_on;
    }

    fn validate(&self) -> Result<(), StoreError> {
        let kind = Self::KIND;
        check_length(kind, "id", &self.id, MAX_ID_LENGTH)?;
        check_required(kind, "name", &self.name, MAX_NAME_LENGTH)?;
        check_required(
            kind,
            "cluster_credentials_id",
            &self.cluster_credentials_id,
            MAX_ID_LENGTH,
        )
    }
}

/// Credentials for a private Git repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryCredentials {
    pub id: String,
    /// Owner of the credentials
    pub user_id: String,
    pub private_url: String,
    pub auth_username: String,
    pub auth_password: String,
    pub auth_ssh_key: String,
    /// Name of the Kubernetes secret that hands these credentials to the GitOps engine
    pub secret_obj: String,
    /// GitOps engine instance the secret lives on
    pub engine_cluster_id: String,
    pub seq_id: i64,
    pub created_on: Option<DateTime<Utc>>,
}

impl Entity for RepositoryCredentials {
    const KIND: &'static str = "RepositoryCredentials";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn set_created(&mut self, seq_id: i64, created_on: DateTime<Utc>) {
        self.seq_id = seq_id;
        self.created_on = Some(created_on);
    }

    fn preserve_created(&mut self, existing: &Self) {
        self.seq_id = existing.seq_id;
        self.created_on = existing.created_on;
    }

    fn validate(&self) -> Result<(), StoreError> {
        let kind = Self::KIND;
        check_length(kind, "id", &self.id, MAX_ID_LENGTH)?;
        check_required(kind, "user_id", &self.user_id, MAX_ID_LENGTH)?;
        check_required(kind, "private_url", &self.private_url, MAX_REPOSITORY_URL_LENGTH)?;
        check_length(kind, "auth_username", &self.auth_username, MAX_REPOSITORY_USER_LENGTH)?;
        check_length(kind, "auth_password", &self.auth_password, MAX_REPOSITORY_SECRET_LENGTH)?;
        check_length(kind, "auth_ssh_key", &self.auth_ssh_key, MAX_REPOSITORY_SECRET_LENGTH)?;
        check_required(kind, "secret_obj", &self.secret_obj, MAX_SECRET_OBJECT_LENGTH)?;
        check_required(kind, "engine_cluster_id", &self.engine_cluster_id, MAX_ID_LENGTH)
    }
}
