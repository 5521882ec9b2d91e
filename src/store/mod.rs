//! # Entity Store
//!
//! Storage for the credentials and environments the GitOps service tracks outside the
//! cluster. [`EntityStore`] is the access seam; [`MemoryStore`] keeps everything in process.
//!
//! Errors are classifiable: callers distinguish a missing row ([`StoreError::is_not_found`])
//! and a column limit violation ([`StoreError::is_max_length`]) from other failures.

mod entities;
mod memory;

pub use entities::{
    ClusterCredentials, Entity, ManagedEnvironmentRecord, RepositoryCredentials, MAX_BEARER_TOKEN_LENGTH,
    MAX_HOST_LENGTH, MAX_ID_LENGTH, MAX_KUBE_CONFIG_CONTEXT_LENGTH, MAX_KUBE_CONFIG_LENGTH,
    MAX_NAME_LENGTH, MAX_REPOSITORY_SECRET_LENGTH, MAX_REPOSITORY_URL_LENGTH,
    MAX_REPOSITORY_USER_LENGTH, MAX_SECRET_OBJECT_LENGTH, MAX_SERVICE_ACCOUNT_NAMESPACE_LENGTH,
};
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("value too long for {kind}.{field}: {actual} characters, limit is {max}")]
    MaxLength {
        kind: &'static str,
        field: &'static str,
        max: usize,
        actual: usize,
    },
    #[error("{kind}.{field} must not be empty")]
    EmptyField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: &'static str, id: String },
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_max_length(&self) -> bool {
        matches!(self, StoreError::MaxLength { .. })
    }
}

/// Row filter for [`EntityStore::list`]
pub type Filter<'a, E> = &'a (dyn Fn(&E) -> bool + Send + Sync);

/// CRUD access to rows of type `E`, keyed by primary key
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no row has this key.
    async fn get(&self, id: &str) -> Result<E, StoreError>;

    /// Insert a row, returning it with its generated fields filled in
    ///
    /// An empty primary key is replaced by a random UUID.
    ///
    /// # Errors
    ///
    /// Validation errors, [`StoreError::AlreadyExists`], or [`StoreError::Backend`] for a
    /// broken reference to another row.
    async fn create(&self, entity: E) -> Result<E, StoreError>;

    /// Replace an existing row; sequence number and creation time are kept
    ///
    /// # Errors
    ///
    /// Validation errors or [`StoreError::NotFound`].
    async fn update(&self, entity: &E) -> Result<(), StoreError>;

    /// Delete a row, returning the number of rows removed
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] if other rows still reference this one.
    async fn delete(&self, id: &str) -> Result<u64, StoreError>;

    /// All rows matching `filter`, in primary key order
    ///
    /// # Errors
    ///
    /// Backend failures only.
    async fn list(&self, filter: Filter<'_, E>) -> Result<Vec<E>, StoreError>;
}
