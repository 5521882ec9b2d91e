//! In-process [`EntityStore`] backed by ordered maps behind a `tokio` `RwLock`.

use crate::store::entities::{ClusterCredentials, Entity, ManagedEnvironmentRecord, RepositoryCredentials};
use crate::store::{EntityStore, Filter, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Tables {
    cluster_credentials: BTreeMap<String, ClusterCredentials>,
    managed_environments: BTreeMap<String, ManagedEnvironmentRecord>,
    repository_credentials: BTreeMap<String, RepositoryCredentials>,
    next_seq_id: i64,
}

/// Table access and referential checks per entity type
pub trait Stored: Entity {
    fn table(tables: &Tables) -> &BTreeMap<String, Self>;

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<String, Self>;

    /// Rows this entity points at must exist
    fn check_references(_tables: &Tables, _entity: &Self) -> Result<(), StoreError> {
        Ok(())
    }

    /// No other row may still point at the row being deleted
    fn check_referrers(_tables: &Tables, _id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

impl Stored for ClusterCredentials {
    fn table(tables: &Tables) -> &BTreeMap<String, Self> {
        &tables.cluster_credentials
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<String, Self> {
        &mut tables.cluster_credentials
    }

    fn check_referrers(tables: &Tables, id: &str) -> Result<(), StoreError> {
        let referenced = tables
            .managed_environments
            .values()
            .any(|env| env.cluster_credentials_id == id);
        if referenced {
            return Err(StoreError::Backend(format!(
                "{} '{id}' is still referenced by a {}",
                Self::KIND,
                ManagedEnvironmentRecord::KIND
            )));
        }
        Ok(())
    }
}

impl Stored for ManagedEnvironmentRecord {
    fn table(tables: &Tables) -> &BTreeMap<String, Self> {
        &tables.managed_environments
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<String, Self> {
        &mut tables.managed_environments
    }

    fn check_references(tables: &Tables, entity: &Self) -> Result<(), StoreError> {
        if tables
            .cluster_credentials
            .contains_key(&entity.cluster_credentials_id)
        {
            return Ok(());
        }
        Err(StoreError::Backend(format!(
            "foreign key violation: {} '{}' references missing {} '{}'",
            Self::KIND,
            entity.id,
            ClusterCredentials::KIND,
            entity.cluster_credentials_id
        )))
    }
}

impl Stored for RepositoryCredentials {
    fn table(tables: &Tables) -> &BTreeMap<String, Self> {
        &tables.repository_credentials
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<String, Self> {
        &mut tables.repository_credentials
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<E: Stored> EntityStore<E> for MemoryStore {
    async fn get(&self, id: &str) -> Result<E, StoreError> {
        let tables = self.tables.read().await;
        E::table(&tables)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: E::KIND,
                id: id.to_string(),
            })
    }

    async fn create(&self, mut entity: E) -> Result<E, StoreError> {
        if entity.id().is_empty() {
            entity.set_id(uuid::Uuid::new_v4().to_string());
        }
        entity.validate()?;

        let mut tables = self.tables.write().await;
        if E::table(&tables).contains_key(entity.id()) {
            return Err(StoreError::AlreadyExists {
                kind: E::KIND,
                id: entity.id().to_string(),
            });
        }
        E::check_references(&tables, &entity)?;

        tables.next_seq_id += 1;
        entity.set_created(tables.next_seq_id, chrono::Utc::now());
        E::table_mut(&mut tables).insert(entity.id().to_string(), entity.clone());

        debug!(entity.kind = E::KIND, entity.id = entity.id(), "created row");
        Ok(entity)
    }

    async fn update(&self, entity: &E) -> Result<(), StoreError> {
        entity.validate()?;

        let mut tables = self.tables.write().await;
        E::check_references(&tables, entity)?;
        let existing = E::table_mut(&mut tables)
            .get_mut(entity.id())
            .ok_or_else(|| StoreError::NotFound {
                kind: E::KIND,
                id: entity.id().to_string(),
            })?;

        let mut updated = entity.clone();
        updated.preserve_created(existing);
        *existing = updated;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        E::check_referrers(&tables, id)?;
        let removed = E::table_mut(&mut tables).remove(id).is_some();
        Ok(u64::from(removed))
    }

    async fn list(&self, filter: Filter<'_, E>) -> Result<Vec<E>, StoreError> {
        let tables = self.tables.read().await;
        Ok(E::table(&tables)
            .values()
            .filter(|entity| filter(*entity))
            .cloned()
            .collect())
    }
}
