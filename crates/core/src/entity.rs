//! Keyed entities and the per-event working set.
//!
//! Handlers never talk to storage directly. For each event the indexer hands
//! them an [`EntityCache`]: reads go through the staged writes first and then
//! the [`EntityRepository`], writes are staged in a [`ChangeSet`] that the
//! indexer commits atomically with the audit record and cursor.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DomainError, DomainResult};
use crate::ports::EntityRepository;

/// A persisted aggregate addressed by `(KIND, id)`.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Entity kind, also the storage partition (e.g. "Staker").
    const KIND: &'static str;

    /// Entity key within its kind.
    fn id(&self) -> String;
}

/// Storage key of an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub kind: &'static str,
    pub id: String,
}

/// One staged upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange {
    pub kind: &'static str,
    pub id: String,
    pub data: serde_json::Value,
}

/// All upserts staged while handling one event, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<EntityChange>,
}

impl ChangeSet {
    pub fn iter(&self) -> impl Iterator<Item = &EntityChange> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Look up a staged change.
    pub fn get(&self, kind: &str, id: &str) -> Option<&EntityChange> {
        self.changes.iter().find(|c| c.kind == kind && c.id == id)
    }
}

/// Per-event read-through working set.
pub struct EntityCache<'a> {
    repository: &'a dyn EntityRepository,
    staged: BTreeMap<EntityKey, serde_json::Value>,
}

impl<'a> EntityCache<'a> {
    pub fn new(repository: &'a dyn EntityRepository) -> Self {
        Self {
            repository,
            staged: BTreeMap::new(),
        }
    }

    /// Get an entity if it exists (staged writes take precedence).
    pub async fn get<T: Entity>(&self, id: &str) -> DomainResult<Option<T>> {
        let key = EntityKey {
            kind: T::KIND,
            id: id.to_string(),
        };

        let value = match self.staged.get(&key) {
            Some(value) => Some(value.clone()),
            None => self.repository.get_entity(T::KIND, id).await?,
        };

        value.map(|v| decode::<T>(v, id)).transpose()
    }

    /// Load an entity that must already exist.
    ///
    /// A missing record is fatal for the event being processed.
    pub async fn load<T: Entity>(&self, id: &str) -> DomainResult<T> {
        self.get(id).await?.ok_or_else(|| DomainError::EntityNotFound {
            kind: T::KIND,
            id: id.to_string(),
        })
    }

    /// Whether an entity exists.
    pub async fn exists<T: Entity>(&self, id: &str) -> DomainResult<bool> {
        Ok(self.get::<T>(id).await?.is_some())
    }

    /// Get an entity, creating and staging it with `create` if absent.
    ///
    /// An existing record is returned untouched; no field is reset on reload.
    pub async fn get_or_create<T, F>(&mut self, id: &str, create: F) -> DomainResult<T>
    where
        T: Entity,
        F: FnOnce() -> T + Send,
    {
        if let Some(existing) = self.get::<T>(id).await? {
            return Ok(existing);
        }
        let entity = create();
        self.save(&entity)?;
        Ok(entity)
    }

    /// Stage an upsert.
    pub fn save<T: Entity>(&mut self, entity: &T) -> DomainResult<()> {
        let data = serde_json::to_value(entity).map_err(|e| {
            DomainError::DecodingError(format!(
                "Failed to serialize {} {}: {}",
                T::KIND,
                entity.id(),
                e
            ))
        })?;
        self.staged.insert(
            EntityKey {
                kind: T::KIND,
                id: entity.id(),
            },
            data,
        );
        Ok(())
    }

    /// Number of staged upserts.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Consume the working set into its change set.
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet {
            changes: self
                .staged
                .into_iter()
                .map(|(key, data)| EntityChange {
                    kind: key.kind,
                    id: key.id,
                    data,
                })
                .collect(),
        }
    }
}

fn decode<T: Entity>(value: serde_json::Value, id: &str) -> DomainResult<T> {
    serde_json::from_value(value).map_err(|e| {
        DomainError::DecodingError(format!("Failed to decode {} {}: {}", T::KIND, id, e))
    })
}
