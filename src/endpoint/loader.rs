// ============================================================================
// Object Loader
// ============================================================================
//
// Backing-store contract used for lazy loading, plus an in-memory store that
// answers collection loads by scanning foreign keys.
//
// ============================================================================

use crate::core::{ObjectId, RelationEndPointId, RelationError, Result};
use crate::mapping::{EndPointKind, RelationMapping};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Persisted state of one object as far as relations are concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedObject {
    pub id: ObjectId,
    /// Foreign-key property name -> referenced owner
    pub foreign_keys: HashMap<String, Option<ObjectId>>,
}

impl LoadedObject {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            foreign_keys: HashMap::new(),
        }
    }

    pub fn with_foreign_key(mut self, property: impl Into<String>, owner: Option<ObjectId>) -> Self {
        self.foreign_keys.insert(property.into(), owner);
        self
    }

    pub fn foreign_key(&self, property: &str) -> Option<&ObjectId> {
        self.foreign_keys.get(property).and_then(Option::as_ref)
    }
}

pub trait ObjectLoader: Send + Sync {
    /// # Errors
    /// `ObjectNotFound` if the store has no such object
    fn load_object(&self, id: &ObjectId) -> Result<LoadedObject>;

    /// Items of a collection end-point in store order
    fn load_related_objects(&self, end_point_id: &RelationEndPointId) -> Result<Vec<ObjectId>>;
}

/// Reference backing store: objects in insertion order, foreign keys as stored.
pub struct InMemoryObjectStore {
    mapping: Arc<RelationMapping>,
    objects: RwLock<Vec<LoadedObject>>,
}

impl InMemoryObjectStore {
    pub fn new(mapping: Arc<RelationMapping>) -> Self {
        Self {
            mapping,
            objects: RwLock::new(Vec::new()),
        }
    }

    /// Insert or overwrite an object
    pub fn put(&self, object: LoadedObject) -> Result<()> {
        let mut objects = self.objects.write()?;
        match objects.iter_mut().find(|existing| existing.id == object.id) {
            Some(existing) => *existing = object,
            None => objects.push(object),
        }
        Ok(())
    }

    pub fn remove(&self, id: &ObjectId) -> Result<bool> {
        let mut objects = self.objects.write()?;
        let before = objects.len();
        objects.retain(|object| object.id != *id);
        Ok(objects.len() != before)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.objects.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.objects.read()?.is_empty())
    }
}

impl ObjectLoader for InMemoryObjectStore {
    fn load_object(&self, id: &ObjectId) -> Result<LoadedObject> {
        let objects = self.objects.read()?;
        objects
            .iter()
            .find(|object| object.id == *id)
            .cloned()
            .ok_or_else(|| RelationError::ObjectNotFound(id.clone()))
    }

    fn load_related_objects(&self, end_point_id: &RelationEndPointId) -> Result<Vec<ObjectId>> {
        let (definition, kind) = self.mapping.resolve(end_point_id)?;
        if kind != EndPointKind::Collection {
            return Err(RelationError::LoadError(format!(
                "'{}' is not a collection end-point",
                end_point_id
            )));
        }

        let object_end = definition.object_end();
        let owner = end_point_id.object_id();
        let objects = self.objects.read()?;
        Ok(objects
            .iter()
            .filter(|object| object.id.class_id() == &object_end.class_id)
            .filter(|object| object.foreign_key(&object_end.property_name) == Some(owner))
            .map(|object| object.id.clone())
            .collect())
    }
}
