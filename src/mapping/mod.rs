// ============================================================================
// Relation Mapping
// ============================================================================
//
// Minimal mapping information the end-point subsystem needs: which class owns
// which side of which relation. Schema generation lives elsewhere.
//
// ============================================================================

pub mod definition;

pub use definition::{EndPointDefinition, EndPointKind, RelationDefinition, SortComparer};

use crate::core::{ClassId, RelationEndPointId, RelationError, Result};
use crate::endpoint::provider::RelationEndPointProvider;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct RelationMapping {
    relations: Vec<Arc<RelationDefinition>>,
    by_property: HashMap<String, (Arc<RelationDefinition>, EndPointKind)>,
}

impl RelationMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation
    ///
    /// # Errors
    /// Returns error if either property name is already mapped
    pub fn add_relation(&mut self, definition: RelationDefinition) -> Result<()> {
        for kind in [EndPointKind::Collection, EndPointKind::Object] {
            let property = &definition.end_point(kind).property_name;
            if self.by_property.contains_key(property) {
                return Err(RelationError::ConfigError(format!(
                    "Property '{}' is already mapped",
                    property
                )));
            }
        }

        let definition = Arc::new(definition);
        for kind in [EndPointKind::Collection, EndPointKind::Object] {
            let property = definition.end_point(kind).property_name.clone();
            self.by_property
                .insert(property, (Arc::clone(&definition), kind));
        }
        self.relations.push(definition);
        Ok(())
    }

    /// Builder-style variant of [`add_relation`](Self::add_relation)
    pub fn with_relation(mut self, definition: RelationDefinition) -> Result<Self> {
        self.add_relation(definition)?;
        Ok(self)
    }

    pub fn relations(&self) -> &[Arc<RelationDefinition>] {
        &self.relations
    }

    pub fn relation_for_property(
        &self,
        property_name: &str,
    ) -> Option<(&Arc<RelationDefinition>, EndPointKind)> {
        self.by_property
            .get(property_name)
            .map(|(definition, kind)| (definition, *kind))
    }

    /// Like [`relation_for_property`](Self::relation_for_property) but also checks the
    /// end-point's object class.
    pub fn resolve(&self, id: &RelationEndPointId) -> Result<(&Arc<RelationDefinition>, EndPointKind)> {
        let (definition, kind) = self
            .relation_for_property(id.property_name())
            .ok_or_else(|| RelationError::EndPointNotFound(id.clone()))?;
        if definition.end_point(kind).class_id != *id.object_id().class_id() {
            return Err(RelationError::EndPointNotFound(id.clone()));
        }
        Ok((definition, kind))
    }

    /// Relations in which `class_id` owns the collection side
    pub fn collection_relations_of(&self, class_id: &ClassId) -> Vec<Arc<RelationDefinition>> {
        self.relations
            .iter()
            .filter(|relation| relation.collection_end().class_id == *class_id)
            .cloned()
            .collect()
    }

    /// Relations in which `class_id` holds the foreign key
    pub fn object_relations_of(&self, class_id: &ClassId) -> Vec<Arc<RelationDefinition>> {
        self.relations
            .iter()
            .filter(|relation| relation.object_end().class_id == *class_id)
            .cloned()
            .collect()
    }

    pub fn is_mapped_class(&self, class_id: &ClassId) -> bool {
        self.relations.iter().any(|relation| {
            relation.collection_end().class_id == *class_id
                || relation.object_end().class_id == *class_id
        })
    }
}

impl RelationEndPointProvider for RelationMapping {
    fn get_relation_end_point_without_loading(
        &self,
        id: &RelationEndPointId,
    ) -> Option<RelationEndPointId> {
        self.resolve(id).ok().map(|_| id.clone())
    }
}
