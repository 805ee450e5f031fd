// ============================================================================
// End-Point Tracking Decorator
// ============================================================================
//
// Keeps the opposite end-point of every item, aligned 1:1 with the wrapped
// store's contents. An item whose opposite end-point cannot be resolved never
// enters the collection.
//
// ============================================================================

use super::data::{CollectionData, DomainObjectCollectionData, ReadOnlyCollectionData};
use crate::core::{ObjectId, RelationEndPointId, RelationError, Result};
use crate::endpoint::provider::RelationEndPointProvider;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

pub struct EndPointTrackingCollectionData<D = DomainObjectCollectionData> {
    wrapped: D,
    opposite_property: String,
    provider: Arc<dyn RelationEndPointProvider>,
    opposite_end_points: Vec<RelationEndPointId>,
}

impl<D: CollectionData> EndPointTrackingCollectionData<D> {
    /// Wraps `wrapped`, resolving the opposite end-points of the items it already holds.
    ///
    /// # Errors
    /// Returns error if any existing item has no resolvable opposite end-point
    pub fn new(
        wrapped: D,
        opposite_property: impl Into<String>,
        provider: Arc<dyn RelationEndPointProvider>,
    ) -> Result<Self> {
        let mut tracking = Self {
            wrapped,
            opposite_property: opposite_property.into(),
            provider,
            opposite_end_points: Vec::new(),
        };
        tracking.opposite_end_points = tracking
            .wrapped
            .as_slice()
            .iter()
            .map(|item| tracking.resolve(item))
            .collect::<Result<Vec<_>>>()?;
        Ok(tracking)
    }

    /// Opposite end-points in collection order
    pub fn opposite_end_points(&self) -> &[RelationEndPointId] {
        &self.opposite_end_points
    }

    pub fn opposite_end_point_of(&self, id: &ObjectId) -> Option<&RelationEndPointId> {
        self.wrapped
            .index_of(id)
            .and_then(|index| self.opposite_end_points.get(index))
    }

    pub fn opposite_property(&self) -> &str {
        &self.opposite_property
    }

    fn resolve(&self, item: &ObjectId) -> Result<RelationEndPointId> {
        let candidate = RelationEndPointId::new(item.clone(), self.opposite_property.clone());
        self.provider
            .get_relation_end_point_without_loading(&candidate)
            .ok_or_else(|| {
                RelationError::InvalidOperation(format!(
                    "The domain object '{}' cannot be added to the collection because its opposite end-point '{}' cannot be resolved.",
                    item, self.opposite_property
                ))
            })
    }
}

impl<D: CollectionData> CollectionData for EndPointTrackingCollectionData<D> {
    fn count(&self) -> usize {
        self.wrapped.count()
    }

    fn contains_object_id(&self, id: &ObjectId) -> bool {
        self.wrapped.contains_object_id(id)
    }

    fn get_object(&self, index: usize) -> Option<&ObjectId> {
        self.wrapped.get_object(index)
    }

    fn index_of(&self, id: &ObjectId) -> Option<usize> {
        self.wrapped.index_of(id)
    }

    fn as_slice(&self) -> &[ObjectId] {
        self.wrapped.as_slice()
    }

    fn snapshot(&self) -> ReadOnlyCollectionData {
        self.wrapped.snapshot()
    }

    fn insert(&mut self, index: usize, item: ObjectId) -> Result<()> {
        let end_point = self.resolve(&item)?;
        self.wrapped.insert(index, item)?;
        self.opposite_end_points.insert(index, end_point);
        Ok(())
    }

    fn remove(&mut self, id: &ObjectId) -> bool {
        let Some(index) = self.wrapped.index_of(id) else {
            return false;
        };
        self.wrapped.remove(id);
        self.opposite_end_points.remove(index);
        true
    }

    fn replace(&mut self, index: usize, item: ObjectId) -> Result<()> {
        if self.wrapped.get_object(index) == Some(&item) {
            return Ok(());
        }
        let end_point = self.resolve(&item)?;
        self.wrapped.replace(index, item)?;
        self.opposite_end_points[index] = end_point;
        Ok(())
    }

    fn clear(&mut self) {
        self.wrapped.clear();
        self.opposite_end_points.clear();
    }

    fn sort(&mut self, comparer: &dyn Fn(&ObjectId, &ObjectId) -> Ordering) {
        let mut by_item: HashMap<ObjectId, RelationEndPointId> = self
            .wrapped
            .as_slice()
            .iter()
            .cloned()
            .zip(self.opposite_end_points.drain(..))
            .collect();
        self.wrapped.sort(comparer);
        self.opposite_end_points = self
            .wrapped
            .as_slice()
            .iter()
            .filter_map(|item| by_item.remove(item))
            .collect();
    }

    fn replace_contents(&mut self, contents: ReadOnlyCollectionData) -> Result<()> {
        let end_points = contents
            .iter()
            .map(|item| self.resolve(item))
            .collect::<Result<Vec<_>>>()?;
        self.wrapped.replace_contents(contents)?;
        self.opposite_end_points = end_points;
        Ok(())
    }
}
