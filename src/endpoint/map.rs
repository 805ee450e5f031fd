use super::collection_end_point::CollectionEndPoint;
use super::object_end_point::RealObjectEndPoint;
use crate::collection::ChangeCachingCollectionData;
use crate::core::{ObjectId, RelationEndPointId, RelationError, Result};
use std::collections::HashMap;

/// Owns every end-point of one transaction, keyed by end-point ID.
#[derive(Default)]
pub struct RelationEndPointMap {
    collection_end_points: HashMap<RelationEndPointId, CollectionEndPoint>,
    object_end_points: HashMap<RelationEndPointId, RealObjectEndPoint>,
}

impl RelationEndPointMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, id: &RelationEndPointId) -> Option<&CollectionEndPoint> {
        self.collection_end_points.get(id)
    }

    pub fn collection_mut(&mut self, id: &RelationEndPointId) -> Result<&mut CollectionEndPoint> {
        self.collection_end_points
            .get_mut(id)
            .ok_or_else(|| RelationError::EndPointNotFound(id.clone()))
    }

    pub(crate) fn collection_data_mut(
        &mut self,
        id: &RelationEndPointId,
    ) -> Result<&mut ChangeCachingCollectionData> {
        self.collection_mut(id)?.collection_data_mut()
    }

    pub fn object(&self, id: &RelationEndPointId) -> Option<&RealObjectEndPoint> {
        self.object_end_points.get(id)
    }

    pub fn object_mut(&mut self, id: &RelationEndPointId) -> Result<&mut RealObjectEndPoint> {
        self.object_end_points
            .get_mut(id)
            .ok_or_else(|| RelationError::EndPointNotFound(id.clone()))
    }

    pub fn contains_collection(&self, id: &RelationEndPointId) -> bool {
        self.collection_end_points.contains_key(id)
    }

    pub fn contains_object(&self, id: &RelationEndPointId) -> bool {
        self.object_end_points.contains_key(id)
    }

    pub fn insert_collection(&mut self, end_point: CollectionEndPoint) {
        self.collection_end_points
            .insert(end_point.id().clone(), end_point);
    }

    pub fn insert_object(&mut self, end_point: RealObjectEndPoint) {
        self.object_end_points.insert(end_point.id().clone(), end_point);
    }

    pub fn remove_collection(&mut self, id: &RelationEndPointId) -> Option<CollectionEndPoint> {
        self.collection_end_points.remove(id)
    }

    pub fn remove_object(&mut self, id: &RelationEndPointId) -> Option<RealObjectEndPoint> {
        self.object_end_points.remove(id)
    }

    /// Drop every end-point belonging to `object_id`
    pub fn remove_end_points_of(&mut self, object_id: &ObjectId) {
        self.collection_end_points
            .retain(|id, _| id.object_id() != object_id);
        self.object_end_points
            .retain(|id, _| id.object_id() != object_id);
    }

    pub fn collection_ids(&self) -> Vec<RelationEndPointId> {
        let mut ids: Vec<_> = self.collection_end_points.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn object_ids(&self) -> Vec<RelationEndPointId> {
        let mut ids: Vec<_> = self.object_end_points.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn collections_mut(&mut self) -> impl Iterator<Item = &mut CollectionEndPoint> {
        self.collection_end_points.values_mut()
    }

    pub fn objects(&self) -> impl Iterator<Item = &RealObjectEndPoint> {
        self.object_end_points.values()
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut RealObjectEndPoint> {
        self.object_end_points.values_mut()
    }

    pub fn len(&self) -> usize {
        self.collection_end_points.len() + self.object_end_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
