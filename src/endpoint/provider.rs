use crate::core::RelationEndPointId;

/// Resolves end-points without triggering a load from the backing store.
pub trait RelationEndPointProvider: Send + Sync {
    /// `None` when no such end-point exists for the object.
    fn get_relation_end_point_without_loading(
        &self,
        id: &RelationEndPointId,
    ) -> Option<RelationEndPointId>;
}
