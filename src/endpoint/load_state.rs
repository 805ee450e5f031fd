// ============================================================================
// Collection End-Point Load State
// ============================================================================
//
// State Pattern over the two load states of a collection end-point:
//
//   Incomplete ──ensure_data_complete / mark_data_complete──> Complete
//   Complete ──mark_data_incomplete──> Incomplete
//
// Incomplete only remembers the original opposite end-points registered so
// far. Complete owns the unsynchronized opposite end-points and is the only
// state that can produce modifications; every data-dependent operation on an
// incomplete end-point first loads and then forwards to the complete state.
//
// Invariant: the end-point is Complete exactly when its lazy keeper has data.
//
// ============================================================================

use super::data_keeper::CollectionEndPointDataKeeper;
use crate::collection::CollectionData;
use crate::command::RelationEndPointModification;
use crate::core::{ObjectId, RelationEndPointId, RelationError, Result, SyncState};

/// Side effects of an end-point operation that the owning manager applies
/// to other end-points.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EndPointReport {
    /// Items materialized by a load, in loader order
    pub loaded_items: Vec<ObjectId>,
    /// New sync state of opposite (foreign-key) end-points
    pub sync_updates: Vec<(RelationEndPointId, SyncState)>,
}

impl EndPointReport {
    pub fn is_empty(&self) -> bool {
        self.loaded_items.is_empty() && self.sync_updates.is_empty()
    }

    pub(crate) fn sync(&mut self, end_point_id: RelationEndPointId, state: SyncState) {
        self.sync_updates.push((end_point_id, state));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEndPointLoadState {
    Complete(CompleteLoadState),
    Incomplete(IncompleteLoadState),
}

impl CollectionEndPointLoadState {
    pub fn is_data_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

impl Default for CollectionEndPointLoadState {
    fn default() -> Self {
        Self::Incomplete(IncompleteLoadState::default())
    }
}

// ============================================================================
// Incomplete
// ============================================================================

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IncompleteLoadState {
    original_opposite_end_points: Vec<RelationEndPointId>,
}

impl IncompleteLoadState {
    pub fn new(original_opposite_end_points: Vec<RelationEndPointId>) -> Self {
        Self {
            original_opposite_end_points,
        }
    }

    pub fn original_opposite_end_points(&self) -> &[RelationEndPointId] {
        &self.original_opposite_end_points
    }

    pub(crate) fn into_original_opposite_end_points(self) -> Vec<RelationEndPointId> {
        self.original_opposite_end_points
    }

    pub fn register_original_opposite_end_point(
        &mut self,
        end_point_id: RelationEndPointId,
        report: &mut EndPointReport,
    ) -> Result<()> {
        if self.original_opposite_end_points.contains(&end_point_id) {
            return Err(RelationError::invalid_operation(
                "The opposite end-point has already been registered.",
            ));
        }
        report.sync(end_point_id.clone(), SyncState::Unknown);
        self.original_opposite_end_points.push(end_point_id);
        Ok(())
    }

    pub fn unregister_original_opposite_end_point(
        &mut self,
        end_point_id: &RelationEndPointId,
    ) -> Result<()> {
        let Some(position) = self
            .original_opposite_end_points
            .iter()
            .position(|registered| registered == end_point_id)
        else {
            return Err(RelationError::invalid_operation(
                "The opposite end-point has not been registered.",
            ));
        };
        self.original_opposite_end_points.remove(position);
        Ok(())
    }
}

// ============================================================================
// Complete
// ============================================================================

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompleteLoadState {
    unsynchronized_opposite_end_points: Vec<RelationEndPointId>,
}

impl CompleteLoadState {
    pub fn unsynchronized_opposite_end_points(&self) -> &[RelationEndPointId] {
        &self.unsynchronized_opposite_end_points
    }

    pub(crate) fn into_unsynchronized_opposite_end_points(self) -> Vec<RelationEndPointId> {
        self.unsynchronized_opposite_end_points
    }

    fn is_unsynchronized(&self, item: &ObjectId) -> bool {
        self.unsynchronized_opposite_end_points
            .iter()
            .any(|end_point| end_point.object_id() == item)
    }

    /// An end-point whose item is an original item without end-point is adopted
    /// by the keeper (synchronized). Any other end-point points at this collection
    /// without being part of it and is parked as unsynchronized.
    pub fn register_original_opposite_end_point(
        &mut self,
        keeper: &mut CollectionEndPointDataKeeper,
        end_point_id: RelationEndPointId,
        report: &mut EndPointReport,
    ) -> Result<()> {
        if keeper.contains_original_item_without_end_point(end_point_id.object_id()) {
            keeper.register_original_opposite_end_point(end_point_id.clone())?;
            report.sync(end_point_id, SyncState::Synchronized);
            return Ok(());
        }

        if self.unsynchronized_opposite_end_points.contains(&end_point_id)
            || keeper.contains_original_opposite_end_point(&end_point_id)
        {
            return Err(RelationError::invalid_operation(
                "The opposite end-point has already been registered.",
            ));
        }
        report.sync(end_point_id.clone(), SyncState::Unsynchronized);
        self.unsynchronized_opposite_end_points.push(end_point_id);
        Ok(())
    }

    /// Drops `end_point_id` from the unsynchronized end-points; false if it is not one.
    pub fn remove_unsynchronized_opposite_end_point(
        &mut self,
        end_point_id: &RelationEndPointId,
    ) -> bool {
        let before = self.unsynchronized_opposite_end_points.len();
        self.unsynchronized_opposite_end_points
            .retain(|registered| registered != end_point_id);
        self.unsynchronized_opposite_end_points.len() != before
    }

    pub fn synchronize_opposite_end_point(
        &mut self,
        keeper: &mut CollectionEndPointDataKeeper,
        end_point_id: &RelationEndPointId,
        report: &mut EndPointReport,
    ) -> Result<()> {
        if !self.remove_unsynchronized_opposite_end_point(end_point_id) {
            return Err(RelationError::InvalidOperation(format!(
                "Cannot synchronize opposite end-point '{}' - the end-point is not in the list of unsynchronized end-points.",
                end_point_id
            )));
        }
        keeper.register_original_opposite_end_point(end_point_id.clone())?;
        report.sync(end_point_id.clone(), SyncState::Synchronized);
        Ok(())
    }

    pub fn is_synchronized(&self, keeper: &CollectionEndPointDataKeeper) -> bool {
        keeper.original_items_without_end_points().is_empty()
    }

    /// Drop every original item that has no registered opposite end-point
    pub fn synchronize(&self, keeper: &mut CollectionEndPointDataKeeper) -> Result<()> {
        for item in keeper.original_items_without_end_points() {
            keeper.unregister_original_item_without_end_point(&item)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Command factories
    // ------------------------------------------------------------------------

    pub fn create_insert_command(
        &self,
        keeper: &CollectionEndPointDataKeeper,
        index: usize,
        item: ObjectId,
    ) -> Result<RelationEndPointModification> {
        self.check_item_synchronized(keeper, &item, "added to")?;

        let data = keeper.collection_data();
        if index > data.count() {
            return Err(RelationError::IndexOutOfRange {
                index,
                count: data.count(),
            });
        }
        if data.contains_object_id(&item) {
            return Err(RelationError::InvalidOperation(format!(
                "The collection already contains an object with ID '{}'.",
                item
            )));
        }
        Ok(RelationEndPointModification::CollectionInsert {
            end_point_id: keeper.end_point_id().clone(),
            index,
            inserted: item,
        })
    }

    pub fn create_add_command(
        &self,
        keeper: &CollectionEndPointDataKeeper,
        item: ObjectId,
    ) -> Result<RelationEndPointModification> {
        let count = keeper.collection_data().count();
        self.create_insert_command(keeper, count, item)
    }

    pub fn create_remove_command(
        &self,
        keeper: &CollectionEndPointDataKeeper,
        item: &ObjectId,
    ) -> Result<RelationEndPointModification> {
        self.check_item_synchronized(keeper, item, "removed from")?;

        if !keeper.collection_data().contains_object_id(item) {
            return Err(RelationError::InvalidOperation(format!(
                "The collection does not contain an object with ID '{}'.",
                item
            )));
        }
        Ok(RelationEndPointModification::CollectionRemove {
            end_point_id: keeper.end_point_id().clone(),
            removed: item.clone(),
        })
    }

    /// Replacing an item with an ID-equal item yields `CollectionReplaceSame`.
    pub fn create_replace_command(
        &self,
        keeper: &CollectionEndPointDataKeeper,
        index: usize,
        replacement: ObjectId,
    ) -> Result<RelationEndPointModification> {
        let data = keeper.collection_data();
        let replaced = data
            .get_object(index)
            .cloned()
            .ok_or(RelationError::IndexOutOfRange {
                index,
                count: data.count(),
            })?;

        self.check_item_synchronized(keeper, &replaced, "replaced in")?;
        if replaced == replacement {
            return Ok(RelationEndPointModification::CollectionReplaceSame {
                end_point_id: keeper.end_point_id().clone(),
                item: replacement,
            });
        }

        self.check_item_synchronized(keeper, &replacement, "added to")?;
        if data.contains_object_id(&replacement) {
            return Err(RelationError::InvalidOperation(format!(
                "The collection already contains an object with ID '{}'.",
                replacement
            )));
        }
        Ok(RelationEndPointModification::CollectionReplace {
            end_point_id: keeper.end_point_id().clone(),
            index,
            replaced,
            replacement,
        })
    }

    pub fn create_delete_command(
        &self,
        keeper: &CollectionEndPointDataKeeper,
    ) -> Result<RelationEndPointModification> {
        self.check_collection_synchronized(keeper, "deleted")?;
        Ok(RelationEndPointModification::CollectionDelete {
            end_point_id: keeper.end_point_id().clone(),
        })
    }

    pub fn create_set_collection_command(
        &self,
        keeper: &CollectionEndPointDataKeeper,
        new_items: Vec<ObjectId>,
    ) -> Result<RelationEndPointModification> {
        self.check_collection_synchronized(keeper, "replaced")?;
        for (position, item) in new_items.iter().enumerate() {
            if new_items[..position].contains(item) {
                return Err(RelationError::InvalidOperation(format!(
                    "The new contents contain the object with ID '{}' more than once.",
                    item
                )));
            }
        }
        Ok(RelationEndPointModification::CollectionSet {
            end_point_id: keeper.end_point_id().clone(),
            new_items,
        })
    }

    fn check_item_synchronized(
        &self,
        keeper: &CollectionEndPointDataKeeper,
        item: &ObjectId,
        action: &str,
    ) -> Result<()> {
        let end_point_id = keeper.end_point_id();
        let opposite_property = &keeper.definition().object_end().property_name;

        if self.is_unsynchronized(item) {
            return Err(RelationError::OutOfSync(format!(
                "The domain object '{}' cannot be {} collection property '{}' of domain object '{}' because its object property '{}' is out of sync with the collection property. To make this change, synchronize the two properties by calling the 'BidirectionalRelationSyncService::synchronize' method on the '{}' property.",
                item,
                action,
                end_point_id.property_name(),
                end_point_id.object_id(),
                opposite_property,
                opposite_property
            )));
        }
        if keeper.contains_original_item_without_end_point(item) {
            return Err(RelationError::OutOfSync(format!(
                "The domain object '{}' cannot be {} collection property '{}' of domain object '{}' because the property is out of sync with the opposite object property '{}' of domain object '{}'. To make this change, synchronize the two properties by calling the 'BidirectionalRelationSyncService::synchronize' method on the '{}' property.",
                item,
                action,
                end_point_id.property_name(),
                end_point_id.object_id(),
                opposite_property,
                item,
                end_point_id.property_name()
            )));
        }
        Ok(())
    }

    fn check_collection_synchronized(
        &self,
        keeper: &CollectionEndPointDataKeeper,
        action: &str,
    ) -> Result<()> {
        let end_point_id = keeper.end_point_id();
        if let Some(unsynchronized) = self.unsynchronized_opposite_end_points.first() {
            return Err(RelationError::OutOfSync(format!(
                "The collection property '{}' of domain object '{}' cannot be {} because its opposite end-point '{}' is out of sync with the collection property. To make this change, synchronize the two properties by calling the 'BidirectionalRelationSyncService::synchronize' method on the '{}' property.",
                end_point_id.property_name(),
                end_point_id.object_id(),
                action,
                unsynchronized,
                unsynchronized.property_name()
            )));
        }
        if !self.is_synchronized(keeper) {
            return Err(RelationError::OutOfSync(format!(
                "The collection property '{}' of domain object '{}' cannot be {} because the property is out of sync with the opposite object property '{}'. To make this change, synchronize the two properties by calling the 'BidirectionalRelationSyncService::synchronize' method on the '{}' property.",
                end_point_id.property_name(),
                end_point_id.object_id(),
                action,
                keeper.definition().object_end().property_name,
                end_point_id.property_name()
            )));
        }
        Ok(())
    }
}
