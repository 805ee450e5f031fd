use crate::command::RelationEndPointModification;
use crate::core::{ObjectId, RelationEndPointId, RelationError, Result, SyncState};
use crate::mapping::RelationDefinition;
use std::sync::Arc;

/// The foreign-key side of a relation (e.g. `OrderItem.Order`).
#[derive(Debug, Clone)]
pub struct RealObjectEndPoint {
    id: RelationEndPointId,
    definition: Arc<RelationDefinition>,
    opposite_object_id: Option<ObjectId>,
    original_opposite_object_id: Option<ObjectId>,
    sync_state: SyncState,
    has_been_touched: bool,
}

impl RealObjectEndPoint {
    pub fn new(
        id: RelationEndPointId,
        definition: Arc<RelationDefinition>,
        original_opposite_object_id: Option<ObjectId>,
    ) -> Self {
        // A null reference has nothing to disagree with.
        let sync_state = if original_opposite_object_id.is_none() {
            SyncState::Synchronized
        } else {
            SyncState::Unknown
        };
        Self {
            id,
            definition,
            opposite_object_id: original_opposite_object_id.clone(),
            original_opposite_object_id,
            sync_state,
            has_been_touched: false,
        }
    }

    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    pub fn definition(&self) -> &Arc<RelationDefinition> {
        &self.definition
    }

    pub fn opposite_object_id(&self) -> Option<&ObjectId> {
        self.opposite_object_id.as_ref()
    }

    pub fn original_opposite_object_id(&self) -> Option<&ObjectId> {
        self.original_opposite_object_id.as_ref()
    }

    /// Collection end-point of the current owner
    pub fn opposite_end_point_id(&self) -> Option<RelationEndPointId> {
        self.opposite_object_id
            .as_ref()
            .map(|owner| self.definition.collection_end_point_id(owner))
    }

    /// Collection end-point of the original owner
    pub fn original_opposite_end_point_id(&self) -> Option<RelationEndPointId> {
        self.original_opposite_object_id
            .as_ref()
            .map(|owner| self.definition.collection_end_point_id(owner))
    }

    pub fn has_changed(&self) -> bool {
        self.opposite_object_id != self.original_opposite_object_id
    }

    pub fn has_been_touched(&self) -> bool {
        self.has_been_touched
    }

    pub fn touch(&mut self) {
        self.has_been_touched = true;
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub fn is_synchronized(&self) -> Option<bool> {
        self.sync_state.as_bool()
    }

    pub(crate) fn set_sync_state(&mut self, sync_state: SyncState) {
        self.sync_state = sync_state;
    }

    pub(crate) fn set_opposite_object_id(&mut self, opposite_object_id: Option<ObjectId>) {
        self.opposite_object_id = opposite_object_id;
    }

    /// # Errors
    /// `OutOfSync` while the end-point disagrees with its opposite collection
    pub fn create_set_command(
        &self,
        new_opposite_object_id: Option<ObjectId>,
    ) -> Result<RelationEndPointModification> {
        if self.sync_state == SyncState::Unsynchronized {
            let collection_property = &self.definition.collection_end().property_name;
            return Err(RelationError::OutOfSync(format!(
                "The relation property '{}' of domain object '{}' cannot be changed because it is out of sync with the opposite property '{}'. To make this change, synchronize the two properties by calling the 'BidirectionalRelationSyncService::synchronize' method on the '{}' property.",
                self.id.property_name(),
                self.id.object_id(),
                collection_property,
                self.id.property_name()
            )));
        }

        if new_opposite_object_id == self.opposite_object_id {
            return Ok(RelationEndPointModification::ObjectSetSame {
                end_point_id: self.id.clone(),
                value: new_opposite_object_id,
            });
        }
        Ok(RelationEndPointModification::ObjectSet {
            end_point_id: self.id.clone(),
            old: self.opposite_object_id.clone(),
            new: new_opposite_object_id,
        })
    }

    pub fn commit(&mut self) {
        // A changed reference was moved between loaded collections in step with them.
        if self.has_changed() {
            self.sync_state = SyncState::Synchronized;
        }
        self.original_opposite_object_id = self.opposite_object_id.clone();
        self.has_been_touched = false;
    }

    pub fn rollback(&mut self) {
        self.opposite_object_id = self.original_opposite_object_id.clone();
        self.has_been_touched = false;
    }

    pub fn check_mandatory(&self) -> Result<()> {
        if self.opposite_object_id.is_none() {
            return Err(RelationError::MandatoryRelationNotSet(format!(
                "Mandatory relation property '{}' of domain object '{}' cannot be null.",
                self.id.property_name(),
                self.id.object_id()
            )));
        }
        Ok(())
    }
}
