use super::manager::RelationEndPointManager;
use crate::core::{RelationEndPointId, RelationError, Result, SyncState};
use crate::mapping::EndPointKind;
use tracing::{Level, event, info_span};

/// Repairs relations whose two sides disagree after loading, e.g. because the
/// foreign key of an item changed in the store after its owner's collection
/// was loaded.
pub struct BidirectionalRelationSyncService;

impl BidirectionalRelationSyncService {
    /// `None` if the end-point is not loaded or its synchronization state is not known yet.
    /// Never loads.
    pub fn is_synchronized(
        manager: &RelationEndPointManager,
        end_point_id: &RelationEndPointId,
    ) -> Result<Option<bool>> {
        let (_, kind) = manager.mapping().resolve(end_point_id)?;
        let state = match kind {
            EndPointKind::Collection => manager
                .collection_end_point(end_point_id)
                .and_then(|end_point| end_point.is_synchronized()),
            EndPointKind::Object => manager
                .object_end_point(end_point_id)
                .and_then(|end_point| end_point.is_synchronized()),
        };
        Ok(state)
    }

    /// Bring `end_point_id` in line with its opposite side.
    ///
    /// For a collection end-point, every original item whose foreign key no
    /// longer points at the owner is removed. For a foreign-key end-point, the
    /// item is added to the collection it points at.
    ///
    /// # Errors
    /// Returns error if the end-point is not loaded
    pub fn synchronize(
        manager: &mut RelationEndPointManager,
        end_point_id: &RelationEndPointId,
    ) -> Result<()> {
        let span = info_span!("relation.sync", end_point = %end_point_id);
        let _enter = span.enter();

        let (_, kind) = manager.mapping().resolve(end_point_id)?;
        match kind {
            EndPointKind::Collection => Self::synchronize_collection(manager, end_point_id),
            EndPointKind::Object => Self::synchronize_object(manager, end_point_id),
        }
    }

    fn synchronize_collection(
        manager: &mut RelationEndPointManager,
        end_point_id: &RelationEndPointId,
    ) -> Result<()> {
        let is_complete = manager
            .collection_end_point(end_point_id)
            .is_some_and(|end_point| end_point.is_data_complete());
        if !is_complete {
            return Err(RelationError::InvalidOperation(format!(
                "The relation property '{}' of object '{}' has not yet been fully loaded into the transaction.",
                end_point_id.property_name(),
                end_point_id.object_id()
            )));
        }
        manager.with_collection(end_point_id, |end_point| end_point.synchronize())
    }

    fn synchronize_object(
        manager: &mut RelationEndPointManager,
        end_point_id: &RelationEndPointId,
    ) -> Result<()> {
        let Some(end_point) = manager.object_end_point(end_point_id) else {
            return Err(RelationError::InvalidOperation(format!(
                "The relation property '{}' of object '{}' has not yet been loaded into the transaction.",
                end_point_id.property_name(),
                end_point_id.object_id()
            )));
        };
        let Some(opposite) = end_point.original_opposite_end_point_id() else {
            return Ok(());
        };

        if end_point.sync_state() == SyncState::Unknown {
            manager.with_collection(&opposite, |collection| collection.ensure_data_complete())?;
        }
        let synchronized = manager
            .object_end_point(end_point_id)
            .map(|end_point| end_point.sync_state() != SyncState::Unsynchronized)
            .unwrap_or(true);
        if synchronized {
            return Ok(());
        }

        manager.with_collection(&opposite, |collection| {
            collection.synchronize_opposite_end_point(end_point_id)
        })?;
        event!(Level::INFO, opposite = %opposite, "foreign-key end-point synchronized");
        Ok(())
    }
}
