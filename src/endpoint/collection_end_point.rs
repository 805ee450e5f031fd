// ============================================================================
// Collection End-Point
// ============================================================================
//
// The "many" side of a relation for one owner object. Holds the lazy data
// keeper and the load state; every data-dependent operation on an incomplete
// end-point loads first and then runs against the complete state.
//
// Effects on other end-points (loaded items, sync-state changes of opposite
// end-points) are collected in an `EndPointReport` that the owning manager
// drains with `take_report` after each call.
//
// ============================================================================

use super::data_keeper::CollectionEndPointDataKeeper;
use super::lazy_keeper::LazyLoadingCollectionEndPointDataKeeper;
use super::listener::{ClientTransactionListener, VirtualEndPointStateUpdateListener};
use super::load_state::{
    CollectionEndPointLoadState, CompleteLoadState, EndPointReport, IncompleteLoadState,
};
use super::loader::ObjectLoader;
use super::provider::RelationEndPointProvider;
use crate::collection::{
    ChangeCachingCollectionData, ChangeDetectionStrategy, CollectionData, ReadOnlyCollectionData,
};
use crate::command::RelationEndPointModification;
use crate::core::{ObjectId, RelationEndPointId, RelationError, Result, SyncState};
use crate::mapping::RelationDefinition;
use std::sync::Arc;
use tracing::{Level, event, info_span};

/// Collaborators shared by every collection end-point of one manager.
#[derive(Clone)]
pub struct CollectionEndPointServices {
    pub provider: Arc<dyn RelationEndPointProvider>,
    pub loader: Arc<dyn ObjectLoader>,
    pub sink: Arc<dyn ClientTransactionListener>,
    pub strategy: Arc<dyn ChangeDetectionStrategy>,
    pub sort_on_load: bool,
}

pub struct CollectionEndPoint {
    id: RelationEndPointId,
    definition: Arc<RelationDefinition>,
    data_keeper: LazyLoadingCollectionEndPointDataKeeper,
    load_state: CollectionEndPointLoadState,
    has_been_touched: bool,
    sink: Arc<dyn ClientTransactionListener>,
    strategy: Arc<dyn ChangeDetectionStrategy>,
    report: EndPointReport,
}

fn loaded(
    data_keeper: &mut LazyLoadingCollectionEndPointDataKeeper,
) -> Result<&mut CollectionEndPointDataKeeper> {
    let end_point_id = data_keeper.end_point_id().clone();
    data_keeper.data_keeper_mut().ok_or_else(|| {
        RelationError::InvalidOperation(format!(
            "The data of end-point '{}' is not complete.",
            end_point_id
        ))
    })
}

impl CollectionEndPoint {
    /// A new end-point starts out incomplete.
    pub fn new(
        id: RelationEndPointId,
        definition: Arc<RelationDefinition>,
        services: &CollectionEndPointServices,
    ) -> Self {
        let state_listener = Arc::new(VirtualEndPointStateUpdateListener::new(
            id.clone(),
            Arc::clone(&services.sink),
        ));
        let data_keeper = LazyLoadingCollectionEndPointDataKeeper::new(
            id.clone(),
            Arc::clone(&definition),
            Arc::clone(&services.provider),
            state_listener,
            Arc::clone(&services.loader),
        )
        .with_sort_on_load(services.sort_on_load);

        Self {
            id,
            definition,
            data_keeper,
            load_state: CollectionEndPointLoadState::default(),
            has_been_touched: false,
            sink: Arc::clone(&services.sink),
            strategy: Arc::clone(&services.strategy),
            report: EndPointReport::default(),
        }
    }

    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    pub fn definition(&self) -> &Arc<RelationDefinition> {
        &self.definition
    }

    pub fn load_state(&self) -> &CollectionEndPointLoadState {
        &self.load_state
    }

    pub fn is_data_complete(&self) -> bool {
        self.load_state.is_data_complete()
    }

    /// Side effects collected since the last call
    pub fn take_report(&mut self) -> EndPointReport {
        std::mem::take(&mut self.report)
    }

    // ------------------------------------------------------------------------
    // Load state transitions
    // ------------------------------------------------------------------------

    pub fn ensure_data_complete(&mut self) -> Result<()> {
        if self.is_data_complete() {
            return Ok(());
        }

        let loaded_items = self.data_keeper.ensure_data_available()?;
        self.report.loaded_items.extend(loaded_items);
        self.transition_to_complete()
    }

    /// Complete the end-point with known contents, without loading.
    ///
    /// # Errors
    /// Returns error if the data is already complete
    pub fn mark_data_complete(&mut self, items: &[ObjectId]) -> Result<()> {
        if self.is_data_complete() {
            return Err(RelationError::InvalidOperation(format!(
                "The data of end-point '{}' is already complete.",
                self.id
            )));
        }

        self.data_keeper.mark_data_available(items)?;
        self.report.loaded_items.extend(items.iter().cloned());
        self.transition_to_complete()
    }

    /// Discard the loaded data. Unsynchronized opposite end-points are kept
    /// registered so the next load sees them again.
    ///
    /// # Errors
    /// Returns error if the end-point has changed
    pub fn mark_data_incomplete(&mut self) -> Result<()> {
        if !self.is_data_complete() {
            return Ok(());
        }
        if self.has_changed() {
            return Err(RelationError::InvalidOperation(format!(
                "Cannot unload end-point '{}' because its data has changed.",
                self.id
            )));
        }

        let span = info_span!("relation.collection.unload", end_point = %self.id);
        let _enter = span.enter();

        self.sink.relation_end_point_unloading(&self.id);
        let original_opposite_end_points = self
            .data_keeper
            .unload()
            .map(|keeper| keeper.original_opposite_end_points())
            .unwrap_or_default();

        let previous = std::mem::replace(
            &mut self.load_state,
            CollectionEndPointLoadState::Incomplete(IncompleteLoadState::new(
                original_opposite_end_points.clone(),
            )),
        );
        self.has_been_touched = false;
        for end_point_id in original_opposite_end_points {
            self.report.sync(end_point_id, SyncState::Unknown);
        }

        let CollectionEndPointLoadState::Complete(complete) = previous else {
            return Ok(());
        };
        let unsynchronized = complete.into_unsynchronized_opposite_end_points();
        event!(
            Level::DEBUG,
            unsynchronized = unsynchronized.len(),
            "collection end-point marked incomplete"
        );
        for end_point_id in unsynchronized {
            self.register_original_opposite_end_point(end_point_id)?;
        }
        Ok(())
    }

    fn transition_to_complete(&mut self) -> Result<()> {
        let previous = std::mem::replace(
            &mut self.load_state,
            CollectionEndPointLoadState::Complete(CompleteLoadState::default()),
        );
        let pending = match previous {
            CollectionEndPointLoadState::Incomplete(incomplete) => {
                incomplete.into_original_opposite_end_points()
            }
            CollectionEndPointLoadState::Complete(_) => Vec::new(),
        };

        let keeper = loaded(&mut self.data_keeper)?;
        let CollectionEndPointLoadState::Complete(complete) = &mut self.load_state else {
            return Ok(());
        };
        for end_point_id in pending {
            complete.register_original_opposite_end_point(keeper, end_point_id, &mut self.report)?;
        }
        Ok(())
    }

    /// The complete state and the keeper, loading first if necessary
    fn complete_mut(&mut self) -> Result<(&mut CompleteLoadState, &mut CollectionEndPointDataKeeper)> {
        self.ensure_data_complete()?;
        let keeper = loaded(&mut self.data_keeper)?;
        match &mut self.load_state {
            CollectionEndPointLoadState::Complete(complete) => Ok((complete, keeper)),
            CollectionEndPointLoadState::Incomplete(_) => Err(RelationError::InvalidOperation(
                format!("The data of end-point '{}' is not complete.", self.id),
            )),
        }
    }

    fn complete_ref(&mut self) -> Result<(&CompleteLoadState, &CollectionEndPointDataKeeper)> {
        let (complete, keeper) = self.complete_mut()?;
        Ok((&*complete, &*keeper))
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    /// `false` while incomplete; never loads
    pub fn has_changed(&mut self) -> bool {
        let strategy = Arc::clone(&self.strategy);
        self.data_keeper.has_data_changed(strategy.as_ref())
    }

    pub fn has_been_touched(&self) -> bool {
        self.has_been_touched
    }

    pub fn touch(&mut self) {
        self.has_been_touched = true;
    }

    /// True once the live data no longer shares storage with the original data,
    /// even if the change detection strategy ignores the difference (e.g. a reorder).
    fn has_diverged(&mut self) -> bool {
        let diverged = self
            .data_keeper
            .data_keeper()
            .is_some_and(|keeper| !keeper.collection_data().shares_original_with_current());
        diverged || self.has_changed()
    }

    pub fn commit(&mut self) {
        if self.has_diverged() {
            if let Some(keeper) = self.data_keeper.data_keeper_mut() {
                keeper.commit();
            }
        }
        self.has_been_touched = false;
    }

    pub fn rollback(&mut self) -> Result<()> {
        if self.has_diverged() {
            if let Some(keeper) = self.data_keeper.data_keeper_mut() {
                keeper.rollback()?;
            }
        }
        self.has_been_touched = false;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Data access
    // ------------------------------------------------------------------------

    pub fn get_data(&mut self) -> Result<ReadOnlyCollectionData> {
        let (_, keeper) = self.complete_ref()?;
        Ok(keeper.collection_data().snapshot())
    }

    pub fn get_original_data(&mut self) -> Result<ReadOnlyCollectionData> {
        let (_, keeper) = self.complete_ref()?;
        Ok(keeper.original_collection_data())
    }

    pub fn get_opposite_end_point_ids(&mut self) -> Result<Vec<RelationEndPointId>> {
        let (_, keeper) = self.complete_ref()?;
        Ok(keeper.current_opposite_end_points().to_vec())
    }

    /// Loaded data without triggering a load
    pub fn data_keeper(&self) -> Option<&CollectionEndPointDataKeeper> {
        self.data_keeper.data_keeper()
    }

    pub(crate) fn collection_data_mut(&mut self) -> Result<&mut ChangeCachingCollectionData> {
        Ok(loaded(&mut self.data_keeper)?.collection_data_mut())
    }

    pub fn sort_current_and_original_data(&mut self) -> Result<()> {
        let (_, keeper) = self.complete_mut()?;
        keeper.sort_current_and_original_data();
        Ok(())
    }

    /// Copy the current contents of `source` into this end-point. Touches this
    /// end-point if `source` was touched or the copy changed anything.
    pub fn set_data_from(&mut self, source: &mut CollectionEndPoint) -> Result<()> {
        source.ensure_data_complete()?;
        let (_, keeper) = self.complete_mut()?;
        let source_keeper = loaded(&mut source.data_keeper)?;
        keeper.set_data_from(source_keeper)?;

        if source.has_been_touched || self.has_changed() {
            self.touch();
        }
        Ok(())
    }

    pub fn check_mandatory(&mut self) -> Result<()> {
        let (_, keeper) = self.complete_ref()?;
        let is_empty = keeper.collection_data().is_empty();
        if is_empty {
            return Err(RelationError::MandatoryRelationNotSet(format!(
                "Mandatory relation property '{}' of domain object '{}' contains no items.",
                self.id.property_name(),
                self.id.object_id()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Opposite end-point registration and synchronization
    // ------------------------------------------------------------------------

    pub fn register_original_opposite_end_point(
        &mut self,
        end_point_id: RelationEndPointId,
    ) -> Result<()> {
        match &mut self.load_state {
            CollectionEndPointLoadState::Incomplete(incomplete) => {
                incomplete.register_original_opposite_end_point(end_point_id, &mut self.report)
            }
            CollectionEndPointLoadState::Complete(complete) => {
                let keeper = loaded(&mut self.data_keeper)?;
                complete.register_original_opposite_end_point(keeper, end_point_id, &mut self.report)
            }
        }
    }

    /// Unregistering a synchronized end-point from complete data makes the data
    /// incomplete; it is reloaded on next access.
    pub fn unregister_original_opposite_end_point(
        &mut self,
        end_point_id: &RelationEndPointId,
    ) -> Result<()> {
        if let CollectionEndPointLoadState::Complete(complete) = &mut self.load_state {
            if complete.remove_unsynchronized_opposite_end_point(end_point_id) {
                return Ok(());
            }
            self.mark_data_incomplete()?;
        }

        match &mut self.load_state {
            CollectionEndPointLoadState::Incomplete(incomplete) => {
                incomplete.unregister_original_opposite_end_point(end_point_id)
            }
            CollectionEndPointLoadState::Complete(_) => Err(RelationError::InvalidOperation(
                format!("End-point '{}' could not be marked incomplete.", self.id),
            )),
        }
    }

    /// `None` while incomplete; never loads
    pub fn is_synchronized(&self) -> Option<bool> {
        match (&self.load_state, self.data_keeper.data_keeper()) {
            (CollectionEndPointLoadState::Complete(complete), Some(keeper)) => {
                Some(complete.is_synchronized(keeper))
            }
            _ => None,
        }
    }

    /// Remove every original item whose opposite end-point is not registered here.
    pub fn synchronize(&mut self) -> Result<()> {
        let span = info_span!("relation.collection.synchronize", end_point = %self.id);
        let _enter = span.enter();

        let (complete, keeper) = self.complete_mut()?;
        let orphans = keeper.original_items_without_end_points().len();
        complete.synchronize(keeper)?;
        event!(Level::INFO, removed = orphans, "collection end-point synchronized");
        Ok(())
    }

    pub fn synchronize_opposite_end_point(&mut self, end_point_id: &RelationEndPointId) -> Result<()> {
        self.ensure_data_complete()?;
        let keeper = loaded(&mut self.data_keeper)?;
        let CollectionEndPointLoadState::Complete(complete) = &mut self.load_state else {
            return Err(RelationError::InvalidOperation(format!(
                "The data of end-point '{}' is not complete.",
                self.id
            )));
        };
        complete.synchronize_opposite_end_point(keeper, end_point_id, &mut self.report)
    }

    /// Empty while incomplete
    pub fn unsynchronized_opposite_end_points(&self) -> Vec<RelationEndPointId> {
        match &self.load_state {
            CollectionEndPointLoadState::Complete(complete) => {
                complete.unsynchronized_opposite_end_points().to_vec()
            }
            CollectionEndPointLoadState::Incomplete(_) => Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Command factories
    // ------------------------------------------------------------------------

    pub fn create_insert_command(
        &mut self,
        index: usize,
        item: ObjectId,
    ) -> Result<RelationEndPointModification> {
        let (complete, keeper) = self.complete_ref()?;
        complete.create_insert_command(keeper, index, item)
    }

    pub fn create_add_command(&mut self, item: ObjectId) -> Result<RelationEndPointModification> {
        let (complete, keeper) = self.complete_ref()?;
        complete.create_add_command(keeper, item)
    }

    pub fn create_remove_command(&mut self, item: &ObjectId) -> Result<RelationEndPointModification> {
        let (complete, keeper) = self.complete_ref()?;
        complete.create_remove_command(keeper, item)
    }

    pub fn create_replace_command(
        &mut self,
        index: usize,
        replacement: ObjectId,
    ) -> Result<RelationEndPointModification> {
        let (complete, keeper) = self.complete_ref()?;
        complete.create_replace_command(keeper, index, replacement)
    }

    pub fn create_delete_command(&mut self) -> Result<RelationEndPointModification> {
        let (complete, keeper) = self.complete_ref()?;
        complete.create_delete_command(keeper)
    }

    pub fn create_set_collection_command(
        &mut self,
        new_items: Vec<ObjectId>,
    ) -> Result<RelationEndPointModification> {
        let (complete, keeper) = self.complete_ref()?;
        complete.create_set_collection_command(keeper, new_items)
    }
}
