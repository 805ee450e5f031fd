// ============================================================================
// Lazy-Loading Data Keeper
// ============================================================================
//
// Defers materializing a collection until it is first needed. Unloaded data
// counts as unchanged; asking whether it changed never triggers a load.
//
// ============================================================================

use super::data_keeper::CollectionEndPointDataKeeper;
use super::listener::StateUpdateListener;
use super::loader::ObjectLoader;
use super::provider::RelationEndPointProvider;
use crate::collection::ChangeDetectionStrategy;
use crate::core::{ObjectId, RelationEndPointId, RelationError, Result};
use crate::mapping::RelationDefinition;
use std::sync::Arc;
use tracing::{Level, event, info_span};

pub struct LazyLoadingCollectionEndPointDataKeeper {
    end_point_id: RelationEndPointId,
    definition: Arc<RelationDefinition>,
    provider: Arc<dyn RelationEndPointProvider>,
    state_listener: Arc<dyn StateUpdateListener>,
    loader: Arc<dyn ObjectLoader>,
    sort_on_load: bool,
    keeper: Option<CollectionEndPointDataKeeper>,
}

impl LazyLoadingCollectionEndPointDataKeeper {
    pub fn new(
        end_point_id: RelationEndPointId,
        definition: Arc<RelationDefinition>,
        provider: Arc<dyn RelationEndPointProvider>,
        state_listener: Arc<dyn StateUpdateListener>,
        loader: Arc<dyn ObjectLoader>,
    ) -> Self {
        Self {
            end_point_id,
            definition,
            provider,
            state_listener,
            loader,
            sort_on_load: true,
            keeper: None,
        }
    }

    pub fn with_sort_on_load(mut self, sort_on_load: bool) -> Self {
        self.sort_on_load = sort_on_load;
        self
    }

    pub fn end_point_id(&self) -> &RelationEndPointId {
        &self.end_point_id
    }

    pub fn is_data_available(&self) -> bool {
        self.keeper.is_some()
    }

    /// The materialized keeper, if loaded
    pub fn data_keeper(&self) -> Option<&CollectionEndPointDataKeeper> {
        self.keeper.as_ref()
    }

    pub fn data_keeper_mut(&mut self) -> Option<&mut CollectionEndPointDataKeeper> {
        self.keeper.as_mut()
    }

    /// Load the data unless it is available already. Returns the newly loaded
    /// items in loader order (empty when nothing was loaded).
    ///
    /// # Errors
    /// Returns error if the loader fails or returns a duplicate or untrackable item
    pub fn ensure_data_available(&mut self) -> Result<Vec<ObjectId>> {
        if self.keeper.is_some() {
            return Ok(Vec::new());
        }

        let span = info_span!("relation.collection.load", end_point = %self.end_point_id);
        let _enter = span.enter();

        let items = self
            .loader
            .load_related_objects(&self.end_point_id)
            .inspect_err(|err| {
                event!(Level::ERROR, error = %err, "collection load failed");
            })?;
        self.materialize(&items)?;
        event!(Level::DEBUG, count = items.len(), "collection loaded");
        Ok(items)
    }

    /// Mark the data as available with known contents, without asking the loader.
    ///
    /// # Errors
    /// Returns error if the data is already available
    pub fn mark_data_available(&mut self, items: &[ObjectId]) -> Result<()> {
        if self.keeper.is_some() {
            return Err(RelationError::invalid_operation(
                "The data is already available.",
            ));
        }
        self.materialize(items)
    }

    /// `false` while unloaded
    pub fn has_data_changed(&mut self, strategy: &dyn ChangeDetectionStrategy) -> bool {
        self.keeper
            .as_mut()
            .is_some_and(|keeper| keeper.has_data_changed(strategy))
    }

    /// Discard all materialized state including the change cache
    pub fn unload(&mut self) -> Option<CollectionEndPointDataKeeper> {
        if self.keeper.is_some() {
            event!(Level::DEBUG, end_point = %self.end_point_id, "collection data unloaded");
        }
        self.keeper.take()
    }

    fn materialize(&mut self, items: &[ObjectId]) -> Result<()> {
        let mut keeper = CollectionEndPointDataKeeper::new(
            self.end_point_id.clone(),
            Arc::clone(&self.definition),
            Arc::clone(&self.provider),
            Arc::clone(&self.state_listener),
        )?;
        for item in items {
            keeper.register_original_item_without_end_point(item.clone())?;
        }
        if self.sort_on_load {
            keeper.sort_current_and_original_data();
        }
        self.keeper = Some(keeper);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionData, SubCollectionChangeDetectionStrategy};
    use crate::core::ChangeState;
    use crate::endpoint::loader::LoadedObject;
    use crate::mapping::RelationMapping;
    use std::cmp::Ordering;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct NoopListener;

    impl StateUpdateListener for NoopListener {
        fn state_updated(&self, _state: ChangeState) {}
    }

    struct FixedLoader {
        items: Vec<ObjectId>,
        calls: AtomicUsize,
    }

    impl ObjectLoader for FixedLoader {
        fn load_object(&self, id: &ObjectId) -> Result<LoadedObject> {
            Ok(LoadedObject::new(id.clone()))
        }

        fn load_related_objects(&self, _end_point_id: &RelationEndPointId) -> Result<Vec<ObjectId>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.items.clone())
        }
    }

    fn item(name: &str) -> ObjectId {
        ObjectId::from_name("OrderItem", name)
    }

    fn lazy_keeper(
        definition: RelationDefinition,
        items: Vec<ObjectId>,
    ) -> (LazyLoadingCollectionEndPointDataKeeper, Arc<FixedLoader>) {
        let definition = Arc::new(definition);
        let mapping = RelationMapping::new()
            .with_relation(definition.as_ref().clone())
            .unwrap();
        let loader = Arc::new(FixedLoader {
            items,
            calls: AtomicUsize::new(0),
        });
        let keeper = LazyLoadingCollectionEndPointDataKeeper::new(
            definition.collection_end_point_id(&ObjectId::from_name("Order", "o1")),
            definition,
            Arc::new(mapping),
            Arc::new(NoopListener),
            loader.clone(),
        );
        (keeper, loader)
    }

    fn definition() -> RelationDefinition {
        RelationDefinition::one_to_many(
            "OrderToItems",
            "Order",
            "Order.OrderItems",
            "OrderItem",
            "OrderItem.Order",
        )
    }

    #[test]
    fn test_has_data_changed_does_not_load() {
        let (mut keeper, loader) = lazy_keeper(definition(), vec![item("a")]);
        assert!(!keeper.has_data_changed(&SubCollectionChangeDetectionStrategy));
        assert!(!keeper.is_data_available());
        assert_eq!(loader.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn test_ensure_data_available_loads_once() {
        let (mut keeper, loader) = lazy_keeper(definition(), vec![item("b"), item("a")]);
        let loaded = keeper.ensure_data_available().unwrap();
        assert_eq!(loaded, vec![item("b"), item("a")]);
        assert!(keeper.ensure_data_available().unwrap().is_empty());
        assert_eq!(loader.calls.load(AtomicOrdering::SeqCst), 1);

        let data = keeper.data_keeper().unwrap();
        assert_eq!(data.collection_data().as_slice(), &[item("b"), item("a")]);
        assert_eq!(data.original_items_without_end_points(), vec![item("b"), item("a")]);
        assert!(!keeper.has_data_changed(&SubCollectionChangeDetectionStrategy));
    }

    #[test]
    fn test_load_applies_sort_comparer() {
        let sorted = definition().with_sort_comparer(Arc::new(|a: &ObjectId, b: &ObjectId| -> Ordering {
            a.cmp(b)
        }));
        let mut items = vec![item("a"), item("b"), item("c")];
        items.sort_by(|a, b| b.cmp(a));
        let (mut keeper, _) = lazy_keeper(sorted, items.clone());
        keeper.ensure_data_available().unwrap();

        items.sort();
        let data = keeper.data_keeper().unwrap();
        assert_eq!(data.collection_data().as_slice(), items.as_slice());
        assert_eq!(data.original_collection_data().as_slice(), items.as_slice());
    }

    #[test]
    fn test_unload_discards_changes() {
        let (mut keeper, loader) = lazy_keeper(definition(), vec![item("a")]);
        keeper.ensure_data_available().unwrap();
        keeper
            .data_keeper_mut()
            .unwrap()
            .collection_data_mut()
            .add(item("b"))
            .unwrap();
        assert!(keeper.has_data_changed(&SubCollectionChangeDetectionStrategy));

        assert!(keeper.unload().is_some());
        assert!(!keeper.is_data_available());
        assert!(!keeper.has_data_changed(&SubCollectionChangeDetectionStrategy));

        keeper.ensure_data_available().unwrap();
        assert_eq!(loader.calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(
            keeper.data_keeper().unwrap().collection_data().as_slice(),
            &[item("a")]
        );
    }

    #[test]
    fn test_mark_data_available_twice_fails() {
        let (mut keeper, loader) = lazy_keeper(definition(), vec![]);
        keeper.mark_data_available(&[item("a")]).unwrap();
        assert!(keeper.is_data_available());
        assert!(keeper.mark_data_available(&[]).is_err());
        assert_eq!(loader.calls.load(AtomicOrdering::SeqCst), 0);
    }
}
