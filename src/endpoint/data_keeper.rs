// ============================================================================
// Collection End-Point Data Keeper
// ============================================================================
//
// Owns the collection pipeline of one loaded collection end-point
// (change caching -> end-point tracking -> store) together with the
// original opposite end-points.
//
// Original items fall into two groups:
//   - items with a registered original opposite end-point
//   - items without one ("orphans"), e.g. freshly loaded items whose
//     foreign-key side has not been registered yet
//
// ============================================================================

use crate::collection::{
    ChangeCachingCollectionData, ChangeDetectionStrategy, CollectionData,
    DomainObjectCollectionData, EndPointTrackingCollectionData, ReadOnlyCollectionData,
};
use crate::core::{ObjectId, RelationEndPointId, RelationError, Result};
use crate::endpoint::listener::StateUpdateListener;
use crate::endpoint::provider::RelationEndPointProvider;
use crate::mapping::RelationDefinition;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct CollectionEndPointDataKeeper {
    end_point_id: RelationEndPointId,
    definition: Arc<RelationDefinition>,
    data: ChangeCachingCollectionData,
    original_opposite_end_points: HashMap<ObjectId, RelationEndPointId>,
    original_items_without_end_point: HashSet<ObjectId>,
}

impl CollectionEndPointDataKeeper {
    pub fn new(
        end_point_id: RelationEndPointId,
        definition: Arc<RelationDefinition>,
        provider: Arc<dyn RelationEndPointProvider>,
        state_listener: Arc<dyn StateUpdateListener>,
    ) -> Result<Self> {
        let tracking = EndPointTrackingCollectionData::new(
            DomainObjectCollectionData::new(),
            definition.object_end().property_name.clone(),
            provider,
        )?;
        Ok(Self {
            end_point_id,
            definition,
            data: ChangeCachingCollectionData::new(tracking, state_listener),
            original_opposite_end_points: HashMap::new(),
            original_items_without_end_point: HashSet::new(),
        })
    }

    pub fn end_point_id(&self) -> &RelationEndPointId {
        &self.end_point_id
    }

    pub fn definition(&self) -> &Arc<RelationDefinition> {
        &self.definition
    }

    pub fn collection_data(&self) -> &ChangeCachingCollectionData {
        &self.data
    }

    pub fn collection_data_mut(&mut self) -> &mut ChangeCachingCollectionData {
        &mut self.data
    }

    pub fn original_collection_data(&self) -> ReadOnlyCollectionData {
        self.data.original_data()
    }

    /// Registered original opposite end-points, in original-data order
    pub fn original_opposite_end_points(&self) -> Vec<RelationEndPointId> {
        self.data
            .original_data()
            .iter()
            .filter_map(|item| self.original_opposite_end_points.get(item).cloned())
            .collect()
    }

    /// Opposite end-points of the live items, in collection order
    pub fn current_opposite_end_points(&self) -> &[RelationEndPointId] {
        self.data.wrapped().opposite_end_points()
    }

    /// Original items lacking a registered opposite end-point, in original-data order
    pub fn original_items_without_end_points(&self) -> Vec<ObjectId> {
        self.data
            .original_data()
            .iter()
            .filter(|item| self.original_items_without_end_point.contains(*item))
            .cloned()
            .collect()
    }

    pub fn contains_original_opposite_end_point(&self, end_point_id: &RelationEndPointId) -> bool {
        self.original_opposite_end_points
            .get(end_point_id.object_id())
            .is_some_and(|registered| registered == end_point_id)
    }

    pub fn contains_original_item_without_end_point(&self, id: &ObjectId) -> bool {
        self.original_items_without_end_point.contains(id)
    }

    pub fn contains_current_item(&self, id: &ObjectId) -> bool {
        self.data.contains_object_id(id)
    }

    pub fn contains_original_item(&self, id: &ObjectId) -> bool {
        self.data.original_data().contains_object_id(id)
    }

    /// Registers the opposite end-point of an item. An orphan with the same ID is
    /// adopted; any other item is added to the original and current data.
    ///
    /// # Errors
    /// Returns error if the end-point is already registered
    pub fn register_original_opposite_end_point(
        &mut self,
        end_point_id: RelationEndPointId,
    ) -> Result<()> {
        let item = end_point_id.object_id().clone();
        if self.original_opposite_end_points.contains_key(&item) {
            return Err(RelationError::invalid_operation(
                "The opposite end-point has already been registered.",
            ));
        }

        if !self.original_items_without_end_point.remove(&item) {
            self.data.register_original_item(item.clone())?;
        }
        self.original_opposite_end_points.insert(item, end_point_id);
        Ok(())
    }

    /// Removes the opposite end-point and its item from the original and current data.
    ///
    /// # Errors
    /// Returns error if the end-point has not been registered
    pub fn unregister_original_opposite_end_point(
        &mut self,
        end_point_id: &RelationEndPointId,
    ) -> Result<()> {
        if !self.contains_original_opposite_end_point(end_point_id) {
            return Err(RelationError::invalid_operation(
                "The opposite end-point has not been registered.",
            ));
        }

        let item = end_point_id.object_id();
        self.data.unregister_original_item(item)?;
        self.original_opposite_end_points.remove(item);
        Ok(())
    }

    /// # Errors
    /// Returns error if the original data already contains the item
    pub fn register_original_item_without_end_point(&mut self, item: ObjectId) -> Result<()> {
        self.data.register_original_item(item.clone())?;
        self.original_items_without_end_point.insert(item);
        Ok(())
    }

    /// # Errors
    /// Returns error if the item is not an original item without end-point
    pub fn unregister_original_item_without_end_point(&mut self, id: &ObjectId) -> Result<()> {
        if !self.original_items_without_end_point.contains(id) {
            return Err(RelationError::InvalidOperation(format!(
                "The domain object with ID '{}' has not been registered as an item without end-point.",
                id
            )));
        }

        self.data.unregister_original_item(id)?;
        self.original_items_without_end_point.remove(id);
        Ok(())
    }

    /// Sort by the relation's comparer, if it has one.
    pub fn sort_current_and_original_data(&mut self) {
        if let Some(comparer) = self.definition.sort_comparer().cloned() {
            self.data
                .sort_original_and_current(&|a: &ObjectId, b: &ObjectId| comparer(a, b));
        }
    }

    pub fn has_data_changed(&mut self, strategy: &dyn ChangeDetectionStrategy) -> bool {
        self.data.has_changed(strategy)
    }

    /// Replace the current contents with those of `source`
    ///
    /// # Errors
    /// Returns error if an item of `source` has no resolvable opposite end-point here
    pub fn set_data_from(&mut self, source: &CollectionEndPointDataKeeper) -> Result<()> {
        self.data.replace_contents(source.data.snapshot())
    }

    pub fn commit(&mut self) {
        self.data.commit();
        self.original_opposite_end_points = self
            .current_opposite_end_points()
            .iter()
            .map(|end_point| (end_point.object_id().clone(), end_point.clone()))
            .collect();
        self.original_items_without_end_point.clear();
    }

    /// # Errors
    /// Returns error if the original items can no longer be tracked
    pub fn rollback(&mut self) -> Result<()> {
        self.data.rollback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::RootCollectionChangeDetectionStrategy;
    use crate::core::ChangeState;
    use crate::mapping::RelationMapping;
    use std::cmp::Ordering;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        states: Mutex<Vec<ChangeState>>,
    }

    impl StateUpdateListener for RecordingListener {
        fn state_updated(&self, state: ChangeState) {
            self.states.lock().unwrap().push(state);
        }
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

    fn keeper_with(
        definition: RelationDefinition,
    ) -> (CollectionEndPointDataKeeper, Arc<RecordingListener>) {
        let definition = Arc::new(definition);
        let mapping = RelationMapping::new()
            .with_relation(definition.as_ref().clone())
            .unwrap();
        let listener = Arc::new(RecordingListener::default());
        let owner = ObjectId::from_name("Order", "o1");
        let keeper = CollectionEndPointDataKeeper::new(
            definition.collection_end_point_id(&owner),
            definition,
            Arc::new(mapping),
            listener.clone(),
        )
        .unwrap();
        (keeper, listener)
    }

    fn keeper() -> (CollectionEndPointDataKeeper, Arc<RecordingListener>) {
        keeper_with(definition())
    }

    fn item(name: &str) -> ObjectId {
        ObjectId::from_name("OrderItem", name)
    }

    fn opposite(name: &str) -> RelationEndPointId {
        RelationEndPointId::new(item(name), "OrderItem.Order")
    }

    #[test]
    fn test_register_original_opposite_end_point() {
        let (mut keeper, _) = keeper();
        keeper.register_original_opposite_end_point(opposite("a")).unwrap();

        assert!(keeper.contains_original_opposite_end_point(&opposite("a")));
        assert!(keeper.contains_current_item(&item("a")));
        assert!(keeper.contains_original_item(&item("a")));
        assert_eq!(keeper.current_opposite_end_points(), &[opposite("a")]);

        let err = keeper
            .register_original_opposite_end_point(opposite("a"))
            .unwrap_err();
        assert_eq!(
            err,
            RelationError::invalid_operation("The opposite end-point has already been registered.")
        );
    }

    #[test]
    fn test_register_then_unregister_restores_state() {
        let (mut keeper, listener) = keeper();
        keeper.register_original_opposite_end_point(opposite("a")).unwrap();
        keeper.has_data_changed(&RootCollectionChangeDetectionStrategy);
        let notifications = listener.states.lock().unwrap().len();
        let original = keeper.original_collection_data();

        keeper.register_original_opposite_end_point(opposite("b")).unwrap();
        keeper.unregister_original_opposite_end_point(&opposite("b")).unwrap();

        assert_eq!(keeper.collection_data().as_slice(), &[item("a")]);
        assert_eq!(keeper.original_collection_data().as_slice(), original.as_slice());
        assert!(keeper.collection_data().is_cache_up_to_date());
        assert_eq!(listener.states.lock().unwrap().len(), notifications);
    }

    #[test]
    fn test_unregister_unknown_end_point_fails() {
        let (mut keeper, _) = keeper();
        let err = keeper
            .unregister_original_opposite_end_point(&opposite("a"))
            .unwrap_err();
        assert_eq!(
            err,
            RelationError::invalid_operation("The opposite end-point has not been registered.")
        );
    }

    #[test]
    fn test_orphan_is_adopted_by_its_end_point() {
        let (mut keeper, _) = keeper();
        keeper.register_original_item_without_end_point(item("a")).unwrap();
        keeper.register_original_item_without_end_point(item("b")).unwrap();
        assert_eq!(keeper.original_items_without_end_points(), vec![item("a"), item("b")]);

        keeper.register_original_opposite_end_point(opposite("b")).unwrap();
        assert_eq!(keeper.original_items_without_end_points(), vec![item("a")]);
        assert_eq!(keeper.original_opposite_end_points(), vec![opposite("b")]);
        assert_eq!(keeper.collection_data().count(), 2);

        keeper.unregister_original_item_without_end_point(&item("a")).unwrap();
        assert!(keeper.original_items_without_end_points().is_empty());
        assert_eq!(keeper.collection_data().as_slice(), &[item("b")]);
        assert!(keeper.unregister_original_item_without_end_point(&item("a")).is_err());
    }

    #[test]
    fn test_commit_adopts_current_opposite_end_points() {
        let (mut keeper, _) = keeper();
        keeper.register_original_opposite_end_point(opposite("a")).unwrap();
        keeper.register_original_item_without_end_point(item("x")).unwrap();
        keeper.collection_data_mut().add(item("b")).unwrap();
        keeper.collection_data_mut().remove(&item("a"));

        keeper.commit();
        assert_eq!(keeper.original_opposite_end_points(), vec![opposite("x"), opposite("b")]);
        assert!(keeper.original_items_without_end_points().is_empty());
        assert!(!keeper.has_data_changed(&RootCollectionChangeDetectionStrategy));
    }

    #[test]
    fn test_rollback_restores_items_and_end_points() {
        let (mut keeper, _) = keeper();
        keeper.register_original_opposite_end_point(opposite("a")).unwrap();
        keeper.collection_data_mut().add(item("b")).unwrap();

        keeper.rollback().unwrap();
        assert_eq!(keeper.collection_data().as_slice(), &[item("a")]);
        assert_eq!(keeper.current_opposite_end_points(), &[opposite("a")]);
        assert_eq!(keeper.original_opposite_end_points(), vec![opposite("a")]);
    }

    #[test]
    fn test_sort_uses_relation_comparer() {
        let reversed = definition().with_sort_comparer(Arc::new(|a: &ObjectId, b: &ObjectId| -> Ordering {
            b.cmp(a)
        }));
        let (mut keeper, _) = keeper_with(reversed);
        for name in ["a", "b", "c"] {
            keeper.register_original_item_without_end_point(item(name)).unwrap();
        }
        keeper.sort_current_and_original_data();

        let mut expected = vec![item("a"), item("b"), item("c")];
        expected.sort_by(|a, b| b.cmp(a));
        assert_eq!(keeper.collection_data().as_slice(), expected.as_slice());
        assert_eq!(keeper.original_collection_data().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_set_data_from_copies_contents() {
        let (mut source, _) = keeper();
        source.register_original_opposite_end_point(opposite("a")).unwrap();
        source.collection_data_mut().add(item("b")).unwrap();

        let (mut target, _) = keeper();
        target.set_data_from(&source).unwrap();
        assert_eq!(target.collection_data().as_slice(), &[item("a"), item("b")]);
        assert_eq!(target.current_opposite_end_points(), &[opposite("a"), opposite("b")]);
        assert!(target.has_data_changed(&RootCollectionChangeDetectionStrategy));
    }
}
