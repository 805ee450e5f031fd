/// Relation end-point manager tests
///
/// Loading, moving, deleting and rolling back one-to-many relations
/// Run with: cargo test --test relation_manager_tests

use anyhow::Result;
use relmemodb::{
    ClientTransactionListener, InMemoryObjectStore, LoadedObject, ObjectId, RelationChange,
    RelationConfig, RelationDefinition, RelationEndPointId, RelationEndPointManager, RelationError,
    RelationMapping, TransactionEvent, TransactionEventLog,
};
use std::sync::Arc;

const ITEMS: &str = "Order.OrderItems";
const ORDER: &str = "OrderItem.Order";

fn order(name: &str) -> ObjectId {
    ObjectId::from_name("Order", name)
}

fn item(name: &str) -> ObjectId {
    ObjectId::from_name("OrderItem", name)
}

fn mapping(definition: RelationDefinition) -> Result<Arc<RelationMapping>> {
    Ok(Arc::new(RelationMapping::new().with_relation(definition)?))
}

fn order_items() -> RelationDefinition {
    RelationDefinition::one_to_many("OrderToItems", "Order", ITEMS, "OrderItem", ORDER)
}

/// o1 owns i1 and i2, o2 owns i3
fn store(mapping: &Arc<RelationMapping>) -> Result<Arc<InMemoryObjectStore>> {
    let store = Arc::new(InMemoryObjectStore::new(Arc::clone(mapping)));
    store.put(LoadedObject::new(order("o1")))?;
    store.put(LoadedObject::new(order("o2")))?;
    store.put(LoadedObject::new(item("i1")).with_foreign_key(ORDER, Some(order("o1"))))?;
    store.put(LoadedObject::new(item("i2")).with_foreign_key(ORDER, Some(order("o1"))))?;
    store.put(LoadedObject::new(item("i3")).with_foreign_key(ORDER, Some(order("o2"))))?;
    Ok(store)
}

fn manager() -> Result<RelationEndPointManager> {
    let mapping = mapping(order_items())?;
    let store = store(&mapping)?;
    Ok(RelationEndPointManager::new(mapping, store))
}

fn manager_with_listener(
    listener: Arc<dyn ClientTransactionListener>,
) -> Result<RelationEndPointManager> {
    Ok(manager()?.with_listener(listener))
}

#[test]
fn test_loading_collection_registers_items() -> Result<()> {
    let mut manager = manager()?;

    let mut items = manager.collection(&order("o1"), ITEMS)?;
    assert!(!items.is_data_complete());
    assert_eq!(items.objects()?, vec![item("i1"), item("i2")]);
    assert!(items.is_data_complete());
    assert!(!items.has_changed()?);

    assert!(manager.is_known(&item("i1")));
    assert_eq!(manager.related_object(&item("i2"), ORDER)?, Some(order("o1")));

    let end_point_id = RelationEndPointId::new(item("i1"), ORDER);
    let end_point = manager.object_end_point(&end_point_id).expect("loaded");
    assert_eq!(end_point.is_synchronized(), Some(true));
    Ok(())
}

#[test]
fn test_add_moves_item_between_collections() -> Result<()> {
    let mut manager = manager()?;

    manager.collection(&order("o2"), ITEMS)?.add(item("i1"))?;

    assert_eq!(manager.collection(&order("o1"), ITEMS)?.objects()?, vec![item("i2")]);
    assert_eq!(
        manager.collection(&order("o2"), ITEMS)?.objects()?,
        vec![item("i3"), item("i1")]
    );
    assert_eq!(manager.related_object(&item("i1"), ORDER)?, Some(order("o2")));

    let mut old_owner = manager.collection(&order("o1"), ITEMS)?;
    assert!(old_owner.has_changed()?);
    assert!(old_owner.has_been_touched());
    Ok(())
}

#[test]
fn test_rollback_restores_moved_item() -> Result<()> {
    let mut manager = manager()?;

    manager.set_related_object(&item("i1"), ORDER, Some(order("o2")))?;
    assert_eq!(manager.collection(&order("o1"), ITEMS)?.count()?, 1);

    manager.rollback()?;

    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    assert_eq!(o1_items.objects()?, vec![item("i1"), item("i2")]);
    assert!(!o1_items.has_changed()?);
    assert!(!o1_items.has_been_touched());
    assert_eq!(manager.collection(&order("o2"), ITEMS)?.objects()?, vec![item("i3")]);
    assert_eq!(manager.related_object(&item("i1"), ORDER)?, Some(order("o1")));
    Ok(())
}

#[test]
fn test_commit_makes_current_state_original() -> Result<()> {
    let mut manager = manager()?;

    manager.set_related_object(&item("i1"), ORDER, Some(order("o2")))?;
    manager.commit()?;

    let mut o2_items = manager.collection(&order("o2"), ITEMS)?;
    assert_eq!(o2_items.original_objects()?, vec![item("i3"), item("i1")]);
    assert!(!o2_items.has_changed()?);

    manager.rollback()?;
    assert_eq!(manager.related_object(&item("i1"), ORDER)?, Some(order("o2")));
    Ok(())
}

#[test]
fn test_commit_keeps_reordered_items() -> Result<()> {
    let mut manager = manager()?;

    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    o1_items.remove(&item("i1"))?;
    o1_items.insert(1, item("i1"))?;
    assert_eq!(o1_items.objects()?, vec![item("i2"), item("i1")]);
    assert!(!o1_items.has_changed()?);

    manager.commit()?;

    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    assert_eq!(o1_items.objects()?, o1_items.original_objects()?);
    assert_eq!(o1_items.original_objects()?, vec![item("i2"), item("i1")]);

    o1_items.remove(&item("i2"))?;
    manager.rollback()?;
    assert_eq!(
        manager.collection(&order("o1"), ITEMS)?.objects()?,
        vec![item("i2"), item("i1")]
    );
    Ok(())
}

#[test]
fn test_rollback_restores_original_order() -> Result<()> {
    let mut manager = manager()?;

    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    o1_items.remove(&item("i1"))?;
    o1_items.insert(1, item("i1"))?;

    manager.rollback()?;

    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    assert_eq!(o1_items.objects()?, vec![item("i1"), item("i2")]);
    assert_eq!(o1_items.original_objects()?, vec![item("i1"), item("i2")]);
    Ok(())
}

#[test]
fn test_insert_replace_and_remove() -> Result<()> {
    let mut manager = manager()?;

    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    o1_items.replace(0, item("i3"))?;
    assert_eq!(o1_items.objects()?, vec![item("i3"), item("i2")]);

    assert_eq!(manager.related_object(&item("i1"), ORDER)?, None);
    assert_eq!(manager.related_object(&item("i3"), ORDER)?, Some(order("o1")));
    assert_eq!(manager.collection(&order("o2"), ITEMS)?.count()?, 0);

    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    o1_items.insert(1, item("i1"))?;
    assert_eq!(o1_items.objects()?, vec![item("i3"), item("i1"), item("i2")]);

    assert!(o1_items.remove(&item("i2"))?);
    assert!(!o1_items.remove(&item("i2"))?);
    assert_eq!(o1_items.objects()?, vec![item("i3"), item("i1")]);
    assert_eq!(manager.related_object(&item("i2"), ORDER)?, None);
    Ok(())
}

#[test]
fn test_invalid_collection_edits_are_rejected() -> Result<()> {
    let mut manager = manager()?;
    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;

    let err = o1_items.insert(5, item("i3")).unwrap_err();
    assert!(matches!(err, RelationError::IndexOutOfRange { index: 5, count: 2 }));

    let err = o1_items.add(item("i1")).unwrap_err();
    assert!(matches!(err, RelationError::InvalidOperation(_)));

    let err = o1_items.add(order("o2")).unwrap_err();
    assert!(matches!(err, RelationError::InvalidOperation(_)));

    assert_eq!(o1_items.objects()?, vec![item("i1"), item("i2")]);
    assert!(!o1_items.has_been_touched());
    Ok(())
}

#[test]
fn test_replace_with_same_item_only_touches() -> Result<()> {
    let mut manager = manager()?;

    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    o1_items.replace(1, item("i2"))?;

    assert_eq!(o1_items.objects()?, vec![item("i1"), item("i2")]);
    assert!(!o1_items.has_changed()?);
    assert!(o1_items.has_been_touched());
    Ok(())
}

#[test]
fn test_set_contents_detaches_and_attaches() -> Result<()> {
    let mut manager = manager()?;

    manager
        .collection(&order("o1"), ITEMS)?
        .set_contents(vec![item("i2"), item("i3")])?;

    assert_eq!(
        manager.collection(&order("o1"), ITEMS)?.objects()?,
        vec![item("i2"), item("i3")]
    );
    assert_eq!(manager.related_object(&item("i1"), ORDER)?, None);
    assert_eq!(manager.related_object(&item("i3"), ORDER)?, Some(order("o1")));
    assert!(manager.collection(&order("o2"), ITEMS)?.objects()?.is_empty());
    Ok(())
}

#[test]
fn test_delete_owner_nulls_item_references() -> Result<()> {
    let mut manager = manager()?;

    manager.delete_object(&order("o1"))?;

    assert!(manager.is_deleted(&order("o1")));
    assert_eq!(manager.related_object(&item("i1"), ORDER)?, None);
    assert_eq!(manager.related_object(&item("i2"), ORDER)?, None);

    let err = manager.collection(&order("o1"), ITEMS).err().expect("deleted owner");
    assert!(matches!(err, RelationError::ObjectDeleted(_)));

    manager.commit()?;
    assert!(!manager.is_deleted(&order("o1")));
    assert!(!manager.is_known(&order("o1")));
    Ok(())
}

#[test]
fn test_delete_item_removes_it_from_owner() -> Result<()> {
    let mut manager = manager()?;

    manager.delete_object(&item("i1"))?;
    assert_eq!(manager.collection(&order("o1"), ITEMS)?.objects()?, vec![item("i2")]);

    manager.rollback()?;
    assert!(!manager.is_deleted(&item("i1")));
    assert_eq!(
        manager.collection(&order("o1"), ITEMS)?.objects()?,
        vec![item("i1"), item("i2")]
    );
    Ok(())
}

#[test]
fn test_new_objects_are_discarded_on_rollback() -> Result<()> {
    let mut manager = manager()?;

    let new_order = manager.new_object("Order")?;
    let mut new_items = manager.collection(&new_order, ITEMS)?;
    assert!(new_items.is_data_complete());
    assert_eq!(new_items.count()?, 0);

    new_items.add(item("i1"))?;
    assert_eq!(manager.related_object(&item("i1"), ORDER)?, Some(new_order.clone()));

    manager.rollback()?;
    assert!(!manager.is_known(&new_order));
    assert_eq!(manager.related_object(&item("i1"), ORDER)?, Some(order("o1")));
    assert_eq!(
        manager.collection(&order("o1"), ITEMS)?.objects()?,
        vec![item("i1"), item("i2")]
    );
    Ok(())
}

#[test]
fn test_unload_unchanged_collection_reloads_on_access() -> Result<()> {
    let mut manager = manager()?;

    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    assert_eq!(o1_items.count()?, 2);
    o1_items.unload()?;
    assert!(!o1_items.is_data_complete());
    assert_eq!(o1_items.objects()?, vec![item("i1"), item("i2")]);
    Ok(())
}

#[test]
fn test_unload_changed_collection_fails() -> Result<()> {
    let mut manager = manager()?;

    manager.set_related_object(&item("i1"), ORDER, None)?;
    let err = manager.collection(&order("o1"), ITEMS)?.unload().unwrap_err();
    assert!(matches!(err, RelationError::InvalidOperation(_)));

    let err = manager.unload_object(&item("i1")).unwrap_err();
    assert!(matches!(err, RelationError::InvalidOperation(_)));
    Ok(())
}

#[test]
fn test_unload_object_makes_owner_collection_incomplete() -> Result<()> {
    let mut manager = manager()?;

    assert_eq!(manager.collection(&order("o1"), ITEMS)?.count()?, 2);
    manager.unload_object(&item("i1"))?;

    assert!(!manager.is_known(&item("i1")));
    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    assert!(!o1_items.is_data_complete());
    assert_eq!(o1_items.objects()?, vec![item("i1"), item("i2")]);
    assert!(manager.is_known(&item("i1")));
    Ok(())
}

// ============================================================================
// Listener notifications
// ============================================================================

struct VetoEverything;

impl ClientTransactionListener for VetoEverything {
    fn relation_changing(&self, change: &RelationChange) -> relmemodb::Result<()> {
        Err(RelationError::Vetoed(format!(
            "change of '{}' is not allowed",
            change.end_point_id
        )))
    }
}

#[test]
fn test_veto_leaves_everything_untouched() -> Result<()> {
    let mut manager = manager_with_listener(Arc::new(VetoEverything))?;

    let err = manager
        .set_related_object(&item("i1"), ORDER, Some(order("o2")))
        .unwrap_err();
    assert!(matches!(err, RelationError::Vetoed(_)));

    assert_eq!(manager.related_object(&item("i1"), ORDER)?, Some(order("o1")));
    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    assert_eq!(o1_items.objects()?, vec![item("i1"), item("i2")]);
    assert!(!o1_items.has_changed()?);
    assert!(!o1_items.has_been_touched());
    assert_eq!(manager.collection(&order("o2"), ITEMS)?.objects()?, vec![item("i3")]);
    Ok(())
}

struct VetoOnBegin;

impl ClientTransactionListener for VetoOnBegin {
    fn object_relation_changing(&self, change: &RelationChange) -> relmemodb::Result<()> {
        Err(RelationError::Vetoed(format!(
            "'{}' is locked",
            change.end_point_id
        )))
    }
}

#[test]
fn test_veto_on_begin_leaves_everything_untouched() -> Result<()> {
    let mut manager = manager_with_listener(Arc::new(VetoOnBegin))?;

    let err = manager
        .set_related_object(&item("i1"), ORDER, Some(order("o2")))
        .unwrap_err();
    assert!(matches!(err, RelationError::Vetoed(_)));

    let err = manager.collection(&order("o1"), ITEMS)?.add(item("i3")).unwrap_err();
    assert!(matches!(err, RelationError::Vetoed(_)));

    let err = manager.collection(&order("o1"), ITEMS)?.clear().unwrap_err();
    assert!(matches!(err, RelationError::Vetoed(_)));

    for (owner, items) in [("o1", vec![item("i1"), item("i2")]), ("o2", vec![item("i3")])] {
        let mut collection = manager.collection(&order(owner), ITEMS)?;
        assert_eq!(collection.objects()?, items);
        assert!(!collection.has_changed()?);
        assert!(!collection.has_been_touched());
    }
    for (name, owner) in [("i1", "o1"), ("i2", "o1"), ("i3", "o2")] {
        assert_eq!(manager.related_object(&item(name), ORDER)?, Some(order(owner)));
        let end_point = manager
            .object_end_point(&RelationEndPointId::new(item(name), ORDER))
            .expect("loaded");
        assert!(!end_point.has_been_touched());
    }
    Ok(())
}

fn phase(event: &TransactionEvent) -> Option<&'static str> {
    match event {
        TransactionEvent::RelationChanging(_) => Some("changing"),
        TransactionEvent::ObjectRelationChanging(_) => Some("object_changing"),
        TransactionEvent::ObjectRelationChanged(_) => Some("object_changed"),
        TransactionEvent::RelationChanged(_) => Some("changed"),
        _ => None,
    }
}

#[test]
fn test_clear_runs_one_batched_sequence() -> Result<()> {
    let log = Arc::new(TransactionEventLog::new());
    let mut manager = manager_with_listener(log.clone())?;

    let mut o1_items = manager.collection(&order("o1"), ITEMS)?;
    assert_eq!(o1_items.count()?, 2);
    log.clear()?;

    o1_items.clear()?;
    assert_eq!(o1_items.count()?, 0);
    assert!(o1_items.has_been_touched());

    let events = log.events()?;
    let phases: Vec<_> = events.iter().filter_map(phase).collect();
    let mut expected = vec!["changing"; 4];
    expected.extend(["object_changing"; 4]);
    expected.extend(["object_changed"; 4]);
    expected.extend(["changed"; 4]);
    assert_eq!(phases, expected);

    // Items are removed last to first; announcements run in reverse, so the
    // first item's removal is announced first.
    let collection_id = RelationEndPointId::new(order("o1"), ITEMS);
    let first = events.iter().find_map(|event| match event {
        TransactionEvent::RelationChanging(change) => Some(change.clone()),
        _ => None,
    });
    assert_eq!(
        first,
        Some(RelationChange::new(collection_id, Some(item("i1")), None))
    );

    assert_eq!(manager.related_object(&item("i1"), ORDER)?, None);
    assert_eq!(manager.related_object(&item("i2"), ORDER)?, None);
    Ok(())
}

#[test]
fn test_clear_of_empty_collection_only_touches() -> Result<()> {
    let log = Arc::new(TransactionEventLog::new());
    let mut manager = manager_with_listener(log.clone())?;

    let new_order = manager.new_object("Order")?;
    let mut items = manager.collection(&new_order, ITEMS)?;
    items.clear()?;

    assert!(items.has_been_touched());
    assert!(log.events()?.iter().filter_map(phase).next().is_none());
    Ok(())
}

// ============================================================================
// Mandatory relations
// ============================================================================

#[test]
fn test_mandatory_reference_is_checked_on_commit() -> Result<()> {
    let mapping = mapping(order_items().mandatory_reference())?;
    let store = store(&mapping)?;
    let mut manager = RelationEndPointManager::new(mapping, store);

    let new_item = manager.new_object("OrderItem")?;
    let err = manager.commit().unwrap_err();
    assert!(matches!(err, RelationError::MandatoryRelationNotSet(_)));

    manager.set_related_object(&new_item, ORDER, Some(order("o2")))?;
    manager.commit()?;
    assert!(!manager.is_new(&new_item));
    assert_eq!(
        manager.collection(&order("o2"), ITEMS)?.original_objects()?,
        vec![item("i3"), new_item]
    );
    Ok(())
}

#[test]
fn test_mandatory_collection_validation_can_be_disabled() -> Result<()> {
    let mapping = mapping(order_items().mandatory_collection())?;
    let store = store(&mapping)?;

    let mut manager = RelationEndPointManager::new(Arc::clone(&mapping), store.clone());
    manager.collection(&order("o2"), ITEMS)?.clear()?;
    let err = manager.commit().unwrap_err();
    assert!(matches!(err, RelationError::MandatoryRelationNotSet(_)));

    let mut manager = RelationEndPointManager::new(mapping, store)
        .with_config(RelationConfig::new().validate_mandatory_on_commit(false));
    manager.collection(&order("o2"), ITEMS)?.clear()?;
    manager.commit()?;
    assert_eq!(manager.collection(&order("o2"), ITEMS)?.count()?, 0);
    Ok(())
}
