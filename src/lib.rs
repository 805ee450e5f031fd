// ============================================================================
// RelMemoDB Library
// ============================================================================
//
// Bidirectional one-to-many relations for an in-memory object transaction:
// lazily loaded collection end-points, copy-on-write change tracking,
// expanded relation commands and commit/rollback.
//
// ============================================================================

pub mod collection;
pub mod command;
pub mod config;
pub mod core;
pub mod endpoint;
pub mod mapping;
pub mod transaction;

// Re-export main types for convenience
pub use config::{ChangeDetectionMode, RelationConfig};
pub use core::{
    ChangeState, ClassId, ObjectId, RelationEndPointId, RelationError, Result, SyncState,
};
pub use mapping::{EndPointKind, RelationDefinition, RelationMapping};

pub use collection::{
    ChangeCachingCollectionData, ChangeDetectionStrategy, CollectionData,
    DomainObjectCollectionData, ReadOnlyCollectionData,
};
pub use command::{ExpandedCommand, RelationChange, RelationEndPointModification};
pub use endpoint::{
    ClientTransactionListener, CollectionEndPoint, InMemoryObjectStore, LoadedObject,
    NullTransactionListener, ObjectLoader, RealObjectEndPoint, TransactionEvent,
    TransactionEventLog,
};

/// Per-transaction relation bookkeeping
///
/// # Examples
///
/// ```
/// use relmemodb::{
///     InMemoryObjectStore, LoadedObject, ObjectId, RelationDefinition, RelationEndPointManager,
///     RelationMapping,
/// };
/// use std::sync::Arc;
///
/// # fn main() -> relmemodb::Result<()> {
/// let mapping = Arc::new(RelationMapping::new().with_relation(RelationDefinition::one_to_many(
///     "OrderToItems",
///     "Order",
///     "Order.OrderItems",
///     "OrderItem",
///     "OrderItem.Order",
/// ))?);
///
/// let order = ObjectId::from_name("Order", "o1");
/// let item = ObjectId::from_name("OrderItem", "i1");
/// let store = Arc::new(InMemoryObjectStore::new(Arc::clone(&mapping)));
/// store.put(LoadedObject::new(order.clone()))?;
/// store.put(LoadedObject::new(item.clone()).with_foreign_key("OrderItem.Order", Some(order.clone())))?;
///
/// let mut manager = RelationEndPointManager::new(mapping, store);
/// assert_eq!(manager.collection(&order, "Order.OrderItems")?.objects()?, vec![item.clone()]);
///
/// manager.set_related_object(&item, "OrderItem.Order", None)?;
/// assert_eq!(manager.collection(&order, "Order.OrderItems")?.count()?, 0);
///
/// manager.rollback()?;
/// assert_eq!(manager.related_object(&item, "OrderItem.Order")?, Some(order));
/// # Ok(())
/// # }
/// ```
pub use transaction::RelationEndPointManager;
pub use transaction::{BidirectionalRelationSyncService, DomainObjectCollection};
