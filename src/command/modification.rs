// ============================================================================
// Relation End-Point Modifications
// ============================================================================
//
// One edit of one end-point. Every modification goes through five phases:
//
//   notify_client_transaction_of_begin  -> relation_changing       (may veto)
//   begin                               -> object_relation_changing (may veto)
//   perform                             -> mutates the end-point
//   end                                 -> object_relation_changed
//   notify_client_transaction_of_end    -> relation_changed
//
// `perform` never touches; callers touch once all modifications of a batch
// have been performed.
//
// ============================================================================

use crate::collection::{CollectionData, DomainObjectCollectionData};
use crate::core::{ObjectId, RelationEndPointId, Result};
use crate::endpoint::listener::ClientTransactionListener;
use crate::endpoint::map::RelationEndPointMap;
use serde::{Deserialize, Serialize};

/// What a modification changes, as reported to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationChange {
    pub end_point_id: RelationEndPointId,
    pub old_related: Option<ObjectId>,
    pub new_related: Option<ObjectId>,
}

impl RelationChange {
    pub fn new(
        end_point_id: RelationEndPointId,
        old_related: Option<ObjectId>,
        new_related: Option<ObjectId>,
    ) -> Self {
        Self {
            end_point_id,
            old_related,
            new_related,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationEndPointModification {
    CollectionInsert {
        end_point_id: RelationEndPointId,
        index: usize,
        inserted: ObjectId,
    },
    CollectionRemove {
        end_point_id: RelationEndPointId,
        removed: ObjectId,
    },
    CollectionReplace {
        end_point_id: RelationEndPointId,
        index: usize,
        replaced: ObjectId,
        replacement: ObjectId,
    },
    /// Replacing an item with itself; touches but changes nothing
    CollectionReplaceSame {
        end_point_id: RelationEndPointId,
        item: ObjectId,
    },
    /// The owning object is being deleted
    CollectionDelete { end_point_id: RelationEndPointId },
    CollectionSet {
        end_point_id: RelationEndPointId,
        new_items: Vec<ObjectId>,
    },
    ObjectSet {
        end_point_id: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    },
    /// Setting a reference to its current value
    ObjectSetSame {
        end_point_id: RelationEndPointId,
        value: Option<ObjectId>,
    },
}

impl RelationEndPointModification {
    pub fn end_point_id(&self) -> &RelationEndPointId {
        match self {
            Self::CollectionInsert { end_point_id, .. }
            | Self::CollectionRemove { end_point_id, .. }
            | Self::CollectionReplace { end_point_id, .. }
            | Self::CollectionReplaceSame { end_point_id, .. }
            | Self::CollectionDelete { end_point_id }
            | Self::CollectionSet { end_point_id, .. }
            | Self::ObjectSet { end_point_id, .. }
            | Self::ObjectSetSame { end_point_id, .. } => end_point_id,
        }
    }

    pub fn is_collection_modification(&self) -> bool {
        !matches!(self, Self::ObjectSet { .. } | Self::ObjectSetSame { .. })
    }

    /// True for the "same value" variants
    pub fn is_no_op(&self) -> bool {
        matches!(
            self,
            Self::CollectionReplaceSame { .. } | Self::ObjectSetSame { .. }
        )
    }

    pub fn relation_change(&self) -> RelationChange {
        let (old_related, new_related) = match self {
            Self::CollectionInsert { inserted, .. } => (None, Some(inserted.clone())),
            Self::CollectionRemove { removed, .. } => (Some(removed.clone()), None),
            Self::CollectionReplace {
                replaced,
                replacement,
                ..
            } => (Some(replaced.clone()), Some(replacement.clone())),
            Self::CollectionReplaceSame { item, .. } => (Some(item.clone()), Some(item.clone())),
            Self::CollectionDelete { .. } | Self::CollectionSet { .. } => (None, None),
            Self::ObjectSet { old, new, .. } => (old.clone(), new.clone()),
            Self::ObjectSetSame { value, .. } => (value.clone(), value.clone()),
        };
        RelationChange::new(self.end_point_id().clone(), old_related, new_related)
    }

    pub fn notify_client_transaction_of_begin(
        &self,
        listener: &dyn ClientTransactionListener,
    ) -> Result<()> {
        listener.relation_changing(&self.relation_change())
    }

    pub fn begin(&self, listener: &dyn ClientTransactionListener) -> Result<()> {
        listener.object_relation_changing(&self.relation_change())
    }

    pub fn perform(&self, map: &mut RelationEndPointMap) -> Result<()> {
        match self {
            Self::CollectionInsert {
                end_point_id,
                index,
                inserted,
            } => map
                .collection_data_mut(end_point_id)?
                .insert(*index, inserted.clone()),
            Self::CollectionRemove {
                end_point_id,
                removed,
            } => {
                map.collection_data_mut(end_point_id)?.remove(removed);
                Ok(())
            }
            Self::CollectionReplace {
                end_point_id,
                index,
                replacement,
                ..
            } => map
                .collection_data_mut(end_point_id)?
                .replace(*index, replacement.clone()),
            Self::CollectionDelete { end_point_id } => {
                map.collection_data_mut(end_point_id)?.clear();
                Ok(())
            }
            Self::CollectionSet {
                end_point_id,
                new_items,
            } => {
                let contents = DomainObjectCollectionData::from_items(new_items.iter().cloned())?;
                map.collection_data_mut(end_point_id)?
                    .replace_contents(contents.snapshot())
            }
            Self::ObjectSet {
                end_point_id, new, ..
            } => {
                map.object_mut(end_point_id)?
                    .set_opposite_object_id(new.clone());
                Ok(())
            }
            Self::CollectionReplaceSame { .. } | Self::ObjectSetSame { .. } => Ok(()),
        }
    }

    /// Mark the modified end-point as touched
    pub fn touch(&self, map: &mut RelationEndPointMap) -> Result<()> {
        if self.is_collection_modification() {
            map.collection_mut(self.end_point_id())?.touch();
        } else {
            map.object_mut(self.end_point_id())?.touch();
        }
        Ok(())
    }

    pub fn end(&self, listener: &dyn ClientTransactionListener) {
        listener.object_relation_changed(&self.relation_change());
    }

    pub fn notify_client_transaction_of_end(&self, listener: &dyn ClientTransactionListener) {
        listener.relation_changed(&self.relation_change());
    }
}
