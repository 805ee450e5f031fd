use crate::core::{ClassId, ObjectId, RelationEndPointId};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Orders the items of a collection end-point.
pub type SortComparer = Arc<dyn Fn(&ObjectId, &ObjectId) -> Ordering + Send + Sync>;

/// Which side of a one-to-many relation an end-point sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndPointKind {
    /// The "many" side, e.g. `Order.OrderItems`
    Collection,
    /// The foreign-key side, e.g. `OrderItem.Order`
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndPointDefinition {
    pub class_id: ClassId,
    pub property_name: String,
    pub mandatory: bool,
}

impl EndPointDefinition {
    pub fn new(class_id: impl Into<ClassId>, property_name: impl Into<String>) -> Self {
        Self {
            class_id: class_id.into(),
            property_name: property_name.into(),
            mandatory: false,
        }
    }
}

/// A bidirectional one-to-many relation between a collection property and
/// the foreign-key property pointing back at its owner.
#[derive(Clone)]
pub struct RelationDefinition {
    id: String,
    collection_end: EndPointDefinition,
    object_end: EndPointDefinition,
    sort_comparer: Option<SortComparer>,
}

impl RelationDefinition {
    /// `one_to_many("OrderToItems", "Order", "Order.OrderItems", "OrderItem", "OrderItem.Order")`
    pub fn one_to_many(
        id: impl Into<String>,
        collection_class: impl Into<ClassId>,
        collection_property: impl Into<String>,
        object_class: impl Into<ClassId>,
        object_property: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            collection_end: EndPointDefinition::new(collection_class, collection_property),
            object_end: EndPointDefinition::new(object_class, object_property),
            sort_comparer: None,
        }
    }

    pub fn with_sort_comparer(mut self, comparer: SortComparer) -> Self {
        self.sort_comparer = Some(comparer);
        self
    }

    /// The collection must contain at least one item on commit.
    pub fn mandatory_collection(mut self) -> Self {
        self.collection_end.mandatory = true;
        self
    }

    /// Every related object must reference an owner on commit.
    pub fn mandatory_reference(mut self) -> Self {
        self.object_end.mandatory = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection_end(&self) -> &EndPointDefinition {
        &self.collection_end
    }

    pub fn object_end(&self) -> &EndPointDefinition {
        &self.object_end
    }

    pub fn sort_comparer(&self) -> Option<&SortComparer> {
        self.sort_comparer.as_ref()
    }

    pub fn end_point(&self, kind: EndPointKind) -> &EndPointDefinition {
        match kind {
            EndPointKind::Collection => &self.collection_end,
            EndPointKind::Object => &self.object_end,
        }
    }

    /// Collection end-point of `owner` for this relation.
    pub fn collection_end_point_id(&self, owner: &ObjectId) -> RelationEndPointId {
        RelationEndPointId::new(owner.clone(), self.collection_end.property_name.clone())
    }

    /// Foreign-key end-point of `item` for this relation.
    pub fn object_end_point_id(&self, item: &ObjectId) -> RelationEndPointId {
        RelationEndPointId::new(item.clone(), self.object_end.property_name.clone())
    }
}

impl fmt::Debug for RelationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDefinition")
            .field("id", &self.id)
            .field("collection_end", &self.collection_end)
            .field("object_end", &self.object_end)
            .field("sorted", &self.sort_comparer.is_some())
            .finish()
    }
}
