// ============================================================================
// Collection Data Store
// ============================================================================
//
// Ordered, ID-keyed sequence of domain object references. The contents live
// behind an `Arc` so a snapshot can alias the live store until the first
// write (`Arc::make_mut` takes the private copy).
//
// ============================================================================

use crate::core::{ObjectId, RelationError, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct CollectionContents {
    items: Vec<ObjectId>,
    positions: HashMap<ObjectId, usize>,
}

impl CollectionContents {
    fn reindex_from(&mut self, start: usize) {
        for (index, id) in self.items.iter().enumerate().skip(start) {
            self.positions.insert(id.clone(), index);
        }
    }
}

/// Read-only handle on a collection's contents.
///
/// Cloning is cheap and never copies the items. Two handles are
/// [`ptr_eq`](Self::ptr_eq) when they share the same allocation.
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyCollectionData {
    contents: Arc<CollectionContents>,
}

impl ReadOnlyCollectionData {
    pub fn count(&self) -> usize {
        self.contents.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.items.is_empty()
    }

    pub fn contains_object_id(&self, id: &ObjectId) -> bool {
        self.contents.positions.contains_key(id)
    }

    pub fn get_object(&self, index: usize) -> Option<&ObjectId> {
        self.contents.items.get(index)
    }

    pub fn index_of(&self, id: &ObjectId) -> Option<usize> {
        self.contents.positions.get(id).copied()
    }

    pub fn as_slice(&self) -> &[ObjectId] {
        &self.contents.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObjectId> {
        self.contents.items.iter()
    }

    pub fn to_vec(&self) -> Vec<ObjectId> {
        self.contents.items.clone()
    }

    /// True when both handles share storage (not merely equal contents)
    pub fn ptr_eq(&self, other: &ReadOnlyCollectionData) -> bool {
        Arc::ptr_eq(&self.contents, &other.contents)
    }

    /// Copy of these contents with `item` appended; never touches shared storage
    pub(crate) fn with_added(&self, item: ObjectId) -> Result<ReadOnlyCollectionData> {
        let mut data = DomainObjectCollectionData::from_snapshot(self.clone());
        data.add(item)?;
        Ok(data.snapshot())
    }

    /// Copy of these contents without `id`
    pub(crate) fn without(&self, id: &ObjectId) -> ReadOnlyCollectionData {
        let mut data = DomainObjectCollectionData::from_snapshot(self.clone());
        data.remove(id);
        data.snapshot()
    }
}

/// Operations shared by the store and its decorators.
pub trait CollectionData {
    fn count(&self) -> usize;

    fn contains_object_id(&self, id: &ObjectId) -> bool;

    fn get_object(&self, index: usize) -> Option<&ObjectId>;

    fn index_of(&self, id: &ObjectId) -> Option<usize>;

    fn as_slice(&self) -> &[ObjectId];

    /// Read-only handle sharing the current contents
    fn snapshot(&self) -> ReadOnlyCollectionData;

    /// # Errors
    /// `IndexOutOfRange` if `index > count`, `InvalidOperation` on a duplicate ID
    fn insert(&mut self, index: usize, item: ObjectId) -> Result<()>;

    /// Returns false (and does nothing) if the item is absent
    fn remove(&mut self, id: &ObjectId) -> bool;

    /// # Errors
    /// `IndexOutOfRange` if there is no item at `index`, `InvalidOperation` if
    /// `item` is already contained at another position
    fn replace(&mut self, index: usize, item: ObjectId) -> Result<()>;

    fn clear(&mut self);

    fn sort(&mut self, comparer: &dyn Fn(&ObjectId, &ObjectId) -> Ordering);

    /// Make the contents equal to `contents`, sharing its storage where possible
    fn replace_contents(&mut self, contents: ReadOnlyCollectionData) -> Result<()>;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    fn add(&mut self, item: ObjectId) -> Result<()> {
        self.insert(self.count(), item)
    }

    fn get_object_by_id(&self, id: &ObjectId) -> Option<&ObjectId> {
        self.index_of(id).and_then(|index| self.get_object(index))
    }

    fn iter(&self) -> std::slice::Iter<'_, ObjectId> {
        self.as_slice().iter()
    }
}

/// The plain store at the bottom of every collection pipeline.
#[derive(Debug, Clone, Default)]
pub struct DomainObjectCollectionData {
    contents: Arc<CollectionContents>,
}

impl DomainObjectCollectionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns error if `items` contains the same ID twice
    pub fn from_items(items: impl IntoIterator<Item = ObjectId>) -> Result<Self> {
        let mut data = Self::new();
        for item in items {
            data.add(item)?;
        }
        Ok(data)
    }

    pub fn from_snapshot(snapshot: ReadOnlyCollectionData) -> Self {
        Self {
            contents: snapshot.contents,
        }
    }

    fn contents_mut(&mut self) -> &mut CollectionContents {
        Arc::make_mut(&mut self.contents)
    }
}

impl CollectionData for DomainObjectCollectionData {
    fn count(&self) -> usize {
        self.contents.items.len()
    }

    fn contains_object_id(&self, id: &ObjectId) -> bool {
        self.contents.positions.contains_key(id)
    }

    fn get_object(&self, index: usize) -> Option<&ObjectId> {
        self.contents.items.get(index)
    }

    fn index_of(&self, id: &ObjectId) -> Option<usize> {
        self.contents.positions.get(id).copied()
    }

    fn as_slice(&self) -> &[ObjectId] {
        &self.contents.items
    }

    fn snapshot(&self) -> ReadOnlyCollectionData {
        ReadOnlyCollectionData {
            contents: Arc::clone(&self.contents),
        }
    }

    fn insert(&mut self, index: usize, item: ObjectId) -> Result<()> {
        let count = self.count();
        if index > count {
            return Err(RelationError::IndexOutOfRange { index, count });
        }
        if self.contains_object_id(&item) {
            return Err(RelationError::InvalidOperation(format!(
                "The collection already contains an object with ID '{}'.",
                item
            )));
        }

        let contents = self.contents_mut();
        contents.items.insert(index, item);
        contents.reindex_from(index);
        Ok(())
    }

    fn remove(&mut self, id: &ObjectId) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };

        let contents = self.contents_mut();
        contents.items.remove(index);
        contents.positions.remove(id);
        contents.reindex_from(index);
        true
    }

    fn replace(&mut self, index: usize, item: ObjectId) -> Result<()> {
        let count = self.count();
        if index >= count {
            return Err(RelationError::IndexOutOfRange { index, count });
        }
        if self.contents.items[index] == item {
            return Ok(());
        }
        if self.contains_object_id(&item) {
            return Err(RelationError::InvalidOperation(format!(
                "The collection already contains an object with ID '{}'.",
                item
            )));
        }

        let contents = self.contents_mut();
        let old = std::mem::replace(&mut contents.items[index], item.clone());
        contents.positions.remove(&old);
        contents.positions.insert(item, index);
        Ok(())
    }

    fn clear(&mut self) {
        if !self.is_empty() {
            self.contents = Arc::new(CollectionContents::default());
        }
    }

    fn sort(&mut self, comparer: &dyn Fn(&ObjectId, &ObjectId) -> Ordering) {
        let contents = self.contents_mut();
        contents.items.sort_by(|a, b| comparer(a, b));
        contents.reindex_from(0);
    }

    fn replace_contents(&mut self, contents: ReadOnlyCollectionData) -> Result<()> {
        self.contents = contents.contents;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str) -> ObjectId {
        ObjectId::from_name("OrderItem", name)
    }

    #[test]
    fn test_insert_keeps_order_and_index() {
        let mut data = DomainObjectCollectionData::new();
        data.add(item("a")).unwrap();
        data.add(item("c")).unwrap();
        data.insert(1, item("b")).unwrap();

        assert_eq!(data.as_slice(), &[item("a"), item("b"), item("c")]);
        assert_eq!(data.index_of(&item("c")), Some(2));
        assert_eq!(data.get_object_by_id(&item("b")), Some(&item("b")));
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut data = DomainObjectCollectionData::new();
        let err = data.insert(1, item("a")).unwrap_err();
        assert_eq!(err, RelationError::IndexOutOfRange { index: 1, count: 0 });
        assert!(data.is_empty());
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut data = DomainObjectCollectionData::from_items([item("a")]).unwrap();
        assert!(matches!(
            data.add(item("a")),
            Err(RelationError::InvalidOperation(_))
        ));
        assert_eq!(data.count(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut data = DomainObjectCollectionData::from_items([item("a"), item("b")]).unwrap();
        assert!(!data.remove(&item("z")));
        assert!(data.remove(&item("a")));
        assert_eq!(data.index_of(&item("b")), Some(0));
        assert!(!data.contains_object_id(&item("a")));
    }

    #[test]
    fn test_replace() {
        let mut data = DomainObjectCollectionData::from_items([item("a"), item("b")]).unwrap();
        data.replace(0, item("x")).unwrap();
        assert_eq!(data.as_slice(), &[item("x"), item("b")]);
        assert_eq!(data.index_of(&item("a")), None);
        assert_eq!(data.index_of(&item("x")), Some(0));

        assert!(matches!(
            data.replace(2, item("y")),
            Err(RelationError::IndexOutOfRange { index: 2, count: 2 })
        ));
        assert!(matches!(
            data.replace(0, item("b")),
            Err(RelationError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_sort_reindexes() {
        let mut data =
            DomainObjectCollectionData::from_items([item("a"), item("b"), item("c")]).unwrap();
        let order = [item("c"), item("a"), item("b")];
        data.sort(&|x, y| {
            let px = order.iter().position(|o| o == x);
            let py = order.iter().position(|o| o == y);
            px.cmp(&py)
        });
        assert_eq!(data.as_slice(), &order);
        assert_eq!(data.index_of(&item("b")), Some(2));
    }

    #[test]
    fn test_snapshot_is_copy_on_write() {
        let mut data = DomainObjectCollectionData::from_items([item("a")]).unwrap();
        let before = data.snapshot();
        assert!(before.ptr_eq(&data.snapshot()));

        data.add(item("b")).unwrap();
        assert!(!before.ptr_eq(&data.snapshot()));
        assert_eq!(before.as_slice(), &[item("a")]);
        assert_eq!(data.count(), 2);
    }

    #[test]
    fn test_clear_leaves_snapshot_intact() {
        let mut data = DomainObjectCollectionData::from_items([item("a")]).unwrap();
        let before = data.snapshot();
        data.replace(0, item("a")).unwrap();
        assert!(before.ptr_eq(&data.snapshot()));
        data.clear();
        assert!(data.is_empty());
        assert_eq!(before.count(), 1);
    }

    #[test]
    fn test_replace_contents_shares_storage() {
        let source = DomainObjectCollectionData::from_items([item("a"), item("b")]).unwrap();
        let mut target = DomainObjectCollectionData::from_items([item("z")]).unwrap();
        target.replace_contents(source.snapshot()).unwrap();
        assert!(target.snapshot().ptr_eq(&source.snapshot()));
        assert_eq!(target.index_of(&item("b")), Some(1));
    }
}
