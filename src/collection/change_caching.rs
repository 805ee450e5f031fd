// ============================================================================
// Change-Caching Decorator
// ============================================================================
//
// Keeps the original data of a collection and caches whether the live
// contents differ from it.
//
// The original handle aliases the live store until the first divergent write.
// While aliased, `register_original_item`, `unregister_original_item` and
// `sort_original_and_current` edit both sides at once; afterwards they only
// touch what they have to. The cached result is bound to the original handle
// it was computed against and is ignored once that handle is replaced.
//
// Notifications:
//   structural mutation  -> Unknown
//   sort                 -> none, the cached flag is kept
//   has_changed (miss)   -> Changed / Unchanged
//   commit / rollback    -> Unchanged
//
// ============================================================================

use super::data::{CollectionData, ReadOnlyCollectionData};
use super::strategy::ChangeDetectionStrategy;
use super::tracking::EndPointTrackingCollectionData;
use crate::core::{ChangeState, ObjectId, RelationError, Result};
use crate::endpoint::listener::StateUpdateListener;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CachedChange {
    changed: bool,
    computed_against: ReadOnlyCollectionData,
}

pub struct ChangeCachingCollectionData<D = EndPointTrackingCollectionData> {
    wrapped: D,
    original: ReadOnlyCollectionData,
    cache: Option<CachedChange>,
    listener: Arc<dyn StateUpdateListener>,
}

impl<D: CollectionData> ChangeCachingCollectionData<D> {
    /// The original data starts out as a shared view of `wrapped`.
    pub fn new(wrapped: D, listener: Arc<dyn StateUpdateListener>) -> Self {
        let original = wrapped.snapshot();
        Self {
            wrapped,
            original,
            cache: None,
            listener,
        }
    }

    pub fn wrapped(&self) -> &D {
        &self.wrapped
    }

    pub fn original_data(&self) -> ReadOnlyCollectionData {
        self.original.clone()
    }

    /// True while the original data still shares storage with the live store
    pub fn shares_original_with_current(&self) -> bool {
        self.original.ptr_eq(&self.wrapped.snapshot())
    }

    pub fn is_cache_up_to_date(&self) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|cached| cached.computed_against.ptr_eq(&self.original))
    }

    /// Cached change state, `Unknown` when the cache is stale
    pub fn cached_state(&self) -> ChangeState {
        match &self.cache {
            Some(cached) if cached.computed_against.ptr_eq(&self.original) => {
                ChangeState::from_changed(cached.changed)
            }
            _ => ChangeState::Unknown,
        }
    }

    pub fn has_changed(&mut self, strategy: &dyn ChangeDetectionStrategy) -> bool {
        if let Some(changed) = self.cached_state().as_bool() {
            return changed;
        }

        let changed = strategy.has_data_changed(self.wrapped.as_slice(), self.original.as_slice());
        self.cache = Some(CachedChange {
            changed,
            computed_against: self.original.clone(),
        });
        self.listener.state_updated(ChangeState::from_changed(changed));
        changed
    }

    /// Make the current contents the new original data
    pub fn commit(&mut self) {
        self.original = self.wrapped.snapshot();
        self.mark_unchanged();
    }

    /// Restore the live contents from the original data
    ///
    /// # Errors
    /// Returns error if the wrapped store rejects the original contents
    pub fn rollback(&mut self) -> Result<()> {
        self.wrapped.replace_contents(self.original.clone())?;
        self.mark_unchanged();
        Ok(())
    }

    /// Add `item` to the original data (and to the live data if missing)
    ///
    /// # Errors
    /// Returns error if the original data already contains the item
    pub fn register_original_item(&mut self, item: ObjectId) -> Result<()> {
        if self.original.contains_object_id(&item) {
            return Err(RelationError::InvalidOperation(format!(
                "The original collection already contains a domain object with ID '{}'.",
                item
            )));
        }

        if self.shares_original_with_current() {
            return self.edit_shared(|data| data.add(item));
        }

        let original = self.original.with_added(item.clone())?;
        if !self.wrapped.contains_object_id(&item) {
            self.wrapped.add(item)?;
        }
        self.original = original;
        self.on_data_changed();
        Ok(())
    }

    /// Remove `id` from the original data (and from the live data if present)
    ///
    /// # Errors
    /// Returns error if the original data does not contain the item
    pub fn unregister_original_item(&mut self, id: &ObjectId) -> Result<()> {
        if !self.original.contains_object_id(id) {
            return Err(RelationError::InvalidOperation(format!(
                "The original collection does not contain a domain object with ID '{}'.",
                id
            )));
        }

        if self.shares_original_with_current() {
            self.edit_shared(|data| data.remove(id));
            return Ok(());
        }

        self.original = self.original.without(id);
        self.wrapped.remove(id);
        self.on_data_changed();
        Ok(())
    }

    /// Sort the live data, and the original data along with it while both are shared.
    /// Once they have split, only the live data is sorted and the cached flag is kept.
    pub fn sort_original_and_current(&mut self, comparer: &dyn Fn(&ObjectId, &ObjectId) -> Ordering) {
        if self.shares_original_with_current() {
            self.edit_shared(|data| data.sort(comparer));
        } else {
            self.wrapped.sort(comparer);
        }
    }

    /// Apply `edit` to the live store while the original data aliases it, and keep
    /// them aliased. A valid cache stays valid: both sides change together.
    fn edit_shared<R>(&mut self, edit: impl FnOnce(&mut D) -> R) -> R {
        let cached = self
            .cache
            .take()
            .filter(|cached| cached.computed_against.ptr_eq(&self.original))
            .map(|cached| cached.changed);
        self.original = ReadOnlyCollectionData::default();

        let result = edit(&mut self.wrapped);

        self.original = self.wrapped.snapshot();
        self.cache = cached.map(|changed| CachedChange {
            changed,
            computed_against: self.original.clone(),
        });
        result
    }

    fn mark_unchanged(&mut self) {
        self.cache = Some(CachedChange {
            changed: false,
            computed_against: self.original.clone(),
        });
        self.listener.state_updated(ChangeState::Unchanged);
    }

    fn on_data_changed(&mut self) {
        self.cache = None;
        self.listener.state_updated(ChangeState::Unknown);
    }
}

impl<D: CollectionData> CollectionData for ChangeCachingCollectionData<D> {
    fn count(&self) -> usize {
        self.wrapped.count()
    }

    fn contains_object_id(&self, id: &ObjectId) -> bool {
        self.wrapped.contains_object_id(id)
    }

    fn get_object(&self, index: usize) -> Option<&ObjectId> {
        self.wrapped.get_object(index)
    }

    fn index_of(&self, id: &ObjectId) -> Option<usize> {
        self.wrapped.index_of(id)
    }

    fn as_slice(&self) -> &[ObjectId] {
        self.wrapped.as_slice()
    }

    fn snapshot(&self) -> ReadOnlyCollectionData {
        self.wrapped.snapshot()
    }

    fn insert(&mut self, index: usize, item: ObjectId) -> Result<()> {
        self.wrapped.insert(index, item)?;
        self.on_data_changed();
        Ok(())
    }

    fn remove(&mut self, id: &ObjectId) -> bool {
        let removed = self.wrapped.remove(id);
        if removed {
            self.on_data_changed();
        }
        removed
    }

    fn replace(&mut self, index: usize, item: ObjectId) -> Result<()> {
        if self.wrapped.get_object(index) == Some(&item) {
            return Ok(());
        }
        self.wrapped.replace(index, item)?;
        self.on_data_changed();
        Ok(())
    }

    fn clear(&mut self) {
        self.wrapped.clear();
        self.on_data_changed();
    }

    fn sort(&mut self, comparer: &dyn Fn(&ObjectId, &ObjectId) -> Ordering) {
        self.wrapped.sort(comparer);
        self.on_data_changed();
    }

    fn replace_contents(&mut self, contents: ReadOnlyCollectionData) -> Result<()> {
        self.wrapped.replace_contents(contents)?;
        self.on_data_changed();
        Ok(())
    }
}
