use crate::core::ObjectId;
use std::collections::HashSet;

/// Compares live collection contents against the original snapshot.
pub trait ChangeDetectionStrategy: Send + Sync {
    fn has_data_changed(&self, current: &[ObjectId], original: &[ObjectId]) -> bool;
}

/// Set semantics: a collection only counts as changed when its membership differs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootCollectionChangeDetectionStrategy;

impl ChangeDetectionStrategy for RootCollectionChangeDetectionStrategy {
    fn has_data_changed(&self, current: &[ObjectId], original: &[ObjectId]) -> bool {
        if current.len() != original.len() {
            return true;
        }
        let original: HashSet<&ObjectId> = original.iter().collect();
        current.iter().any(|id| !original.contains(id))
    }
}

/// Sequence semantics: reordering is a change too.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubCollectionChangeDetectionStrategy;

impl ChangeDetectionStrategy for SubCollectionChangeDetectionStrategy {
    fn has_data_changed(&self, current: &[ObjectId], original: &[ObjectId]) -> bool {
        current != original
    }
}
