use super::manager::RelationEndPointManager;
use crate::command::{ExpandedCommand, RelationEndPointModification};
use crate::core::{ObjectId, RelationEndPointId, Result};

/// Mutable view of one collection end-point. Every edit is expanded into the
/// implied foreign-key and opposite-collection edits before it runs.
pub struct DomainObjectCollection<'a> {
    manager: &'a mut RelationEndPointManager,
    end_point_id: RelationEndPointId,
}

impl<'a> DomainObjectCollection<'a> {
    pub(crate) fn new(manager: &'a mut RelationEndPointManager, end_point_id: RelationEndPointId) -> Self {
        Self {
            manager,
            end_point_id,
        }
    }

    pub fn end_point_id(&self) -> &RelationEndPointId {
        &self.end_point_id
    }

    pub fn objects(&mut self) -> Result<Vec<ObjectId>> {
        let data = self
            .manager
            .with_collection(&self.end_point_id, |end_point| end_point.get_data())?;
        Ok(data.to_vec())
    }

    pub fn original_objects(&mut self) -> Result<Vec<ObjectId>> {
        let data = self
            .manager
            .with_collection(&self.end_point_id, |end_point| end_point.get_original_data())?;
        Ok(data.to_vec())
    }

    pub fn get(&mut self, index: usize) -> Result<Option<ObjectId>> {
        let data = self
            .manager
            .with_collection(&self.end_point_id, |end_point| end_point.get_data())?;
        Ok(data.get_object(index).cloned())
    }

    pub fn count(&mut self) -> Result<usize> {
        let data = self
            .manager
            .with_collection(&self.end_point_id, |end_point| end_point.get_data())?;
        Ok(data.count())
    }

    pub fn contains(&mut self, item: &ObjectId) -> Result<bool> {
        let data = self
            .manager
            .with_collection(&self.end_point_id, |end_point| end_point.get_data())?;
        Ok(data.contains_object_id(item))
    }

    pub fn is_data_complete(&self) -> bool {
        self.manager
            .collection_end_point(&self.end_point_id)
            .is_some_and(|end_point| end_point.is_data_complete())
    }

    pub fn has_changed(&mut self) -> Result<bool> {
        self.manager
            .with_collection(&self.end_point_id, |end_point| Ok(end_point.has_changed()))
    }

    pub fn has_been_touched(&self) -> bool {
        self.manager
            .collection_end_point(&self.end_point_id)
            .is_some_and(|end_point| end_point.has_been_touched())
    }

    pub fn add(&mut self, item: ObjectId) -> Result<()> {
        self.manager.load_object(&item)?;
        let add = self
            .manager
            .with_collection(&self.end_point_id, |end_point| end_point.create_add_command(item))?;
        self.run(add)
    }

    pub fn insert(&mut self, index: usize, item: ObjectId) -> Result<()> {
        self.manager.load_object(&item)?;
        let insert = self.manager.with_collection(&self.end_point_id, |end_point| {
            end_point.create_insert_command(index, item)
        })?;
        self.run(insert)
    }

    /// `Ok(false)` if `item` is not in the collection
    pub fn remove(&mut self, item: &ObjectId) -> Result<bool> {
        if !self.contains(item)? {
            return Ok(false);
        }
        let remove = self.manager.with_collection(&self.end_point_id, |end_point| {
            end_point.create_remove_command(item)
        })?;
        self.run(remove)?;
        Ok(true)
    }

    pub fn replace(&mut self, index: usize, replacement: ObjectId) -> Result<()> {
        self.manager.load_object(&replacement)?;
        let replace = self.manager.with_collection(&self.end_point_id, |end_point| {
            end_point.create_replace_command(index, replacement)
        })?;
        self.run(replace)
    }

    /// Replace the whole contents with `items`
    pub fn set_contents(&mut self, items: Vec<ObjectId>) -> Result<()> {
        for item in &items {
            self.manager.load_object(item)?;
        }
        let set = self.manager.with_collection(&self.end_point_id, |end_point| {
            end_point.create_set_collection_command(items)
        })?;
        self.run(set)
    }

    /// Remove every item, last to first. Listeners see all removals announced
    /// before any of them is performed; an empty collection is only touched.
    pub fn clear(&mut self) -> Result<()> {
        let items = self.objects()?;
        if items.is_empty() {
            return self
                .manager
                .with_collection(&self.end_point_id, |end_point| {
                    end_point.touch();
                    Ok(())
                });
        }

        let mut batch = ExpandedCommand::default();
        for item in items.iter().rev() {
            let remove = self.manager.with_collection(&self.end_point_id, |end_point| {
                end_point.create_remove_command(item)
            })?;
            batch = batch.combine(self.manager.expand(remove)?);
        }
        self.manager.execute_batch(&batch)
    }

    /// Discard the loaded contents; they are reloaded on next access.
    pub fn unload(&mut self) -> Result<()> {
        self.manager.unload_collection(&self.end_point_id)
    }

    fn run(&mut self, modification: RelationEndPointModification) -> Result<()> {
        let expanded = self.manager.expand(modification)?;
        self.manager.execute(&expanded)
    }
}
