// ============================================================================
// Relation End-Point Manager
// ============================================================================
//
// Per-transaction registry of every relation end-point. The manager owns all
// end-points; end-points refer to each other only by `RelationEndPointId`.
//
// Every call into a collection end-point goes through `with_collection`,
// which applies the end-point's report afterwards:
//   - loaded items are loaded as objects (registering their foreign keys)
//   - sync-state updates are applied to the real object end-points
//
// Single edits are expanded into all implied edits before they run:
//
//   insert X into A      [X.fk := A, A.insert X, B.remove X]
//   remove X from A      [X.fk := none, A.remove X]
//   replace O by N in A  [O.fk := none, N.fk := A, A.replace, B.remove N]
//   X.fk := C (was B)    [B.remove X, X.fk := C, C.add X]
//
// ============================================================================

use super::collection::DomainObjectCollection;
use crate::command::{ExpandedCommand, RelationEndPointModification};
use crate::config::RelationConfig;
use crate::core::{ObjectId, RelationEndPointId, RelationError, Result};
use crate::endpoint::{
    ClientTransactionListener, CollectionEndPoint, CollectionEndPointServices, EndPointReport,
    NullTransactionListener, ObjectLoader, RealObjectEndPoint, RelationEndPointMap,
};
use crate::mapping::{EndPointKind, RelationDefinition, RelationMapping};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{Level, event, info_span};

pub struct RelationEndPointManager {
    config: RelationConfig,
    mapping: Arc<RelationMapping>,
    loader: Arc<dyn ObjectLoader>,
    listener: Arc<dyn ClientTransactionListener>,
    end_points: RelationEndPointMap,

    // Loaded or created in this transaction; includes deleted objects until commit.
    known_objects: HashSet<ObjectId>,
    new_objects: HashSet<ObjectId>,
    deleted_objects: HashSet<ObjectId>,
}

impl RelationEndPointManager {
    pub fn new(mapping: Arc<RelationMapping>, loader: Arc<dyn ObjectLoader>) -> Self {
        Self {
            config: RelationConfig::default(),
            mapping,
            loader,
            listener: Arc::new(NullTransactionListener),
            end_points: RelationEndPointMap::new(),
            known_objects: HashSet::new(),
            new_objects: HashSet::new(),
            deleted_objects: HashSet::new(),
        }
    }

    pub fn with_config(mut self, config: RelationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ClientTransactionListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    pub fn mapping(&self) -> &Arc<RelationMapping> {
        &self.mapping
    }

    pub fn end_points(&self) -> &RelationEndPointMap {
        &self.end_points
    }

    pub fn collection_end_point(&self, id: &RelationEndPointId) -> Option<&CollectionEndPoint> {
        self.end_points.collection(id)
    }

    pub fn object_end_point(&self, id: &RelationEndPointId) -> Option<&RealObjectEndPoint> {
        self.end_points.object(id)
    }

    pub fn is_known(&self, id: &ObjectId) -> bool {
        self.known_objects.contains(id)
    }

    pub fn is_new(&self, id: &ObjectId) -> bool {
        self.new_objects.contains(id)
    }

    pub fn is_deleted(&self, id: &ObjectId) -> bool {
        self.deleted_objects.contains(id)
    }

    fn services(&self) -> CollectionEndPointServices {
        CollectionEndPointServices {
            provider: self.mapping.clone(),
            loader: Arc::clone(&self.loader),
            sink: Arc::clone(&self.listener),
            strategy: self.config.change_detection.strategy(),
            sort_on_load: self.config.sort_on_load,
        }
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Create a new object of `class_id`. Its collections start out complete and empty.
    pub fn new_object(&mut self, class_id: &str) -> Result<ObjectId> {
        let id = ObjectId::new(class_id);
        self.known_objects.insert(id.clone());
        self.new_objects.insert(id.clone());

        for definition in self.mapping.object_relations_of(id.class_id()) {
            self.register_object_end_point(&definition, &id, None)?;
        }
        for definition in self.mapping.collection_relations_of(id.class_id()) {
            self.get_or_create_collection_end_point(&definition.collection_end_point_id(&id))?;
        }

        event!(Level::DEBUG, object = %id, "new object registered");
        Ok(id)
    }

    /// Load `id` from the backing store unless it is known already.
    pub fn load_object(&mut self, id: &ObjectId) -> Result<()> {
        self.check_not_deleted(id)?;
        if self.is_known(id) {
            return Ok(());
        }

        let span = info_span!("relation.object.load", object = %id);
        let _enter = span.enter();

        let loaded = self.loader.load_object(id).inspect_err(|err| {
            event!(Level::ERROR, error = %err, "object load failed");
        })?;
        self.known_objects.insert(id.clone());
        for definition in self.mapping.object_relations_of(id.class_id()) {
            let owner = loaded
                .foreign_key(&definition.object_end().property_name)
                .cloned();
            self.register_object_end_point(&definition, id, owner)?;
        }

        event!(Level::DEBUG, "object loaded");
        Ok(())
    }

    fn check_not_deleted(&self, id: &ObjectId) -> Result<()> {
        if self.is_deleted(id) {
            return Err(RelationError::ObjectDeleted(id.clone()));
        }
        Ok(())
    }

    fn register_object_end_point(
        &mut self,
        definition: &Arc<RelationDefinition>,
        id: &ObjectId,
        original_owner: Option<ObjectId>,
    ) -> Result<()> {
        let end_point_id = definition.object_end_point_id(id);
        self.end_points.insert_object(RealObjectEndPoint::new(
            end_point_id.clone(),
            Arc::clone(definition),
            original_owner.clone(),
        ));

        if let Some(owner) = original_owner {
            let collection_id = definition.collection_end_point_id(&owner);
            self.with_collection(&collection_id, |end_point| {
                end_point.register_original_opposite_end_point(end_point_id)
            })?;
        }
        Ok(())
    }

    /// Delete `id`: its collections are emptied, its items lose their reference
    /// to it, and it is removed from the collections it belongs to.
    pub fn delete_object(&mut self, id: &ObjectId) -> Result<()> {
        self.load_object(id)?;

        let span = info_span!("relation.object.delete", object = %id);
        let _enter = span.enter();

        let mut expanded = ExpandedCommand::default();
        for definition in self.mapping.collection_relations_of(id.class_id()) {
            let collection_id = definition.collection_end_point_id(id);
            let delete = self.with_collection(&collection_id, |end_point| {
                end_point.create_delete_command()
            })?;
            expanded = expanded.combine(self.expand(delete)?);
        }
        for definition in self.mapping.object_relations_of(id.class_id()) {
            let set = self.object_set_command(&definition, id, None)?;
            expanded = expanded.combine(self.expand(set)?);
        }
        self.execute(&expanded)?;

        if self.new_objects.remove(id) {
            self.end_points.remove_end_points_of(id);
            self.known_objects.remove(id);
        } else {
            self.deleted_objects.insert(id.clone());
        }
        event!(Level::DEBUG, "object deleted");
        Ok(())
    }

    /// Forget an unchanged object. Loaded collections it was registered with
    /// become incomplete and are reloaded on next access.
    pub fn unload_object(&mut self, id: &ObjectId) -> Result<()> {
        if !self.is_known(id) {
            return Ok(());
        }
        self.check_not_deleted(id)?;
        if self.is_new(id) {
            return Err(RelationError::InvalidOperation(format!(
                "New object '{}' cannot be unloaded.",
                id
            )));
        }

        let object_end_point_ids: Vec<_> = self
            .end_points
            .object_ids()
            .into_iter()
            .filter(|end_point_id| end_point_id.object_id() == id)
            .collect();
        let collection_ids: Vec<_> = self
            .end_points
            .collection_ids()
            .into_iter()
            .filter(|end_point_id| end_point_id.object_id() == id)
            .collect();

        for end_point_id in &object_end_point_ids {
            let end_point = self.end_points.object_mut(end_point_id)?;
            let changed = end_point.has_changed();
            let opposite = end_point.original_opposite_end_point_id();
            let opposite_changed = match &opposite {
                Some(opposite) => self
                    .end_points
                    .collection_mut(opposite)
                    .map(|collection| collection.has_changed())
                    .unwrap_or(false),
                None => false,
            };
            if changed || opposite_changed {
                return Err(RelationError::InvalidOperation(format!(
                    "Object '{}' cannot be unloaded because its relation '{}' has changed.",
                    id,
                    end_point_id.property_name()
                )));
            }
        }
        for collection_id in &collection_ids {
            if self.end_points.collection_mut(collection_id)?.has_changed() {
                return Err(RelationError::InvalidOperation(format!(
                    "Object '{}' cannot be unloaded because its relation '{}' has changed.",
                    id,
                    collection_id.property_name()
                )));
            }
        }

        let span = info_span!("relation.object.unload", object = %id);
        let _enter = span.enter();

        for end_point_id in object_end_point_ids {
            let opposite = self
                .end_points
                .object(&end_point_id)
                .and_then(|end_point| end_point.original_opposite_end_point_id());
            if let Some(opposite) = opposite {
                if self.end_points.contains_collection(&opposite) {
                    self.with_collection(&opposite, |collection| {
                        collection.unregister_original_opposite_end_point(&end_point_id)
                    })?;
                }
            }
            self.end_points.remove_object(&end_point_id);
        }
        for collection_id in collection_ids {
            self.with_collection(&collection_id, |collection| collection.mark_data_incomplete())?;
        }
        self.known_objects.remove(id);
        event!(Level::DEBUG, "object unloaded");
        Ok(())
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// Collection façade for `owner`'s collection property
    pub fn collection(
        &mut self,
        owner: &ObjectId,
        property_name: &str,
    ) -> Result<DomainObjectCollection<'_>> {
        self.load_object(owner)?;
        let end_point_id = RelationEndPointId::new(owner.clone(), property_name);
        self.get_or_create_collection_end_point(&end_point_id)?;
        Ok(DomainObjectCollection::new(self, end_point_id))
    }

    pub fn related_object(
        &mut self,
        object: &ObjectId,
        property_name: &str,
    ) -> Result<Option<ObjectId>> {
        self.load_object(object)?;
        let end_point_id = RelationEndPointId::new(object.clone(), property_name);
        self.require_kind(&end_point_id, EndPointKind::Object)?;
        let end_point = self
            .end_points
            .object(&end_point_id)
            .ok_or_else(|| RelationError::EndPointNotFound(end_point_id.clone()))?;
        Ok(end_point.opposite_object_id().cloned())
    }

    /// Set the foreign-key side of a relation, moving `object` between collections.
    pub fn set_related_object(
        &mut self,
        object: &ObjectId,
        property_name: &str,
        new_owner: Option<ObjectId>,
    ) -> Result<()> {
        self.load_object(object)?;
        let end_point_id = RelationEndPointId::new(object.clone(), property_name);
        let definition = self.require_kind(&end_point_id, EndPointKind::Object)?;

        let set = self.object_set_command(&definition, object, new_owner)?;
        let expanded = self.expand(set)?;
        self.execute(&expanded)
    }

    /// Discard the loaded data of a collection; no-op if it was never created.
    pub fn unload_collection(&mut self, id: &RelationEndPointId) -> Result<()> {
        if !self.end_points.contains_collection(id) {
            return Ok(());
        }
        self.with_collection(id, |end_point| end_point.mark_data_incomplete())
    }

    /// Copy the collection `id` from `source` into this manager.
    pub fn set_collection_from(
        &mut self,
        source: &mut RelationEndPointManager,
        id: &RelationEndPointId,
    ) -> Result<()> {
        source.get_or_create_collection_end_point(id)?;
        self.get_or_create_collection_end_point(id)?;

        let source_end_point = source.end_points.collection_mut(id)?;
        let target = self.end_points.collection_mut(id)?;
        let result = target.set_data_from(source_end_point);

        let source_report = source_end_point.take_report();
        let target_report = target.take_report();
        source.apply_report(source_report)?;
        self.apply_report(target_report)?;
        result
    }

    /// Copy the real end-point `id` from `source` into this manager.
    pub fn set_object_from(
        &mut self,
        source: &RelationEndPointManager,
        id: &RelationEndPointId,
    ) -> Result<()> {
        let source_end_point = source
            .end_points
            .object(id)
            .ok_or_else(|| RelationError::EndPointNotFound(id.clone()))?;
        self.load_object(id.object_id())?;
        let target = self.end_points.object_mut(id)?;
        target.set_opposite_object_id(source_end_point.opposite_object_id().cloned());
        if source_end_point.has_been_touched() || target.has_changed() {
            target.touch();
        }
        Ok(())
    }

    // ========================================================================
    // Transaction
    // ========================================================================

    pub fn commit(&mut self) -> Result<()> {
        let span = info_span!("relation.transaction.commit", end_points = self.end_points.len());
        let _enter = span.enter();

        if self.config.validate_mandatory_on_commit {
            self.validate_mandatory_relations().inspect_err(|err| {
                event!(Level::WARN, error = %err, "commit rejected");
            })?;
        }

        for end_point in self.end_points.collections_mut() {
            end_point.commit();
        }
        for end_point in self.end_points.objects_mut() {
            end_point.commit();
        }
        for id in self.deleted_objects.drain() {
            self.end_points.remove_end_points_of(&id);
            self.known_objects.remove(&id);
        }
        self.new_objects.clear();

        event!(Level::INFO, "relation transaction committed");
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        let span = info_span!("relation.transaction.rollback", end_points = self.end_points.len());
        let _enter = span.enter();

        for end_point in self.end_points.collections_mut() {
            end_point.rollback()?;
        }
        for end_point in self.end_points.objects_mut() {
            end_point.rollback();
        }
        for id in self.new_objects.drain() {
            self.end_points.remove_end_points_of(&id);
            self.known_objects.remove(&id);
        }
        self.deleted_objects.clear();

        event!(Level::INFO, "relation transaction rolled back");
        Ok(())
    }

    /// Mandatory relations of every live object. Unloaded collections are not checked.
    pub fn validate_mandatory_relations(&mut self) -> Result<()> {
        for id in self.end_points.object_ids() {
            if self.is_deleted(id.object_id()) {
                continue;
            }
            let end_point = self.end_points.object_mut(&id)?;
            if end_point.definition().object_end().mandatory {
                end_point.check_mandatory()?;
            }
        }
        for id in self.end_points.collection_ids() {
            if self.is_deleted(id.object_id()) {
                continue;
            }
            let end_point = self.end_points.collection_mut(&id)?;
            if end_point.definition().collection_end().mandatory && end_point.is_data_complete() {
                end_point.check_mandatory()?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Plumbing shared with the façade and the sync service
    // ========================================================================

    fn require_kind(
        &self,
        id: &RelationEndPointId,
        expected: EndPointKind,
    ) -> Result<Arc<RelationDefinition>> {
        let (definition, kind) = self.mapping.resolve(id)?;
        if kind != expected {
            return Err(RelationError::InvalidOperation(format!(
                "'{}' is not a {} end-point.",
                id,
                match expected {
                    EndPointKind::Collection => "collection",
                    EndPointKind::Object => "object",
                }
            )));
        }
        Ok(Arc::clone(definition))
    }

    pub(crate) fn get_or_create_collection_end_point(&mut self, id: &RelationEndPointId) -> Result<()> {
        if self.end_points.contains_collection(id) {
            return Ok(());
        }
        let definition = self.require_kind(id, EndPointKind::Collection)?;

        let mut end_point = CollectionEndPoint::new(id.clone(), definition, &self.services());
        if self.is_new(id.object_id()) {
            end_point.mark_data_complete(&[])?;
            end_point.take_report();
        }
        self.end_points.insert_collection(end_point);
        Ok(())
    }

    /// Run `f` against the collection end-point `id`, then apply its report.
    pub(crate) fn with_collection<T>(
        &mut self,
        id: &RelationEndPointId,
        f: impl FnOnce(&mut CollectionEndPoint) -> Result<T>,
    ) -> Result<T> {
        self.get_or_create_collection_end_point(id)?;
        let end_point = self.end_points.collection_mut(id)?;
        let result = f(end_point);
        let report = end_point.take_report();
        self.apply_report(report)?;
        result
    }

    fn apply_report(&mut self, report: EndPointReport) -> Result<()> {
        for (end_point_id, sync_state) in report.sync_updates {
            if let Ok(end_point) = self.end_points.object_mut(&end_point_id) {
                end_point.set_sync_state(sync_state);
            }
        }
        for item in report.loaded_items {
            if self.is_known(&item) || self.is_deleted(&item) {
                continue;
            }
            self.load_object(&item)?;
        }
        Ok(())
    }

    /// Resolve the current sync state of a real end-point by loading its
    /// original owner's collection.
    fn ensure_sync_state_known(&mut self, end_point_id: &RelationEndPointId) -> Result<()> {
        let opposite = match self.end_points.object(end_point_id) {
            Some(end_point) if end_point.is_synchronized().is_none() => {
                end_point.original_opposite_end_point_id()
            }
            _ => None,
        };
        if let Some(opposite) = opposite {
            self.with_collection(&opposite, |collection| collection.ensure_data_complete())?;
        }
        Ok(())
    }

    /// Set command for `item`'s foreign key
    pub(crate) fn object_set_command(
        &mut self,
        definition: &Arc<RelationDefinition>,
        item: &ObjectId,
        new_owner: Option<ObjectId>,
    ) -> Result<RelationEndPointModification> {
        self.check_not_deleted(item)?;
        if *item.class_id() != definition.object_end().class_id {
            return Err(RelationError::InvalidOperation(format!(
                "The domain object '{}' cannot take part in relation '{}'; expected an object of class '{}'.",
                item,
                definition.id(),
                definition.object_end().class_id
            )));
        }
        if let Some(owner) = &new_owner {
            self.load_object(owner)?;
            if *owner.class_id() != definition.collection_end().class_id {
                return Err(RelationError::InvalidOperation(format!(
                    "The domain object '{}' cannot own relation '{}'; expected an object of class '{}'.",
                    owner,
                    definition.id(),
                    definition.collection_end().class_id
                )));
            }
        }
        self.load_object(item)?;

        let end_point_id = definition.object_end_point_id(item);
        self.ensure_sync_state_known(&end_point_id)?;
        self.end_points
            .object(&end_point_id)
            .ok_or_else(|| RelationError::EndPointNotFound(end_point_id.clone()))?
            .create_set_command(new_owner)
    }

    /// Removal of `item` from its current owner's collection, unless that owner is `new_owner`
    fn detach_command(
        &mut self,
        definition: &Arc<RelationDefinition>,
        item: &ObjectId,
        new_owner: &ObjectId,
    ) -> Result<Option<RelationEndPointModification>> {
        let end_point_id = definition.object_end_point_id(item);
        let current_owner = self
            .end_points
            .object(&end_point_id)
            .and_then(|end_point| end_point.opposite_object_id().cloned());
        match current_owner {
            Some(owner) if owner != *new_owner => {
                let collection_id = definition.collection_end_point_id(&owner);
                let remove = self.with_collection(&collection_id, |collection| {
                    collection.create_remove_command(item)
                })?;
                Ok(Some(remove))
            }
            _ => Ok(None),
        }
    }

    /// Expand one modification into the list of all modifications it implies.
    pub(crate) fn expand(
        &mut self,
        modification: RelationEndPointModification,
    ) -> Result<ExpandedCommand> {
        let (definition, _) = self.mapping.resolve(modification.end_point_id())?;
        let definition = Arc::clone(definition);
        let owner = modification.end_point_id().object_id().clone();

        let mut commands = Vec::new();
        match &modification {
            RelationEndPointModification::CollectionInsert { inserted, .. } => {
                commands.push(self.object_set_command(&definition, inserted, Some(owner.clone()))?);
                let detach = self.detach_command(&definition, inserted, &owner)?;
                commands.push(modification);
                commands.extend(detach);
            }
            RelationEndPointModification::CollectionRemove { removed, .. } => {
                commands.push(self.object_set_command(&definition, removed, None)?);
                commands.push(modification);
            }
            RelationEndPointModification::CollectionReplace {
                replaced,
                replacement,
                ..
            } => {
                commands.push(self.object_set_command(&definition, replaced, None)?);
                commands.push(self.object_set_command(
                    &definition,
                    replacement,
                    Some(owner.clone()),
                )?);
                let detach = self.detach_command(&definition, replacement, &owner)?;
                commands.push(modification);
                commands.extend(detach);
            }
            RelationEndPointModification::CollectionReplaceSame { item, .. } => {
                commands.push(self.object_set_command(&definition, item, Some(owner.clone()))?);
                commands.push(modification);
            }
            RelationEndPointModification::CollectionDelete { end_point_id } => {
                let items = self.with_collection(end_point_id, |collection| collection.get_data())?;
                for item in items.iter() {
                    commands.push(self.object_set_command(&definition, item, None)?);
                }
                commands.push(modification);
            }
            RelationEndPointModification::CollectionSet {
                end_point_id,
                new_items,
            } => {
                let current = self.with_collection(end_point_id, |collection| collection.get_data())?;
                let mut detaches = Vec::new();
                for item in current.iter().filter(|item| !new_items.contains(item)) {
                    commands.push(self.object_set_command(&definition, item, None)?);
                }
                for item in new_items
                    .iter()
                    .filter(|item| !current.contains_object_id(item))
                {
                    commands.push(self.object_set_command(&definition, item, Some(owner.clone()))?);
                    detaches.extend(self.detach_command(&definition, item, &owner)?);
                }
                commands.push(modification);
                commands.extend(detaches);
            }
            RelationEndPointModification::ObjectSet { old, new, .. } => {
                if let Some(old_owner) = old {
                    let collection_id = definition.collection_end_point_id(old_owner);
                    commands.push(self.with_collection(&collection_id, |collection| {
                        collection.create_remove_command(&owner)
                    })?);
                }
                let new = new.clone();
                commands.push(modification);
                if let Some(new_owner) = new {
                    let collection_id = definition.collection_end_point_id(&new_owner);
                    commands.push(self.with_collection(&collection_id, |collection| {
                        collection.create_add_command(owner.clone())
                    })?);
                }
            }
            RelationEndPointModification::ObjectSetSame { .. } => {
                commands.push(modification);
            }
        }
        Ok(ExpandedCommand::new(commands))
    }

    /// Run all five phases of `command`
    pub(crate) fn execute(&mut self, command: &ExpandedCommand) -> Result<()> {
        let span = info_span!("relation.command", modifications = command.len());
        let _enter = span.enter();

        let listener = Arc::clone(&self.listener);
        command.notify_and_perform(listener.as_ref(), &mut self.end_points)
    }

    /// Like [`execute`](Self::execute), with the notify-begin phase run last to first
    pub(crate) fn execute_batch(&mut self, command: &ExpandedCommand) -> Result<()> {
        let span = info_span!("relation.command.batch", modifications = command.len());
        let _enter = span.enter();

        let listener = Arc::clone(&self.listener);
        command.notify_and_perform_batch(listener.as_ref(), &mut self.end_points)
    }
}
