// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity graph
//!
//! All entities of a model keyed by id, plus a reverse reference index
//! (target → referencing slots). The forward direction is the entity's own
//! attribute slots. Every mutation keeps the index in sync and, while a
//! transaction is open, records an undo entry.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::attribute::AttributeValue;
use crate::entity::{Entity, EntityId, Reference};
use crate::error::{Error, Result};
use crate::layout;
use crate::schema::{IfcType, SchemaVersion};
use crate::transaction::UndoOp;

/// In-memory IFC model
#[derive(Debug, Clone)]
pub struct EntityGraph {
    pub(crate) entities: BTreeMap<EntityId, Entity>,
    pub(crate) referrers: FxHashMap<EntityId, FxHashSet<Reference>>,
    pub(crate) pinned: BTreeSet<EntityId>,
    pub(crate) schema: SchemaVersion,
    pub(crate) journal: Vec<UndoOp>,
    pub(crate) marks: Vec<usize>,
}

impl Default for EntityGraph {
    fn default() -> Self {
        Self::new(SchemaVersion::Ifc4)
    }
}

impl EntityGraph {
    /// Create an empty graph
    pub fn new(schema: SchemaVersion) -> Self {
        Self {
            entities: BTreeMap::new(),
            referrers: FxHashMap::default(),
            pinned: BTreeSet::new(),
            schema,
            journal: Vec::new(),
            marks: Vec::new(),
        }
    }

    /// Build a graph from a complete set of entities.
    ///
    /// Forward references are allowed; the finished graph must not dangle.
    pub fn from_entities(schema: SchemaVersion, entities: impl IntoIterator<Item = Entity>) -> Result<Self> {
        let mut graph = Self::new(schema);
        for entity in entities {
            if graph.entities.contains_key(&entity.id) {
                return Err(Error::DuplicateEntity(entity.id));
            }
            graph.index(&entity);
            graph.entities.insert(entity.id, entity);
        }
        graph.validate()?;
        Ok(graph)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn schema(&self) -> SchemaVersion {
        self.schema
    }

    #[inline]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Like [`get`](Self::get) but fails with `EntityNotFound`
    pub fn entity(&self, id: EntityId) -> Result<&Entity> {
        self.entities.get(&id).ok_or(Error::EntityNotFound(id))
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// All entities in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    /// Ids of every entity of `kind`, ascending
    pub fn all_ids_of_type(&self, kind: &IfcType) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| &e.ifc_type == kind)
            .map(|e| e.id)
            .collect()
    }

    /// One past the largest id in use
    pub fn next_id(&self) -> EntityId {
        self.entities.keys().next_back().map_or(1, |id| id + 1)
    }

    /// Every reference pointing at `id`, sorted
    pub fn referrers(&self, id: EntityId) -> Vec<Reference> {
        let mut refs: Vec<Reference> = self
            .referrers
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        refs.sort_unstable();
        refs
    }

    /// Distinct ids of the entities referencing `id`, ascending
    pub fn referrer_ids(&self, id: EntityId) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .referrers
            .get(&id)
            .map(|set| set.iter().map(|r| r.source).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn referrer_count(&self, id: EntityId) -> usize {
        self.referrers.get(&id).map_or(0, |set| set.len())
    }

    /// Every reference held by `id`, in slot order
    pub fn references_from(&self, id: EntityId) -> Vec<Reference> {
        self.get(id).map(Entity::references).unwrap_or_default()
    }

    pub fn is_pinned(&self, id: EntityId) -> bool {
        self.pinned.contains(&id)
    }

    /// Root set: every project plus pinned entities, ascending
    pub fn roots(&self) -> Vec<EntityId> {
        let mut roots: BTreeSet<EntityId> = self
            .all_ids_of_type(&IfcType::IfcProject)
            .into_iter()
            .collect();
        roots.extend(self.pinned.iter().copied().filter(|id| self.contains(*id)));
        roots.into_iter().collect()
    }

    /// Check referential integrity
    pub fn validate(&self) -> Result<()> {
        for entity in self.entities.values() {
            let mut missing = None;
            for value in &entity.attributes {
                value.for_each_ref(&mut |target| {
                    if missing.is_none() && !self.entities.contains_key(&target) {
                        missing = Some(target);
                    }
                });
            }
            if let Some(target) = missing {
                return Err(Error::DanglingReference {
                    target,
                    referrers: vec![entity.id],
                });
            }
        }
        Ok(())
    }

    /// Mandatory slots that currently hold no value
    pub fn mandatory_gaps(&self) -> BTreeSet<(EntityId, usize)> {
        let mut gaps = BTreeSet::new();
        for entity in self.entities.values() {
            let Some(defs) = layout::layout(self.schema, &entity.ifc_type) else {
                continue;
            };
            for (slot, def) in defs.iter().enumerate() {
                if def.optional {
                    continue;
                }
                let empty = match entity.attributes.get(slot) {
                    None | Some(AttributeValue::Null) => true,
                    Some(AttributeValue::List(items)) => items.is_empty(),
                    Some(_) => false,
                };
                if empty {
                    gaps.insert((entity.id, slot));
                }
            }
        }
        gaps
    }

    // ---------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------

    /// Insert a new entity; every target it references must already exist
    pub fn insert(&mut self, entity: Entity) -> Result<()> {
        if self.entities.contains_key(&entity.id) {
            return Err(Error::DuplicateEntity(entity.id));
        }
        self.check_targets(entity.id, &entity.attributes)?;
        self.index(&entity);
        self.record(UndoOp::Inserted(entity.id));
        self.entities.insert(entity.id, entity);
        Ok(())
    }

    /// Insert a new entity under the next free id
    pub fn add(&mut self, ifc_type: IfcType, attributes: Vec<AttributeValue>) -> Result<EntityId> {
        let id = self.next_id();
        self.insert(Entity::new(id, ifc_type, attributes))?;
        Ok(id)
    }

    /// Remove an entity nobody else references
    pub fn remove(&mut self, id: EntityId) -> Result<Entity> {
        if !self.contains(id) {
            return Err(Error::EntityNotFound(id));
        }
        let referrers: Vec<EntityId> = self
            .referrer_ids(id)
            .into_iter()
            .filter(|&r| r != id)
            .collect();
        if !referrers.is_empty() {
            return Err(Error::DanglingReference {
                target: id,
                referrers,
            });
        }
        self.detach_entity(id).ok_or(Error::EntityNotFound(id))
    }

    /// Remove `id` after detaching it from every referencer.
    ///
    /// List slots drop the reference, optional scalar slots become null and
    /// relationships left without a mandatory value are removed as well.
    /// Fails (leaving the graph untouched) when a non-relationship entity
    /// would lose a mandatory value. Returns every removed id, ascending.
    pub fn force_remove(&mut self, id: EntityId) -> Result<Vec<EntityId>> {
        if !self.contains(id) {
            return Err(Error::EntityNotFound(id));
        }
        self.transaction(|graph| graph.force_remove_inner(id))
    }

    fn force_remove_inner(&mut self, id: EntityId) -> Result<Vec<EntityId>> {
        let mut doomed: BTreeSet<EntityId> = BTreeSet::new();
        let mut worklist = vec![id];
        doomed.insert(id);

        while let Some(target) = worklist.pop() {
            for source in self.referrer_ids(target) {
                if doomed.contains(&source) {
                    continue;
                }
                let Some(entity) = self.get(source) else {
                    continue;
                };
                let mut updated = entity.clone();
                let mut breaks_mandatory = false;
                for (slot, value) in updated.attributes.iter_mut().enumerate() {
                    if !value.contains_ref(target) {
                        continue;
                    }
                    value.prune_ref(target);
                    let mandatory = layout::is_mandatory(self.schema, &entity.ifc_type, slot);
                    if mandatory && value.is_empty_value() {
                        breaks_mandatory = true;
                    }
                }
                if breaks_mandatory {
                    if entity.ifc_type.is_relationship() {
                        doomed.insert(source);
                        worklist.push(source);
                        continue;
                    }
                    return Err(Error::DanglingReference {
                        target,
                        referrers: vec![source],
                    });
                }
                self.replace(updated)?;
            }
        }

        // Doomed entities may still reference each other
        for &doomed_id in &doomed {
            self.detach_entity(doomed_id);
        }
        Ok(doomed.into_iter().collect())
    }

    /// Remove a set of entities that is closed under references
    pub fn remove_set(&mut self, ids: &BTreeSet<EntityId>) -> Result<()> {
        for &id in ids {
            if !self.contains(id) {
                return Err(Error::EntityNotFound(id));
            }
            let outside: Vec<EntityId> = self
                .referrer_ids(id)
                .into_iter()
                .filter(|r| !ids.contains(r))
                .collect();
            if !outside.is_empty() {
                return Err(Error::DanglingReference {
                    target: id,
                    referrers: outside,
                });
            }
        }
        for &id in ids {
            self.detach_entity(id);
        }
        Ok(())
    }

    /// Point one reference at a different target
    pub fn rewrite_reference(&mut self, reference: Reference, new_target: EntityId) -> Result<()> {
        if !self.contains(new_target) {
            return Err(Error::EntityNotFound(new_target));
        }
        let mut updated = self.entity(reference.source)?.clone();
        let value = updated
            .attributes
            .get_mut(reference.slot)
            .ok_or(Error::InvalidAttribute {
                id: reference.source,
                slot: reference.slot,
            })?;
        if value.replace_ref(reference.target, new_target) == 0 {
            return Err(Error::InvalidAttribute {
                id: reference.source,
                slot: reference.slot,
            });
        }
        self.replace(updated)
    }

    /// Rewrite every reference to `old` so it points at `new`; returns the count
    pub fn replace_references(&mut self, old: EntityId, new: EntityId) -> Result<usize> {
        if !self.contains(new) {
            return Err(Error::EntityNotFound(new));
        }
        let mut count = 0;
        for source in self.referrer_ids(old) {
            if source == old {
                continue;
            }
            let mut updated = self.entity(source)?.clone();
            for value in updated.attributes.iter_mut() {
                count += value.replace_ref(old, new);
            }
            self.replace(updated)?;
        }
        Ok(count)
    }

    /// Overwrite one slot; returns the previous value
    pub fn set_attribute(&mut self, id: EntityId, slot: usize, value: AttributeValue) -> Result<AttributeValue> {
        let mut updated = self.entity(id)?.clone();
        let cell = updated
            .attributes
            .get_mut(slot)
            .ok_or(Error::InvalidAttribute { id, slot })?;
        let previous = std::mem::replace(cell, value);
        self.replace(updated)?;
        Ok(previous)
    }

    /// Change an entity's kind together with its full attribute list
    pub fn set_type(&mut self, id: EntityId, ifc_type: IfcType, attributes: Vec<AttributeValue>) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::EntityNotFound(id));
        }
        self.replace(Entity::new(id, ifc_type, attributes))
    }

    pub fn pin(&mut self, id: EntityId) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::EntityNotFound(id));
        }
        if self.pinned.insert(id) {
            self.record(UndoOp::Pinned(id));
        }
        Ok(())
    }

    pub fn set_schema(&mut self, schema: SchemaVersion) {
        let previous = std::mem::replace(&mut self.schema, schema);
        self.record(UndoOp::Schema(previous));
    }

    /// Compact ids to `1..=n`, preserving order. Returns old → new.
    ///
    /// Only meant for the serialization boundary; fails inside a transaction.
    pub fn renumber(&mut self) -> Result<FxHashMap<EntityId, EntityId>> {
        if self.in_transaction() {
            return Err(Error::structural("cannot renumber inside a transaction"));
        }
        let mapping: FxHashMap<EntityId, EntityId> = self
            .entities
            .keys()
            .enumerate()
            .map(|(i, &id)| (id, i as EntityId + 1))
            .collect();

        let old = std::mem::take(&mut self.entities);
        self.referrers.clear();
        for (_, mut entity) in old {
            entity.id = mapping.get(&entity.id).copied().unwrap_or(entity.id);
            for value in entity.attributes.iter_mut() {
                remap(value, &mapping);
            }
            self.index(&entity);
            self.entities.insert(entity.id, entity);
        }
        self.pinned = self
            .pinned
            .iter()
            .filter_map(|id| mapping.get(id).copied())
            .collect();
        Ok(mapping)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn check_targets(&self, id: EntityId, attributes: &[AttributeValue]) -> Result<()> {
        let mut missing = None;
        for value in attributes {
            value.for_each_ref(&mut |target| {
                if missing.is_none() && target != id && !self.entities.contains_key(&target) {
                    missing = Some(target);
                }
            });
        }
        match missing {
            Some(target) => Err(Error::DanglingReference {
                target,
                referrers: vec![id],
            }),
            None => Ok(()),
        }
    }

    /// Swap in a new version of an existing entity
    pub(crate) fn replace(&mut self, entity: Entity) -> Result<()> {
        self.check_targets(entity.id, &entity.attributes)?;
        let previous = self
            .entities
            .get(&entity.id)
            .cloned()
            .ok_or(Error::EntityNotFound(entity.id))?;
        self.unindex(&previous);
        self.index(&entity);
        self.entities.insert(entity.id, entity);
        self.record(UndoOp::Replaced(previous));
        Ok(())
    }

    /// Remove an entity and its outgoing index entries without checks
    pub(crate) fn detach_entity(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.unindex(&entity);
        if self.pinned.remove(&id) {
            self.record(UndoOp::Unpinned(id));
        }
        self.record(UndoOp::Removed(entity.clone()));
        Some(entity)
    }

    pub(crate) fn index(&mut self, entity: &Entity) {
        for reference in entity.references() {
            self.referrers
                .entry(reference.target)
                .or_default()
                .insert(reference);
        }
    }

    pub(crate) fn unindex(&mut self, entity: &Entity) {
        for reference in entity.references() {
            if let Some(set) = self.referrers.get_mut(&reference.target) {
                set.remove(&reference);
                if set.is_empty() {
                    self.referrers.remove(&reference.target);
                }
            }
        }
    }

    pub(crate) fn record(&mut self, op: UndoOp) {
        if !self.marks.is_empty() {
            self.journal.push(op);
        }
    }
}

fn remap(value: &mut AttributeValue, mapping: &FxHashMap<EntityId, EntityId>) {
    match value {
        AttributeValue::EntityRef(id) => {
            if let Some(&new) = mapping.get(id) {
                *id = new;
            }
        }
        AttributeValue::List(items) | AttributeValue::Typed(_, items) => {
            for item in items {
                remap(item, mapping);
            }
        }
        _ => {}
    }
}
