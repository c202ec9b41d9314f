// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spatial structure flattening
//!
//! Walks the spatial tree (Project → Site → Building → Storey → Space)
//! top-down and collapses containers that carry nothing of their own: a
//! single child, no name, long name or elevation, no representation and no
//! relationship besides the two that place it in the tree. The child moves
//! up to the grandparent and its local placement is rebased so its absolute
//! placement does not change.

use ifc_lite_core::{layout, AttributeValue, Entity, EntityGraph, EntityId, Error, IfcType, Reference, Result};
use ifc_lite_geometry::{decompose, is_identity, relative_placement, Decomposed};
use rustc_hash::FxHashSet;

use crate::analysis::{detach, sweep_orphans};
use crate::progress::StageContext;

const PLACEMENT_EPS: f64 = 1e-9;

// Slots shared by the spatial kinds
const NAME: usize = 2;
const OBJECT_PLACEMENT: usize = 5;
const REPRESENTATION: usize = 6;
const LONG_NAME: usize = 7;
const KIND_SPECIFIC: usize = 9;

/// Direct children of a spatial container
#[derive(Debug, Default)]
struct Children {
    /// (IfcRelAggregates, related object) with the container as relating object
    aggregated: Vec<(EntityId, EntityId)>,
    /// (IfcRelContainedInSpatialStructure, element)
    contained: Vec<(EntityId, EntityId)>,
}

impl Children {
    fn total(&self) -> usize {
        self.aggregated.len() + self.contained.len()
    }

    fn spatial(&self, graph: &EntityGraph) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .aggregated
            .iter()
            .map(|&(_, child)| child)
            .filter(|&child| graph.get(child).is_some_and(|e| e.ifc_type.is_spatial_container()))
            .collect();
        ids.sort_unstable();
        ids
    }

    fn link_relationships(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.aggregated.iter().chain(&self.contained).map(|&(rel, _)| rel)
    }
}

fn children_of(graph: &EntityGraph, id: EntityId) -> Children {
    let mut children = Children::default();
    for reference in graph.referrers(id) {
        let Some(rel) = graph.get(reference.source) else {
            continue;
        };
        match (&rel.ifc_type, reference.slot) {
            (IfcType::IfcRelAggregates, 4) => {
                children
                    .aggregated
                    .extend(rel.get_refs(5).into_iter().map(|child| (rel.id, child)));
            }
            (IfcType::IfcRelContainedInSpatialStructure, 5) => {
                children
                    .contained
                    .extend(rel.get_refs(4).into_iter().map(|element| (rel.id, element)));
            }
            _ => {}
        }
    }
    children
}

/// (IfcRelAggregates, spatial parent) pairs listing `id` as a part
fn parents_of(graph: &EntityGraph, id: EntityId) -> Vec<(EntityId, EntityId)> {
    let mut parents = Vec::new();
    for reference in graph.referrers(id) {
        let Some(rel) = graph.get(reference.source) else {
            continue;
        };
        if rel.ifc_type != IfcType::IfcRelAggregates || reference.slot != 5 {
            continue;
        }
        if let Some(parent) = rel.get_ref(4) {
            if graph.get(parent).is_some_and(|e| e.ifc_type.is_spatial_container()) {
                parents.push((rel.id, parent));
            }
        }
    }
    parents.dedup();
    parents
}

fn has_value(entity: &Entity, slot: usize) -> bool {
    entity.get(slot).is_some_and(|v| !v.inner().is_empty_value())
}

/// No name, long name or kind-specific value of its own.
///
/// Every optional slot after CompositionType counts, so a site keeps its
/// georeference. An enumeration equal to its default counts as unset.
fn is_anonymous(graph: &EntityGraph, entity: &Entity) -> bool {
    if has_value(entity, NAME) || has_value(entity, LONG_NAME) {
        return false;
    }
    let schema = graph.schema();
    !(KIND_SPECIFIC..entity.attributes.len()).any(|slot| {
        if !has_value(entity, slot) {
            return false;
        }
        match layout::attribute_def(schema, &entity.ifc_type, slot) {
            Some(def) if !def.optional => false,
            Some(def) => match (def.default, entity.get_enum(slot)) {
                (Some(default), Some(value)) => !value.eq_ignore_ascii_case(default),
                _ => true,
            },
            None => true,
        }
    })
}

/// Spatial containers below the projects in top-down order, with the
/// aggregation that places each one under its parent.
///
/// A container reached twice means a cycle or a second parent.
fn walk(graph: &EntityGraph) -> Result<Vec<(EntityId, Option<(EntityId, EntityId)>)>> {
    let mut order = Vec::new();
    let mut visited: FxHashSet<EntityId> = FxHashSet::default();
    for project in graph.all_ids_of_type(&IfcType::IfcProject) {
        let mut stack: Vec<(EntityId, Option<(EntityId, EntityId)>)> = vec![(project, None)];
        while let Some((id, parent)) = stack.pop() {
            if !visited.insert(id) {
                return Err(Error::structural(format!(
                    "spatial container #{} is reached twice in the decomposition tree",
                    id
                )));
            }
            order.push((id, parent));
            let children = children_of(graph, id);
            for child in children.spatial(graph).into_iter().rev() {
                let rel = children
                    .aggregated
                    .iter()
                    .find(|&&(_, c)| c == child)
                    .map(|&(rel, _)| rel);
                if let Some(rel) = rel {
                    stack.push((child, Some((rel, id))));
                }
            }
        }
    }
    Ok(order)
}

#[derive(Debug, Clone, Copy)]
enum Link {
    Aggregated,
    Contained(EntityId),
}

/// New PlacementRelTo, and the composed relative placement unless the
/// container's own placement was the identity
#[derive(Debug)]
struct Rebase {
    local_placement: EntityId,
    previous_relative: Option<EntityId>,
    rel_to: Option<EntityId>,
    relative: Option<Decomposed>,
}

#[derive(Debug)]
struct Collapse {
    container: EntityId,
    parent: EntityId,
    parent_rel: EntityId,
    child: EntityId,
    link: Link,
    rebase: Option<Rebase>,
}

fn plan_rebase(
    graph: &EntityGraph,
    container: &Entity,
    child: EntityId,
) -> ifc_lite_geometry::Result<Option<Rebase>> {
    let Some(container_placement) = container.get_ref(OBJECT_PLACEMENT) else {
        return Ok(None);
    };
    let Some(local_placement) = graph.entity(child)?.get_ref(OBJECT_PLACEMENT) else {
        return Ok(None);
    };
    let local = graph.entity(local_placement)?;
    if local.ifc_type != IfcType::IfcLocalPlacement || local.get_ref(0) != Some(container_placement) {
        return Ok(None);
    }

    let outer = relative_placement(graph, container_placement)?;
    let rel_to = graph.entity(container_placement)?.get_ref(0);
    let relative = if is_identity(&outer, PLACEMENT_EPS) {
        None
    } else {
        let composed = outer * relative_placement(graph, local_placement)?;
        Some(decompose(&composed, PLACEMENT_EPS)?)
    };
    Ok(Some(Rebase {
        local_placement,
        previous_relative: local.get_ref(1),
        rel_to,
        relative,
    }))
}

fn plan(graph: &EntityGraph, container: EntityId, parent_rel: EntityId, parent: EntityId) -> Result<Option<Collapse>> {
    let entity = graph.entity(container)?;
    if entity.ifc_type == IfcType::IfcProject
        || graph.is_pinned(container)
        || !is_anonymous(graph, entity)
        || has_value(entity, REPRESENTATION)
    {
        return Ok(None);
    }

    let children = children_of(graph, container);
    if children.total() != 1 {
        return Ok(None);
    }
    let (child, link) = match (children.aggregated.first(), children.contained.first()) {
        (Some(&(_, child)), None) => (child, Link::Aggregated),
        (None, Some(&(rel, element))) => (element, Link::Contained(rel)),
        _ => return Ok(None),
    };
    // Elements cannot sit directly under the project
    if matches!(link, Link::Contained(_)) && graph.entity(parent)?.ifc_type == IfcType::IfcProject {
        return Ok(None);
    }

    let allowed: FxHashSet<EntityId> = children
        .link_relationships()
        .chain(std::iter::once(parent_rel))
        .collect();
    if graph.referrer_ids(container).iter().any(|r| !allowed.contains(r)) {
        return Ok(None);
    }

    let rebase = match plan_rebase(graph, entity, child) {
        Ok(rebase) => rebase,
        Err(e) => {
            tracing::debug!(container, error = %e, "Keeping container with an unusable placement");
            return Ok(None);
        }
    };

    Ok(Some(Collapse {
        container,
        parent,
        parent_rel,
        child,
        link,
        rebase,
    }))
}

fn add_triple(graph: &mut EntityGraph, kind: IfcType, values: [f64; 3]) -> Result<EntityId> {
    let coords = values
        .iter()
        .map(|&v| AttributeValue::Float(if v.abs() < 1e-12 { 0.0 } else { v }))
        .collect();
    graph.add(kind, vec![AttributeValue::List(coords)])
}

/// A fresh IfcAxis2Placement3D; shared placements are never edited
fn add_axis2_placement(graph: &mut EntityGraph, placement: &Decomposed) -> Result<EntityId> {
    let location = add_triple(graph, IfcType::IfcCartesianPoint, placement.location)?;
    let (axis, ref_direction) = if placement.has_default_axes(PLACEMENT_EPS) {
        (AttributeValue::Null, AttributeValue::Null)
    } else {
        (
            AttributeValue::EntityRef(add_triple(graph, IfcType::IfcDirection, placement.axis)?),
            AttributeValue::EntityRef(add_triple(graph, IfcType::IfcDirection, placement.ref_direction)?),
        )
    };
    graph.add(
        IfcType::IfcAxis2Placement3D,
        vec![AttributeValue::EntityRef(location), axis, ref_direction],
    )
}

fn collapse(graph: &mut EntityGraph, step: &Collapse) -> Result<Vec<(EntityId, IfcType)>> {
    let mut seeds = Vec::new();
    if let Some(rebase) = &step.rebase {
        let rel_to = rebase.rel_to.map_or(AttributeValue::Null, AttributeValue::EntityRef);
        graph.set_attribute(rebase.local_placement, 0, rel_to)?;
        if let Some(relative) = &rebase.relative {
            let axes = add_axis2_placement(graph, relative)?;
            graph.set_attribute(rebase.local_placement, 1, AttributeValue::EntityRef(axes))?;
            seeds.extend(rebase.previous_relative);
        }
    }

    match step.link {
        Link::Aggregated => graph.rewrite_reference(
            Reference {
                source: step.parent_rel,
                slot: 5,
                target: step.container,
            },
            step.child,
        )?,
        Link::Contained(rel) => {
            graph.set_attribute(rel, 5, AttributeValue::EntityRef(step.parent))?;
        }
    }

    let detached = detach(graph, step.container)?;
    seeds.extend(detached.seeds);
    let mut removed: Vec<(EntityId, IfcType)> = detached
        .removed
        .into_iter()
        .filter(|&(id, _)| id != step.container)
        .collect();
    removed.extend(sweep_orphans(graph, &seeds)?);
    Ok(removed)
}

/// Collapse redundant containers until none is left. Returns the count.
pub fn flatten_containers(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    let mut flattened = 0;
    loop {
        ctx.checkpoint()?;
        let order = walk(graph)?;
        let mut next = None;
        for &(container, parent) in &order {
            let Some((parent_rel, parent)) = parent else {
                continue;
            };
            if let Some(step) = plan(graph, container, parent_rel, parent)? {
                next = Some(step);
                break;
            }
        }
        let Some(step) = next else {
            break;
        };

        tracing::debug!(
            container = step.container,
            parent = step.parent,
            child = step.child,
            "Flattening redundant spatial container"
        );
        let removed = collapse(graph, &step)?;
        ctx.stats.record_removed(&removed);
        flattened += 1;
        ctx.report(flattened, order.len());
    }
    Ok(flattened)
}

/// Empty, anonymous spaces whose parent has other children
fn is_unused_space(graph: &EntityGraph, id: EntityId) -> bool {
    let Some(space) = graph.get(id) else {
        return false;
    };
    if graph.is_pinned(id) || !is_anonymous(graph, space) || children_of(graph, id).total() > 0 {
        return false;
    }
    let only_structural = graph.referrers(id).iter().all(|reference| {
        graph.get(reference.source).is_some_and(|rel| {
            matches!(
                (&rel.ifc_type, reference.slot),
                (IfcType::IfcRelAggregates, 5)
                    | (IfcType::IfcRelDefinesByProperties, 4)
                    | (IfcType::IfcRelDefinesByType, 4)
            )
        })
    });
    if !only_structural {
        return false;
    }
    match parents_of(graph, id).as_slice() {
        [(_, parent)] => children_of(graph, *parent).total() > 1,
        _ => false,
    }
}

/// Remove empty leaf spaces. Returns the number removed.
pub fn remove_unused_spaces(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    let mut count = 0;
    for space in graph.all_ids_of_type(&IfcType::IfcSpace) {
        if !is_unused_space(graph, space) {
            continue;
        }
        let detached = detach(graph, space)?;
        ctx.stats.record_removed(&detached.removed);
        let swept = sweep_orphans(graph, &detached.seeds)?;
        ctx.stats.record_removed(&swept);
        count += 1;
    }
    if count > 0 {
        tracing::debug!(removed = count, "Removed empty spaces");
    }
    Ok(count)
}

/// Structure flattening stage
pub fn run(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    let flattened = flatten_containers(graph, ctx)?;
    ctx.stats.flattened_containers += flattened;
    let spaces = remove_unused_spaces(graph, ctx)?;
    Ok(flattened + spaces)
}
