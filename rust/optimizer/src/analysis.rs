// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reference analysis
//!
//! Mark-and-sweep liveness over the entity graph. Marking starts at the root
//! set and follows strong references; an entity holding weak references
//! (relationships, styled items, layer assignments) becomes live as soon as
//! one of its weak targets is live. A worklist drives the marking, so cycles
//! and deep chains are harmless.

use std::collections::{BTreeMap, BTreeSet};

use ifc_lite_core::layout::{self, RefStrength};
use ifc_lite_core::{AttributeValue, Entity, EntityGraph, EntityId, Error, IfcType, Result, SchemaVersion};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::progress::StageContext;

/// Liveness and usage facts about a graph
#[derive(Debug, Clone, Default)]
pub struct ReachabilityReport {
    pub live: FxHashSet<EntityId>,
    /// Entities not reachable from any root, ascending
    pub unused: Vec<EntityId>,
    /// Distinct live objects using each property set or classification
    pub usage: BTreeMap<EntityId, usize>,
    /// Property sets and classifications nothing live uses
    pub removable: Vec<EntityId>,
    /// Used by exactly one object through exactly one relationship
    pub inline_candidates: Vec<EntityId>,
}

impl ReachabilityReport {
    pub fn is_live(&self, id: EntityId) -> bool {
        self.live.contains(&id)
    }
}

/// Relationship kinds outside the known layouts.
///
/// Any live target anchors them, and once live they keep all their targets.
fn is_opaque_relationship(kind: &IfcType) -> bool {
    kind.is_unknown() && kind.is_relationship()
}

fn is_weak(schema: SchemaVersion, entity: &Entity, slot: usize) -> bool {
    is_opaque_relationship(&entity.ifc_type)
        || layout::strength(schema, &entity.ifc_type, slot) == RefStrength::Weak
}

fn follows(schema: SchemaVersion, entity: &Entity, slot: usize) -> bool {
    is_opaque_relationship(&entity.ifc_type)
        || layout::strength(schema, &entity.ifc_type, slot) == RefStrength::Strong
}

/// Compute the live set.
///
/// Fails with `StructuralInvariantViolation` when a non-empty graph has no root.
pub fn liveness(graph: &EntityGraph) -> Result<FxHashSet<EntityId>> {
    let schema = graph.schema();
    let roots = graph.roots();
    if roots.is_empty() {
        if graph.is_empty() {
            return Ok(FxHashSet::default());
        }
        return Err(Error::structural(
            "graph has entities but no IfcProject or pinned root",
        ));
    }

    // Weak target → entities anchored by it
    let mut anchors: FxHashMap<EntityId, SmallVec<[EntityId; 2]>> = FxHashMap::default();
    for entity in graph.iter() {
        for reference in entity.references() {
            if is_weak(schema, entity, reference.slot) {
                anchors.entry(reference.target).or_default().push(entity.id);
            }
        }
    }

    let mut live: FxHashSet<EntityId> = FxHashSet::default();
    live.reserve(graph.len());
    let mut worklist: Vec<EntityId> = Vec::with_capacity(roots.len());
    for root in roots {
        if live.insert(root) {
            worklist.push(root);
        }
    }

    loop {
        while let Some(id) = worklist.pop() {
            let Some(entity) = graph.get(id) else {
                continue;
            };
            for reference in entity.references() {
                if follows(schema, entity, reference.slot) && live.insert(reference.target) {
                    worklist.push(reference.target);
                }
            }
            if let Some(sources) = anchors.get(&id) {
                for &source in sources {
                    if live.insert(source) {
                        worklist.push(source);
                    }
                }
            }
        }

        // Mandatory weak scalars of live entities must never dangle
        let mut extra: Vec<EntityId> = Vec::new();
        for &id in &live {
            let Some(entity) = graph.get(id) else {
                continue;
            };
            for (slot, value) in entity.attributes.iter().enumerate() {
                if let AttributeValue::EntityRef(target) = value {
                    if !live.contains(target)
                        && is_weak(schema, entity, slot)
                        && layout::is_mandatory(schema, &entity.ifc_type, slot)
                    {
                        extra.push(*target);
                    }
                }
            }
        }
        if extra.is_empty() {
            break;
        }
        for target in extra {
            if live.insert(target) {
                worklist.push(target);
            }
        }
    }

    Ok(live)
}

/// Full reachability report: live set, unused ids and usage counts
pub fn analyze(graph: &EntityGraph) -> Result<ReachabilityReport> {
    let live = liveness(graph)?;
    let unused: Vec<EntityId> = graph.ids().filter(|id| !live.contains(id)).collect();

    let mut usage = BTreeMap::new();
    let mut removable = Vec::new();
    let mut inline_candidates = Vec::new();
    for entity in graph.iter() {
        if !(entity.ifc_type.is_property_set() || entity.ifc_type.is_classification()) {
            continue;
        }
        let (users, relationships, direct) = users_of(graph, &live, entity.id);
        usage.insert(entity.id, users);
        if users == 0 && !graph.is_pinned(entity.id) {
            removable.push(entity.id);
        } else if users == 1 && relationships == 1 && direct == 0 {
            inline_candidates.push(entity.id);
        }
    }

    Ok(ReachabilityReport {
        live,
        unused,
        usage,
        removable,
        inline_candidates,
    })
}

/// (distinct live users, live relationships, live direct referencers)
fn users_of(graph: &EntityGraph, live: &FxHashSet<EntityId>, id: EntityId) -> (usize, usize, usize) {
    let schema = graph.schema();
    let mut users: BTreeSet<EntityId> = BTreeSet::new();
    let mut relationships = 0;
    let mut direct = 0;
    for source in graph.referrer_ids(id) {
        if source == id || !live.contains(&source) {
            continue;
        }
        let Some(referrer) = graph.get(source) else {
            continue;
        };
        if referrer.ifc_type.is_relationship() {
            relationships += 1;
            for reference in referrer.references() {
                if reference.target != id
                    && live.contains(&reference.target)
                    && is_weak(schema, referrer, reference.slot)
                {
                    users.insert(reference.target);
                }
            }
        } else {
            direct += 1;
            users.insert(source);
        }
    }
    (users.len(), relationships, direct)
}

/// Remove a set of dead entities.
///
/// Live referencers can only hold dead targets in weak slots; those
/// references are pruned first. Returns the removed ids with their kinds.
pub fn remove_dead(graph: &mut EntityGraph, dead: &BTreeSet<EntityId>) -> Result<Vec<(EntityId, IfcType)>> {
    if dead.is_empty() {
        return Ok(Vec::new());
    }
    let mut sources = BTreeSet::new();
    for &id in dead {
        sources.extend(graph.referrer_ids(id).into_iter().filter(|s| !dead.contains(s)));
    }
    for source in sources {
        let entity = graph.entity(source)?;
        let mut updates = Vec::new();
        for (slot, value) in entity.attributes.iter().enumerate() {
            let mut pruned = value.clone();
            let mut count = 0;
            for target in value.refs() {
                if dead.contains(&target) {
                    count += pruned.prune_ref(target);
                }
            }
            if count > 0 {
                updates.push((slot, pruned));
            }
        }
        for (slot, value) in updates {
            graph.set_attribute(source, slot, value)?;
        }
    }

    let removed: Vec<(EntityId, IfcType)> = dead
        .iter()
        .filter_map(|&id| graph.get(id).map(|e| (id, e.ifc_type.clone())))
        .collect();
    graph.remove_set(dead)?;
    Ok(removed)
}

/// Outcome of [`detach`]
#[derive(Debug, Default)]
pub struct Detached {
    /// Everything `force_remove` took out, ascending
    pub removed: Vec<(EntityId, IfcType)>,
    /// Surviving entities the removed ones referenced
    pub seeds: Vec<EntityId>,
}

/// `force_remove` that keeps the kinds of the removed entities and the
/// targets they pointed at, for category counts and a follow-up sweep.
pub fn detach(graph: &mut EntityGraph, id: EntityId) -> Result<Detached> {
    // force_remove only cascades through relationship referrers
    let mut kinds: FxHashMap<EntityId, (IfcType, Vec<EntityId>)> = FxHashMap::default();
    let mut worklist = vec![id];
    while let Some(current) = worklist.pop() {
        if kinds.contains_key(&current) {
            continue;
        }
        let entity = graph.entity(current)?;
        let targets = entity.references().into_iter().map(|r| r.target).collect();
        kinds.insert(current, (entity.ifc_type.clone(), targets));
        for source in graph.referrer_ids(current) {
            if graph.get(source).is_some_and(|e| e.ifc_type.is_relationship()) {
                worklist.push(source);
            }
        }
    }

    let removed_ids = graph.force_remove(id)?;
    let mut removed = Vec::with_capacity(removed_ids.len());
    let mut seeds = BTreeSet::new();
    for removed_id in removed_ids {
        if let Some((kind, targets)) = kinds.remove(&removed_id) {
            removed.push((removed_id, kind));
            seeds.extend(targets);
        }
    }
    Ok(Detached {
        removed,
        seeds: seeds.into_iter().filter(|&s| graph.contains(s)).collect(),
    })
}

/// Incremental pass: remove the unreachable entities connected to `seeds`.
///
/// Only dead entities in the forward closure of the seeds (plus the dead
/// entities still referencing them) are touched; unrelated garbage stays.
pub fn sweep_orphans(graph: &mut EntityGraph, seeds: &[EntityId]) -> Result<Vec<(EntityId, IfcType)>> {
    let seeds: Vec<EntityId> = seeds.iter().copied().filter(|&id| graph.contains(id)).collect();
    if seeds.is_empty() {
        return Ok(Vec::new());
    }
    let live = liveness(graph)?;

    let mut component: BTreeSet<EntityId> = BTreeSet::new();
    let mut worklist: Vec<EntityId> = seeds.into_iter().filter(|id| !live.contains(id)).collect();
    while let Some(id) = worklist.pop() {
        if !component.insert(id) {
            continue;
        }
        for reference in graph.references_from(id) {
            if !live.contains(&reference.target) && !component.contains(&reference.target) {
                worklist.push(reference.target);
            }
        }
        for source in graph.referrer_ids(id) {
            if !live.contains(&source) && !component.contains(&source) {
                worklist.push(source);
            }
        }
    }

    let removed = remove_dead(graph, &component)?;
    if !removed.is_empty() {
        tracing::debug!(removed = removed.len(), "Swept orphaned entities");
    }
    Ok(removed)
}

/// Unused-entity stage: drop everything unreachable from the roots
pub fn run(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    ctx.checkpoint()?;
    let report = analyze(graph)?;
    ctx.stats.inline_candidates = report.inline_candidates.len();
    ctx.report(graph.len(), graph.len());

    let dead: BTreeSet<EntityId> = report.unused.iter().copied().collect();
    let removed = remove_dead(graph, &dead)?;
    ctx.stats.record_removed(&removed);

    tracing::debug!(
        live = report.live.len(),
        removed = removed.len(),
        inline_candidates = report.inline_candidates.len(),
        "Removed unreachable entities"
    );
    Ok(removed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifc_lite_core::parse_model;

    const MODEL: &str = r#"
#1=IFCPROJECT('p',$,'Project',$,$,$,$,$,$);
#2=IFCSITE('s',$,'Site',$,$,$,$,$,.ELEMENT.,$,$,$,$,$);
#3=IFCRELAGGREGATES('r1',$,$,$,#1,(#2));
#4=IFCWALL('w1',$,$,$,$,$,$,$,$);
#5=IFCRELCONTAINEDINSPATIALSTRUCTURE('r2',$,$,$,(#4),#2);
#6=IFCPROPERTYSINGLEVALUE('Fire',$,IFCLABEL('EI60'),$);
#7=IFCPROPERTYSET('ps1',$,'Pset_WallCommon',$,(#6));
#8=IFCRELDEFINESBYPROPERTIES('r3',$,$,$,(#4),#7);
#9=IFCWALL('orphan',$,$,$,$,$,$,$,$);
#10=IFCPROPERTYSET('ps2',$,'Pset_Orphan',$,(#6));
#11=IFCRELDEFINESBYPROPERTIES('r4',$,$,$,(#9),#10);
#12=IFCCARTESIANPOINT((0.,0.,0.));
#13=IFCCARTESIANPOINT((1.,1.,1.));
#14=IFCRELDEFINESBYPROPERTIES('r5',$,$,$,(#4,#9),#7);
"#;

    #[test]
    fn marks_from_roots_through_anchored_relationships() {
        let graph = parse_model(MODEL).unwrap();
        let report = analyze(&graph).unwrap();
        for id in [1, 2, 3, 4, 5, 6, 7, 8, 14] {
            assert!(report.is_live(id), "#{} should be live", id);
        }
        assert_eq!(report.unused, vec![9, 10, 11, 12, 13]);
    }

    #[test]
    fn usage_counts_distinct_live_objects() {
        let graph = parse_model(MODEL).unwrap();
        let report = analyze(&graph).unwrap();
        // #7 is linked to wall #4 twice (r3, r5) and to the dead wall #9
        assert_eq!(report.usage.get(&7), Some(&1));
        assert_eq!(report.usage.get(&10), Some(&0));
        assert_eq!(report.removable, vec![10]);
        assert!(report.inline_candidates.is_empty());
    }

    #[test]
    fn stage_removes_unused_and_prunes_weak_links() {
        let mut graph = parse_model(MODEL).unwrap();
        let report = analyze(&graph).unwrap();
        let dead: BTreeSet<EntityId> = report.unused.iter().copied().collect();
        let removed = remove_dead(&mut graph, &dead).unwrap();
        assert_eq!(removed.len(), 5);
        assert!(graph.validate().is_ok());
        // The dead wall is dropped from r5's RelatedObjects
        assert_eq!(graph.get(14).unwrap().get_refs(4).as_slice(), &[4]);
    }

    #[test]
    fn cycles_are_harmless() {
        let text = r#"
#1=IFCPROJECT('p',$,$,$,$,$,$,$,$);
#2=IFCLOCALPLACEMENT(#3,#4);
#3=IFCLOCALPLACEMENT(#2,#4);
#4=IFCAXIS2PLACEMENT3D(#5,$,$);
#5=IFCCARTESIANPOINT((0.,0.,0.));
"#;
        let graph = parse_model(text).unwrap();
        let report = analyze(&graph).unwrap();
        assert_eq!(report.unused, vec![2, 3, 4, 5]);
    }

    #[test]
    fn rootless_graph_is_rejected() {
        let graph = parse_model("#1=IFCWALL('w',$,$,$,$,$,$,$,$);").unwrap();
        assert!(matches!(
            liveness(&graph),
            Err(Error::StructuralInvariantViolation(_))
        ));
        let empty = EntityGraph::default();
        assert!(liveness(&empty).unwrap().is_empty());
    }

    #[test]
    fn pinned_entities_are_roots() {
        let mut graph = parse_model(MODEL).unwrap();
        graph.pin(13).unwrap();
        let report = analyze(&graph).unwrap();
        assert!(report.is_live(13));
        assert!(!report.is_live(12));
    }

    #[test]
    fn opaque_relationships_anchor_and_keep() {
        let text = r#"
#1=IFCPROJECT('p',$,$,$,$,$,$,$,$);
#2=IFCSITE('s',$,$,$,$,$,$,$,.ELEMENT.,$,$,$,$,$);
#3=IFCRELAGGREGATES('r1',$,$,$,#1,(#2));
#4=IFCRELSPACEBOUNDARY('b',$,$,$,#2,#5,$,.PHYSICAL.,.EXTERNAL.);
#5=IFCCARTESIANPOINT((0.,0.,0.));
#6=IFCRELSPACEBOUNDARY('b2',$,$,$,#7,$,$,.PHYSICAL.,.EXTERNAL.);
#7=IFCCARTESIANPOINT((1.,0.,0.));
"#;
        let graph = parse_model(text).unwrap();
        let report = analyze(&graph).unwrap();
        assert!(report.is_live(4));
        assert!(report.is_live(5));
        assert_eq!(report.unused, vec![6, 7]);
    }

    #[test]
    fn detach_reports_cascaded_relationships() {
        let mut graph = parse_model(MODEL).unwrap();
        let detached = detach(&mut graph, 4).unwrap();
        let ids: Vec<EntityId> = detached.removed.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![4, 5, 8]);
        assert_eq!(detached.removed[1].1, IfcType::IfcRelContainedInSpatialStructure);
        assert_eq!(detached.seeds, vec![2, 7]);
        assert_eq!(graph.get(14).unwrap().get_refs(4).as_slice(), &[9]);
    }

    #[test]
    fn sweep_only_touches_the_seeded_component() {
        let mut graph = parse_model(MODEL).unwrap();
        // #11 anchors nothing live; seeding it removes its dead component only
        let removed = sweep_orphans(&mut graph, &[11]).unwrap();
        let ids: Vec<EntityId> = removed.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![9, 10, 11]);
        assert!(graph.contains(12));
        assert!(graph.contains(13));
        assert!(graph.validate().is_ok());
    }
}
