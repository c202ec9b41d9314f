// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attribute cleaning
//!
//! Clears optional attributes that only restate the schema default, drops
//! placeholder properties, unused property sets and classifications, and
//! merges content-identical definitions: property values, property sets,
//! classification references and owner histories.

use std::collections::BTreeMap;

use ifc_lite_core::layout;
use ifc_lite_core::writer::encode_value;
use ifc_lite_core::{AttributeValue, Entity, EntityGraph, EntityId, Error, IfcType, Result};
use rustc_hash::FxHashSet;

use crate::analysis::{analyze, detach, sweep_orphans};
use crate::progress::StageContext;
use crate::rewire::merge_into;
use crate::stats::{MergedIdentity, OptimizationStats};

// IfcRoot.GlobalId, IfcPropertySet.HasProperties, IfcPropertySingleValue.NominalValue
const GLOBAL_ID: usize = 0;
const HAS_PROPERTIES: usize = 4;
const NOMINAL_VALUE: usize = 2;

/// Report mandatory attributes that were already null in the input
pub fn record_preexisting_gaps(graph: &EntityGraph, ctx: &mut StageContext<'_>) {
    let schema = graph.schema();
    for (id, slot) in graph.mandatory_gaps() {
        let Some(entity) = graph.get(id) else {
            continue;
        };
        let name = layout::attribute_def(schema, &entity.ifc_type, slot).map_or("?", |def| def.name);
        ctx.stats.preexisting(
            id,
            &entity.ifc_type,
            ctx.stage,
            format!("mandatory attribute {} is unset", name),
        );
    }
}

fn is_redundant(value: &AttributeValue, default: Option<&str>) -> bool {
    match value {
        AttributeValue::Null | AttributeValue::Derived => false,
        AttributeValue::Enum(e) => default == Some(e.as_str()),
        other => other.is_empty_value(),
    }
}

/// Null out optional slots holding the schema default or an empty value.
/// Returns the number of cleared slots.
pub fn clear_defaults(graph: &mut EntityGraph) -> Result<usize> {
    let schema = graph.schema();
    let mut updates: Vec<(EntityId, usize)> = Vec::new();
    for entity in graph.iter() {
        let Some(defs) = layout::layout(schema, &entity.ifc_type) else {
            continue;
        };
        for (slot, (def, value)) in defs.iter().zip(&entity.attributes).enumerate() {
            if def.optional && is_redundant(value, def.default) {
                updates.push((entity.id, slot));
            }
        }
    }
    for &(id, slot) in &updates {
        graph.set_attribute(id, slot, AttributeValue::Null)?;
    }
    Ok(updates.len())
}

fn is_placeholder(entity: &Entity, placeholder: &str) -> bool {
    entity.ifc_type == IfcType::IfcPropertySingleValue
        && entity
            .get(NOMINAL_VALUE)
            .and_then(|v| v.inner().as_string())
            .is_some_and(|s| s.trim() == placeholder.trim())
}

/// Remove properties whose value is the placeholder; property sets left
/// without properties go too. Returns the number of removed properties.
pub fn remove_placeholders(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    let placeholder = ctx.config.placeholder_value.as_str();
    let doomed: FxHashSet<EntityId> = graph
        .iter()
        .filter(|e| is_placeholder(e, placeholder) && !graph.is_pinned(e.id))
        .map(|e| e.id)
        .collect();
    if doomed.is_empty() {
        return Ok(0);
    }

    let mut sets: Vec<EntityId> = doomed
        .iter()
        .flat_map(|&id| graph.referrer_ids(id))
        .filter(|&id| graph.get(id).is_some_and(|e| e.ifc_type == IfcType::IfcPropertySet))
        .collect();
    sets.sort_unstable();
    sets.dedup();

    let mut seeds = Vec::new();
    for set in sets {
        let entity = graph.entity(set)?;
        let kept: Vec<AttributeValue> = entity
            .get_list(HAS_PROPERTIES)
            .unwrap_or_default()
            .iter()
            .filter(|v| v.as_entity_ref().map_or(true, |id| !doomed.contains(&id)))
            .cloned()
            .collect();
        if !kept.is_empty() {
            graph.set_attribute(set, HAS_PROPERTIES, AttributeValue::List(kept))?;
        } else if !graph.is_pinned(set) {
            let detached = detach(graph, set)?;
            ctx.stats.record_removed(&detached.removed);
            seeds.extend(detached.seeds);
        }
    }

    let mut ordered: Vec<EntityId> = doomed.into_iter().collect();
    ordered.sort_unstable();
    let mut removed = 0;
    for id in ordered {
        if !graph.contains(id) {
            continue;
        }
        match detach(graph, id) {
            Ok(detached) => {
                ctx.stats.record_removed(&detached.removed);
                seeds.extend(detached.seeds);
                removed += 1;
            }
            Err(Error::DanglingReference { referrers, .. }) => {
                tracing::warn!(id, ?referrers, "Keeping placeholder property that others require");
            }
            Err(e) => return Err(e),
        }
    }
    ctx.stats.record_removed(&sweep_orphans(graph, &seeds)?);
    Ok(removed)
}

/// Remove property sets and classifications with no live user.
/// Returns the number removed.
pub fn remove_unused_definitions(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    let report = analyze(graph)?;
    let mut removed = 0;
    let mut seeds = Vec::new();
    for id in report.removable {
        if !graph.contains(id) {
            continue;
        }
        let kind = graph.entity(id)?.ifc_type.clone();
        match detach(graph, id) {
            Ok(detached) => {
                ctx.stats.record_removed(&detached.removed);
                seeds.extend(detached.seeds);
                removed += 1;
            }
            Err(Error::DanglingReference { referrers, .. }) => {
                tracing::debug!(id, kind = %kind, ?referrers, "Unused definition is still referenced");
            }
            Err(e) => return Err(e),
        }
    }
    ctx.stats.record_removed(&sweep_orphans(graph, &seeds)?);
    Ok(removed)
}

/// Content key of an entity; `skip` slots are ignored and `sorted` list
/// slots compare as sets
fn content_key(entity: &Entity, skip: &[usize], sorted: &[usize]) -> String {
    let mut key = String::with_capacity(64);
    key.push_str(entity.ifc_type.as_str());
    for (slot, value) in entity.attributes.iter().enumerate() {
        key.push('|');
        if skip.contains(&slot) {
            continue;
        }
        match value {
            AttributeValue::List(items) if sorted.contains(&slot) => {
                let mut parts: Vec<String> = items
                    .iter()
                    .map(|item| {
                        let mut part = String::new();
                        encode_value(&mut part, item);
                        part
                    })
                    .collect();
                parts.sort_unstable();
                key.push_str(&parts.join(","));
            }
            other => encode_value(&mut key, other),
        }
    }
    key
}

/// Merge entities of `kind` with identical content keys into the lowest id.
/// Returns the `(duplicate, survivor)` pairs.
fn merge_identical(
    graph: &mut EntityGraph,
    kind: &IfcType,
    skip: &[usize],
    sorted: &[usize],
) -> Result<Vec<(EntityId, EntityId)>> {
    let mut survivors: BTreeMap<String, EntityId> = BTreeMap::new();
    let mut merges = Vec::new();
    for id in graph.all_ids_of_type(kind) {
        let entity = graph.entity(id)?;
        let key = content_key(entity, skip, sorted);
        match survivors.get(&key) {
            Some(&survivor) if !graph.is_pinned(id) => merges.push((id, survivor)),
            Some(_) => {}
            None => {
                survivors.insert(key, id);
            }
        }
    }
    for &(duplicate, survivor) in &merges {
        merge_into(graph, duplicate, survivor)?;
        graph.remove(duplicate)?;
    }
    Ok(merges)
}

/// Merge identical property values, property sets, classification
/// references and owner histories. Returns the number of merged entities.
///
/// Property sets are compared without their GlobalId; the ones given up
/// are listed in `stats.merged_global_ids`.
pub fn merge_definitions(graph: &mut EntityGraph, stats: &mut OptimizationStats) -> Result<usize> {
    let values = merge_identical(graph, &IfcType::IfcPropertySingleValue, &[], &[])?.len();

    let global_ids: BTreeMap<EntityId, String> = graph
        .all_ids_of_type(&IfcType::IfcPropertySet)
        .into_iter()
        .filter_map(|id| Some((id, graph.get(id)?.get_string(GLOBAL_ID)?.to_string())))
        .collect();
    // Property order carries no meaning
    let sets = merge_identical(graph, &IfcType::IfcPropertySet, &[GLOBAL_ID], &[HAS_PROPERTIES])?;
    for &(duplicate, survivor) in &sets {
        let Some(global_id) = global_ids.get(&duplicate) else {
            continue;
        };
        if global_ids.get(&survivor) != Some(global_id) {
            stats.merged_global_ids.push(MergedIdentity {
                global_id: global_id.clone(),
                duplicate,
                survivor,
            });
        }
    }

    let references = merge_identical(graph, &IfcType::IfcClassificationReference, &[], &[])?.len();
    let histories = merge_identical(graph, &IfcType::IfcOwnerHistory, &[], &[])?.len();
    let merged = values + sets.len() + references + histories;
    if merged > 0 {
        tracing::debug!(
            values,
            sets = sets.len(),
            references,
            histories,
            "Merged identical definitions"
        );
    }
    Ok(merged)
}

/// Attribute cleaning stage
pub fn run(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    ctx.checkpoint()?;
    record_preexisting_gaps(graph, ctx);

    let cleared = clear_defaults(graph)?;
    ctx.stats.cleared_attributes += cleared;
    ctx.report(1, 4);

    ctx.checkpoint()?;
    let placeholders = remove_placeholders(graph, ctx)?;
    ctx.report(2, 4);

    ctx.checkpoint()?;
    let unused = remove_unused_definitions(graph, ctx)?;
    ctx.report(3, 4);

    ctx.checkpoint()?;
    let merged = merge_definitions(graph, ctx.stats)?;
    ctx.stats.merged_property_count += merged;
    ctx.report(4, 4);

    tracing::debug!(cleared, placeholders, unused, merged, "Cleaned attributes");
    Ok(cleared + placeholders + unused + merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OptimizerConfig, Stage};
    use crate::progress::CancellationToken;
    use crate::stats::OptimizationStats;
    use ifc_lite_core::parse_model;
    use ifc_lite_geometry::DefaultKernel;

    const MODEL: &str = r#"
#1=IFCPROJECT('p',$,'Project',$,$,$,$,$,$);
#2=IFCSITE('s',$,'Site',$,$,$,$,$,.ELEMENT.,$,$,$,$,$);
#3=IFCRELAGGREGATES('a',$,$,$,#1,(#2));
#4=IFCWALL('w1',$,'Wall',$,$,$,$,$,.NOTDEFINED.);
#5=IFCWALL('w2',$,'Wall',$,$,$,$,$,.SOLIDWALL.);
#6=IFCRELCONTAINEDINSPATIALSTRUCTURE('c',$,$,$,(#4,#5),#2);
#10=IFCPROPERTYSINGLEVALUE('Fire',$,IFCLABEL('EI60'),$);
#11=IFCPROPERTYSINGLEVALUE('Status',$,IFCLABEL('-'),$);
#12=IFCPROPERTYSET('g1',$,'Pset_WallCommon',$,(#10,#11));
#13=IFCRELDEFINESBYPROPERTIES('d1',$,$,$,(#4),#12);
#20=IFCPROPERTYSINGLEVALUE('Fire',$,IFCLABEL('EI60'),$);
#21=IFCPROPERTYSET('g2',$,'Pset_WallCommon',$,(#20));
#22=IFCRELDEFINESBYPROPERTIES('d2',$,$,$,(#5),#21);
#30=IFCPROPERTYSINGLEVALUE('Note',$,IFCLABEL('-'),$);
#31=IFCPROPERTYSET('g3',$,'Pset_Empty',$,(#30));
#32=IFCRELDEFINESBYPROPERTIES('d3',$,$,$,(#4,#5),#31);
"#;

    fn run_with(graph: &mut EntityGraph, f: impl FnOnce(&mut EntityGraph, &mut StageContext<'_>)) -> OptimizationStats {
        let config = OptimizerConfig::default();
        let mut stats = OptimizationStats::default();
        let token = CancellationToken::new();
        {
            let mut ctx = StageContext::new(&config, &DefaultKernel, &mut stats, Stage::Clean, None, &token);
            f(graph, &mut ctx);
        }
        stats
    }

    #[test]
    fn defaults_and_empty_strings_are_cleared() {
        let mut graph = parse_model(
            "#1=IFCWALL('w1',$,'',$,$,$,$,$,.NOTDEFINED.);\n\
             #2=IFCWALL('w2',$,'Wall',$,$,$,$,$,.SOLIDWALL.);",
        )
        .unwrap();
        assert_eq!(clear_defaults(&mut graph).unwrap(), 2);
        let wall = graph.get(1).unwrap();
        assert!(wall.get(2).unwrap().is_null());
        assert!(wall.get(8).unwrap().is_null());
        assert_eq!(graph.get(2).unwrap().get_enum(8), Some("SOLIDWALL"));
        assert_eq!(clear_defaults(&mut graph).unwrap(), 0);
    }

    #[test]
    fn mandatory_slots_are_reported_not_touched() {
        let mut graph = parse_model("#1=IFCPROPERTYSINGLEVALUE($,$,IFCLABEL('x'),$);").unwrap();
        let stats = run_with(&mut graph, |g, ctx| record_preexisting_gaps(g, ctx));
        assert_eq!(stats.preexisting_issues.len(), 1);
        assert_eq!(stats.preexisting_issues[0].id, 1);
        assert!(stats.preexisting_issues[0].reason.contains("Name"));
    }

    #[test]
    fn placeholders_and_emptied_sets_go() {
        let mut graph = parse_model(MODEL).unwrap();
        let stats = run_with(&mut graph, |g, ctx| {
            assert_eq!(remove_placeholders(g, ctx).unwrap(), 2);
        });
        assert!(!graph.contains(11));
        assert_eq!(graph.get(12).unwrap().get_refs(4).as_slice(), &[10]);
        for id in [30, 31, 32] {
            assert!(!graph.contains(id));
        }
        assert_eq!(stats.removed_by_category.property_sets, 3);
        assert_eq!(stats.removed_by_category.relationships, 1);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn identical_definitions_merge() {
        let mut graph = parse_model(MODEL).unwrap();
        run_with(&mut graph, |g, ctx| {
            remove_placeholders(g, ctx).unwrap();
        });

        // #20 matches #10, after which #21 matches #12 apart from GlobalId
        let mut stats = OptimizationStats::default();
        assert_eq!(merge_definitions(&mut graph, &mut stats).unwrap(), 2);
        assert!(!graph.contains(20));
        assert!(!graph.contains(21));
        assert_eq!(graph.get(22).unwrap().get_ref(5), Some(12));
        assert_eq!(
            stats.merged_global_ids,
            vec![MergedIdentity {
                global_id: "g2".into(),
                duplicate: 21,
                survivor: 12,
            }]
        );
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn identical_owner_histories_merge() {
        let mut graph = parse_model(
            "#1=IFCPERSONANDORGANIZATION(#2,#3,$);
             #2=IFCPERSON($,'Doe',$,$,$,$,$,$);
             #3=IFCORGANIZATION($,'Acme',$,$,$);
             #5=IFCOWNERHISTORY(#1,$,$,.ADDED.,$,$,$,1700000000);
             #6=IFCOWNERHISTORY(#1,$,$,.ADDED.,$,$,$,1700000000);
             #7=IFCOWNERHISTORY(#1,$,$,.MODIFIED.,$,$,$,1700000500);
             #10=IFCWALL('w1',#5,'A',$,$,$,$,$,$);
             #11=IFCWALL('w2',#6,'B',$,$,$,$,$,$);
             #12=IFCWALL('w3',#7,'C',$,$,$,$,$,$);",
        )
        .unwrap();
        let mut stats = OptimizationStats::default();
        assert_eq!(merge_definitions(&mut graph, &mut stats).unwrap(), 1);
        assert!(!graph.contains(6));
        assert_eq!(graph.get(11).unwrap().get_ref(1), Some(5));
        assert_eq!(graph.get(12).unwrap().get_ref(1), Some(7));
        assert!(stats.merged_global_ids.is_empty());
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn padded_placeholders_are_recognized() {
        let mut graph = parse_model(
            "#1=IFCPROPERTYSINGLEVALUE('A',$,IFCLABEL(' - '),$);
             #2=IFCPROPERTYSINGLEVALUE('B',$,IFCLABEL('-'),$);
             #3=IFCPROPERTYSINGLEVALUE('C',$,IFCLABEL('- x'),$);",
        )
        .unwrap();
        let placeholders: Vec<EntityId> = graph
            .iter()
            .filter(|e| is_placeholder(e, "-"))
            .map(|e| e.id)
            .collect();
        assert_eq!(placeholders, vec![1, 2]);
        assert!(is_placeholder(graph.get(2).unwrap(), " - "));
    }

    #[test]
    fn unlinked_property_sets_are_removed() {
        let text = format!(
            "{}#40=IFCPROPERTYSINGLEVALUE('Loose',$,IFCLABEL('y'),$);\n\
             #41=IFCPROPERTYSET('g4',$,'Pset_Loose',$,(#40));",
            MODEL
        );
        let mut graph = parse_model(&text).unwrap();
        let stats = run_with(&mut graph, |g, ctx| {
            assert_eq!(remove_unused_definitions(g, ctx).unwrap(), 1);
        });
        assert!(!graph.contains(41));
        assert!(!graph.contains(40));
        assert_eq!(stats.removed_by_category.property_sets, 2);
        assert!(graph.contains(12) && graph.contains(21) && graph.contains(31));
    }

    #[test]
    fn stage_is_idempotent() {
        let mut graph = parse_model(MODEL).unwrap();
        let first = run_with(&mut graph, |g, ctx| {
            run(g, ctx).unwrap();
        });
        assert_eq!(first.cleared_attributes, 1);
        assert_eq!(first.merged_property_count, 2);

        let snapshot = ifc_lite_core::writer::write_data(&graph);
        run_with(&mut graph, |g, ctx| {
            assert_eq!(run(g, ctx).unwrap(), 0);
        });
        assert_eq!(ifc_lite_core::writer::write_data(&graph), snapshot);
    }
}
