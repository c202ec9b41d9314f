// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry deduplication
//!
//! When lossy rounding is configured, stored coordinates are rounded first.
//! Coincident points and directions are merged next. Shape representations
//! are then canonicalized in parallel and every representation whose form
//! equals an earlier one is merged into it: the lowest id survives and all
//! references are redirected before the duplicate's item subgraph is swept.

use ifc_lite_core::{AttributeValue, EntityGraph, EntityId, IfcType, Result};
use ifc_lite_geometry::{canonical_shapes, quantize, CanonicalShape};
use rustc_hash::FxHashMap;

use crate::analysis::sweep_orphans;
use crate::progress::StageContext;
use crate::rewire::merge_into;

fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}

/// Rewrite stored coordinates of points and point lists to `precision`
/// decimals. Lossy. Returns the number of entities that changed.
pub fn round_coordinates(graph: &mut EntityGraph, precision: u32) -> Result<usize> {
    let scale = 10f64.powi(precision as i32);
    let round_list = |items: &[AttributeValue]| -> Vec<AttributeValue> {
        items
            .iter()
            .map(|item| match item {
                AttributeValue::Float(v) if v.is_finite() => AttributeValue::Float(round_to(*v, scale)),
                other => other.clone(),
            })
            .collect()
    };

    let mut updates: Vec<(EntityId, AttributeValue)> = Vec::new();
    for entity in graph.iter() {
        if graph.is_pinned(entity.id) {
            continue;
        }
        let Some(coords) = entity.get_list(0) else {
            continue;
        };
        let rounded = match entity.ifc_type {
            IfcType::IfcCartesianPoint => round_list(coords),
            IfcType::IfcCartesianPointList3D => coords
                .iter()
                .map(|point| match point {
                    AttributeValue::List(items) => AttributeValue::List(round_list(items)),
                    other => other.clone(),
                })
                .collect(),
            _ => continue,
        };
        if rounded.as_slice() != coords {
            updates.push((entity.id, AttributeValue::List(rounded)));
        }
    }

    let count = updates.len();
    for (id, value) in updates {
        graph.set_attribute(id, 0, value)?;
    }
    if count > 0 {
        tracing::debug!(rounded = count, precision, "Rounded stored coordinates");
    }
    Ok(count)
}

/// Merge `IfcCartesianPoint`s and `IfcDirection`s that are equal after
/// quantization to `precision` decimals. Returns the number merged.
pub fn merge_points(graph: &mut EntityGraph, precision: u32) -> Result<usize> {
    let mut survivors: FxHashMap<(bool, Vec<i64>), EntityId> = FxHashMap::default();
    let mut merges: Vec<(EntityId, EntityId)> = Vec::new();

    for entity in graph.iter() {
        let is_direction = match entity.ifc_type {
            IfcType::IfcCartesianPoint => false,
            IfcType::IfcDirection => true,
            _ => continue,
        };
        let Some(coords) = entity.get_list(0) else {
            continue;
        };
        let key: Option<Vec<i64>> = coords
            .iter()
            .map(|c| c.as_float().filter(|v| v.is_finite()).map(|v| quantize(v, precision)))
            .collect();
        let Some(key) = key else {
            continue;
        };
        match survivors.get(&(is_direction, key.clone())) {
            Some(&survivor) if !graph.is_pinned(entity.id) => merges.push((entity.id, survivor)),
            Some(_) => {}
            None => {
                survivors.insert((is_direction, key), entity.id);
            }
        }
    }

    for &(duplicate, survivor) in &merges {
        merge_into(graph, duplicate, survivor)?;
        graph.remove(duplicate)?;
    }
    if !merges.is_empty() {
        tracing::debug!(merged = merges.len(), "Merged coincident points and directions");
    }
    Ok(merges.len())
}

/// Merge equivalent shape representations. Returns the number merged.
pub fn merge_representations(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    let ids = graph.all_ids_of_type(&IfcType::IfcShapeRepresentation);
    let total = ids.len();
    let precision = ctx.config.coordinate_precision;
    let batch = ctx.batch_size();

    let mut shapes = Vec::with_capacity(total);
    for (index, chunk) in ids.chunks(batch).enumerate() {
        ctx.checkpoint()?;
        shapes.extend(canonical_shapes(ctx.kernel, graph, chunk, precision));
        ctx.report(((index + 1) * batch).min(total), total);
    }

    let tolerance = ctx.config.geometry_tolerance;
    let near = ctx.config.enable_near_duplicate_merge;
    let mut survivors: Vec<CanonicalShape> = Vec::new();
    let mut by_fingerprint: FxHashMap<u64, Vec<usize>> = FxHashMap::default();
    let mut by_skeleton: FxHashMap<u64, Vec<usize>> = FxHashMap::default();
    let mut merges: Vec<(EntityId, EntityId)> = Vec::new();

    for (id, result) in shapes {
        let shape = match result {
            Ok(shape) => shape,
            Err(e) => {
                tracing::warn!(id, error = %e, "Skipping representation that cannot be canonicalized");
                ctx.stats.skip(
                    id,
                    &IfcType::IfcShapeRepresentation,
                    ctx.stage,
                    e.for_entity(id).to_string(),
                );
                continue;
            }
        };

        let exact = by_fingerprint
            .get(&shape.fingerprint)
            .and_then(|candidates| candidates.iter().find(|&&i| survivors[i].same_as(&shape)));
        let matched = match exact {
            Some(&i) => Some(i),
            None if near => by_skeleton
                .get(&shape.skeleton)
                .and_then(|candidates| candidates.iter().find(|&&i| survivors[i].near(&shape, tolerance)))
                .copied(),
            None => None,
        };

        match matched {
            Some(i) if !graph.is_pinned(id) => merges.push((id, survivors[i].id)),
            _ => {
                let index = survivors.len();
                by_fingerprint.entry(shape.fingerprint).or_default().push(index);
                by_skeleton.entry(shape.skeleton).or_default().push(index);
                survivors.push(shape);
            }
        }
    }

    if merges.is_empty() {
        return Ok(0);
    }

    let mut duplicates = Vec::with_capacity(merges.len());
    for &(duplicate, survivor) in &merges {
        merge_into(graph, duplicate, survivor)?;
        duplicates.push(duplicate);
    }
    let removed = sweep_orphans(graph, &duplicates)?;
    let orphaned: Vec<_> = removed
        .into_iter()
        .filter(|(id, _)| duplicates.binary_search(id).is_err())
        .collect();
    ctx.stats.record_removed(&orphaned);

    tracing::debug!(
        representations = total,
        merged = merges.len(),
        orphaned = orphaned.len(),
        "Merged equivalent representations"
    );
    Ok(merges.len())
}

/// Geometry deduplication stage
pub fn run(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    ctx.checkpoint()?;
    let rounded = match ctx.config.lossy_rounding_precision {
        Some(precision) => round_coordinates(graph, precision)?,
        None => 0,
    };
    ctx.stats.rounded_point_count += rounded;

    let points = merge_points(graph, ctx.config.coordinate_precision)?;
    ctx.stats.merged_point_count += points;

    let representations = merge_representations(graph, ctx)?;
    ctx.stats.merged_geometry_count += representations;
    Ok(rounded + points + representations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OptimizerConfig, Stage};
    use crate::progress::CancellationToken;
    use crate::stats::OptimizationStats;
    use ifc_lite_core::parse_model;
    use ifc_lite_geometry::DefaultKernel;

    const TWO_WALLS: &str = r#"
#1=IFCPROJECT('p',$,'Project',$,$,$,$,(#4),$);
#2=IFCCARTESIANPOINT((0.,0.,0.));
#3=IFCAXIS2PLACEMENT3D(#2,$,$);
#4=IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.E-05,#3,$);
#5=IFCDIRECTION((0.,0.,1.));
#10=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,1.,1.);
#11=IFCEXTRUDEDAREASOLID(#10,#3,#5,5.);
#12=IFCSHAPEREPRESENTATION(#4,'Body','SweptSolid',(#11));
#13=IFCPRODUCTDEFINITIONSHAPE($,$,(#12));
#20=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,1.,1.);
#21=IFCEXTRUDEDAREASOLID(#20,#3,#25,5.);
#22=IFCSHAPEREPRESENTATION(#4,'Body','SweptSolid',(#21));
#23=IFCPRODUCTDEFINITIONSHAPE($,$,(#22));
#25=IFCDIRECTION((0.,0.,1.));
#30=IFCWALL('w1',$,$,$,$,$,#13,$,$);
#31=IFCWALL('w2',$,$,$,$,$,#23,$,$);
#32=IFCRELCONTAINEDINSPATIALSTRUCTURE('r',$,$,$,(#30,#31),#33);
#33=IFCSITE('s',$,'Site',$,$,$,$,$,.ELEMENT.,$,$,$,$,$);
#34=IFCRELAGGREGATES('a',$,$,$,#1,(#33));
"#;

    fn run_stage(graph: &mut EntityGraph, config: &OptimizerConfig) -> (usize, OptimizationStats) {
        let mut stats = OptimizationStats::default();
        let token = CancellationToken::new();
        let changes = {
            let mut ctx = StageContext::new(config, &DefaultKernel, &mut stats, Stage::Dedup, None, &token);
            run(graph, &mut ctx).unwrap()
        };
        (changes, stats)
    }

    #[test]
    fn points_merge_after_quantization() {
        let mut graph = parse_model(
            "#1=IFCCARTESIANPOINT((0.,0.,0.));\n\
             #2=IFCCARTESIANPOINT((0.0000001,0.,0.));\n\
             #3=IFCDIRECTION((0.,0.,0.));\n\
             #4=IFCPOLYLINE((#1,#2));\n\
             #5=IFCAXIS2PLACEMENT3D(#2,#3,$);",
        )
        .unwrap();
        assert_eq!(merge_points(&mut graph, 6).unwrap(), 1);
        assert!(!graph.contains(2));
        assert!(graph.contains(3), "directions never merge with points");
        assert_eq!(graph.get(5).unwrap().get_ref(0), Some(1));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn lossy_rounding_is_opt_in() {
        let text = "#1=IFCCARTESIANPOINT((1.23456,2.,0.0004));\n\
                    #2=IFCCARTESIANPOINT((1.2349,2.,0.));\n\
                    #3=IFCCARTESIANPOINTLIST3D(((0.12345,1.,2.),(3.,4.,5.)));\n\
                    #4=IFCCARTESIANPOINT((5.,5.,5.));\n\
                    #5=IFCPOLYLINE((#1,#2,#4));";
        let coords = |graph: &EntityGraph, id: EntityId| -> Vec<f64> {
            graph.get(id).unwrap().get_list(0).unwrap().iter().filter_map(|c| c.as_float()).collect()
        };

        let mut graph = parse_model(text).unwrap();
        let (_, stats) = run_stage(&mut graph, &OptimizerConfig::default());
        assert_eq!(stats.rounded_point_count, 0);
        assert_eq!(coords(&graph, 1), vec![1.23456, 2.0, 0.0004]);

        let config = OptimizerConfig {
            lossy_rounding_precision: Some(2),
            ..OptimizerConfig::default()
        };
        let mut graph = parse_model(text).unwrap();
        let (_, stats) = run_stage(&mut graph, &config);
        assert_eq!(stats.rounded_point_count, 3);
        assert_eq!(coords(&graph, 1), vec![1.23, 2.0, 0.0]);
        // #2 rounds onto #1 and merges into it
        assert_eq!(stats.merged_point_count, 1);
        assert!(!graph.contains(2));
        assert_eq!(graph.get(5).unwrap().get_refs(0).as_slice(), &[1, 1, 4]);
        let first = graph.get(3).unwrap().get_list(0).unwrap()[0].clone();
        assert_eq!(
            first,
            AttributeValue::List(vec![
                AttributeValue::Float(0.12),
                AttributeValue::Float(1.0),
                AttributeValue::Float(2.0)
            ])
        );

        let (changes, _) = run_stage(&mut graph, &config);
        assert_eq!(changes, 0);
    }

    #[test]
    fn identical_representations_share_the_lowest_id() {
        let mut graph = parse_model(TWO_WALLS).unwrap();
        let (_, stats) = run_stage(&mut graph, &OptimizerConfig::default());

        assert_eq!(stats.merged_geometry_count, 1);
        assert_eq!(stats.merged_point_count, 1);
        assert!(graph.contains(12));
        assert!(!graph.contains(22));
        assert!(!graph.contains(21));
        assert!(!graph.contains(20));
        assert_eq!(graph.get(23).unwrap().get_refs(2).as_slice(), &[12]);
        assert!(graph.contains(30) && graph.contains(31));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn second_run_changes_nothing() {
        let mut graph = parse_model(TWO_WALLS).unwrap();
        let config = OptimizerConfig::default();
        run_stage(&mut graph, &config);
        let (changes, _) = run_stage(&mut graph, &config);
        assert_eq!(changes, 0);
    }

    #[test]
    fn near_duplicates_need_opt_in() {
        let text = TWO_WALLS.replace(
            "#20=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,1.,1.);",
            "#20=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,1.0002,1.);",
        );
        let mut graph = parse_model(&text).unwrap();
        let (_, stats) = run_stage(&mut graph, &OptimizerConfig::default());
        assert_eq!(stats.merged_geometry_count, 0);

        let mut graph = parse_model(&text).unwrap();
        let config = OptimizerConfig {
            enable_near_duplicate_merge: true,
            ..OptimizerConfig::default()
        };
        let (_, stats) = run_stage(&mut graph, &config);
        assert_eq!(stats.merged_geometry_count, 1);
        assert!(!graph.contains(22));
    }

    #[test]
    fn broken_representations_are_skipped() {
        let text = TWO_WALLS.replace(
            "#21=IFCEXTRUDEDAREASOLID(#20,#3,#25,5.);",
            "#21=IFCEXTRUDEDAREASOLID(#20,#3,#25,$);",
        );
        let mut graph = parse_model(&text).unwrap();
        let (_, stats) = run_stage(&mut graph, &OptimizerConfig::default());
        assert_eq!(stats.merged_geometry_count, 0);
        assert_eq!(stats.skipped_entities.len(), 1);
        assert_eq!(stats.skipped_entities[0].id, 22);
        assert!(graph.contains(22));
    }
}
