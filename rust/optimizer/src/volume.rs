// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small-element filter
//!
//! Elements whose body volume (in m³) is below `volume_threshold` are removed
//! together with their relationship links. Elements without solid geometry,
//! or whose volume cannot be estimated, always stay.

use ifc_lite_core::{volume_scale, EntityGraph, EntityId, Error, IfcType, Result};
use ifc_lite_geometry::element_volumes;

use crate::analysis::{detach, sweep_orphans};
use crate::progress::StageContext;

fn is_candidate(graph: &EntityGraph, id: EntityId) -> bool {
    graph.get(id).is_some_and(|entity| {
        entity.ifc_type.is_element()
            && entity.ifc_type != IfcType::IfcOpeningElement
            // IfcProduct.Representation
            && entity.get_ref(6).is_some()
            && !graph.is_pinned(id)
    })
}

/// Elements below `threshold` m³, ascending by id
pub fn small_elements(graph: &EntityGraph, ctx: &mut StageContext<'_>) -> Result<Vec<(EntityId, f64)>> {
    let candidates: Vec<EntityId> = graph.ids().filter(|&id| is_candidate(graph, id)).collect();
    let total = candidates.len();
    let batch = ctx.batch_size();
    let scale = volume_scale(graph);
    let threshold = ctx.config.volume_threshold;

    let mut small = Vec::new();
    for (index, chunk) in candidates.chunks(batch).enumerate() {
        ctx.checkpoint()?;
        for (id, result) in element_volumes(ctx.kernel, graph, chunk) {
            match result {
                Ok(Some(volume)) => {
                    let volume = volume.abs() * scale;
                    if volume < threshold {
                        small.push((id, volume));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let kind = graph.entity(id)?.ifc_type.clone();
                    tracing::warn!(id, kind = %kind, error = %e, "Keeping element with unknown volume");
                    ctx.stats.skip(id, &kind, ctx.stage, e.for_entity(id).to_string());
                }
            }
        }
        ctx.report(((index + 1) * batch).min(total), total);
    }
    Ok(small)
}

/// Volume filter stage
pub fn run(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    let small = small_elements(graph, ctx)?;
    if small.is_empty() {
        return Ok(0);
    }

    let mut removed = 0;
    let mut seeds = Vec::new();
    for (id, volume) in small {
        ctx.checkpoint()?;
        let kind = graph.entity(id)?.ifc_type.clone();
        match detach(graph, id) {
            Ok(detached) => {
                tracing::debug!(id, kind = %kind, volume, "Removed small element");
                ctx.stats.removed_by_category.small_elements += 1;
                let others: Vec<_> = detached.removed.into_iter().filter(|(r, _)| *r != id).collect();
                ctx.stats.record_removed(&others);
                seeds.extend(detached.seeds);
                removed += 1;
            }
            Err(Error::DanglingReference { referrers, .. }) => {
                tracing::warn!(id, ?referrers, "Keeping small element that others depend on");
                ctx.stats.skip(
                    id,
                    &kind,
                    ctx.stage,
                    format!("still required by {:?}", referrers),
                );
            }
            Err(e) => return Err(e),
        }
    }

    let swept = sweep_orphans(graph, &seeds)?;
    ctx.stats.record_removed(&swept);
    tracing::debug!(removed, swept = swept.len(), "Filtered small elements");
    Ok(removed)
}
