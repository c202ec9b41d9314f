// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Schema mapping
//!
//! Declarative tables rewrite entity kinds and attribute layouts between
//! IFC2X3, IFC4 and IFC4X3. IFC2X3 and IFC4X3 are converted through IFC4.
//! Kinds without a rule that exist in the target are copied unchanged;
//! kinds that do not exist there follow the configured [`UnmappedPolicy`].

use std::collections::BTreeSet;
use std::sync::OnceLock;

use ifc_lite_core::layout;
use ifc_lite_core::{AttributeValue, EntityGraph, EntityId, Error, IfcType, Result, SchemaVersion};
use ifc_lite_geometry::quantize;
use rustc_hash::FxHashMap;

use crate::analysis::{detach, sweep_orphans};
use crate::cleaner::clear_defaults;
use crate::config::{Stage, UnmappedPolicy};
use crate::progress::StageContext;

/// Literal written into a target slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Const {
    Enum(&'static str),
    Text(&'static str),
}

impl Const {
    fn value(self) -> AttributeValue {
        match self {
            Const::Enum(e) => AttributeValue::Enum(e.to_string()),
            Const::Text(t) => AttributeValue::String(t.to_string()),
        }
    }
}

/// How one target slot is filled
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotRule {
    /// Source slot as is
    Copy(usize),
    /// Source slot, or the constant when the source is unset
    CopyOr(usize, Const),
    Constant(Const),
    Null,
    /// Source slot, or a shared identity IfcAxis2Placement3D
    Placement3D(usize),
    /// Source slot, or a shared identity IfcAxis2Placement2D
    Placement2D(usize),
}

/// Target kind plus its slot list
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub kind: IfcType,
    pub slots: Vec<SlotRule>,
}

/// Mapping of one source kind
#[derive(Debug, Clone, PartialEq)]
pub struct KindRule {
    pub target: Option<Conversion>,
    /// Used under [`UnmappedPolicy::Fallback`] when there is no target
    pub fallback: Option<Conversion>,
}

pub type MappingTable = FxHashMap<IfcType, KindRule>;

static TABLES: OnceLock<[MappingTable; 4]> = OnceLock::new();

fn copy(range: std::ops::Range<usize>) -> Vec<SlotRule> {
    range.map(SlotRule::Copy).collect()
}

fn slots(parts: impl IntoIterator<Item = Vec<SlotRule>>) -> Vec<SlotRule> {
    parts.into_iter().flatten().collect()
}

fn to(kind: IfcType, slots: Vec<SlotRule>) -> KindRule {
    KindRule {
        target: Some(Conversion { kind, slots }),
        fallback: None,
    }
}

fn ifc4_to_ifc2x3() -> MappingTable {
    use IfcType::*;
    use SlotRule::*;

    let mut table = MappingTable::default();
    // PredefinedType has no IFC2X3 slot
    for kind in [
        IfcWall,
        IfcWallStandardCase,
        IfcBeam,
        IfcColumn,
        IfcMember,
        IfcPlate,
        IfcOpeningElement,
        IfcBuildingElementProxy,
    ] {
        let mut rule = copy(0..8);
        if kind == IfcBuildingElementProxy {
            rule.push(Null);
        }
        table.insert(kind.clone(), to(kind, rule));
    }
    for kind in [IfcSlab, IfcRailing, IfcCovering] {
        table.insert(kind.clone(), to(kind, copy(0..9)));
    }
    for kind in [IfcRoof, IfcStair, IfcFooting] {
        table.insert(
            kind.clone(),
            to(kind, slots([copy(0..8), vec![CopyOr(8, Const::Enum("NOTDEFINED"))]])),
        );
    }
    for kind in [IfcDoor, IfcWindow] {
        table.insert(kind.clone(), to(kind, copy(0..10)));
    }
    table.insert(IfcFurniture, to(IfcFurnishingElement, copy(0..8)));
    table.insert(IfcPipeSegment, to(IfcFlowSegment, copy(0..8)));
    table.insert(IfcDuctSegment, to(IfcFlowSegment, copy(0..8)));

    // CompositionType is mandatory in IFC2X3
    let composition = CopyOr(8, Const::Enum("ELEMENT"));
    table.insert(IfcSite, to(IfcSite, slots([copy(0..8), vec![composition], copy(9..14)])));
    table.insert(
        IfcBuilding,
        to(IfcBuilding, slots([copy(0..8), vec![composition], copy(9..12)])),
    );
    table.insert(
        IfcBuildingStorey,
        to(IfcBuildingStorey, slots([copy(0..8), vec![composition], vec![Copy(9)]])),
    );
    table.insert(
        IfcSpace,
        to(
            IfcSpace,
            slots([
                copy(0..8),
                vec![composition, Constant(Const::Enum("NOTDEFINED")), Copy(10)],
            ]),
        ),
    );

    let mut owner_history = copy(0..8);
    owner_history[3] = CopyOr(3, Const::Enum("NOCHANGE"));
    table.insert(IfcOwnerHistory, to(IfcOwnerHistory, owner_history));

    table.insert(IfcMaterial, to(IfcMaterial, copy(0..1)));
    table.insert(IfcMaterialLayer, to(IfcMaterialLayer, copy(0..3)));
    table.insert(IfcMaterialLayerSet, to(IfcMaterialLayerSet, copy(0..2)));
    table.insert(IfcMaterialLayerSetUsage, to(IfcMaterialLayerSetUsage, copy(0..4)));
    for kind in [IfcQuantityLength, IfcQuantityArea, IfcQuantityVolume] {
        table.insert(kind.clone(), to(kind, copy(0..4)));
    }
    // EditionDate is an IfcCalendarDate reference in IFC2X3
    table.insert(
        IfcClassification,
        to(
            IfcClassification,
            vec![
                CopyOr(0, Const::Text("")),
                CopyOr(1, Const::Text("")),
                Null,
                Copy(3),
            ],
        ),
    );
    table.insert(IfcClassificationReference, to(IfcClassificationReference, copy(0..4)));

    // Positions are mandatory in IFC2X3
    table.insert(
        IfcExtrudedAreaSolid,
        to(IfcExtrudedAreaSolid, vec![Copy(0), Placement3D(1), Copy(2), Copy(3)]),
    );
    table.insert(
        IfcRectangleProfileDef,
        to(
            IfcRectangleProfileDef,
            vec![Copy(0), Copy(1), Placement2D(2), Copy(3), Copy(4)],
        ),
    );
    table.insert(
        IfcCircleProfileDef,
        to(IfcCircleProfileDef, vec![Copy(0), Copy(1), Placement2D(2), Copy(3)]),
    );
    table
}

fn ifc2x3_to_ifc4() -> MappingTable {
    use IfcType::*;
    use SlotRule::*;

    let mut table = MappingTable::default();
    for kind in [
        IfcWall,
        IfcWallStandardCase,
        IfcBeam,
        IfcColumn,
        IfcMember,
        IfcPlate,
        IfcOpeningElement,
        // CompositionType does not survive
        IfcBuildingElementProxy,
    ] {
        table.insert(kind.clone(), to(kind, slots([copy(0..8), vec![Null]])));
    }
    // ShapeType and PredefinedType share the enumeration values that matter
    for kind in [IfcSlab, IfcRailing, IfcCovering, IfcRoof, IfcStair, IfcFooting] {
        table.insert(kind.clone(), to(kind, copy(0..9)));
    }
    for kind in [IfcDoor, IfcWindow] {
        table.insert(kind.clone(), to(kind, slots([copy(0..10), vec![Null, Null, Null]])));
    }
    table.insert(
        IfcSpace,
        to(IfcSpace, slots([copy(0..9), vec![Null, Copy(10)]])),
    );

    table.insert(IfcMaterial, to(IfcMaterial, slots([copy(0..1), vec![Null, Null]])));
    table.insert(
        IfcMaterialLayer,
        to(IfcMaterialLayer, slots([copy(0..3), vec![Null; 4]])),
    );
    table.insert(
        IfcMaterialLayerSet,
        to(IfcMaterialLayerSet, slots([copy(0..2), vec![Null]])),
    );
    table.insert(
        IfcMaterialLayerSetUsage,
        to(IfcMaterialLayerSetUsage, slots([copy(0..4), vec![Null]])),
    );
    for kind in [IfcQuantityLength, IfcQuantityArea, IfcQuantityVolume] {
        table.insert(kind.clone(), to(kind, slots([copy(0..4), vec![Null]])));
    }
    table.insert(
        IfcClassification,
        to(
            IfcClassification,
            vec![Copy(0), Copy(1), Null, Copy(3), Null, Null, Null],
        ),
    );
    table.insert(
        IfcClassificationReference,
        to(IfcClassificationReference, slots([copy(0..4), vec![Null, Null]])),
    );
    table
}

fn ifc4x3_to_ifc4() -> MappingTable {
    use IfcType::*;

    let mut table = MappingTable::default();
    // Alignments have no IFC4 counterpart at all
    table.insert(
        IfcAlignment,
        KindRule {
            target: None,
            fallback: None,
        },
    );
    table.insert(
        IfcCourse,
        KindRule {
            target: None,
            fallback: Some(Conversion {
                kind: IfcBuildingElementProxy,
                slots: slots([copy(0..8), vec![SlotRule::Null]]),
            }),
        },
    );
    table
}

fn ifc4_to_ifc4x3() -> MappingTable {
    use IfcType::*;

    let mut table = MappingTable::default();
    table.insert(IfcWallStandardCase, to(IfcWall, copy(0..9)));
    table
}

fn table_index(from: SchemaVersion, to: SchemaVersion) -> Option<usize> {
    use SchemaVersion::*;
    match (from, to) {
        (Ifc4, Ifc2x3) => Some(0),
        (Ifc2x3, Ifc4) => Some(1),
        (Ifc4x3, Ifc4) => Some(2),
        (Ifc4, Ifc4x3) => Some(3),
        _ => None,
    }
}

/// Mapping table for a direct conversion, if one ships
pub fn table(from: SchemaVersion, to: SchemaVersion) -> Option<&'static MappingTable> {
    let tables = TABLES.get_or_init(|| {
        [
            ifc4_to_ifc2x3(),
            ifc2x3_to_ifc4(),
            ifc4x3_to_ifc4(),
            ifc4_to_ifc4x3(),
        ]
    });
    table_index(from, to).map(|index| &tables[index])
}

/// Direct conversions leading from `from` to `to`
pub fn route(from: SchemaVersion, to: SchemaVersion) -> Vec<(SchemaVersion, SchemaVersion)> {
    if from == to {
        Vec::new()
    } else if table_index(from, to).is_some() {
        vec![(from, to)]
    } else {
        vec![(from, SchemaVersion::Ifc4), (SchemaVersion::Ifc4, to)]
    }
}

/// Identity placements created on demand and shared by every rule.
///
/// Origins already in the model are reused, so a later point merge finds
/// nothing new to merge.
#[derive(Default)]
struct DefaultPlacements {
    precision: u32,
    origin_2d: Option<EntityId>,
    origin_3d: Option<EntityId>,
    placement_3d: Option<EntityId>,
    placement_2d: Option<EntityId>,
}

/// Lowest-id point of `dims` coordinates that quantizes to the origin
fn existing_origin(graph: &EntityGraph, dims: usize, precision: u32) -> Option<EntityId> {
    graph
        .all_ids_of_type(&IfcType::IfcCartesianPoint)
        .into_iter()
        .find(|&id| {
            graph.get(id).and_then(|point| point.get_list(0)).is_some_and(|coords| {
                coords.len() == dims
                    && coords.iter().all(|c| {
                        c.as_float()
                            .is_some_and(|v| v.is_finite() && quantize(v, precision) == 0)
                    })
            })
        })
}

impl DefaultPlacements {
    fn new(precision: u32) -> Self {
        Self {
            precision,
            ..Self::default()
        }
    }

    fn origin(&mut self, graph: &mut EntityGraph, dims: usize) -> Result<EntityId> {
        let cached = if dims == 2 { self.origin_2d } else { self.origin_3d };
        if let Some(id) = cached {
            return Ok(id);
        }
        let id = match existing_origin(graph, dims, self.precision) {
            Some(id) => id,
            None => {
                let zero = vec![AttributeValue::Float(0.0); dims];
                graph.add(IfcType::IfcCartesianPoint, vec![AttributeValue::List(zero)])?
            }
        };
        if dims == 2 {
            self.origin_2d = Some(id);
        } else {
            self.origin_3d = Some(id);
        }
        Ok(id)
    }

    fn get(&mut self, graph: &mut EntityGraph, dims: usize) -> Result<EntityId> {
        let cached = if dims == 2 { self.placement_2d } else { self.placement_3d };
        if let Some(id) = cached {
            return Ok(id);
        }
        let origin = self.origin(graph, dims)?;
        let id = if dims == 2 {
            graph.add(
                IfcType::IfcAxis2Placement2D,
                vec![AttributeValue::EntityRef(origin), AttributeValue::Null],
            )?
        } else {
            graph.add(
                IfcType::IfcAxis2Placement3D,
                vec![AttributeValue::EntityRef(origin), AttributeValue::Null, AttributeValue::Null],
            )?
        };
        if dims == 2 {
            self.placement_2d = Some(id);
        } else {
            self.placement_3d = Some(id);
        }
        Ok(id)
    }
}

fn convert(
    graph: &mut EntityGraph,
    id: EntityId,
    conversion: &Conversion,
    placements: &mut DefaultPlacements,
) -> Result<()> {
    let source = graph.entity(id)?.attributes.clone();
    let value_at = |slot: usize| source.get(slot).cloned().unwrap_or(AttributeValue::Null);
    let mut attributes = Vec::with_capacity(conversion.slots.len());
    for rule in &conversion.slots {
        let value = match *rule {
            SlotRule::Copy(slot) => value_at(slot),
            SlotRule::CopyOr(slot, constant) => match value_at(slot) {
                AttributeValue::Null => constant.value(),
                other => other,
            },
            SlotRule::Constant(constant) => constant.value(),
            SlotRule::Null => AttributeValue::Null,
            SlotRule::Placement3D(slot) | SlotRule::Placement2D(slot) => match value_at(slot) {
                AttributeValue::Null => {
                    let dims = if matches!(rule, SlotRule::Placement2D(_)) { 2 } else { 3 };
                    AttributeValue::EntityRef(placements.get(graph, dims)?)
                }
                other => other,
            },
        };
        attributes.push(value);
    }
    graph.set_type(id, conversion.kind.clone(), attributes)
}

fn unmappable(id: EntityId, kind: &IfcType, target: SchemaVersion) -> String {
    Error::UnmappableEntity {
        id,
        kind: kind.as_str().to_string(),
        target: target.as_str().to_string(),
    }
    .to_string()
}

/// Apply one direct conversion. Returns the number of rewritten or removed
/// entities.
pub fn convert_step(
    graph: &mut EntityGraph,
    from: SchemaVersion,
    target: SchemaVersion,
    policy: UnmappedPolicy,
    ctx: &mut StageContext<'_>,
) -> Result<usize> {
    let Some(table) = table(from, target) else {
        return Err(Error::structural(format!("no mapping from {} to {}", from, target)));
    };
    let gaps_before = graph.mandatory_gaps();
    let ids: Vec<EntityId> = graph.ids().collect();
    let total = ids.len();
    let batch = ctx.batch_size();

    let mut placements = DefaultPlacements::new(ctx.config.coordinate_precision);
    let mut changes = 0;
    let mut to_drop = Vec::new();
    for (index, chunk) in ids.chunks(batch).enumerate() {
        ctx.checkpoint()?;
        for &id in chunk {
            let kind = graph.entity(id)?.ifc_type.clone();
            let rule = table.get(&kind);
            let conversion = rule.and_then(|rule| match (&rule.target, policy) {
                (Some(conversion), _) => Some(conversion),
                (None, UnmappedPolicy::Fallback) => rule.fallback.as_ref(),
                (None, _) => None,
            });
            if let Some(conversion) = conversion {
                convert(graph, id, conversion, &mut placements)?;
                changes += 1;
            } else if !target.supports(&kind) {
                if policy == UnmappedPolicy::Drop {
                    to_drop.push((id, kind));
                } else {
                    tracing::debug!(id, kind = %kind, schema = %target, "Entity has no counterpart");
                    ctx.stats.unmapped(id, &kind, ctx.stage, unmappable(id, &kind, target));
                }
            }
        }
        ctx.report(((index + 1) * batch).min(total), total);
    }

    let mut seeds = Vec::new();
    for (id, kind) in to_drop {
        if !graph.contains(id) {
            continue;
        }
        match detach(graph, id) {
            Ok(detached) => {
                ctx.stats.record_removed(&detached.removed);
                ctx.stats.unmapped(
                    id,
                    &kind,
                    ctx.stage,
                    format!("removed: no {} counterpart", target),
                );
                seeds.extend(detached.seeds);
                changes += 1;
            }
            Err(Error::DanglingReference { referrers, .. }) => {
                tracing::debug!(id, kind = %kind, ?referrers, "Cannot drop unmappable entity");
                ctx.stats.unmapped(id, &kind, ctx.stage, unmappable(id, &kind, target));
            }
            Err(e) => return Err(e),
        }
    }
    if !seeds.is_empty() {
        ctx.stats.record_removed(&sweep_orphans(graph, &seeds)?);
    }

    graph.set_schema(target);

    // Copies that lack a value the target requires are listed, not invented
    let new_gaps: BTreeSet<(EntityId, usize)> = graph
        .mandatory_gaps()
        .difference(&gaps_before)
        .copied()
        .collect();
    for (id, slot) in new_gaps {
        let Some(entity) = graph.get(id) else {
            continue;
        };
        let name = layout::attribute_def(target, &entity.ifc_type, slot).map_or("?", |def| def.name);
        ctx.stats.unmapped(
            id,
            &entity.ifc_type,
            ctx.stage,
            format!("{} requires {} which has no value", target, name),
        );
    }

    tracing::debug!(from = %from, to = %target, changes, "Converted schema");
    Ok(changes)
}

/// Schema mapping stage
pub fn run(graph: &mut EntityGraph, ctx: &mut StageContext<'_>) -> Result<usize> {
    let target = ctx.config.target_schema.resolve(graph.schema());
    let mut changes = 0;
    for (from, to) in route(graph.schema(), target) {
        changes += convert_step(graph, from, to, ctx.config.unmapped_policy, ctx)?;
    }
    // Copied values can be defaults in the target schema
    if changes > 0 && ctx.config.is_enabled(Stage::Clean) {
        let cleared = clear_defaults(graph)?;
        ctx.stats.cleared_attributes += cleared;
    }
    Ok(changes)
}
