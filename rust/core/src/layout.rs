// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attribute layouts
//!
//! Minimal schema definitions for the kinds the optimizer reasons about: the
//! ordered attribute slots of each kind, which of them are optional, their
//! schema default (if any) and how strongly a reference held in the slot ties
//! the two entities together. Layouts are built once per schema version.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::schema::{IfcType, SchemaVersion};

/// How a reference in a slot affects liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefStrength {
    /// Source live ⇒ target live
    Strong,
    /// Backward anchor: the source is live while one of its weak targets is;
    /// the target is never kept alive through this slot
    Weak,
}

/// One attribute slot of an entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: &'static str,
    pub optional: bool,
    pub strength: RefStrength,
    /// Enumeration value equivalent to leaving the slot unset
    pub default: Option<&'static str>,
}

impl AttributeDef {
    pub const fn req(name: &'static str) -> Self {
        Self {
            name,
            optional: false,
            strength: RefStrength::Strong,
            default: None,
        }
    }

    pub const fn opt(name: &'static str) -> Self {
        Self {
            name,
            optional: true,
            strength: RefStrength::Strong,
            default: None,
        }
    }

    pub const fn weak(mut self) -> Self {
        self.strength = RefStrength::Weak;
        self
    }

    pub const fn with_default(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }
}

use AttributeDef as A;

type LayoutMap = FxHashMap<IfcType, Vec<AttributeDef>>;

static LAYOUTS: OnceLock<[LayoutMap; 3]> = OnceLock::new();

fn schema_index(schema: SchemaVersion) -> usize {
    match schema {
        SchemaVersion::Ifc2x3 => 0,
        SchemaVersion::Ifc4 => 1,
        SchemaVersion::Ifc4x3 => 2,
    }
}

/// Attribute slots of `kind` in `schema`, or `None` for kinds without a layout
pub fn layout(schema: SchemaVersion, kind: &IfcType) -> Option<&'static [AttributeDef]> {
    if kind.is_unknown() || !schema.supports(kind) {
        return None;
    }
    let maps = LAYOUTS.get_or_init(|| {
        [
            build(SchemaVersion::Ifc2x3),
            build(SchemaVersion::Ifc4),
            build(SchemaVersion::Ifc4x3),
        ]
    });
    maps[schema_index(schema)].get(kind).map(Vec::as_slice)
}

pub fn attribute_def(schema: SchemaVersion, kind: &IfcType, slot: usize) -> Option<&'static AttributeDef> {
    layout(schema, kind).and_then(|defs| defs.get(slot))
}

/// Slot index of the attribute called `name`
pub fn slot_by_name(schema: SchemaVersion, kind: &IfcType, name: &str) -> Option<usize> {
    layout(schema, kind)?.iter().position(|def| def.name == name)
}

/// Reference strength of a slot; kinds without a layout are all strong
pub fn strength(schema: SchemaVersion, kind: &IfcType, slot: usize) -> RefStrength {
    attribute_def(schema, kind, slot)
        .map(|def| def.strength)
        .unwrap_or(RefStrength::Strong)
}

/// Whether a slot must never be null; slots without a layout are treated as optional
pub fn is_mandatory(schema: SchemaVersion, kind: &IfcType, slot: usize) -> bool {
    attribute_def(schema, kind, slot).is_some_and(|def| !def.optional)
}

fn root(schema: SchemaVersion) -> Vec<AttributeDef> {
    let owner_history = if schema == SchemaVersion::Ifc2x3 {
        A::req("OwnerHistory")
    } else {
        A::opt("OwnerHistory")
    };
    vec![
        A::req("GlobalId"),
        owner_history,
        A::opt("Name"),
        A::opt("Description"),
    ]
}

fn object(schema: SchemaVersion) -> Vec<AttributeDef> {
    let mut defs = root(schema);
    defs.push(A::opt("ObjectType"));
    defs
}

fn product(schema: SchemaVersion) -> Vec<AttributeDef> {
    let mut defs = object(schema);
    defs.extend([A::opt("ObjectPlacement"), A::opt("Representation")]);
    defs
}

fn element(schema: SchemaVersion) -> Vec<AttributeDef> {
    let mut defs = product(schema);
    defs.push(A::opt("Tag"));
    defs
}

fn with(mut base: Vec<AttributeDef>, extra: impl IntoIterator<Item = AttributeDef>) -> Vec<AttributeDef> {
    base.extend(extra);
    base
}

fn predefined() -> AttributeDef {
    A::opt("PredefinedType").with_default("NOTDEFINED")
}

fn spatial(schema: SchemaVersion) -> Vec<AttributeDef> {
    let composition = if schema == SchemaVersion::Ifc2x3 {
        A::req("CompositionType")
    } else {
        A::opt("CompositionType")
    };
    with(product(schema), [A::opt("LongName"), composition])
}

fn relationship(
    schema: SchemaVersion,
    extra: impl IntoIterator<Item = AttributeDef>,
) -> Vec<AttributeDef> {
    with(root(schema), extra)
}

fn build(schema: SchemaVersion) -> LayoutMap {
    use IfcType::*;

    let legacy = schema == SchemaVersion::Ifc2x3;
    let mut map: LayoutMap = FxHashMap::default();

    // Spatial structure
    let contexts = if legacy {
        [A::req("RepresentationContexts"), A::req("UnitsInContext")]
    } else {
        [A::opt("RepresentationContexts"), A::opt("UnitsInContext")]
    };
    map.insert(
        IfcProject,
        with(
            object(schema),
            [A::opt("LongName"), A::opt("Phase"), contexts[0], contexts[1]],
        ),
    );
    map.insert(
        IfcSite,
        with(
            spatial(schema),
            [
                A::opt("RefLatitude"),
                A::opt("RefLongitude"),
                A::opt("RefElevation"),
                A::opt("LandTitleNumber"),
                A::opt("SiteAddress"),
            ],
        ),
    );
    map.insert(
        IfcBuilding,
        with(
            spatial(schema),
            [
                A::opt("ElevationOfRefHeight"),
                A::opt("ElevationOfTerrain"),
                A::opt("BuildingAddress"),
            ],
        ),
    );
    map.insert(IfcBuildingStorey, with(spatial(schema), [A::opt("Elevation")]));
    let space_kind = if legacy {
        A::req("InteriorOrExteriorSpace")
    } else {
        predefined()
    };
    map.insert(
        IfcSpace,
        with(spatial(schema), [space_kind, A::opt("ElevationWithFlooring")]),
    );

    // Elements
    if legacy {
        for kind in [
            IfcWall,
            IfcWallStandardCase,
            IfcBeam,
            IfcColumn,
            IfcMember,
            IfcPlate,
            IfcOpeningElement,
            IfcFurnishingElement,
            IfcFlowSegment,
        ] {
            map.insert(kind, element(schema));
        }
        for kind in [IfcSlab, IfcRailing, IfcCovering] {
            map.insert(kind, with(element(schema), [A::opt("PredefinedType")]));
        }
        map.insert(IfcRoof, with(element(schema), [A::req("ShapeType")]));
        map.insert(IfcStair, with(element(schema), [A::req("ShapeType")]));
        map.insert(IfcFooting, with(element(schema), [A::req("PredefinedType")]));
        map.insert(
            IfcBuildingElementProxy,
            with(element(schema), [A::opt("CompositionType")]),
        );
        map.insert(
            IfcDoor,
            with(element(schema), [A::opt("OverallHeight"), A::opt("OverallWidth")]),
        );
        map.insert(
            IfcWindow,
            with(element(schema), [A::opt("OverallHeight"), A::opt("OverallWidth")]),
        );
    } else {
        for kind in [IfcFurnishingElement, IfcFlowSegment] {
            map.insert(kind, element(schema));
        }
        for kind in [
            IfcWall,
            IfcWallStandardCase,
            IfcSlab,
            IfcBeam,
            IfcColumn,
            IfcMember,
            IfcPlate,
            IfcRoof,
            IfcStair,
            IfcRailing,
            IfcCovering,
            IfcFooting,
            IfcBuildingElementProxy,
            IfcOpeningElement,
            IfcFurniture,
            IfcPipeSegment,
            IfcDuctSegment,
            IfcCourse,
        ] {
            map.insert(kind, with(element(schema), [predefined()]));
        }
        map.insert(
            IfcDoor,
            with(
                element(schema),
                [
                    A::opt("OverallHeight"),
                    A::opt("OverallWidth"),
                    predefined(),
                    A::opt("OperationType").with_default("NOTDEFINED"),
                    A::opt("UserDefinedOperationType"),
                ],
            ),
        );
        map.insert(
            IfcWindow,
            with(
                element(schema),
                [
                    A::opt("OverallHeight"),
                    A::opt("OverallWidth"),
                    predefined(),
                    A::opt("PartitioningType").with_default("NOTDEFINED"),
                    A::opt("UserDefinedPartitioningType"),
                ],
            ),
        );
        map.insert(IfcAlignment, with(product(schema), [A::opt("PredefinedType")]));
    }

    // Type objects
    for kind in [IfcWallType, IfcSlabType] {
        map.insert(
            kind,
            with(
                root(schema),
                [
                    A::opt("ApplicableOccurrence"),
                    A::opt("HasPropertySets"),
                    A::opt("RepresentationMaps"),
                    A::opt("Tag"),
                    A::opt("ElementType"),
                    A::req("PredefinedType"),
                ],
            ),
        );
    }

    // Relationships
    for kind in [IfcRelAggregates, IfcRelNests] {
        map.insert(
            kind,
            relationship(
                schema,
                [A::req("RelatingObject").weak(), A::req("RelatedObjects")],
            ),
        );
    }
    map.insert(
        IfcRelContainedInSpatialStructure,
        relationship(
            schema,
            [A::req("RelatedElements"), A::req("RelatingStructure").weak()],
        ),
    );
    map.insert(
        IfcRelDefinesByProperties,
        relationship(
            schema,
            [
                A::req("RelatedObjects").weak(),
                A::req("RelatingPropertyDefinition"),
            ],
        ),
    );
    map.insert(
        IfcRelDefinesByType,
        relationship(
            schema,
            [A::req("RelatedObjects").weak(), A::req("RelatingType")],
        ),
    );
    map.insert(
        IfcRelAssociatesMaterial,
        relationship(
            schema,
            [A::req("RelatedObjects").weak(), A::req("RelatingMaterial")],
        ),
    );
    map.insert(
        IfcRelAssociatesClassification,
        relationship(
            schema,
            [
                A::req("RelatedObjects").weak(),
                A::req("RelatingClassification"),
            ],
        ),
    );
    map.insert(
        IfcRelVoidsElement,
        relationship(
            schema,
            [
                A::req("RelatingBuildingElement").weak(),
                A::req("RelatedOpeningElement"),
            ],
        ),
    );
    map.insert(
        IfcRelFillsElement,
        relationship(
            schema,
            [
                A::req("RelatingOpeningElement").weak(),
                A::req("RelatedBuildingElement"),
            ],
        ),
    );

    // Properties and quantities
    map.insert(IfcPropertySet, with(root(schema), [A::req("HasProperties")]));
    map.insert(
        IfcElementQuantity,
        with(
            root(schema),
            [A::opt("MethodOfMeasurement"), A::req("Quantities")],
        ),
    );
    map.insert(
        IfcPropertySingleValue,
        vec![
            A::req("Name"),
            A::opt("Description"),
            A::opt("NominalValue"),
            A::opt("Unit"),
        ],
    );
    for (kind, value) in [
        (IfcQuantityLength, "LengthValue"),
        (IfcQuantityArea, "AreaValue"),
        (IfcQuantityVolume, "VolumeValue"),
    ] {
        let mut defs = vec![
            A::req("Name"),
            A::opt("Description"),
            A::opt("Unit"),
            A::req(value),
        ];
        if !legacy {
            defs.push(A::opt("Formula"));
        }
        map.insert(kind, defs);
    }

    // Materials
    if legacy {
        map.insert(IfcMaterial, vec![A::req("Name")]);
        map.insert(
            IfcMaterialLayer,
            vec![
                A::opt("Material"),
                A::req("LayerThickness"),
                A::opt("IsVentilated"),
            ],
        );
        map.insert(
            IfcMaterialLayerSet,
            vec![A::req("MaterialLayers"), A::opt("LayerSetName")],
        );
    } else {
        map.insert(
            IfcMaterial,
            vec![A::req("Name"), A::opt("Description"), A::opt("Category")],
        );
        map.insert(
            IfcMaterialLayer,
            vec![
                A::opt("Material"),
                A::req("LayerThickness"),
                A::opt("IsVentilated"),
                A::opt("Name"),
                A::opt("Description"),
                A::opt("Category"),
                A::opt("Priority"),
            ],
        );
        map.insert(
            IfcMaterialLayerSet,
            vec![
                A::req("MaterialLayers"),
                A::opt("LayerSetName"),
                A::opt("Description"),
            ],
        );
    }
    let mut usage = vec![
        A::req("ForLayerSet"),
        A::req("LayerSetDirection"),
        A::req("DirectionSense"),
        A::req("OffsetFromReferenceLine"),
    ];
    if !legacy {
        usage.push(A::opt("ReferenceExtent"));
    }
    map.insert(IfcMaterialLayerSetUsage, usage);
    map.insert(IfcMaterialList, vec![A::req("Materials")]);

    // Classification
    if legacy {
        map.insert(
            IfcClassification,
            vec![
                A::req("Source"),
                A::req("Edition"),
                A::opt("EditionDate"),
                A::req("Name"),
            ],
        );
        map.insert(
            IfcClassificationReference,
            vec![
                A::opt("Location"),
                A::opt("ItemReference"),
                A::opt("Name"),
                A::opt("ReferencedSource"),
            ],
        );
    } else {
        map.insert(
            IfcClassification,
            vec![
                A::opt("Source"),
                A::opt("Edition"),
                A::opt("EditionDate"),
                A::req("Name"),
                A::opt("Description"),
                A::opt("Location"),
                A::opt("ReferenceTokens"),
            ],
        );
        map.insert(
            IfcClassificationReference,
            vec![
                A::opt("Location"),
                A::opt("Identification"),
                A::opt("Name"),
                A::opt("ReferencedSource"),
                A::opt("Description"),
                A::opt("Sort"),
            ],
        );
    }

    // Representation
    map.insert(
        IfcProductDefinitionShape,
        vec![A::opt("Name"), A::opt("Description"), A::req("Representations")],
    );
    map.insert(
        IfcShapeRepresentation,
        vec![
            A::req("ContextOfItems"),
            A::opt("RepresentationIdentifier"),
            A::opt("RepresentationType"),
            A::req("Items"),
        ],
    );
    let context = vec![
        A::opt("ContextIdentifier"),
        A::opt("ContextType"),
        A::req("CoordinateSpaceDimension"),
        A::opt("Precision"),
        A::req("WorldCoordinateSystem"),
        A::opt("TrueNorth"),
    ];
    map.insert(IfcGeometricRepresentationContext, context);
    map.insert(
        IfcGeometricRepresentationSubContext,
        vec![
            A::opt("ContextIdentifier"),
            A::opt("ContextType"),
            A::opt("CoordinateSpaceDimension"),
            A::opt("Precision"),
            A::opt("WorldCoordinateSystem"),
            A::opt("TrueNorth"),
            A::req("ParentContext"),
            A::opt("TargetScale"),
            A::req("TargetView"),
            A::opt("UserDefinedTargetView"),
        ],
    );
    map.insert(
        IfcRepresentationMap,
        vec![A::req("MappingOrigin"), A::req("MappedRepresentation")],
    );
    map.insert(
        IfcMappedItem,
        vec![A::req("MappingSource"), A::req("MappingTarget")],
    );
    map.insert(
        IfcCartesianTransformationOperator3D,
        vec![
            A::opt("Axis1"),
            A::opt("Axis2"),
            A::req("LocalOrigin"),
            A::opt("Scale"),
            A::opt("Axis3"),
        ],
    );

    // Geometric items
    let position = if legacy { A::req("Position") } else { A::opt("Position") };
    map.insert(
        IfcExtrudedAreaSolid,
        vec![
            A::req("SweptArea"),
            position,
            A::req("ExtrudedDirection"),
            A::req("Depth"),
        ],
    );
    map.insert(IfcFacetedBrep, vec![A::req("Outer")]);
    map.insert(IfcClosedShell, vec![A::req("CfsFaces")]);
    map.insert(IfcFace, vec![A::req("Bounds")]);
    for kind in [IfcFaceOuterBound, IfcFaceBound] {
        map.insert(kind, vec![A::req("Bound"), A::req("Orientation")]);
    }
    map.insert(IfcPolyLoop, vec![A::req("Polygon")]);
    if !legacy {
        map.insert(
            IfcTriangulatedFaceSet,
            vec![
                A::req("Coordinates"),
                A::opt("Normals"),
                A::opt("Closed"),
                A::req("CoordIndex"),
                A::opt("PnIndex"),
            ],
        );
        map.insert(IfcCartesianPointList3D, vec![A::req("CoordList")]);
    }
    for kind in [IfcBooleanResult, IfcBooleanClippingResult] {
        map.insert(
            kind,
            vec![
                A::req("Operator"),
                A::req("FirstOperand"),
                A::req("SecondOperand"),
            ],
        );
    }
    map.insert(
        IfcBoundingBox,
        vec![
            A::req("Corner"),
            A::req("XDim"),
            A::req("YDim"),
            A::req("ZDim"),
        ],
    );
    map.insert(IfcPolyline, vec![A::req("Points")]);
    map.insert(
        IfcRectangleProfileDef,
        vec![
            A::req("ProfileType"),
            A::opt("ProfileName"),
            position,
            A::req("XDim"),
            A::req("YDim"),
        ],
    );
    map.insert(
        IfcCircleProfileDef,
        vec![
            A::req("ProfileType"),
            A::opt("ProfileName"),
            position,
            A::req("Radius"),
        ],
    );
    map.insert(
        IfcArbitraryClosedProfileDef,
        vec![
            A::req("ProfileType"),
            A::opt("ProfileName"),
            A::req("OuterCurve"),
        ],
    );

    // Placement
    map.insert(IfcCartesianPoint, vec![A::req("Coordinates")]);
    map.insert(IfcDirection, vec![A::req("DirectionRatios")]);
    map.insert(
        IfcAxis2Placement3D,
        vec![A::req("Location"), A::opt("Axis"), A::opt("RefDirection")],
    );
    map.insert(
        IfcAxis2Placement2D,
        vec![A::req("Location"), A::opt("RefDirection")],
    );
    map.insert(
        IfcLocalPlacement,
        vec![A::opt("PlacementRelTo"), A::req("RelativePlacement")],
    );

    // Presentation
    map.insert(
        IfcStyledItem,
        vec![A::opt("Item").weak(), A::req("Styles"), A::opt("Name")],
    );
    if schema != SchemaVersion::Ifc4x3 {
        map.insert(IfcPresentationStyleAssignment, vec![A::req("Styles")]);
    }
    map.insert(
        IfcPresentationLayerAssignment,
        vec![
            A::req("Name"),
            A::opt("Description"),
            A::req("AssignedItems").weak(),
            A::opt("Identifier"),
        ],
    );
    map.insert(
        IfcSurfaceStyle,
        vec![A::opt("Name"), A::req("Side"), A::req("Styles")],
    );
    map.insert(
        IfcColourRgb,
        vec![A::opt("Name"), A::req("Red"), A::req("Green"), A::req("Blue")],
    );

    // Project metadata
    let change_action = if legacy {
        A::req("ChangeAction")
    } else {
        A::opt("ChangeAction")
    };
    map.insert(
        IfcOwnerHistory,
        vec![
            A::req("OwningUser"),
            A::req("OwningApplication"),
            A::opt("State"),
            change_action,
            A::opt("LastModifiedDate"),
            A::opt("LastModifyingUser"),
            A::opt("LastModifyingApplication"),
            A::req("CreationDate"),
        ],
    );
    map.insert(
        IfcPerson,
        vec![
            A::opt(if legacy { "Id" } else { "Identification" }),
            A::opt("FamilyName"),
            A::opt("GivenName"),
            A::opt("MiddleNames"),
            A::opt("PrefixTitles"),
            A::opt("SuffixTitles"),
            A::opt("Roles"),
            A::opt("Addresses"),
        ],
    );
    map.insert(
        IfcOrganization,
        vec![
            A::opt(if legacy { "Id" } else { "Identification" }),
            A::req("Name"),
            A::opt("Description"),
            A::opt("Roles"),
            A::opt("Addresses"),
        ],
    );
    map.insert(
        IfcPersonAndOrganization,
        vec![
            A::req("ThePerson"),
            A::req("TheOrganization"),
            A::opt("Roles"),
        ],
    );
    map.insert(
        IfcApplication,
        vec![
            A::req("ApplicationDeveloper"),
            A::req("Version"),
            A::req("ApplicationFullName"),
            A::req("ApplicationIdentifier"),
        ],
    );
    map.insert(IfcUnitAssignment, vec![A::req("Units")]);
    map.insert(
        IfcSIUnit,
        vec![
            A::opt("Dimensions"),
            A::req("UnitType"),
            A::opt("Prefix"),
            A::req("Name"),
        ],
    );

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storey_elevation_slot() {
        assert_eq!(
            slot_by_name(SchemaVersion::Ifc4, &IfcType::IfcBuildingStorey, "Elevation"),
            Some(9)
        );
        assert_eq!(
            layout(SchemaVersion::Ifc4, &IfcType::IfcProject).map(|l| l.len()),
            Some(9)
        );
    }

    #[test]
    fn relationship_anchors_are_weak() {
        let schema = SchemaVersion::Ifc4;
        assert_eq!(strength(schema, &IfcType::IfcRelAggregates, 4), RefStrength::Weak);
        assert_eq!(strength(schema, &IfcType::IfcRelAggregates, 5), RefStrength::Strong);
        assert_eq!(
            strength(schema, &IfcType::IfcRelDefinesByProperties, 4),
            RefStrength::Weak
        );
        assert_eq!(
            strength(schema, &IfcType::IfcRelContainedInSpatialStructure, 5),
            RefStrength::Weak
        );
    }

    #[test]
    fn unknown_kinds_have_no_layout() {
        let sensor = IfcType::from_name("IFCSENSOR");
        assert!(layout(SchemaVersion::Ifc4, &sensor).is_none());
        assert_eq!(strength(SchemaVersion::Ifc4, &sensor, 3), RefStrength::Strong);
        assert!(!is_mandatory(SchemaVersion::Ifc4, &sensor, 0));
    }

    #[test]
    fn schema_differences() {
        assert!(is_mandatory(SchemaVersion::Ifc2x3, &IfcType::IfcWall, 1));
        assert!(!is_mandatory(SchemaVersion::Ifc4, &IfcType::IfcWall, 1));
        assert_eq!(layout(SchemaVersion::Ifc2x3, &IfcType::IfcWall).map(|l| l.len()), Some(8));
        assert_eq!(layout(SchemaVersion::Ifc4, &IfcType::IfcWall).map(|l| l.len()), Some(9));
        assert_eq!(layout(SchemaVersion::Ifc4, &IfcType::IfcDoor).map(|l| l.len()), Some(13));
        assert!(layout(SchemaVersion::Ifc2x3, &IfcType::IfcTriangulatedFaceSet).is_none());
        assert!(layout(SchemaVersion::Ifc4x3, &IfcType::IfcCourse).is_some());
    }

    #[test]
    fn defaults_on_enumerations() {
        let def = attribute_def(SchemaVersion::Ifc4, &IfcType::IfcWall, 8);
        assert_eq!(def.and_then(|d| d.default), Some("NOTDEFINED"));
        let def = attribute_def(SchemaVersion::Ifc2x3, &IfcType::IfcFooting, 8);
        assert_eq!(def.map(|d| d.optional), Some(false));
    }
}
