// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC Schema Types
//!
//! Fast type checking using an enum instead of string comparison, plus the
//! schema versions the optimizer understands.

use std::fmt;

macro_rules! ifc_types {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// IFC entity kinds known to the optimizer.
        ///
        /// Kinds outside this set keep their STEP name in [`IfcType::Unknown`] so
        /// they survive a load/optimize/write cycle unchanged.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum IfcType {
            $($variant,)*
            /// Unrecognized kind, stored by its upper-case STEP name
            Unknown(Box<str>),
        }

        impl IfcType {
            /// Parse IFC type from its STEP name (case-insensitive)
            pub fn from_name(s: &str) -> Self {
                match s {
                    $($name => return Self::$variant,)*
                    _ => {}
                }
                let upper = s.to_ascii_uppercase();
                match upper.as_str() {
                    $($name => Self::$variant,)*
                    _ => Self::Unknown(upper.into_boxed_str()),
                }
            }

            /// Upper-case STEP name, e.g. `IFCWALL`
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $name,)*
                    Self::Unknown(name) => name,
                }
            }

            /// Every known kind, in declaration order
            pub fn known() -> &'static [IfcType] {
                static KNOWN: &[IfcType] = &[$(IfcType::$variant,)*];
                KNOWN
            }
        }
    };
}

ifc_types! {
    // Spatial structure
    IfcProject => "IFCPROJECT",
    IfcSite => "IFCSITE",
    IfcBuilding => "IFCBUILDING",
    IfcBuildingStorey => "IFCBUILDINGSTOREY",
    IfcSpace => "IFCSPACE",

    // Building elements
    IfcWall => "IFCWALL",
    IfcWallStandardCase => "IFCWALLSTANDARDCASE",
    IfcSlab => "IFCSLAB",
    IfcBeam => "IFCBEAM",
    IfcColumn => "IFCCOLUMN",
    IfcMember => "IFCMEMBER",
    IfcPlate => "IFCPLATE",
    IfcRoof => "IFCROOF",
    IfcStair => "IFCSTAIR",
    IfcRailing => "IFCRAILING",
    IfcCovering => "IFCCOVERING",
    IfcFooting => "IFCFOOTING",
    IfcDoor => "IFCDOOR",
    IfcWindow => "IFCWINDOW",
    IfcBuildingElementProxy => "IFCBUILDINGELEMENTPROXY",
    IfcOpeningElement => "IFCOPENINGELEMENT",
    IfcFurnishingElement => "IFCFURNISHINGELEMENT",
    IfcFurniture => "IFCFURNITURE",
    IfcFlowSegment => "IFCFLOWSEGMENT",
    IfcPipeSegment => "IFCPIPESEGMENT",
    IfcDuctSegment => "IFCDUCTSEGMENT",
    IfcCourse => "IFCCOURSE",
    IfcAlignment => "IFCALIGNMENT",

    // Type objects
    IfcWallType => "IFCWALLTYPE",
    IfcSlabType => "IFCSLABTYPE",

    // Relationships
    IfcRelAggregates => "IFCRELAGGREGATES",
    IfcRelNests => "IFCRELNESTS",
    IfcRelContainedInSpatialStructure => "IFCRELCONTAINEDINSPATIALSTRUCTURE",
    IfcRelDefinesByProperties => "IFCRELDEFINESBYPROPERTIES",
    IfcRelDefinesByType => "IFCRELDEFINESBYTYPE",
    IfcRelAssociatesMaterial => "IFCRELASSOCIATESMATERIAL",
    IfcRelAssociatesClassification => "IFCRELASSOCIATESCLASSIFICATION",
    IfcRelVoidsElement => "IFCRELVOIDSELEMENT",
    IfcRelFillsElement => "IFCRELFILLSELEMENT",

    // Properties and quantities
    IfcPropertySet => "IFCPROPERTYSET",
    IfcElementQuantity => "IFCELEMENTQUANTITY",
    IfcPropertySingleValue => "IFCPROPERTYSINGLEVALUE",
    IfcQuantityLength => "IFCQUANTITYLENGTH",
    IfcQuantityArea => "IFCQUANTITYAREA",
    IfcQuantityVolume => "IFCQUANTITYVOLUME",

    // Materials
    IfcMaterial => "IFCMATERIAL",
    IfcMaterialLayer => "IFCMATERIALLAYER",
    IfcMaterialLayerSet => "IFCMATERIALLAYERSET",
    IfcMaterialLayerSetUsage => "IFCMATERIALLAYERSETUSAGE",
    IfcMaterialList => "IFCMATERIALLIST",

    // Classification
    IfcClassification => "IFCCLASSIFICATION",
    IfcClassificationReference => "IFCCLASSIFICATIONREFERENCE",

    // Representation
    IfcProductDefinitionShape => "IFCPRODUCTDEFINITIONSHAPE",
    IfcShapeRepresentation => "IFCSHAPEREPRESENTATION",
    IfcGeometricRepresentationContext => "IFCGEOMETRICREPRESENTATIONCONTEXT",
    IfcGeometricRepresentationSubContext => "IFCGEOMETRICREPRESENTATIONSUBCONTEXT",
    IfcRepresentationMap => "IFCREPRESENTATIONMAP",
    IfcMappedItem => "IFCMAPPEDITEM",
    IfcCartesianTransformationOperator3D => "IFCCARTESIANTRANSFORMATIONOPERATOR3D",

    // Geometric items
    IfcExtrudedAreaSolid => "IFCEXTRUDEDAREASOLID",
    IfcFacetedBrep => "IFCFACETEDBREP",
    IfcClosedShell => "IFCCLOSEDSHELL",
    IfcFace => "IFCFACE",
    IfcFaceOuterBound => "IFCFACEOUTERBOUND",
    IfcFaceBound => "IFCFACEBOUND",
    IfcPolyLoop => "IFCPOLYLOOP",
    IfcTriangulatedFaceSet => "IFCTRIANGULATEDFACESET",
    IfcCartesianPointList3D => "IFCCARTESIANPOINTLIST3D",
    IfcBooleanResult => "IFCBOOLEANRESULT",
    IfcBooleanClippingResult => "IFCBOOLEANCLIPPINGRESULT",
    IfcBoundingBox => "IFCBOUNDINGBOX",
    IfcPolyline => "IFCPOLYLINE",
    IfcRectangleProfileDef => "IFCRECTANGLEPROFILEDEF",
    IfcCircleProfileDef => "IFCCIRCLEPROFILEDEF",
    IfcArbitraryClosedProfileDef => "IFCARBITRARYCLOSEDPROFILEDEF",

    // Placement
    IfcCartesianPoint => "IFCCARTESIANPOINT",
    IfcDirection => "IFCDIRECTION",
    IfcAxis2Placement2D => "IFCAXIS2PLACEMENT2D",
    IfcAxis2Placement3D => "IFCAXIS2PLACEMENT3D",
    IfcLocalPlacement => "IFCLOCALPLACEMENT",

    // Presentation
    IfcStyledItem => "IFCSTYLEDITEM",
    IfcPresentationStyleAssignment => "IFCPRESENTATIONSTYLEASSIGNMENT",
    IfcPresentationLayerAssignment => "IFCPRESENTATIONLAYERASSIGNMENT",
    IfcSurfaceStyle => "IFCSURFACESTYLE",
    IfcColourRgb => "IFCCOLOURRGB",

    // Project metadata
    IfcOwnerHistory => "IFCOWNERHISTORY",
    IfcPerson => "IFCPERSON",
    IfcOrganization => "IFCORGANIZATION",
    IfcPersonAndOrganization => "IFCPERSONANDORGANIZATION",
    IfcApplication => "IFCAPPLICATION",
    IfcUnitAssignment => "IFCUNITASSIGNMENT",
    IfcSIUnit => "IFCSIUNIT",
}

impl IfcType {
    /// Project, site, building, storey or space
    pub fn is_spatial_container(&self) -> bool {
        matches!(
            self,
            Self::IfcProject
                | Self::IfcSite
                | Self::IfcBuilding
                | Self::IfcBuildingStorey
                | Self::IfcSpace
        )
    }

    /// Physical elements (IfcElement subtypes) that may carry solid geometry
    pub fn is_element(&self) -> bool {
        matches!(
            self,
            Self::IfcWall
                | Self::IfcWallStandardCase
                | Self::IfcSlab
                | Self::IfcBeam
                | Self::IfcColumn
                | Self::IfcMember
                | Self::IfcPlate
                | Self::IfcRoof
                | Self::IfcStair
                | Self::IfcRailing
                | Self::IfcCovering
                | Self::IfcFooting
                | Self::IfcDoor
                | Self::IfcWindow
                | Self::IfcBuildingElementProxy
                | Self::IfcOpeningElement
                | Self::IfcFurnishingElement
                | Self::IfcFurniture
                | Self::IfcFlowSegment
                | Self::IfcPipeSegment
                | Self::IfcDuctSegment
                | Self::IfcCourse
        )
    }

    /// Products: anything with an object placement and a representation
    pub fn is_product(&self) -> bool {
        (self.is_spatial_container() && !matches!(self, Self::IfcProject))
            || self.is_element()
            || matches!(self, Self::IfcAlignment)
    }

    pub fn is_relationship(&self) -> bool {
        matches!(
            self,
            Self::IfcRelAggregates
                | Self::IfcRelNests
                | Self::IfcRelContainedInSpatialStructure
                | Self::IfcRelDefinesByProperties
                | Self::IfcRelDefinesByType
                | Self::IfcRelAssociatesMaterial
                | Self::IfcRelAssociatesClassification
                | Self::IfcRelVoidsElement
                | Self::IfcRelFillsElement
        ) || matches!(self, Self::Unknown(name) if name.starts_with("IFCREL"))
    }

    /// Property set definitions (what usage counting tracks)
    pub fn is_property_set(&self) -> bool {
        matches!(self, Self::IfcPropertySet | Self::IfcElementQuantity)
    }

    /// Individual properties and quantities owned by a property set
    pub fn is_property(&self) -> bool {
        matches!(
            self,
            Self::IfcPropertySingleValue
                | Self::IfcQuantityLength
                | Self::IfcQuantityArea
                | Self::IfcQuantityVolume
        )
    }

    pub fn is_material(&self) -> bool {
        matches!(
            self,
            Self::IfcMaterial
                | Self::IfcMaterialLayer
                | Self::IfcMaterialLayerSet
                | Self::IfcMaterialLayerSetUsage
                | Self::IfcMaterialList
        )
    }

    pub fn is_classification(&self) -> bool {
        matches!(
            self,
            Self::IfcClassification | Self::IfcClassificationReference
        )
    }

    /// Representation and geometric-item kinds, including placements
    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            Self::IfcProductDefinitionShape
                | Self::IfcShapeRepresentation
                | Self::IfcRepresentationMap
                | Self::IfcMappedItem
                | Self::IfcCartesianTransformationOperator3D
                | Self::IfcExtrudedAreaSolid
                | Self::IfcFacetedBrep
                | Self::IfcClosedShell
                | Self::IfcFace
                | Self::IfcFaceOuterBound
                | Self::IfcFaceBound
                | Self::IfcPolyLoop
                | Self::IfcTriangulatedFaceSet
                | Self::IfcCartesianPointList3D
                | Self::IfcBooleanResult
                | Self::IfcBooleanClippingResult
                | Self::IfcBoundingBox
                | Self::IfcPolyline
                | Self::IfcRectangleProfileDef
                | Self::IfcCircleProfileDef
                | Self::IfcArbitraryClosedProfileDef
                | Self::IfcCartesianPoint
                | Self::IfcDirection
                | Self::IfcAxis2Placement2D
                | Self::IfcAxis2Placement3D
                | Self::IfcLocalPlacement
        )
    }

    /// Representation items that enclose a volume
    pub fn is_solid_item(&self) -> bool {
        matches!(
            self,
            Self::IfcExtrudedAreaSolid
                | Self::IfcFacetedBrep
                | Self::IfcTriangulatedFaceSet
                | Self::IfcBooleanResult
                | Self::IfcBooleanClippingResult
                | Self::IfcBoundingBox
                | Self::IfcMappedItem
        )
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for IfcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IFC schema versions the graph can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SchemaVersion {
    #[cfg_attr(feature = "serde", serde(rename = "IFC2X3"))]
    Ifc2x3,
    #[cfg_attr(feature = "serde", serde(rename = "IFC4"))]
    Ifc4,
    #[cfg_attr(feature = "serde", serde(rename = "IFC4X3", alias = "IFC4.3"))]
    Ifc4x3,
}

impl SchemaVersion {
    /// Parse the FILE_SCHEMA identifier (`IFC2X3`, `IFC4`, `IFC4X3_ADD2`, `IFC4.3`, ...)
    pub fn from_name(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.starts_with("IFC4X3") || upper.starts_with("IFC4.3") {
            Some(Self::Ifc4x3)
        } else if upper.starts_with("IFC2X3") {
            Some(Self::Ifc2x3)
        } else if upper.starts_with("IFC4") {
            Some(Self::Ifc4)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ifc2x3 => "IFC2X3",
            Self::Ifc4 => "IFC4",
            Self::Ifc4x3 => "IFC4X3",
        }
    }

    /// Whether `kind` exists in this schema.
    ///
    /// Unknown kinds are assumed to exist everywhere; the optimizer cannot
    /// reason about them and leaves them alone.
    pub fn supports(&self, kind: &IfcType) -> bool {
        use IfcType::*;
        match self {
            Self::Ifc2x3 => !matches!(
                kind,
                IfcFurniture
                    | IfcPipeSegment
                    | IfcDuctSegment
                    | IfcCourse
                    | IfcAlignment
                    | IfcTriangulatedFaceSet
                    | IfcCartesianPointList3D
            ),
            Self::Ifc4 => !matches!(kind, IfcCourse | IfcAlignment),
            Self::Ifc4x3 => !matches!(kind, IfcWallStandardCase | IfcPresentationStyleAssignment),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in IfcType::known() {
            assert_eq!(&IfcType::from_name(kind.as_str()), kind);
        }
    }

    #[test]
    fn case_insensitive_lookup() {
        assert_eq!(IfcType::from_name("IfcWall"), IfcType::IfcWall);
        assert_eq!(IfcType::from_name("ifcbuildingstorey"), IfcType::IfcBuildingStorey);
    }

    #[test]
    fn unknown_kinds_keep_their_name() {
        let kind = IfcType::from_name("IfcSensor");
        assert!(kind.is_unknown());
        assert_eq!(kind.as_str(), "IFCSENSOR");
    }

    #[test]
    fn unknown_relationships_are_still_relationships() {
        assert!(IfcType::from_name("IFCRELSPACEBOUNDARY").is_relationship());
        assert!(!IfcType::from_name("IFCSENSOR").is_relationship());
    }

    #[test]
    fn schema_versions_parse() {
        assert_eq!(SchemaVersion::from_name("IFC2X3"), Some(SchemaVersion::Ifc2x3));
        assert_eq!(SchemaVersion::from_name("IFC4"), Some(SchemaVersion::Ifc4));
        assert_eq!(SchemaVersion::from_name("IFC4X3_ADD2"), Some(SchemaVersion::Ifc4x3));
        assert_eq!(SchemaVersion::from_name("ifc4.3"), Some(SchemaVersion::Ifc4x3));
        assert_eq!(SchemaVersion::from_name("STEP"), None);
    }

    #[test]
    fn schema_support() {
        assert!(!SchemaVersion::Ifc2x3.supports(&IfcType::IfcTriangulatedFaceSet));
        assert!(SchemaVersion::Ifc4.supports(&IfcType::IfcTriangulatedFaceSet));
        assert!(!SchemaVersion::Ifc4.supports(&IfcType::IfcAlignment));
        assert!(!SchemaVersion::Ifc4x3.supports(&IfcType::IfcWallStandardCase));
        assert!(SchemaVersion::Ifc4x3.supports(&IfcType::from_name("IFCSENSOR")));
    }
}
