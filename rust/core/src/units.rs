// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Unit extraction for IFC models
//!
//! Handles IFCSIUNIT prefixes so lengths, areas and volumes can be brought
//! to metres.

use crate::attribute::AttributeValue;
use crate::graph::EntityGraph;
use crate::schema::IfcType;

/// SI Prefix multipliers as defined in IFC specification
/// Maps IfcSIPrefix enum values to their numeric multipliers
#[inline]
pub fn get_si_prefix_multiplier(prefix: &str) -> f64 {
    match prefix {
        "ATTO" => 1e-18,
        "FEMTO" => 1e-15,
        "PICO" => 1e-12,
        "NANO" => 1e-9,
        "MICRO" => 1e-6,
        "MILLI" => 1e-3,
        "CENTI" => 1e-2,
        "DECI" => 1e-1,
        "DECA" => 1e1,
        "HECTO" => 1e2,
        "KILO" => 1e3,
        "MEGA" => 1e6,
        "GIGA" => 1e9,
        "TERA" => 1e12,
        "PETA" => 1e15,
        "EXA" => 1e18,
        _ => 1.0, // No prefix or unknown = base unit (metres)
    }
}

/// Length unit scale factor of the model (e.g. 0.001 for millimetres)
///
/// Follows IFCPROJECT → IFCUNITASSIGNMENT → IFCSIUNIT(.LENGTHUNIT.) of the
/// first project. Anything missing or not an SI unit means metres.
pub fn length_unit_scale(graph: &EntityGraph) -> f64 {
    let Some(&project_id) = graph.all_ids_of_type(&IfcType::IfcProject).first() else {
        return 1.0;
    };
    let Some(project) = graph.get(project_id) else {
        return 1.0;
    };

    // IFCPROJECT attribute 8: UnitsInContext
    let Some(assignment) = project.get_ref(8).and_then(|id| graph.get(id)) else {
        return 1.0;
    };
    if assignment.ifc_type != IfcType::IfcUnitAssignment {
        return 1.0;
    }

    for unit_id in assignment.get_refs(0) {
        let Some(unit) = graph.get(unit_id) else {
            continue;
        };
        if unit.ifc_type != IfcType::IfcSIUnit {
            continue; // IfcConversionBasedUnit etc.
        }
        // IFCSIUNIT: Dimensions, UnitType, Prefix, Name
        if unit.get_enum(1) != Some("LENGTHUNIT") {
            continue;
        }
        return match unit.get(2) {
            Some(AttributeValue::Enum(prefix)) => get_si_prefix_multiplier(prefix),
            _ => 1.0,
        };
    }

    1.0
}

/// Factor converting model volumes to cubic metres
pub fn volume_scale(graph: &EntityGraph) -> f64 {
    length_unit_scale(graph).powi(3)
}
