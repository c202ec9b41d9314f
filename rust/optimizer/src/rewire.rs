// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Redirecting references from a merged entity to its survivor.

use ifc_lite_core::{AttributeValue, EntityGraph, EntityId, IfcType, Result};

/// Kinds whose list slots are sets: a member listed twice is redundant
fn has_set_slots(kind: &IfcType) -> bool {
    kind.is_relationship()
        || kind.is_property_set()
        || matches!(
            kind,
            IfcType::IfcProductDefinitionShape
                | IfcType::IfcShapeRepresentation
                | IfcType::IfcPresentationLayerAssignment
                | IfcType::IfcClosedShell
                | IfcType::IfcFace
        )
}

/// Point every reference to `duplicate` at `survivor`.
///
/// Set-valued slots that end up listing the survivor twice keep one entry.
/// Returns the number of rewritten references.
pub fn merge_into(graph: &mut EntityGraph, duplicate: EntityId, survivor: EntityId) -> Result<usize> {
    let referrers = graph.referrer_ids(duplicate);
    let count = graph.replace_references(duplicate, survivor)?;
    for source in referrers {
        if source == duplicate {
            continue;
        }
        let Some(entity) = graph.get(source) else {
            continue;
        };
        if !has_set_slots(&entity.ifc_type) {
            continue;
        }
        let mut updates = Vec::new();
        for (slot, value) in entity.attributes.iter().enumerate() {
            if let AttributeValue::List(items) = value {
                let mut seen = false;
                let mut changed = false;
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if item.as_entity_ref() == Some(survivor) {
                        if seen {
                            changed = true;
                            continue;
                        }
                        seen = true;
                    }
                    kept.push(item.clone());
                }
                if changed {
                    updates.push((slot, AttributeValue::List(kept)));
                }
            }
        }
        for (slot, value) in updates {
            graph.set_attribute(source, slot, value)?;
        }
    }
    Ok(count)
}
