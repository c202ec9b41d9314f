// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entities and the references between them.

use smallvec::SmallVec;

use crate::attribute::AttributeValue;
use crate::schema::IfcType;

/// STEP instance identifier (`#123`)
pub type EntityId = u32;

/// A typed record with ordered attribute slots
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entity {
    pub id: EntityId,
    pub ifc_type: IfcType,
    pub attributes: Vec<AttributeValue>,
}

impl Entity {
    /// Create new entity
    pub fn new(id: EntityId, ifc_type: IfcType, attributes: Vec<AttributeValue>) -> Self {
        Self {
            id,
            ifc_type,
            attributes,
        }
    }

    /// Get attribute by index
    pub fn get(&self, index: usize) -> Option<&AttributeValue> {
        self.attributes.get(index)
    }

    /// Get entity reference attribute
    pub fn get_ref(&self, index: usize) -> Option<EntityId> {
        self.get(index).and_then(|v| v.as_entity_ref())
    }

    /// Entity references held directly in a list attribute
    pub fn get_refs(&self, index: usize) -> SmallVec<[EntityId; 4]> {
        match self.get(index) {
            Some(AttributeValue::List(items)) => {
                items.iter().filter_map(|v| v.as_entity_ref()).collect()
            }
            Some(AttributeValue::EntityRef(id)) => SmallVec::from_elem(*id, 1),
            _ => SmallVec::new(),
        }
    }

    /// Get string attribute (typed labels are unwrapped)
    pub fn get_string(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|v| v.inner().as_string())
    }

    /// Get float attribute (typed measures are unwrapped)
    pub fn get_float(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(|v| v.inner().as_float())
    }

    /// Get enum attribute
    pub fn get_enum(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|v| v.as_enum())
    }

    /// Get list attribute
    pub fn get_list(&self, index: usize) -> Option<&[AttributeValue]> {
        self.get(index).and_then(|v| v.as_list())
    }

    /// Every outgoing reference, in slot order
    pub fn references(&self) -> Vec<Reference> {
        let mut out = Vec::new();
        for (slot, value) in self.attributes.iter().enumerate() {
            value.for_each_ref(&mut |target| {
                out.push(Reference {
                    source: self.id,
                    slot,
                    target,
                })
            });
        }
        out
    }
}

/// A directed attribute edge: `source.attributes[slot]` mentions `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reference {
    pub source: EntityId,
    pub slot: usize,
    pub target: EntityId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_follow_slot_order() {
        let entity = Entity::new(
            10,
            IfcType::IfcRelAggregates,
            vec![
                AttributeValue::String("guid".into()),
                AttributeValue::Null,
                AttributeValue::Null,
                AttributeValue::Null,
                AttributeValue::EntityRef(1),
                AttributeValue::List(vec![AttributeValue::EntityRef(2), AttributeValue::EntityRef(3)]),
            ],
        );
        let refs = entity.references();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0], Reference { source: 10, slot: 4, target: 1 });
        assert_eq!(refs[2], Reference { source: 10, slot: 5, target: 3 });
        assert_eq!(entity.get_refs(5).as_slice(), &[2, 3]);
        assert_eq!(entity.get_refs(4).as_slice(), &[1]);
    }

    #[test]
    fn typed_values_read_through() {
        let entity = Entity::new(
            1,
            IfcType::IfcPropertySingleValue,
            vec![
                AttributeValue::String("Width".into()),
                AttributeValue::Null,
                AttributeValue::Typed(
                    "IFCLENGTHMEASURE".into(),
                    vec![AttributeValue::Float(0.25)],
                ),
                AttributeValue::Null,
            ],
        );
        assert_eq!(entity.get_string(0), Some("Width"));
        assert_eq!(entity.get_float(2), Some(0.25));
    }
}
