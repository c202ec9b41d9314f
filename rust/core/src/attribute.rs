// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attribute values stored in entity slots.

use crate::entity::EntityId;

/// IFC entity attribute value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttributeValue {
    /// Entity reference
    EntityRef(EntityId),
    /// String value
    String(String),
    /// Integer value
    Integer(i64),
    /// Float value
    Float(f64),
    /// Enum value (without the surrounding dots), including booleans `T`/`F`
    Enum(String),
    /// List of values
    List(Vec<AttributeValue>),
    /// Typed value such as `IFCLABEL('x')` or `IFCLENGTHMEASURE(2.)`
    Typed(String, Vec<AttributeValue>),
    /// Null/undefined
    Null,
    /// Derived value (*)
    Derived,
}

impl AttributeValue {
    /// Get as entity reference
    #[inline]
    pub fn as_entity_ref(&self) -> Option<EntityId> {
        match self {
            AttributeValue::EntityRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Get as string
    #[inline]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as enum value (strips the dots from .ENUM.)
    #[inline]
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            AttributeValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Get as float
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as integer (more efficient than as_float for indices)
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            AttributeValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Get as list
    #[inline]
    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Check if null/derived
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null | AttributeValue::Derived)
    }

    /// Null, an empty string or an empty list: nothing a reader could use
    pub fn is_empty_value(&self) -> bool {
        match self {
            AttributeValue::Null => true,
            AttributeValue::String(s) => s.is_empty(),
            AttributeValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Unwrap a typed value (`IFCLABEL('x')` → `'x'`), or return self
    pub fn inner(&self) -> &AttributeValue {
        match self {
            AttributeValue::Typed(_, args) if args.len() == 1 => &args[0],
            other => other,
        }
    }

    /// Parse a list of numbers as `[x, y, z]` (missing components are 0)
    pub fn as_point3(&self) -> Option<[f64; 3]> {
        let coords = self.as_list()?;
        if coords.is_empty() {
            return None;
        }
        let x = coords.first().and_then(|v| v.as_float()).unwrap_or(0.0);
        let y = coords.get(1).and_then(|v| v.as_float()).unwrap_or(0.0);
        let z = coords.get(2).and_then(|v| v.as_float()).unwrap_or(0.0);
        Some([x, y, z])
    }

    /// Visit every entity reference, including those nested in lists
    pub fn for_each_ref(&self, f: &mut impl FnMut(EntityId)) {
        match self {
            AttributeValue::EntityRef(id) => f(*id),
            AttributeValue::List(items) | AttributeValue::Typed(_, items) => {
                for item in items {
                    item.for_each_ref(f);
                }
            }
            _ => {}
        }
    }

    /// Collect every entity reference held by this value
    pub fn refs(&self) -> Vec<EntityId> {
        let mut out = Vec::new();
        self.for_each_ref(&mut |id| out.push(id));
        out
    }

    pub fn contains_ref(&self, target: EntityId) -> bool {
        let mut found = false;
        self.for_each_ref(&mut |id| found |= id == target);
        found
    }

    /// Replace every reference to `old` by `new`; returns the number of replacements
    pub fn replace_ref(&mut self, old: EntityId, new: EntityId) -> usize {
        match self {
            AttributeValue::EntityRef(id) if *id == old => {
                *id = new;
                1
            }
            AttributeValue::List(items) | AttributeValue::Typed(_, items) => items
                .iter_mut()
                .map(|item| item.replace_ref(old, new))
                .sum(),
            _ => 0,
        }
    }

    /// Drop list members referencing `target`; a direct reference becomes null.
    /// Returns the number of references removed.
    pub fn prune_ref(&mut self, target: EntityId) -> usize {
        match self {
            AttributeValue::EntityRef(id) if *id == target => {
                *self = AttributeValue::Null;
                1
            }
            AttributeValue::List(items) => {
                let before = items.len();
                items.retain(|item| item.as_entity_ref() != Some(target));
                let mut removed = before - items.len();
                for item in items.iter_mut() {
                    removed += item.prune_ref(target);
                }
                removed
            }
            _ => 0,
        }
    }
}

impl From<EntityId> for AttributeValue {
    fn from(id: EntityId) -> Self {
        AttributeValue::EntityRef(id)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(ids: &[EntityId]) -> AttributeValue {
        AttributeValue::List(ids.iter().map(|&id| AttributeValue::EntityRef(id)).collect())
    }

    #[test]
    fn collects_nested_refs() {
        let value = AttributeValue::List(vec![
            AttributeValue::EntityRef(1),
            AttributeValue::List(vec![AttributeValue::EntityRef(2), AttributeValue::Float(0.5)]),
        ]);
        assert_eq!(value.refs(), vec![1, 2]);
        assert!(value.contains_ref(2));
        assert!(!value.contains_ref(3));
    }

    #[test]
    fn replace_ref_counts_occurrences() {
        let mut value = refs(&[4, 5, 4]);
        assert_eq!(value.replace_ref(4, 9), 2);
        assert_eq!(value, refs(&[9, 5, 9]));
    }

    #[test]
    fn prune_ref_shrinks_lists_and_nulls_scalars() {
        let mut list = refs(&[1, 2, 3]);
        assert_eq!(list.prune_ref(2), 1);
        assert_eq!(list, refs(&[1, 3]));

        let mut scalar = AttributeValue::EntityRef(7);
        assert_eq!(scalar.prune_ref(7), 1);
        assert!(scalar.is_null());
    }

    #[test]
    fn empty_values() {
        assert!(AttributeValue::Null.is_empty_value());
        assert!(AttributeValue::String(String::new()).is_empty_value());
        assert!(AttributeValue::List(vec![]).is_empty_value());
        assert!(!AttributeValue::Derived.is_empty_value());
        assert!(!AttributeValue::Float(0.0).is_empty_value());
    }

    #[test]
    fn point_parsing_pads_missing_components() {
        let p = AttributeValue::List(vec![AttributeValue::Float(1.0), AttributeValue::Float(2.0)]);
        assert_eq!(p.as_point3(), Some([1.0, 2.0, 0.0]));
    }

    #[test]
    fn typed_values_unwrap() {
        let v = AttributeValue::Typed(
            "IFCLABEL".into(),
            vec![AttributeValue::String("-".into())],
        );
        assert_eq!(v.inner().as_string(), Some("-"));
    }
}
