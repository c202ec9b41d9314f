// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP entity writer
//!
//! Encodes entities as `#id=IFCTYPE(...);` lines. The same encoding backs the
//! byte estimates reported by the optimizer.

use std::fmt::Write;

use crate::attribute::AttributeValue;
use crate::entity::Entity;
use crate::error::Result;
use crate::graph::EntityGraph;

/// Append the STEP encoding of one value
pub fn encode_value(out: &mut String, value: &AttributeValue) {
    match value {
        AttributeValue::EntityRef(id) => {
            let _ = write!(out, "#{}", id);
        }
        AttributeValue::String(s) => {
            out.push('\'');
            out.push_str(&s.replace('\'', "''"));
            out.push('\'');
        }
        AttributeValue::Integer(i) => {
            let _ = write!(out, "{}", i);
        }
        AttributeValue::Float(f) => encode_float(out, *f),
        AttributeValue::Enum(e) => {
            out.push('.');
            out.push_str(e);
            out.push('.');
        }
        AttributeValue::List(items) => encode_list(out, items),
        AttributeValue::Typed(name, args) => {
            out.push_str(name);
            encode_list(out, args);
        }
        AttributeValue::Null => out.push('$'),
        AttributeValue::Derived => out.push('*'),
    }
}

fn encode_list(out: &mut String, items: &[AttributeValue]) {
    out.push('(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        encode_value(out, item);
    }
    out.push(')');
}

/// STEP reals always carry a decimal point (`0.`, `1.5`)
fn encode_float(out: &mut String, value: f64) {
    if !value.is_finite() {
        out.push_str("0.");
        return;
    }
    let start = out.len();
    let _ = write!(out, "{}", value);
    if !out[start..].contains('.') {
        out.push('.');
    }
}

/// One entity line without the trailing newline
pub fn encode_entity(entity: &Entity) -> String {
    let mut out = String::with_capacity(16 + entity.attributes.len() * 8);
    let _ = write!(out, "#{}={}", entity.id, entity.ifc_type.as_str());
    encode_list(&mut out, &entity.attributes);
    out.push(';');
    out
}

/// Encoded size of one entity line, newline included
pub fn entity_bytes(entity: &Entity) -> usize {
    encode_entity(entity).len() + 1
}

/// Encoded size of the DATA section
pub fn estimate_bytes(graph: &EntityGraph) -> usize {
    graph.iter().map(entity_bytes).sum()
}

/// Entity lines in id order, one per line
pub fn write_data(graph: &EntityGraph) -> String {
    let mut out = String::with_capacity(estimate_bytes(graph));
    for entity in graph.iter() {
        out.push_str(&encode_entity(entity));
        out.push('\n');
    }
    out
}

/// Serialize a complete ISO-10303-21 file.
///
/// Ids are compacted first, closing the gaps left by removals.
pub fn write_model(graph: &mut EntityGraph) -> Result<String> {
    graph.renumber()?;
    let mut out = String::new();
    out.push_str("ISO-10303-21;\nHEADER;\n");
    out.push_str("FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');\n");
    out.push_str("FILE_NAME('','',(''),(''),'ifc-lite-optimizer','','');\n");
    let _ = writeln!(out, "FILE_SCHEMA(('{}'));", graph.schema().as_str());
    out.push_str("ENDSEC;\nDATA;\n");
    out.push_str(&write_data(graph));
    out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_entity, parse_model};
    use crate::schema::SchemaVersion;

    #[test]
    fn encodes_entity_lines() {
        let line = "#7=IFCPROPERTYSINGLEVALUE('it''s',$,IFCREAL(1.5),.T.);";
        let entity = parse_entity(line).unwrap();
        assert_eq!(encode_entity(&entity), line);
    }

    #[test]
    fn floats_keep_a_decimal_point() {
        let mut out = String::new();
        encode_float(&mut out, 0.0);
        out.push(' ');
        encode_float(&mut out, -2.0);
        out.push(' ');
        encode_float(&mut out, 0.25);
        assert_eq!(out, "0. -2. 0.25");
    }

    #[test]
    fn written_model_reads_back_renumbered() {
        let mut graph = parse_model(
            "#10=IFCPROJECT('p',$,$,$,$,$,$,$,$);\n#20=IFCCARTESIANPOINT((0.,1.,2.));\n#30=IFCAXIS2PLACEMENT3D(#20,$,$);",
        )
        .unwrap();
        let text = write_model(&mut graph).unwrap();
        let back = parse_model(&text).unwrap();
        assert_eq!(back.schema(), SchemaVersion::Ifc4);
        assert_eq!(back.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(back.get(3).unwrap().get_ref(0), Some(2));
    }

    #[test]
    fn byte_estimate_matches_data_section() {
        let graph = parse_model("#1=IFCPROJECT('p',$,$,$,$,$,$,$,$);\n#2=IFCDIRECTION((1.,0.,0.));").unwrap();
        assert_eq!(estimate_bytes(&graph), write_data(&graph).len());
    }
}
