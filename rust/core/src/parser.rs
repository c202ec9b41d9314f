// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP entity reader using nom
//!
//! Reads `#id=IFCTYPE(...);` records into an [`EntityGraph`]. Only the
//! FILE_SCHEMA header entry is interpreted; everything else in the HEADER
//! section is skipped.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, map_res, opt, recognize},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::attribute::AttributeValue;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::graph::EntityGraph;
use crate::schema::{IfcType, SchemaVersion};

/// STEP/IFC Token
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    /// Entity reference: #123
    EntityRef(u32),
    /// String literal: 'text' (quotes still doubled)
    String(&'a str),
    /// Integer: 42
    Integer(i64),
    /// Float: 3.14
    Float(f64),
    /// Enum: .T., .NOTDEFINED.
    Enum(&'a str),
    /// List: (1, 2, 3)
    List(Vec<Token<'a>>),
    /// Typed value: IFCLABEL('x'), IFCBOOLEAN(.T.)
    TypedValue(&'a str, Vec<Token<'a>>),
    /// Null value: $
    Null,
    /// Asterisk (derived value): *
    Derived,
}

impl From<Token<'_>> for AttributeValue {
    fn from(token: Token<'_>) -> Self {
        match token {
            Token::EntityRef(id) => AttributeValue::EntityRef(id),
            Token::String(s) => AttributeValue::String(s.replace("''", "'")),
            Token::Integer(i) => AttributeValue::Integer(i),
            Token::Float(f) => AttributeValue::Float(f),
            Token::Enum(e) => AttributeValue::Enum(e.to_string()),
            Token::List(items) => AttributeValue::List(items.into_iter().map(Into::into).collect()),
            Token::TypedValue(name, args) => AttributeValue::Typed(
                name.to_ascii_uppercase(),
                args.into_iter().map(Into::into).collect(),
            ),
            Token::Null => AttributeValue::Null,
            Token::Derived => AttributeValue::Derived,
        }
    }
}

/// Parse entity reference: #123
fn entity_ref(input: &str) -> IResult<&str, Token> {
    map(
        preceded(char('#'), map_res(digit1, |s: &str| s.parse::<u32>())),
        Token::EntityRef,
    )(input)
}

/// Parse string literal: 'text'
/// IFC uses '' to escape a single quote within a string
fn string_literal(input: &str) -> IResult<&str, Token> {
    fn content(input: &str) -> IResult<&str, &str> {
        let bytes = input.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                return Ok((&input[i..], &input[..i]));
            }
            i += 1;
        }
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )))
    }

    map(delimited(char('\''), content, char('\'')), Token::String)(input)
}

/// Parse integer: 42, -42
fn integer(input: &str) -> IResult<&str, Token> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |s: &str| {
        s.parse::<i64>().map(Token::Integer)
    })(input)
}

/// Parse float: 3.14, -3.14, 1.5E-10, 0.
fn float(input: &str) -> IResult<&str, Token> {
    map_res(
        recognize(tuple((
            opt(one_of("+-")),
            digit1,
            char('.'),
            opt(digit1),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.parse::<f64>().map(Token::Float),
    )(input)
}

/// Parse enum: .T., .ELEMENT.
fn enum_value(input: &str) -> IResult<&str, Token> {
    map(
        delimited(
            char('.'),
            take_while1(|c: char| c.is_alphanumeric() || c == '_'),
            char('.'),
        ),
        Token::Enum,
    )(input)
}

fn null(input: &str) -> IResult<&str, Token> {
    map(char('$'), |_| Token::Null)(input)
}

fn derived(input: &str) -> IResult<&str, Token> {
    map(char('*'), |_| Token::Derived)(input)
}

fn arguments(input: &str) -> IResult<&str, Vec<Token>> {
    delimited(
        char('('),
        separated_list0(delimited(ws, char(','), ws), token),
        preceded(ws, char(')')),
    )(input)
}

/// Parse typed value: IFCLABEL('x')
fn typed_value(input: &str) -> IResult<&str, Token> {
    map(
        pair(
            take_while1(|c: char| c.is_alphanumeric() || c == '_'),
            arguments,
        ),
        |(type_name, args)| Token::TypedValue(type_name, args),
    )(input)
}

fn ws(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c.is_whitespace())(input)
}

/// Parse a token with optional surrounding whitespace
fn token(input: &str) -> IResult<&str, Token> {
    delimited(
        ws,
        alt((
            float, // before integer: float includes '.'
            integer,
            entity_ref,
            string_literal,
            enum_value,
            map(arguments, Token::List),
            typed_value,
            null,
            derived,
        )),
        ws,
    )(input)
}

/// Parse a complete entity record, e.g. `#123=IFCWALL('guid',$,$,$,$,$,$,$);`
pub fn parse_entity(input: &str) -> Result<Entity> {
    let result: IResult<&str, (u32, &str, Vec<Token>)> = tuple((
        delimited(
            ws,
            preceded(char('#'), map_res(digit1, |s: &str| s.parse::<u32>())),
            ws,
        ),
        preceded(
            char('='),
            delimited(
                ws,
                take_while1(|c: char| c.is_alphanumeric() || c == '_'),
                ws,
            ),
        ),
        delimited(ws, arguments, pair(ws, opt(char(';')))),
    ))(input);

    match result {
        Ok((_, (id, type_name, args))) => Ok(Entity::new(
            id,
            IfcType::from_name(type_name),
            args.into_iter().map(Into::into).collect(),
        )),
        Err(e) => Err(Error::parse(0, format!("failed to parse entity: {}", e))),
    }
}

/// Byte spans of every `;`-terminated record, skipping semicolons inside strings
pub fn record_spans(content: &str) -> Vec<(usize, usize)> {
    let bytes = content.as_bytes();
    let mut spans = Vec::with_capacity(bytes.len() / 50);
    let mut start = 0;
    let mut pos = 0;
    let mut in_string = false;

    while let Some(offset) = memchr::memchr2(b'\'', b';', &bytes[pos..]) {
        let at = pos + offset;
        pos = at + 1;
        if bytes[at] == b'\'' {
            in_string = !in_string;
        } else if !in_string {
            spans.push((start, pos));
            start = pos;
        }
    }
    spans
}

/// Read the schema named by `FILE_SCHEMA(('...'))`, if any
pub fn detect_schema(content: &str) -> Option<SchemaVersion> {
    let at = memchr::memmem::find(content.as_bytes(), b"FILE_SCHEMA")?;
    let rest = &content[at..];
    let open = rest.find('\'')? + 1;
    let close = rest[open..].find('\'')? + open;
    SchemaVersion::from_name(&rest[open..close])
}

/// Parse every entity record of a STEP file (or a bare list of records).
///
/// The schema comes from the header, defaulting to IFC4. The result is
/// checked for referential integrity.
pub fn parse_model(content: &str) -> Result<EntityGraph> {
    let schema = detect_schema(content).unwrap_or(SchemaVersion::Ifc4);
    let mut entities = Vec::new();
    for (start, end) in record_spans(content) {
        let record = content[start..end].trim_start();
        if !record.starts_with('#') {
            continue;
        }
        let entity = parse_entity(record).map_err(|e| match e {
            Error::Parse { message, .. } => Error::parse(start, message),
            other => other,
        })?;
        entities.push(entity);
    }
    EntityGraph::from_entities(schema, entities)
}

/// Parse a graph whose schema is fixed by the caller
pub fn parse_model_with_schema(content: &str, schema: SchemaVersion) -> Result<EntityGraph> {
    let mut graph = parse_model(content)?;
    graph.schema = schema;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref() {
        assert_eq!(entity_ref("#123"), Ok(("", Token::EntityRef(123))));
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(string_literal("'hello'"), Ok(("", Token::String("hello"))));
        assert_eq!(string_literal("'it''s'"), Ok(("", Token::String("it''s"))));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(integer("-42"), Ok(("", Token::Integer(-42))));
        assert_eq!(float("0."), Ok(("", Token::Float(0.0))));
        assert_eq!(float("1.5E-10"), Ok(("", Token::Float(1.5e-10))));
    }

    #[test]
    fn test_enum() {
        assert_eq!(enum_value(".NOTDEFINED."), Ok(("", Token::Enum("NOTDEFINED"))));
    }

    #[test]
    fn test_parse_entity_with_nested_list() {
        let entity = parse_entity("#9=IFCDIRECTION((0.,0.,1.));").unwrap();
        assert_eq!(entity.id, 9);
        assert_eq!(entity.ifc_type, IfcType::IfcDirection);
        assert_eq!(entity.get(0).and_then(|v| v.as_point3()), Some([0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_typed_values_and_escapes() {
        let entity =
            parse_entity("#5=IFCPROPERTYSINGLEVALUE('Note',$,IFCTEXT('it''s; fine'),$);").unwrap();
        match entity.get(2) {
            Some(AttributeValue::Typed(name, args)) => {
                assert_eq!(name, "IFCTEXT");
                assert_eq!(args[0].as_string(), Some("it's; fine"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kinds_are_kept() {
        let entity = parse_entity("#3 = IfcSensor('g',$,$,$,$,$,$,$,.NOTDEFINED.);").unwrap();
        assert_eq!(entity.ifc_type.as_str(), "IFCSENSOR");
        assert_eq!(entity.attributes.len(), 9);
    }

    #[test]
    fn record_splitting_respects_strings() {
        let spans = record_spans("#1=A('x;y');\n#2=B($);");
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn parses_full_file() {
        let content = "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION((''),'2;1');\n\
            FILE_SCHEMA(('IFC2X3'));\nENDSEC;\nDATA;\n\
            #1=IFCPROJECT('p',#2,'P',$,$,$,$,$,$);\n\
            #2=IFCOWNERHISTORY(#3,#3,$,.NOCHANGE.,$,$,$,0);\n\
            #3=IFCPERSON($,$,$,$,$,$,$,$);\nENDSEC;\nEND-ISO-10303-21;\n";
        let graph = parse_model(content).unwrap();
        assert_eq!(graph.schema(), SchemaVersion::Ifc2x3);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.referrer_ids(3), vec![2]);
    }

    #[test]
    fn dangling_references_are_rejected() {
        assert!(matches!(
            parse_model("#1=IFCLOCALPLACEMENT($,#7);"),
            Err(Error::DanglingReference { target: 7, .. })
        ));
    }
}
