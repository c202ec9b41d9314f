// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Solid volumes in model units.
//!
//! Closed surfaces use the signed tetrahedron method. Boolean results are
//! bounded from above so a small result is never overestimated as large.

use ifc_lite_core::{Entity, EntityGraph, EntityId, IfcType};
use nalgebra::{Matrix3, Matrix4, Point2, Point3};

use crate::error::{Error, Result};
use crate::placement::{cartesian_point, direction, placement_matrix, transformation_operator};

const MAX_DEPTH: usize = 32;

/// Volume of an element's body geometry.
///
/// Returns `Ok(None)` when the element has no solid representation item.
/// Representations labelled `Body` are preferred; otherwise every
/// representation carrying solids is summed.
pub fn element_volume(graph: &EntityGraph, element: EntityId) -> Result<Option<f64>> {
    let entity = graph.entity(element)?;
    // IfcProduct slot 6: Representation
    let Some(shape_id) = entity.get_ref(6) else {
        return Ok(None);
    };
    let shape = graph.entity(shape_id)?;
    let representations: Vec<&Entity> = shape
        .get_refs(2)
        .iter()
        .filter_map(|&id| graph.get(id))
        .filter(|rep| rep.ifc_type == IfcType::IfcShapeRepresentation)
        .filter(|rep| has_solid(graph, rep))
        .collect();

    let bodies: Vec<&Entity> = representations
        .iter()
        .copied()
        .filter(|rep| rep.get_string(1) == Some("Body"))
        .collect();
    let chosen = if bodies.is_empty() { representations } else { bodies };
    if chosen.is_empty() {
        return Ok(None);
    }

    let mut total = 0.0;
    for rep in chosen {
        for item in rep.get_refs(3) {
            if graph.get(item).is_some_and(|e| e.ifc_type.is_solid_item()) {
                total += item_volume(graph, item)?;
            }
        }
    }
    Ok(Some(total))
}

fn has_solid(graph: &EntityGraph, rep: &Entity) -> bool {
    rep.get_refs(3)
        .iter()
        .any(|&id| graph.get(id).is_some_and(|e| e.ifc_type.is_solid_item()))
}

/// Volume of one solid representation item
pub fn item_volume(graph: &EntityGraph, id: EntityId) -> Result<f64> {
    solid_volume(graph, id, 0)
}

fn solid_volume(graph: &EntityGraph, id: EntityId, depth: usize) -> Result<f64> {
    if depth > MAX_DEPTH {
        return Err(Error::geometry(format!("solid nested too deeply at #{}", id)));
    }
    let entity = graph.entity(id)?;
    match entity.ifc_type {
        IfcType::IfcExtrudedAreaSolid => extrusion_volume(graph, entity),
        IfcType::IfcFacetedBrep => brep_volume(graph, entity),
        IfcType::IfcTriangulatedFaceSet => face_set_volume(graph, entity),
        IfcType::IfcBoundingBox => match (entity.get_float(1), entity.get_float(2), entity.get_float(3)) {
            (Some(x), Some(y), Some(z)) => Ok((x * y * z).abs()),
            _ => Err(Error::geometry("bounding box without dimensions")),
        },
        IfcType::IfcBooleanResult | IfcType::IfcBooleanClippingResult => {
            let operand = |slot| {
                entity
                    .get_ref(slot)
                    .ok_or_else(|| Error::geometry(format!("boolean #{} missing operand", id)))
            };
            let first = solid_volume(graph, operand(1)?, depth + 1)?;
            match entity.get_enum(0) {
                Some("UNION") => Ok(first + solid_volume(graph, operand(2)?, depth + 1)?),
                Some("INTERSECTION") => {
                    let second = solid_volume(graph, operand(2)?, depth + 1).unwrap_or(first);
                    Ok(first.min(second))
                }
                // DIFFERENCE: the first operand bounds the result
                _ => Ok(first),
            }
        }
        IfcType::IfcMappedItem => mapped_volume(graph, entity, depth),
        _ => Err(Error::unsupported(format!("{} #{}", entity.ifc_type, id))),
    }
}

fn extrusion_volume(graph: &EntityGraph, solid: &Entity) -> Result<f64> {
    let profile_id = solid
        .get_ref(0)
        .ok_or_else(|| Error::geometry("extrusion without profile"))?;
    let dir_id = solid
        .get_ref(2)
        .ok_or_else(|| Error::geometry("extrusion without direction"))?;
    let depth = solid
        .get_float(3)
        .ok_or_else(|| Error::geometry("extrusion without depth"))?;
    let dir = direction(graph, dir_id)?;
    let len = dir.norm();
    if len < 1e-12 {
        return Err(Error::geometry("zero-length extrusion direction"));
    }
    // Profile lies in the XY plane of the solid's position
    Ok(profile_area(graph, profile_id)? * depth.abs() * (dir.z / len).abs())
}

/// Area of a planar profile definition
pub fn profile_area(graph: &EntityGraph, id: EntityId) -> Result<f64> {
    let profile = graph.entity(id)?;
    match profile.ifc_type {
        IfcType::IfcRectangleProfileDef => match (profile.get_float(3), profile.get_float(4)) {
            (Some(x), Some(y)) => Ok((x * y).abs()),
            _ => Err(Error::geometry("rectangle profile without dimensions")),
        },
        IfcType::IfcCircleProfileDef => profile
            .get_float(3)
            .map(|r| std::f64::consts::PI * r * r)
            .ok_or_else(|| Error::geometry("circle profile without radius")),
        IfcType::IfcArbitraryClosedProfileDef => {
            let curve_id = profile
                .get_ref(2)
                .ok_or_else(|| Error::geometry("profile without outer curve"))?;
            let curve = graph.entity(curve_id)?;
            if curve.ifc_type != IfcType::IfcPolyline {
                return Err(Error::unsupported(format!("outer curve {}", curve.ifc_type)));
            }
            let points = curve
                .get_refs(0)
                .iter()
                .map(|&p| cartesian_point(graph, p).map(|p| Point2::new(p.x, p.y)))
                .collect::<Result<Vec<_>>>()?;
            Ok(polygon_area(&points).abs())
        }
        _ => Err(Error::unsupported(format!("profile {}", profile.ifc_type))),
    }
}

/// Signed shoelace area; closing duplicates contribute nothing
pub fn polygon_area(points: &[Point2<f64>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        twice += a.x * b.y - b.x * a.y;
    }
    twice / 2.0
}

fn brep_volume(graph: &EntityGraph, brep: &Entity) -> Result<f64> {
    let shell = brep
        .get_ref(0)
        .and_then(|id| graph.get(id))
        .ok_or_else(|| Error::geometry(format!("brep #{} without shell", brep.id)))?;

    let mut six_volume = 0.0;
    for face_id in shell.get_refs(0) {
        let face = graph.entity(face_id)?;
        for bound_id in face.get_refs(0) {
            let bound = graph.entity(bound_id)?;
            let Some(polyloop) = bound.get_ref(0).and_then(|id| graph.get(id)) else {
                continue;
            };
            if polyloop.ifc_type != IfcType::IfcPolyLoop {
                return Err(Error::unsupported(format!("face bound {}", polyloop.ifc_type)));
            }
            let mut verts = polyloop
                .get_refs(0)
                .iter()
                .map(|&p| cartesian_point(graph, p))
                .collect::<Result<Vec<_>>>()?;
            if bound.get_enum(1) == Some("F") {
                verts.reverse();
            }
            six_volume += fan_volume(&verts);
        }
    }
    Ok((six_volume / 6.0).abs())
}

/// Six times the signed volume of a loop fanned against the origin
fn fan_volume(verts: &[Point3<f64>]) -> f64 {
    if verts.len() < 3 {
        return 0.0;
    }
    let p0 = verts[0];
    let mut sum = 0.0;
    for i in 1..verts.len() - 1 {
        sum += tetra(&p0, &verts[i], &verts[i + 1]);
    }
    sum
}

#[inline]
fn tetra(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    a.coords.dot(&b.coords.cross(&c.coords))
}

fn face_set_volume(graph: &EntityGraph, set: &Entity) -> Result<f64> {
    let coords = set
        .get_ref(0)
        .and_then(|id| graph.get(id))
        .ok_or_else(|| Error::geometry(format!("face set #{} without coordinates", set.id)))?;
    let vertices: Vec<Point3<f64>> = coords
        .get_list(0)
        .unwrap_or(&[])
        .iter()
        .map(|v| {
            v.as_point3()
                .map(|[x, y, z]| Point3::new(x, y, z))
                .ok_or_else(|| Error::geometry("malformed point list entry"))
        })
        .collect::<Result<_>>()?;

    let vertex = |index: &ifc_lite_core::AttributeValue| -> Result<Point3<f64>> {
        index
            .as_int()
            .filter(|&i| i >= 1 && (i as usize) <= vertices.len())
            .map(|i| vertices[i as usize - 1])
            .ok_or_else(|| Error::geometry("triangle index out of range"))
    };

    let mut six_volume = 0.0;
    for tri in set.get_list(3).unwrap_or(&[]) {
        match tri.as_list() {
            Some([a, b, c]) => six_volume += tetra(&vertex(a)?, &vertex(b)?, &vertex(c)?),
            _ => return Err(Error::geometry("triangle index must have three entries")),
        }
    }
    Ok((six_volume / 6.0).abs())
}

fn mapped_volume(graph: &EntityGraph, item: &Entity, depth: usize) -> Result<f64> {
    let map = item
        .get_ref(0)
        .and_then(|id| graph.get(id))
        .ok_or_else(|| Error::geometry(format!("mapped item #{} without source", item.id)))?;
    let target = match item.get_ref(1) {
        Some(op) => transformation_operator(graph, op)?,
        None => Matrix4::identity(),
    };
    let origin = placement_matrix(graph, map.get_ref(0))?;
    let linear: Matrix3<f64> = (target * origin).fixed_view::<3, 3>(0, 0).into_owned();
    let factor = linear.determinant().abs();

    let rep = map
        .get_ref(1)
        .and_then(|id| graph.get(id))
        .ok_or_else(|| Error::geometry("representation map without representation"))?;
    let mut total = 0.0;
    let mut solids = 0;
    for id in rep.get_refs(3) {
        if graph.get(id).is_some_and(|e| e.ifc_type.is_solid_item()) {
            total += solid_volume(graph, id, depth + 1)?;
            solids += 1;
        }
    }
    if solids == 0 {
        return Err(Error::unsupported(format!("mapped item #{} carries no solids", item.id)));
    }
    Ok(total * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ifc_lite_core::parse_model;

    fn wall_with(items: &str, solid_refs: &str) -> String {
        format!(
            "#1=IFCCARTESIANPOINT((0.,0.,0.));\n\
             #2=IFCDIRECTION((0.,0.,1.));\n\
             #3=IFCAXIS2PLACEMENT3D(#1,$,$);\n\
             #4=IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.E-05,#3,$);\n\
             {items}\n\
             #90=IFCSHAPEREPRESENTATION(#4,'Body','SweptSolid',({solid_refs}));\n\
             #91=IFCPRODUCTDEFINITIONSHAPE($,$,(#90));\n\
             #92=IFCWALL('w',$,$,$,$,$,#91,$,$);"
        )
    }

    #[test]
    fn rectangle_extrusion() {
        let text = wall_with(
            "#10=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,2.,0.5);\n#11=IFCEXTRUDEDAREASOLID(#10,#3,#2,3.);",
            "#11",
        );
        let graph = parse_model(&text).unwrap();
        assert_relative_eq!(element_volume(&graph, 92).unwrap().unwrap(), 3.0);
    }

    #[test]
    fn oblique_extrusion_uses_height() {
        let text = wall_with(
            "#10=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,1.,1.);\n#12=IFCDIRECTION((1.,0.,1.));\n#11=IFCEXTRUDEDAREASOLID(#10,#3,#12,2.);",
            "#11",
        );
        let graph = parse_model(&text).unwrap();
        let expected = 2.0 * std::f64::consts::FRAC_1_SQRT_2;
        assert_relative_eq!(element_volume(&graph, 92).unwrap().unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn arbitrary_profile_area() {
        let text = wall_with(
            "#20=IFCCARTESIANPOINT((0.,0.));\n\
             #21=IFCCARTESIANPOINT((2.,0.));\n\
             #22=IFCCARTESIANPOINT((2.,1.));\n\
             #23=IFCCARTESIANPOINT((0.,1.));\n\
             #24=IFCPOLYLINE((#20,#21,#22,#23,#20));\n\
             #25=IFCARBITRARYCLOSEDPROFILEDEF(.AREA.,$,#24);\n\
             #26=IFCEXTRUDEDAREASOLID(#25,#3,#2,1.5);",
            "#26",
        );
        let graph = parse_model(&text).unwrap();
        assert_relative_eq!(element_volume(&graph, 92).unwrap().unwrap(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn triangulated_tetrahedron() {
        let text = wall_with(
            "#30=IFCCARTESIANPOINTLIST3D(((0.,0.,0.),(1.,0.,0.),(0.,1.,0.),(0.,0.,1.)));\n\
             #31=IFCTRIANGULATEDFACESET(#30,$,.T.,((1,3,2),(1,2,4),(2,3,4),(3,1,4)),$);",
            "#31",
        );
        let graph = parse_model(&text).unwrap();
        assert_relative_eq!(element_volume(&graph, 92).unwrap().unwrap(), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn faceted_brep_cube() {
        let text = wall_with(
            "#40=IFCCARTESIANPOINT((0.,0.,0.));\n\
             #41=IFCCARTESIANPOINT((1.,0.,0.));\n\
             #42=IFCCARTESIANPOINT((1.,1.,0.));\n\
             #43=IFCCARTESIANPOINT((0.,1.,0.));\n\
             #44=IFCCARTESIANPOINT((0.,0.,1.));\n\
             #45=IFCCARTESIANPOINT((1.,0.,1.));\n\
             #46=IFCCARTESIANPOINT((1.,1.,1.));\n\
             #47=IFCCARTESIANPOINT((0.,1.,1.));\n\
             #50=IFCPOLYLOOP((#40,#43,#42,#41));\n\
             #51=IFCPOLYLOOP((#44,#45,#46,#47));\n\
             #52=IFCPOLYLOOP((#40,#41,#45,#44));\n\
             #53=IFCPOLYLOOP((#42,#43,#47,#46));\n\
             #54=IFCPOLYLOOP((#41,#42,#46,#45));\n\
             #55=IFCPOLYLOOP((#43,#40,#44,#47));\n\
             #60=IFCFACEOUTERBOUND(#50,.T.);\n\
             #61=IFCFACEOUTERBOUND(#51,.T.);\n\
             #62=IFCFACEOUTERBOUND(#52,.T.);\n\
             #63=IFCFACEOUTERBOUND(#53,.T.);\n\
             #64=IFCFACEOUTERBOUND(#54,.T.);\n\
             #65=IFCFACEOUTERBOUND(#55,.T.);\n\
             #70=IFCFACE((#60));\n\
             #71=IFCFACE((#61));\n\
             #72=IFCFACE((#62));\n\
             #73=IFCFACE((#63));\n\
             #74=IFCFACE((#64));\n\
             #75=IFCFACE((#65));\n\
             #76=IFCCLOSEDSHELL((#70,#71,#72,#73,#74,#75));\n\
             #77=IFCFACETEDBREP(#76);",
            "#77",
        );
        let graph = parse_model(&text).unwrap();
        assert_relative_eq!(element_volume(&graph, 92).unwrap().unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn mapped_items_scale_by_operator() {
        let text = wall_with(
            "#10=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,1.,1.);\n\
             #11=IFCEXTRUDEDAREASOLID(#10,#3,#2,1.);\n\
             #12=IFCSHAPEREPRESENTATION(#4,'Body','SweptSolid',(#11));\n\
             #13=IFCREPRESENTATIONMAP(#3,#12);\n\
             #14=IFCCARTESIANTRANSFORMATIONOPERATOR3D($,$,#1,2.,$);\n\
             #15=IFCMAPPEDITEM(#13,#14);",
            "#15",
        );
        let graph = parse_model(&text).unwrap();
        assert_relative_eq!(element_volume(&graph, 92).unwrap().unwrap(), 8.0, epsilon = 1e-12);
    }

    #[test]
    fn elements_without_solids_have_no_volume() {
        let text = wall_with(
            "#10=IFCCARTESIANPOINT((1.,1.,0.));\n#11=IFCPOLYLINE((#1,#10));",
            "#11",
        );
        let graph = parse_model(&text).unwrap();
        assert_eq!(element_volume(&graph, 92).unwrap(), None);
    }

    #[test]
    fn difference_is_bounded_by_first_operand() {
        let text = wall_with(
            "#10=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,1.,1.);\n\
             #11=IFCEXTRUDEDAREASOLID(#10,#3,#2,1.);\n\
             #12=IFCBOUNDINGBOX(#1,0.5,0.5,0.5);\n\
             #13=IFCBOOLEANRESULT(.DIFFERENCE.,#11,#12);",
            "#13",
        );
        let graph = parse_model(&text).unwrap();
        assert_relative_eq!(element_volume(&graph, 92).unwrap().unwrap(), 1.0);
    }
}
