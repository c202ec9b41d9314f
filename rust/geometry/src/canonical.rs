// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Canonical shape forms for geometry deduplication.
//!
//! A shape representation is reduced to a tree of quantized values expressed
//! in the representation's own coordinate system: item placements are
//! resolved, closed loops start at their smallest vertex and set-valued
//! collections are sorted. Two representations with equal forms describe
//! the same geometry.

use std::hash::{Hash, Hasher};

use ifc_lite_core::{AttributeValue, Entity, EntityGraph, EntityId, IfcType};
use nalgebra::{Matrix4, Point3, Vector3};
use rustc_hash::FxHasher;

use crate::error::{Error, Result};
use crate::placement::{is_identity, placement_matrix, transformation_operator};

/// Item nesting deeper than this is rejected
const MAX_DEPTH: usize = 64;

/// Quantize a coordinate to `precision` decimals
#[inline]
pub fn quantize(value: f64, precision: u32) -> i64 {
    (value * 10f64.powi(precision as i32)).round() as i64
}

/// Node of a canonical form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    Null,
    Int(i64),
    /// Quantized real
    Number(i64),
    /// Quantized point or vector
    Point([i64; 3]),
    Text(String),
    Enum(String),
    Ref(EntityId),
    List(Vec<Node>),
    Kind(String, Vec<Node>),
}

impl Node {
    fn kind(name: &str, children: Vec<Node>) -> Self {
        Node::Kind(name.to_string(), children)
    }

    /// Hash the structure with every quantized number masked out
    fn hash_skeleton<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Node::Number(_) | Node::Point(_) | Node::Null => {}
            Node::Int(i) => i.hash(state),
            Node::Text(s) | Node::Enum(s) => s.hash(state),
            Node::Ref(id) => id.hash(state),
            Node::List(items) => {
                items.len().hash(state);
                items.iter().for_each(|n| n.hash_skeleton(state));
            }
            Node::Kind(name, items) => {
                name.hash(state);
                items.len().hash(state);
                items.iter().for_each(|n| n.hash_skeleton(state));
            }
        }
    }

    /// Structural equality with numbers compared within `tolerance` quanta
    fn near(&self, other: &Node, tolerance: i64) -> bool {
        match (self, other) {
            (Node::Number(a), Node::Number(b)) => (a - b).abs() <= tolerance,
            (Node::Point(a), Node::Point(b)) => {
                a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance)
            }
            (Node::List(a), Node::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.near(y, tolerance))
            }
            (Node::Kind(na, a), Node::Kind(nb, b)) => {
                na == nb && a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.near(y, tolerance))
            }
            (a, b) => a == b,
        }
    }
}

/// Canonical form of one shape representation
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalShape {
    pub id: EntityId,
    pub form: Node,
    /// FxHash of `form`
    pub fingerprint: u64,
    /// FxHash of `form` with numbers masked
    pub skeleton: u64,
    /// Quantized bounds of every resolved point
    pub bounds: Option<([i64; 3], [i64; 3])>,
    pub precision: u32,
}

impl CanonicalShape {
    fn new(id: EntityId, form: Node, points: &[[i64; 3]], precision: u32) -> Self {
        let mut hasher = FxHasher::default();
        form.hash(&mut hasher);
        let fingerprint = hasher.finish();

        let mut hasher = FxHasher::default();
        form.hash_skeleton(&mut hasher);
        let skeleton = hasher.finish();

        let bounds = points.iter().fold(None, |acc: Option<([i64; 3], [i64; 3])>, p| {
            Some(match acc {
                None => (*p, *p),
                Some((mut lo, mut hi)) => {
                    for axis in 0..3 {
                        lo[axis] = lo[axis].min(p[axis]);
                        hi[axis] = hi[axis].max(p[axis]);
                    }
                    (lo, hi)
                }
            })
        });

        Self {
            id,
            form,
            fingerprint,
            skeleton,
            bounds,
            precision,
        }
    }

    /// Exact equivalence: equal fingerprints and equal forms
    pub fn same_as(&self, other: &CanonicalShape) -> bool {
        self.fingerprint == other.fingerprint && self.form == other.form
    }

    /// Equivalence within `tolerance` (model units).
    ///
    /// Forms must align structurally, every aligned number must differ by at
    /// most the tolerance and the bounding boxes must agree per corner.
    pub fn near(&self, other: &CanonicalShape, tolerance: f64) -> bool {
        if self.skeleton != other.skeleton || self.precision != other.precision {
            return false;
        }
        let quanta = quantize(tolerance, self.precision).max(0);
        if !self.form.near(&other.form, quanta) {
            return false;
        }
        match (self.bounds, other.bounds) {
            (Some((alo, ahi)), Some((blo, bhi))) => (0..3).all(|axis| {
                (alo[axis] - blo[axis]).abs() <= quanta && (ahi[axis] - bhi[axis]).abs() <= quanta
            }),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Compute the canonical form of an IfcShapeRepresentation
pub fn canonical_representation(graph: &EntityGraph, id: EntityId, precision: u32) -> Result<CanonicalShape> {
    let rep = graph.entity(id)?;
    if rep.ifc_type != IfcType::IfcShapeRepresentation {
        return Err(Error::geometry(format!(
            "Expected IfcShapeRepresentation for #{}, got {}",
            id, rep.ifc_type
        )));
    }
    let mut canon = Canonicalizer::new(graph, precision);
    let context = rep.get_ref(0).map_or(Node::Null, Node::Ref);
    let identifier = canon.value(rep.get(1), &Matrix4::identity())?;
    let rep_type = canon.value(rep.get(2), &Matrix4::identity())?;
    let items = canon.item_set(&rep.get_refs(3), &Matrix4::identity())?;
    let form = Node::kind("SHAPE", vec![context, identifier, rep_type, items]);
    Ok(CanonicalShape::new(id, form, &canon.points, precision))
}

struct Canonicalizer<'g> {
    graph: &'g EntityGraph,
    precision: u32,
    points: Vec<[i64; 3]>,
    stack: Vec<EntityId>,
}

impl<'g> Canonicalizer<'g> {
    fn new(graph: &'g EntityGraph, precision: u32) -> Self {
        Self {
            graph,
            precision,
            points: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn number(&self, value: f64) -> Result<Node> {
        if !value.is_finite() {
            return Err(Error::geometry("non-finite coordinate"));
        }
        Ok(Node::Number(quantize(value, self.precision)))
    }

    /// Quantized point in representation coordinates, recorded for bounds
    fn point(&mut self, p: Point3<f64>) -> Result<[i64; 3]> {
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            return Err(Error::geometry("non-finite coordinate"));
        }
        let q = [
            quantize(p.x, self.precision),
            quantize(p.y, self.precision),
            quantize(p.z, self.precision),
        ];
        self.points.push(q);
        Ok(q)
    }

    fn vector(&self, v: Vector3<f64>) -> Node {
        Node::Point([
            quantize(v.x, self.precision),
            quantize(v.y, self.precision),
            quantize(v.z, self.precision),
        ])
    }

    fn matrix(&self, m: &Matrix4<f64>) -> Node {
        Node::List(
            m.iter()
                .map(|v| Node::Number(quantize(*v, self.precision)))
                .collect(),
        )
    }

    fn enter(&mut self, id: EntityId) -> Result<&'g Entity> {
        if self.stack.contains(&id) {
            return Err(Error::geometry(format!("cyclic geometry at #{}", id)));
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(Error::geometry(format!("geometry nested too deeply at #{}", id)));
        }
        self.stack.push(id);
        Ok(self.graph.entity(id)?)
    }

    fn leave(&mut self) {
        self.stack.pop();
    }

    /// Representation items are a set: sorted canonical forms
    fn item_set(&mut self, ids: &[EntityId], t: &Matrix4<f64>) -> Result<Node> {
        let mut items = ids
            .iter()
            .map(|&id| self.item(id, t))
            .collect::<Result<Vec<_>>>()?;
        items.sort();
        Ok(Node::List(items))
    }

    fn item(&mut self, id: EntityId, t: &Matrix4<f64>) -> Result<Node> {
        let entity = self.enter(id)?;
        let node = match entity.ifc_type {
            IfcType::IfcExtrudedAreaSolid => self.extrusion(entity, t),
            IfcType::IfcFacetedBrep => self.brep(entity, t),
            IfcType::IfcTriangulatedFaceSet => self.face_set(entity, t),
            IfcType::IfcBoundingBox => self.bounding_box(entity, t),
            IfcType::IfcMappedItem => self.mapped(entity, t),
            IfcType::IfcPolyline => self.polyline(entity, t),
            IfcType::IfcCartesianPoint => {
                let p = self.resolve_point(entity.id, t)?;
                Ok(Node::Point(p))
            }
            IfcType::IfcBooleanResult | IfcType::IfcBooleanClippingResult => {
                let operator = self.value(entity.get(0), t)?;
                let first = self.required_ref(entity, 1).and_then(|r| self.item(r, t))?;
                let second = self.required_ref(entity, 2).and_then(|r| self.item(r, t))?;
                Ok(Node::kind(entity.ifc_type.as_str(), vec![operator, first, second]))
            }
            _ => self.generic(entity, t),
        };
        self.leave();
        node
    }

    fn required_ref(&self, entity: &Entity, slot: usize) -> Result<EntityId> {
        entity.get_ref(slot).ok_or_else(|| {
            Error::geometry(format!(
                "{} #{} missing reference in slot {}",
                entity.ifc_type, entity.id, slot
            ))
        })
    }

    /// Kinds without a dedicated form keep their attributes; the frame they
    /// live in is part of the form so differently placed copies never match
    fn generic(&mut self, entity: &Entity, t: &Matrix4<f64>) -> Result<Node> {
        let mut children = Vec::with_capacity(entity.attributes.len() + 1);
        if !is_identity(t, 1e-12) {
            children.push(Node::kind("FRAME", vec![self.matrix(t)]));
        }
        for value in &entity.attributes {
            children.push(self.value(Some(value), t)?);
        }
        Ok(Node::kind(entity.ifc_type.as_str(), children))
    }

    fn value(&mut self, value: Option<&AttributeValue>, t: &Matrix4<f64>) -> Result<Node> {
        Ok(match value {
            None | Some(AttributeValue::Null) | Some(AttributeValue::Derived) => Node::Null,
            Some(AttributeValue::EntityRef(id)) => self.item(*id, t)?,
            Some(AttributeValue::String(s)) => Node::Text(s.clone()),
            Some(AttributeValue::Integer(i)) => Node::Int(*i),
            Some(AttributeValue::Float(f)) => self.number(*f)?,
            Some(AttributeValue::Enum(e)) => Node::Enum(e.clone()),
            Some(AttributeValue::List(items)) => Node::List(
                items
                    .iter()
                    .map(|v| self.value(Some(v), t))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(AttributeValue::Typed(name, args)) => Node::Kind(
                name.clone(),
                args.iter()
                    .map(|v| self.value(Some(v), t))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }

    fn resolve_point(&mut self, id: EntityId, t: &Matrix4<f64>) -> Result<[i64; 3]> {
        let p = crate::placement::cartesian_point(self.graph, id)?;
        self.point(t.transform_point(&p))
    }

    fn loop_points(&mut self, ids: &[EntityId], t: &Matrix4<f64>) -> Result<Node> {
        let points = ids
            .iter()
            .map(|&id| self.resolve_point(id, t))
            .collect::<Result<Vec<_>>>()?;
        Ok(closed_loop(points))
    }

    fn extrusion(&mut self, solid: &Entity, t: &Matrix4<f64>) -> Result<Node> {
        // SweptArea, Position, ExtrudedDirection, Depth
        let frame = t * placement_matrix(self.graph, solid.get_ref(1))?;
        let profile_id = self.required_ref(solid, 0)?;
        let direction_id = self.required_ref(solid, 2)?;
        let depth = solid
            .get_float(3)
            .ok_or_else(|| Error::geometry(format!("IfcExtrudedAreaSolid #{} missing depth", solid.id)))?;
        let dir = crate::placement::direction(self.graph, direction_id)?;
        if dir.norm() < 1e-12 {
            return Err(Error::geometry("zero-length extrusion direction"));
        }
        let sweep = frame.transform_vector(&(dir.normalize() * depth));

        let profile_entity = self.enter(profile_id)?;
        let profile = self.profile(profile_entity, &frame);
        self.leave();

        Ok(Node::kind("EXTRUSION", vec![profile?, self.vector(sweep)]))
    }

    fn profile(&mut self, profile: &Entity, frame: &Matrix4<f64>) -> Result<Node> {
        let profile_type = self.value(profile.get(0), frame)?;
        match profile.ifc_type {
            IfcType::IfcRectangleProfileDef => {
                // ProfileType, ProfileName, Position, XDim, YDim
                let p = frame * placement_matrix(self.graph, profile.get_ref(2))?;
                let (x, y) = match (profile.get_float(3), profile.get_float(4)) {
                    (Some(x), Some(y)) => (x / 2.0, y / 2.0),
                    _ => return Err(Error::geometry("rectangle profile without dimensions")),
                };
                let corners = [(-x, -y), (x, -y), (x, y), (-x, y)]
                    .into_iter()
                    .map(|(cx, cy)| self.point(p.transform_point(&Point3::new(cx, cy, 0.0))))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Node::kind("AREA", vec![profile_type, closed_loop(corners)]))
            }
            IfcType::IfcCircleProfileDef => {
                let p = frame * placement_matrix(self.graph, profile.get_ref(2))?;
                let radius = profile
                    .get_float(3)
                    .ok_or_else(|| Error::geometry("circle profile without radius"))?;
                let center = self.point(p.transform_point(&Point3::origin()))?;
                let normal = self.vector(p.transform_vector(&Vector3::z()));
                Ok(Node::kind(
                    "CIRCLE",
                    vec![profile_type, Node::Point(center), normal, self.number(radius)?],
                ))
            }
            IfcType::IfcArbitraryClosedProfileDef => {
                let curve_id = self.required_ref(profile, 2)?;
                let curve = self.enter(curve_id)?;
                let outline = if curve.ifc_type == IfcType::IfcPolyline {
                    self.loop_points(&curve.get_refs(0), frame)
                } else {
                    self.generic(curve, frame)
                };
                self.leave();
                Ok(Node::kind("AREA", vec![profile_type, outline?]))
            }
            _ => self.generic(profile, frame),
        }
    }

    fn brep(&mut self, brep: &Entity, t: &Matrix4<f64>) -> Result<Node> {
        let shell_id = self.required_ref(brep, 0)?;
        let shell = self.enter(shell_id)?;
        let mut faces = Vec::new();
        for face_id in shell.get_refs(0) {
            let face = self.enter(face_id)?;
            let mut bounds = Vec::new();
            for bound_id in face.get_refs(0) {
                let bound = self.enter(bound_id)?;
                let loop_id = self.required_ref(bound, 0)?;
                let polyloop = self.enter(loop_id)?;
                let outline = if polyloop.ifc_type == IfcType::IfcPolyLoop {
                    self.loop_points(&polyloop.get_refs(0), t)?
                } else {
                    self.generic(polyloop, t)?
                };
                self.leave();
                let orientation = self.value(bound.get(1), t)?;
                bounds.push(Node::kind(
                    bound.ifc_type.as_str(),
                    vec![orientation, outline],
                ));
                self.leave();
            }
            bounds.sort();
            faces.push(Node::List(bounds));
            self.leave();
        }
        self.leave();
        faces.sort();
        Ok(Node::kind("BREP", vec![Node::List(faces)]))
    }

    fn face_set(&mut self, set: &Entity, t: &Matrix4<f64>) -> Result<Node> {
        // Coordinates, Normals, Closed, CoordIndex, PnIndex
        let coords_id = self.required_ref(set, 0)?;
        let coords = self.graph.entity(coords_id)?;
        let vertices: Vec<Point3<f64>> = coords
            .get_list(0)
            .ok_or_else(|| Error::geometry(format!("point list #{} without coordinates", coords_id)))?
            .iter()
            .map(|v| {
                v.as_point3()
                    .map(|[x, y, z]| Point3::new(x, y, z))
                    .ok_or_else(|| Error::geometry("malformed point list entry"))
            })
            .collect::<Result<_>>()?;

        let mut triangles = Vec::new();
        for tri in set.get_list(3).unwrap_or(&[]) {
            let indices = tri
                .as_list()
                .ok_or_else(|| Error::geometry("malformed triangle index"))?;
            let mut corners = Vec::with_capacity(3);
            for index in indices {
                let i = index
                    .as_int()
                    .filter(|&i| i >= 1 && (i as usize) <= vertices.len())
                    .ok_or_else(|| Error::geometry("triangle index out of range"))?;
                corners.push(self.point(t.transform_point(&vertices[i as usize - 1]))?);
            }
            triangles.push(closed_loop(corners));
        }
        triangles.sort();

        let normals = self.value(set.get(1), t)?;
        let closed = self.value(set.get(2), t)?;
        let pn_index = self.value(set.get(4), t)?;
        Ok(Node::kind(
            "FACESET",
            vec![closed, Node::List(triangles), normals, pn_index],
        ))
    }

    fn bounding_box(&mut self, bbox: &Entity, t: &Matrix4<f64>) -> Result<Node> {
        let corner_id = self.required_ref(bbox, 0)?;
        let corner = crate::placement::cartesian_point(self.graph, corner_id)?;
        let (dx, dy, dz) = match (bbox.get_float(1), bbox.get_float(2), bbox.get_float(3)) {
            (Some(x), Some(y), Some(z)) => (x, y, z),
            _ => return Err(Error::geometry("bounding box without dimensions")),
        };
        let mut corners = Vec::with_capacity(8);
        for (i, j, k) in [
            (0., 0., 0.),
            (1., 0., 0.),
            (0., 1., 0.),
            (1., 1., 0.),
            (0., 0., 1.),
            (1., 0., 1.),
            (0., 1., 1.),
            (1., 1., 1.),
        ] {
            let p = corner + Vector3::new(i * dx, j * dy, k * dz);
            corners.push(Node::Point(self.point(t.transform_point(&p))?));
        }
        corners.sort();
        Ok(Node::kind("BOX", corners))
    }

    fn mapped(&mut self, item: &Entity, t: &Matrix4<f64>) -> Result<Node> {
        // MappingSource (IfcRepresentationMap), MappingTarget
        let map_id = self.required_ref(item, 0)?;
        let target = transformation_operator(self.graph, self.required_ref(item, 1)?)?;
        let map = self.enter(map_id)?;
        let origin = placement_matrix(self.graph, map.get_ref(0))?;
        let frame = t * target * origin;
        let rep_id = self.required_ref(map, 1)?;
        let rep = self.enter(rep_id)?;
        let items = self.item_set(&rep.get_refs(3), &frame);
        self.leave();
        self.leave();
        Ok(Node::kind("MAPPED", vec![items?]))
    }

    fn polyline(&mut self, line: &Entity, t: &Matrix4<f64>) -> Result<Node> {
        let ids = line.get_refs(0);
        let closed = ids.len() > 2 && ids.first() == ids.last();
        if closed {
            return self.loop_points(&ids, t);
        }
        let points = ids
            .iter()
            .map(|&id| self.resolve_point(id, t).map(Node::Point))
            .collect::<Result<Vec<_>>>()?;
        Ok(Node::kind("POLYLINE", points))
    }
}

/// Closed loop starting at its smallest vertex, orientation preserved
fn closed_loop(mut points: Vec<[i64; 3]>) -> Node {
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if let Some(start) = points
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    {
        points.rotate_left(start);
    }
    Node::kind("LOOP", points.into_iter().map(Node::Point).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifc_lite_core::parse_model;

    /// Two walls' body representations: a 1x1 box extruded 5 high, placed
    /// differently but describing the same solid in representation space.
    const SHAPES: &str = r#"
#1=IFCCARTESIANPOINT((0.,0.,0.));
#2=IFCDIRECTION((0.,0.,1.));
#3=IFCAXIS2PLACEMENT3D(#1,$,$);
#4=IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.E-05,#3,$);
#10=IFCCARTESIANPOINT((0.5,0.5));
#11=IFCAXIS2PLACEMENT2D(#10,$);
#12=IFCRECTANGLEPROFILEDEF(.AREA.,$,#11,1.,1.);
#13=IFCEXTRUDEDAREASOLID(#12,#3,#2,5.);
#14=IFCSHAPEREPRESENTATION(#4,'Body','SweptSolid',(#13));
#20=IFCCARTESIANPOINT((0.5,0.5,0.));
#21=IFCAXIS2PLACEMENT3D(#20,$,$);
#22=IFCRECTANGLEPROFILEDEF(.AREA.,'other name',$,1.,1.);
#23=IFCEXTRUDEDAREASOLID(#22,#21,#2,5.);
#24=IFCSHAPEREPRESENTATION(#4,'Body','SweptSolid',(#23));
#30=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,1.,1.);
#31=IFCEXTRUDEDAREASOLID(#30,#3,#2,5.);
#32=IFCSHAPEREPRESENTATION(#4,'Body','SweptSolid',(#31));
#40=IFCRECTANGLEPROFILEDEF(.AREA.,$,#11,1.0004,1.);
#41=IFCEXTRUDEDAREASOLID(#40,#3,#2,5.);
#42=IFCSHAPEREPRESENTATION(#4,'Body','SweptSolid',(#41));
"#;

    #[test]
    fn resolved_placements_give_equal_forms() {
        let graph = parse_model(SHAPES).unwrap();
        let a = canonical_representation(&graph, 14, 6).unwrap();
        let b = canonical_representation(&graph, 24, 6).unwrap();
        assert!(a.same_as(&b), "{:?}\n{:?}", a.form, b.form);
    }

    #[test]
    fn moved_solids_differ() {
        let graph = parse_model(SHAPES).unwrap();
        let a = canonical_representation(&graph, 14, 6).unwrap();
        let c = canonical_representation(&graph, 32, 6).unwrap();
        assert!(!a.same_as(&c));
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_eq!(a.skeleton, c.skeleton);
    }

    #[test]
    fn near_duplicates_within_tolerance() {
        let graph = parse_model(SHAPES).unwrap();
        let a = canonical_representation(&graph, 14, 6).unwrap();
        let d = canonical_representation(&graph, 42, 6).unwrap();
        assert!(!a.same_as(&d));
        assert!(a.near(&d, 0.001));
        assert!(!a.near(&d, 0.0001));
    }

    #[test]
    fn loops_start_at_smallest_vertex() {
        let node = closed_loop(vec![[1, 0, 0], [1, 1, 0], [0, 0, 0], [1, 0, 0]]);
        assert_eq!(
            node,
            Node::kind(
                "LOOP",
                vec![
                    Node::Point([0, 0, 0]),
                    Node::Point([1, 0, 0]),
                    Node::Point([1, 1, 0])
                ]
            )
        );
    }

    #[test]
    fn brep_face_order_does_not_matter() {
        let text = r#"
#1=IFCCARTESIANPOINT((0.,0.,0.));
#2=IFCCARTESIANPOINT((1.,0.,0.));
#3=IFCCARTESIANPOINT((0.,1.,0.));
#4=IFCCARTESIANPOINT((0.,0.,1.));
#10=IFCPOLYLOOP((#1,#3,#2));
#11=IFCPOLYLOOP((#1,#2,#4));
#12=IFCFACEOUTERBOUND(#10,.T.);
#13=IFCFACEOUTERBOUND(#11,.T.);
#14=IFCFACE((#12));
#15=IFCFACE((#13));
#16=IFCCLOSEDSHELL((#14,#15));
#17=IFCCLOSEDSHELL((#15,#14));
#18=IFCFACETEDBREP(#16);
#19=IFCFACETEDBREP(#17);
#20=IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.E-05,$,$);
#21=IFCSHAPEREPRESENTATION(#20,'Body','Brep',(#18));
#22=IFCSHAPEREPRESENTATION(#20,'Body','Brep',(#19));
"#;
        let graph = parse_model(text).unwrap();
        let a = canonical_representation(&graph, 21, 6).unwrap();
        let b = canonical_representation(&graph, 22, 6).unwrap();
        assert!(a.same_as(&b));
        assert_eq!(a.bounds, Some(([0, 0, 0], [1_000_000, 1_000_000, 1_000_000])));
    }

    #[test]
    fn different_contexts_never_match() {
        let text = r#"
#1=IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.E-05,$,$);
#2=IFCGEOMETRICREPRESENTATIONCONTEXT($,'Plan',2,1.E-05,$,$);
#3=IFCBOUNDINGBOX(#4,1.,1.,1.);
#4=IFCCARTESIANPOINT((0.,0.,0.));
#5=IFCSHAPEREPRESENTATION(#1,'Box','BoundingBox',(#3));
#6=IFCSHAPEREPRESENTATION(#2,'Box','BoundingBox',(#3));
"#;
        let graph = parse_model(text).unwrap();
        let a = canonical_representation(&graph, 5, 6).unwrap();
        let b = canonical_representation(&graph, 6, 6).unwrap();
        assert!(!a.same_as(&b));
    }
}
