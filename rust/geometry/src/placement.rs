// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Placement utilities
//!
//! Reads IFC placement and direction entities from the graph into nalgebra
//! matrices, composes local placement chains and turns rigid matrices back
//! into axis/ref-direction form.

use crate::error::{Error, Result};
use ifc_lite_core::{Entity, EntityGraph, EntityId, IfcType};
use nalgebra::{Matrix4, Point3, Vector3};

const DEFAULT_Z: Vector3<f64> = Vector3::new(0.0, 0.0, 1.0);
const DEFAULT_X: Vector3<f64> = Vector3::new(1.0, 0.0, 0.0);

/// Local placement chains deeper than this are treated as cyclic
const MAX_PLACEMENT_DEPTH: usize = 256;

fn entity_of<'g>(graph: &'g EntityGraph, id: EntityId, kind: IfcType) -> Result<&'g Entity> {
    let entity = graph.entity(id)?;
    if entity.ifc_type != kind {
        return Err(Error::geometry(format!(
            "Expected {} for #{}, got {}",
            kind, id, entity.ifc_type
        )));
    }
    Ok(entity)
}

/// Parse IfcCartesianPoint (missing components are 0)
pub fn cartesian_point(graph: &EntityGraph, id: EntityId) -> Result<Point3<f64>> {
    let point = entity_of(graph, id, IfcType::IfcCartesianPoint)?;
    let [x, y, z] = point
        .get(0)
        .and_then(|v| v.as_point3())
        .ok_or_else(|| Error::geometry(format!("IfcCartesianPoint #{} missing coordinates", id)))?;
    Ok(Point3::new(x, y, z))
}

/// Parse IfcDirection
pub fn direction(graph: &EntityGraph, id: EntityId) -> Result<Vector3<f64>> {
    let dir = entity_of(graph, id, IfcType::IfcDirection)?;
    let [x, y, z] = dir
        .get(0)
        .and_then(|v| v.as_point3())
        .ok_or_else(|| Error::geometry(format!("IfcDirection #{} missing ratios", id)))?;
    Ok(Vector3::new(x, y, z))
}

fn optional_direction(
    graph: &EntityGraph,
    entity: &Entity,
    slot: usize,
    default: Vector3<f64>,
) -> Result<Vector3<f64>> {
    match entity.get_ref(slot) {
        Some(id) => direction(graph, id),
        None => Ok(default),
    }
}

/// Build a rigid frame from a location, Z axis and approximate X axis
pub fn frame(location: Point3<f64>, z_axis: Vector3<f64>, x_axis: Vector3<f64>) -> Result<Matrix4<f64>> {
    if z_axis.norm() < 1e-12 || x_axis.norm() < 1e-12 {
        return Err(Error::geometry("Zero-length placement axis"));
    }
    let z = z_axis.normalize();
    let x_normalized = x_axis.normalize();

    // Ensure X is orthogonal to Z (project X onto plane perpendicular to Z)
    let x_orthogonal = x_normalized - z * x_normalized.dot(&z);
    let x = if x_orthogonal.norm() > 1e-6 {
        x_orthogonal.normalize()
    } else if z.z.abs() < 0.9 {
        Vector3::new(0.0, 0.0, 1.0).cross(&z).normalize()
    } else {
        Vector3::new(1.0, 0.0, 0.0).cross(&z).normalize()
    };

    // Y = Z × X (right-hand rule)
    let y = z.cross(&x).normalize();

    #[rustfmt::skip]
    let m = Matrix4::new(
        x.x, y.x, z.x, location.x,
        x.y, y.y, z.y, location.y,
        x.z, y.z, z.z, location.z,
        0.0, 0.0, 0.0, 1.0,
    );
    Ok(m)
}

/// Parse IfcAxis2Placement3D into a local-to-parent matrix
pub fn axis2_placement_3d(graph: &EntityGraph, id: EntityId) -> Result<Matrix4<f64>> {
    let placement = entity_of(graph, id, IfcType::IfcAxis2Placement3D)?;
    let location = match placement.get_ref(0) {
        Some(point) => cartesian_point(graph, point)?,
        None => Point3::origin(),
    };
    let z = optional_direction(graph, placement, 1, DEFAULT_Z)?;
    let x = optional_direction(graph, placement, 2, DEFAULT_X)?;
    frame(location, z, x)
}

/// Parse IfcAxis2Placement2D, embedded in the XY plane
pub fn axis2_placement_2d(graph: &EntityGraph, id: EntityId) -> Result<Matrix4<f64>> {
    let placement = entity_of(graph, id, IfcType::IfcAxis2Placement2D)?;
    let location = match placement.get_ref(0) {
        Some(point) => cartesian_point(graph, point)?,
        None => Point3::origin(),
    };
    let x = optional_direction(graph, placement, 1, DEFAULT_X)?;
    frame(location, DEFAULT_Z, Vector3::new(x.x, x.y, 0.0))
}

/// Parse any supported placement entity; `None` (unset slot) is the identity
pub fn placement_matrix(graph: &EntityGraph, id: Option<EntityId>) -> Result<Matrix4<f64>> {
    let Some(id) = id else {
        return Ok(Matrix4::identity());
    };
    match graph.entity(id)?.ifc_type {
        IfcType::IfcAxis2Placement3D => axis2_placement_3d(graph, id),
        IfcType::IfcAxis2Placement2D => axis2_placement_2d(graph, id),
        ref other => Err(Error::unsupported(format!("placement kind {}", other))),
    }
}

/// RelativePlacement of an IfcLocalPlacement, ignoring PlacementRelTo
pub fn relative_placement(graph: &EntityGraph, local_placement: EntityId) -> Result<Matrix4<f64>> {
    let placement = entity_of(graph, local_placement, IfcType::IfcLocalPlacement)?;
    placement_matrix(graph, placement.get_ref(1))
}

/// Absolute matrix of an IfcLocalPlacement (PlacementRelTo chain composed)
pub fn local_placement_matrix(graph: &EntityGraph, local_placement: EntityId) -> Result<Matrix4<f64>> {
    let mut result = Matrix4::identity();
    let mut current = Some(local_placement);
    let mut depth = 0;
    while let Some(id) = current {
        depth += 1;
        if depth > MAX_PLACEMENT_DEPTH {
            return Err(Error::InvalidPlacement(format!(
                "placement chain from #{} does not terminate",
                local_placement
            )));
        }
        result = relative_placement(graph, id)? * result;
        current = entity_of(graph, id, IfcType::IfcLocalPlacement)?.get_ref(0);
    }
    Ok(result)
}

/// Parse IfcCartesianTransformationOperator3D (uniform scale only)
pub fn transformation_operator(graph: &EntityGraph, id: EntityId) -> Result<Matrix4<f64>> {
    let op = entity_of(graph, id, IfcType::IfcCartesianTransformationOperator3D)?;
    // Axis1, Axis2, LocalOrigin, Scale, Axis3
    let x = optional_direction(graph, op, 0, DEFAULT_X)?;
    let origin = match op.get_ref(2) {
        Some(point) => cartesian_point(graph, point)?,
        None => Point3::origin(),
    };
    let scale = op.get_float(3).unwrap_or(1.0);
    let z = optional_direction(graph, op, 4, DEFAULT_Z)?;
    let mut m = frame(origin, z, x)?;
    for col in 0..3 {
        for row in 0..3 {
            m[(row, col)] *= scale;
        }
    }
    Ok(m)
}

/// Rigid placement in IfcAxis2Placement3D terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposed {
    pub location: [f64; 3],
    pub axis: [f64; 3],
    pub ref_direction: [f64; 3],
}

impl Decomposed {
    pub fn has_default_axes(&self, eps: f64) -> bool {
        let near = |a: [f64; 3], b: Vector3<f64>| (Vector3::from(a) - b).norm() <= eps;
        near(self.axis, DEFAULT_Z) && near(self.ref_direction, DEFAULT_X)
    }
}

/// Split a rigid matrix into location, Z axis and X axis.
///
/// Fails for matrices with scale, shear or a projective row.
pub fn decompose(m: &Matrix4<f64>, eps: f64) -> Result<Decomposed> {
    if m[(3, 0)].abs() > eps || m[(3, 1)].abs() > eps || m[(3, 2)].abs() > eps || (m[(3, 3)] - 1.0).abs() > eps {
        return Err(Error::InvalidPlacement("projective component".into()));
    }
    let x: Vector3<f64> = m.fixed_view::<3, 1>(0, 0).into_owned();
    let y: Vector3<f64> = m.fixed_view::<3, 1>(0, 1).into_owned();
    let z: Vector3<f64> = m.fixed_view::<3, 1>(0, 2).into_owned();
    let orthonormal = (x.norm() - 1.0).abs() <= eps
        && (y.norm() - 1.0).abs() <= eps
        && (z.norm() - 1.0).abs() <= eps
        && x.dot(&y).abs() <= eps
        && x.dot(&z).abs() <= eps
        && y.dot(&z).abs() <= eps
        && (z.cross(&x) - y).norm() <= eps;
    if !orthonormal {
        return Err(Error::InvalidPlacement("not a rigid transform".into()));
    }
    Ok(Decomposed {
        location: [m[(0, 3)], m[(1, 3)], m[(2, 3)]],
        axis: [z.x, z.y, z.z],
        ref_direction: [x.x, x.y, x.z],
    })
}

pub fn is_identity(m: &Matrix4<f64>, eps: f64) -> bool {
    (m - Matrix4::identity()).amax() <= eps
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ifc_lite_core::parse_model;

    const PLACEMENTS: &str = r#"
#1=IFCCARTESIANPOINT((0.,0.,0.));
#2=IFCCARTESIANPOINT((10.,0.,0.));
#3=IFCDIRECTION((0.,0.,1.));
#4=IFCDIRECTION((0.,1.,0.));
#5=IFCAXIS2PLACEMENT3D(#1,$,$);
#6=IFCAXIS2PLACEMENT3D(#2,#3,#4);
#7=IFCLOCALPLACEMENT($,#5);
#8=IFCLOCALPLACEMENT(#9,#6);
#9=IFCLOCALPLACEMENT($,#6);
"#;

    #[test]
    fn rotated_placement() {
        let graph = parse_model(PLACEMENTS).unwrap();
        let m = axis2_placement_3d(&graph, 6).unwrap();
        let p = m.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 10.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn local_placement_chain_composes() {
        let graph = parse_model(PLACEMENTS).unwrap();
        assert!(is_identity(&local_placement_matrix(&graph, 7).unwrap(), 1e-12));
        let m = local_placement_matrix(&graph, 8).unwrap();
        let origin = m.transform_point(&Point3::origin());
        // (10,0,0) in a frame rotated 90° about Z and shifted by 10 along X
        assert_relative_eq!(origin.x, 10.0, epsilon = 1e-12);
        assert_relative_eq!(origin.y, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn cyclic_chains_fail() {
        let graph = parse_model(
            "#1=IFCCARTESIANPOINT((0.,0.,0.));\n#2=IFCAXIS2PLACEMENT3D(#1,$,$);\n\
             #3=IFCLOCALPLACEMENT(#4,#2);\n#4=IFCLOCALPLACEMENT(#3,#2);",
        )
        .unwrap();
        assert!(matches!(
            local_placement_matrix(&graph, 3),
            Err(Error::InvalidPlacement(_))
        ));
    }

    #[test]
    fn decompose_round_trips_rigid_frames() {
        let graph = parse_model(PLACEMENTS).unwrap();
        let m = axis2_placement_3d(&graph, 6).unwrap();
        let d = decompose(&m, 1e-9).unwrap();
        assert_relative_eq!(d.location[0], 10.0);
        assert_relative_eq!(d.ref_direction[1], 1.0, epsilon = 1e-12);
        assert!(!d.has_default_axes(1e-9));
        let identity = decompose(&Matrix4::identity(), 1e-9).unwrap();
        assert!(identity.has_default_axes(1e-9));
    }

    #[test]
    fn decompose_rejects_scaling() {
        let scaled = Matrix4::new_scaling(2.0);
        assert!(decompose(&scaled, 1e-9).is_err());
    }
}
