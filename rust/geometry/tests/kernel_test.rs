// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Batch kernel calls over a small model.

use approx::assert_relative_eq;
use ifc_lite_core::{parse_model, EntityGraph, EntityId};
use ifc_lite_geometry::{
    canonical_shapes, element_volumes, CanonicalShape, DefaultKernel, GeometryKernel, Matrix4, Result,
};

const MODEL: &str = r#"
#1=IFCCARTESIANPOINT((0.,0.,0.));
#2=IFCAXIS2PLACEMENT3D(#1,$,$);
#3=IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.E-05,#2,$);
#4=IFCDIRECTION((0.,0.,1.));
#10=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,2.,3.);
#11=IFCEXTRUDEDAREASOLID(#10,#2,#4,4.);
#12=IFCSHAPEREPRESENTATION(#3,'Body','SweptSolid',(#11));
#13=IFCPRODUCTDEFINITIONSHAPE($,$,(#12));
#14=IFCWALL('a',$,$,$,$,#40,#13,$,$);
#20=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,2.,3.);
#21=IFCEXTRUDEDAREASOLID(#20,#2,#4,4.);
#22=IFCSHAPEREPRESENTATION(#3,'Body','SweptSolid',(#21));
#23=IFCPRODUCTDEFINITIONSHAPE($,$,(#22));
#24=IFCWALL('b',$,$,$,$,$,#23,$,$);
#30=IFCEXTRUDEDAREASOLID(#10,#2,#4,1.);
#31=IFCSHAPEREPRESENTATION(#3,'Body','SweptSolid',(#30));
#32=IFCPRODUCTDEFINITIONSHAPE($,$,(#31));
#33=IFCWALL('c',$,$,$,$,$,#32,$,$);
#34=IFCWALL('d',$,$,$,$,$,$,$,$);
#40=IFCLOCALPLACEMENT(#41,#42);
#41=IFCLOCALPLACEMENT($,#43);
#42=IFCAXIS2PLACEMENT3D(#44,$,$);
#43=IFCAXIS2PLACEMENT3D(#45,$,$);
#44=IFCCARTESIANPOINT((1.,2.,0.));
#45=IFCCARTESIANPOINT((0.,0.,3.));
"#;

fn model() -> EntityGraph {
    parse_model(MODEL).unwrap()
}

#[test]
fn equal_representations_share_a_fingerprint() {
    let graph = model();
    let shapes = canonical_shapes(&DefaultKernel, &graph, &[31, 12, 22], 6);

    let ids: Vec<EntityId> = shapes.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![31, 12, 22], "results keep the input order");

    let shapes: Vec<CanonicalShape> = shapes.into_iter().map(|(_, r)| r.unwrap()).collect();
    assert!(shapes[1].same_as(&shapes[2]));
    assert_eq!(shapes[1].fingerprint, shapes[2].fingerprint);
    assert!(!shapes[0].same_as(&shapes[1]));
}

#[test]
fn volumes_of_swept_solids() {
    let graph = model();
    let volumes = element_volumes(&DefaultKernel, &graph, &[14, 33, 34]);

    assert_relative_eq!(volumes[0].1.as_ref().unwrap().unwrap(), 24.0, epsilon = 1e-9);
    assert_relative_eq!(volumes[1].1.as_ref().unwrap().unwrap(), 6.0, epsilon = 1e-9);
    assert_eq!(volumes[2].0, 34);
    assert!(matches!(volumes[2].1, Ok(None)));
}

#[test]
fn nested_placements_compose() {
    let graph = model();
    let absolute = DefaultKernel.absolute_placement(&graph, 40).unwrap();
    assert_relative_eq!(absolute[(0, 3)], 1.0, epsilon = 1e-12);
    assert_relative_eq!(absolute[(1, 3)], 2.0, epsilon = 1e-12);
    assert_relative_eq!(absolute[(2, 3)], 3.0, epsilon = 1e-12);

    let relative = DefaultKernel.relative_placement(&graph, 40).unwrap();
    assert_relative_eq!(relative[(2, 3)], 0.0, epsilon = 1e-12);
}

/// Kernel that knows no solids; placements fall back to the provided defaults
struct NoSolids;

impl GeometryKernel for NoSolids {
    fn canonical_shape(&self, graph: &EntityGraph, representation: EntityId, precision: u32) -> Result<CanonicalShape> {
        DefaultKernel.canonical_shape(graph, representation, precision)
    }

    fn element_volume(&self, _graph: &EntityGraph, _element: EntityId) -> Result<Option<f64>> {
        Ok(None)
    }
}

#[test]
fn kernels_are_usable_as_trait_objects() {
    let graph = model();
    let kernel: &dyn GeometryKernel = &NoSolids;

    let volumes = element_volumes(kernel, &graph, &[14]);
    assert!(matches!(volumes[0].1, Ok(None)));

    let placement: Matrix4<f64> = kernel.absolute_placement(&graph, 41).unwrap();
    assert_relative_eq!(placement[(2, 3)], 3.0, epsilon = 1e-12);
}
