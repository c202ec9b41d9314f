// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry capability used by the optimizer stages.

use ifc_lite_core::{EntityGraph, EntityId};
use nalgebra::Matrix4;
use rayon::prelude::*;

use crate::canonical::{canonical_representation, CanonicalShape};
use crate::error::Result;
use crate::placement::{local_placement_matrix, relative_placement};
use crate::volume::element_volume;

/// Geometry kernel trait.
///
/// Implementations must be pure functions of the graph so stages can call
/// them from rayon workers.
pub trait GeometryKernel: Send + Sync {
    /// Canonical form of an IfcShapeRepresentation
    fn canonical_shape(&self, graph: &EntityGraph, representation: EntityId, precision: u32) -> Result<CanonicalShape>;

    /// Solid volume of a product in model units, `None` without solid geometry
    fn element_volume(&self, graph: &EntityGraph, element: EntityId) -> Result<Option<f64>>;

    /// Absolute transform of an IfcLocalPlacement
    fn absolute_placement(&self, graph: &EntityGraph, placement: EntityId) -> Result<Matrix4<f64>> {
        local_placement_matrix(graph, placement)
    }

    /// Transform of an IfcLocalPlacement relative to its PlacementRelTo
    fn relative_placement(&self, graph: &EntityGraph, placement: EntityId) -> Result<Matrix4<f64>> {
        relative_placement(graph, placement)
    }
}

/// Kernel backed by this crate's nalgebra routines
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultKernel;

impl GeometryKernel for DefaultKernel {
    fn canonical_shape(&self, graph: &EntityGraph, representation: EntityId, precision: u32) -> Result<CanonicalShape> {
        canonical_representation(graph, representation, precision)
    }

    fn element_volume(&self, graph: &EntityGraph, element: EntityId) -> Result<Option<f64>> {
        element_volume(graph, element)
    }
}

/// Canonical forms of many representations in parallel, in input order
pub fn canonical_shapes<K: GeometryKernel + ?Sized>(
    kernel: &K,
    graph: &EntityGraph,
    representations: &[EntityId],
    precision: u32,
) -> Vec<(EntityId, Result<CanonicalShape>)> {
    representations
        .par_iter()
        .map(|&id| (id, kernel.canonical_shape(graph, id, precision)))
        .collect()
}

/// Element volumes in parallel, in input order
pub fn element_volumes<K: GeometryKernel + ?Sized>(
    kernel: &K,
    graph: &EntityGraph,
    elements: &[EntityId],
) -> Vec<(EntityId, Result<Option<f64>>)> {
    elements
        .par_iter()
        .map(|&id| (id, kernel.element_volume(graph, id)))
        .collect()
}
