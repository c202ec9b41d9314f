// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC-Lite Geometry
//!
//! The geometry capability behind the optimizer: placement matrices with
//! nalgebra, canonical shape forms for deduplication and solid volumes for
//! the small-element filter.

pub mod canonical;
pub mod error;
pub mod kernel;
pub mod placement;
pub mod volume;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point3, Vector3};

pub use canonical::{canonical_representation, quantize, CanonicalShape, Node};
pub use error::{Error, Result};
pub use kernel::{canonical_shapes, element_volumes, DefaultKernel, GeometryKernel};
pub use placement::{decompose, is_identity, local_placement_matrix, relative_placement, Decomposed};
pub use volume::{element_volume, item_volume};
