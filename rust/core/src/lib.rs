// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-Lite Core
//!
//! In-memory IFC entity graph used by the optimizer.
//!
//! ## Overview
//!
//! - **Entity graph**: entities keyed by id with a reverse reference index
//! - **Attribute layouts**: slot names, optionality, schema defaults and
//!   reference strength for the kinds the optimizer understands
//! - **Transactions**: nested begin/commit/rollback backed by an undo journal
//! - **STEP I/O**: a [nom](https://docs.rs/nom) record reader and a line
//!   writer, used for fixtures, byte estimates and final renumbering
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ifc_lite_core::{parse_model, write_model, IfcType};
//!
//! let mut graph = parse_model("#1=IFCPROJECT('guid',$,'Demo',$,$,$,$,$,$);")?;
//! assert_eq!(graph.all_ids_of_type(&IfcType::IfcProject), vec![1]);
//!
//! graph.transaction(|g| {
//!     g.set_attribute(1, 3, "Optimized".into())?;
//!     Ok(())
//! })?;
//!
//! let text = write_model(&mut graph)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization support for entities and schema versions

pub mod attribute;
pub mod entity;
pub mod error;
pub mod graph;
pub mod layout;
pub mod parser;
pub mod schema;
mod transaction;
pub mod units;
pub mod writer;

pub use attribute::AttributeValue;
pub use entity::{Entity, EntityId, Reference};
pub use error::{Error, Result};
pub use graph::EntityGraph;
pub use layout::{AttributeDef, RefStrength};
pub use parser::{parse_entity, parse_model, parse_model_with_schema};
pub use schema::{IfcType, SchemaVersion};
pub use units::{length_unit_scale, volume_scale};
pub use writer::{encode_entity, estimate_bytes, write_model};
