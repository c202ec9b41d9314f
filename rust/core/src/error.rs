// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for entity graph operations.

use crate::entity::EntityId;
use thiserror::Error;

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, mutating or transforming an entity graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Removing or rewriting an entity would leave live references pointing at nothing.
    #[error("entity #{target} is still referenced by {referrers:?}")]
    DanglingReference {
        target: EntityId,
        referrers: Vec<EntityId>,
    },

    /// The input graph breaks a structural rule (e.g. a spatial containment cycle).
    #[error("structural invariant violated: {0}")]
    StructuralInvariantViolation(String),

    /// An entity kind has no counterpart in the target schema.
    #[error("entity #{id} ({kind}) cannot be mapped to {target}")]
    UnmappableEntity {
        id: EntityId,
        kind: String,
        target: String,
    },

    /// The geometry capability failed on one entity.
    #[error("geometry processing failed for #{id}: {reason}")]
    GeometryProcessing { id: EntityId, reason: String },

    /// A mandatory attribute slot became null during a stage.
    #[error("mandatory attribute {attribute} of #{id} was cleared")]
    MandatoryAttributeCleared { id: EntityId, attribute: String },

    #[error("entity #{0} not found")]
    EntityNotFound(EntityId),

    #[error("entity #{0} already exists")]
    DuplicateEntity(EntityId),

    #[error("invalid attribute slot {slot} on #{id}")]
    InvalidAttribute { id: EntityId, slot: usize },

    #[error("parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    /// Cooperative cancellation was requested.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::StructuralInvariantViolation(message.into())
    }

    pub fn geometry(id: EntityId, reason: impl Into<String>) -> Self {
        Self::GeometryProcessing {
            id,
            reason: reason.into(),
        }
    }

    /// Errors that are recovered per entity instead of aborting a stage.
    pub fn is_per_entity(&self) -> bool {
        matches!(
            self,
            Self::UnmappableEntity { .. } | Self::GeometryProcessing { .. }
        )
    }
}
