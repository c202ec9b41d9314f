// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during geometry processing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unsupported geometry: {0}")]
    Unsupported(String),

    #[error("Placement cannot be composed: {0}")]
    InvalidPlacement(String),

    #[error("Core graph error: {0}")]
    CoreError(#[from] ifc_lite_core::Error),
}

impl Error {
    pub fn geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Attach the failing entity, turning this into a per-entity core error
    pub fn for_entity(self, id: ifc_lite_core::EntityId) -> ifc_lite_core::Error {
        ifc_lite_core::Error::geometry(id, self.to_string())
    }
}
