// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Statistics reported by an optimization run.

use ifc_lite_core::{EntityId, IfcType};
use serde::{Deserialize, Serialize};

use crate::config::Stage;

/// Removed entities grouped by what they were
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedByCategory {
    pub spaces: usize,
    pub property_sets: usize,
    pub materials: usize,
    pub classifications: usize,
    pub geometry: usize,
    pub small_elements: usize,
    pub relationships: usize,
    pub other: usize,
}

impl RemovedByCategory {
    /// Count one removed entity of `kind`
    pub fn record(&mut self, kind: &IfcType) {
        let slot = match kind {
            IfcType::IfcSpace => &mut self.spaces,
            k if k.is_property_set() || k.is_property() => &mut self.property_sets,
            k if k.is_material() => &mut self.materials,
            k if k.is_classification() => &mut self.classifications,
            k if k.is_geometry() || is_presentation(k) => &mut self.geometry,
            k if k.is_relationship() => &mut self.relationships,
            _ => &mut self.other,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.spaces
            + self.property_sets
            + self.materials
            + self.classifications
            + self.geometry
            + self.small_elements
            + self.relationships
            + self.other
    }
}

fn is_presentation(kind: &IfcType) -> bool {
    matches!(
        kind,
        IfcType::IfcStyledItem
            | IfcType::IfcPresentationStyleAssignment
            | IfcType::IfcPresentationLayerAssignment
            | IfcType::IfcSurfaceStyle
            | IfcType::IfcColourRgb
            | IfcType::IfcGeometricRepresentationContext
            | IfcType::IfcGeometricRepresentationSubContext
    )
}

/// An entity a stage left untouched, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityIssue {
    pub id: EntityId,
    pub kind: String,
    pub stage: Stage,
    pub reason: String,
}

/// A rooted definition merged into an equal one with another GlobalId
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedIdentity {
    pub global_id: String,
    pub duplicate: EntityId,
    pub survivor: EntityId,
}

/// Work done by one stage in one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStats {
    pub stage: Stage,
    pub pass: usize,
    pub entities_before: usize,
    pub entities_after: usize,
    /// Mutations applied (removals, merges, rewrites)
    pub changes: usize,
}

/// Report of a full optimization run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationStats {
    pub entities_before: usize,
    pub entities_after: usize,
    /// Estimated DATA section size before optimizing
    pub bytes_before: usize,
    pub bytes_after: usize,
    pub removed_by_category: RemovedByCategory,
    pub merged_geometry_count: usize,
    pub merged_point_count: usize,
    pub merged_property_count: usize,
    /// GlobalIds of merged property sets; the survivor keeps its own
    pub merged_global_ids: Vec<MergedIdentity>,
    /// Points and point lists whose stored coordinates were rounded
    pub rounded_point_count: usize,
    pub flattened_containers: usize,
    pub cleared_attributes: usize,
    pub unmapped_entities: Vec<EntityIssue>,
    pub skipped_entities: Vec<EntityIssue>,
    pub preexisting_issues: Vec<EntityIssue>,
    pub inline_candidates: usize,
    pub passes: usize,
    pub stages: Vec<StageStats>,
}

impl OptimizationStats {
    pub fn record_removed(&mut self, removed: &[(EntityId, IfcType)]) {
        for (_, kind) in removed {
            self.removed_by_category.record(kind);
        }
    }

    pub fn skip(&mut self, id: EntityId, kind: &IfcType, stage: Stage, reason: impl Into<String>) {
        push_unique(&mut self.skipped_entities, id, kind, stage, reason.into());
    }

    pub fn unmapped(&mut self, id: EntityId, kind: &IfcType, stage: Stage, reason: impl Into<String>) {
        push_unique(&mut self.unmapped_entities, id, kind, stage, reason.into());
    }

    pub fn preexisting(&mut self, id: EntityId, kind: &IfcType, stage: Stage, reason: impl Into<String>) {
        let reason = reason.into();
        if !self
            .preexisting_issues
            .iter()
            .any(|issue| issue.id == id && issue.reason == reason)
        {
            self.preexisting_issues.push(EntityIssue {
                id,
                kind: kind.as_str().to_string(),
                stage,
                reason,
            });
        }
    }

    /// Render as pretty JSON for front ends
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Later passes revisit the same entities; one entry per id is enough
fn push_unique(list: &mut Vec<EntityIssue>, id: EntityId, kind: &IfcType, stage: Stage, reason: String) {
    if list.iter().any(|issue| issue.id == id && issue.stage == stage) {
        return;
    }
    list.push(EntityIssue {
        id,
        kind: kind.as_str().to_string(),
        stage,
        reason,
    });
}
