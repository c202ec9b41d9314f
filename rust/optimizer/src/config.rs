// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Optimizer configuration.
//!
//! Plain data with serde support for front ends, plus `IFC_OPT_*`
//! environment overrides.

use std::collections::BTreeSet;
use std::fmt;

use ifc_lite_core::SchemaVersion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Unused,
    Dedup,
    Flatten,
    Volume,
    Clean,
    Schema,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Unused,
        Stage::Dedup,
        Stage::Flatten,
        Stage::Volume,
        Stage::Clean,
        Stage::Schema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Unused => "unused",
            Stage::Dedup => "dedup",
            Stage::Flatten => "flatten",
            Stage::Volume => "volume",
            Stage::Clean => "clean",
            Stage::Schema => "schema",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema the optimized graph should be expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetSchema {
    /// Keep the input schema
    #[default]
    #[serde(rename = "same")]
    Same,
    #[serde(rename = "IFC2X3")]
    Ifc2x3,
    #[serde(rename = "IFC4")]
    Ifc4,
    #[serde(rename = "IFC4X3", alias = "IFC4.3")]
    Ifc4x3,
}

impl TargetSchema {
    /// Concrete schema for a graph currently in `current`
    pub fn resolve(&self, current: SchemaVersion) -> SchemaVersion {
        match self {
            TargetSchema::Same => current,
            TargetSchema::Ifc2x3 => SchemaVersion::Ifc2x3,
            TargetSchema::Ifc4 => SchemaVersion::Ifc4,
            TargetSchema::Ifc4x3 => SchemaVersion::Ifc4x3,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        if name.trim().eq_ignore_ascii_case("same") {
            return Some(TargetSchema::Same);
        }
        SchemaVersion::from_name(name).map(|schema| match schema {
            SchemaVersion::Ifc2x3 => TargetSchema::Ifc2x3,
            SchemaVersion::Ifc4 => TargetSchema::Ifc4,
            SchemaVersion::Ifc4x3 => TargetSchema::Ifc4x3,
        })
    }
}

/// What the schema mapper does with kinds that have no counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedPolicy {
    /// Remove the entity when integrity allows it
    Drop,
    /// Use the mapping rule's declared fallback kind
    Fallback,
    /// Leave the entity as it is
    #[default]
    Keep,
}

impl UnmappedPolicy {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "drop" => Some(UnmappedPolicy::Drop),
            "fallback" => Some(UnmappedPolicy::Fallback),
            "keep" => Some(UnmappedPolicy::Keep),
            _ => None,
        }
    }
}

/// Rejected configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizerConfig {
    /// Elements below this volume (m³) are removed.
    pub volume_threshold: f64,
    /// Numeric tolerance for near-duplicate geometry (model units).
    pub geometry_tolerance: f64,
    /// Decimal places kept when canonicalizing coordinates.
    pub coordinate_precision: u32,
    /// Merge representations that are equal within `geometry_tolerance`.
    pub enable_near_duplicate_merge: bool,
    /// Round stored point coordinates to this many decimals. Lossy, off
    /// unless set.
    pub lossy_rounding_precision: Option<u32>,
    pub target_schema: TargetSchema,
    pub unmapped_policy: UnmappedPolicy,
    pub stages_enabled: BTreeSet<Stage>,
    /// Nominal value marking a property as a placeholder.
    pub placeholder_value: String,
    /// Entities per progress/cancellation batch.
    pub batch_size: usize,
    /// Upper bound on pipeline passes run to reach a fixpoint.
    pub max_passes: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            volume_threshold: 0.001,
            geometry_tolerance: 0.001,
            coordinate_precision: 6,
            enable_near_duplicate_merge: false,
            lossy_rounding_precision: None,
            target_schema: TargetSchema::Same,
            unmapped_policy: UnmappedPolicy::Keep,
            stages_enabled: Stage::ALL.into_iter().collect(),
            placeholder_value: "-".into(),
            batch_size: 256,
            max_passes: 4,
        }
    }
}

impl OptimizerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `IFC_OPT_*` variables; unparsable values keep the current setting.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(value: Option<String>, current: T) -> T {
            value.and_then(|v| v.trim().parse().ok()).unwrap_or(current)
        }

        self.volume_threshold = parsed(var("IFC_OPT_VOLUME_THRESHOLD"), self.volume_threshold);
        self.geometry_tolerance = parsed(var("IFC_OPT_GEOMETRY_TOLERANCE"), self.geometry_tolerance);
        self.coordinate_precision = parsed(var("IFC_OPT_COORDINATE_PRECISION"), self.coordinate_precision);
        self.enable_near_duplicate_merge = parsed(
            var("IFC_OPT_NEAR_DUPLICATE_MERGE"),
            self.enable_near_duplicate_merge,
        );
        if let Some(rounding) = var("IFC_OPT_LOSSY_ROUNDING") {
            match rounding.trim() {
                "" | "off" => self.lossy_rounding_precision = None,
                digits => {
                    if let Ok(precision) = digits.parse() {
                        self.lossy_rounding_precision = Some(precision);
                    }
                }
            }
        }
        self.batch_size = parsed(var("IFC_OPT_BATCH_SIZE"), self.batch_size);
        self.max_passes = parsed(var("IFC_OPT_MAX_PASSES"), self.max_passes);
        if let Some(placeholder) = var("IFC_OPT_PLACEHOLDER") {
            self.placeholder_value = placeholder;
        }
        if let Some(target) = var("IFC_OPT_TARGET_SCHEMA").and_then(|v| TargetSchema::from_name(&v)) {
            self.target_schema = target;
        }
        if let Some(policy) = var("IFC_OPT_UNMAPPED_POLICY").and_then(|v| UnmappedPolicy::from_name(&v)) {
            self.unmapped_policy = policy;
        }
        if let Some(stages) = var("IFC_OPT_STAGES") {
            let parsed: Option<BTreeSet<Stage>> = stages
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(Stage::from_name)
                .collect();
            if let Some(stages) = parsed {
                self.stages_enabled = stages;
            }
        }
        self
    }

    /// Parse a camelCase JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.volume_threshold.is_finite() && self.volume_threshold >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "volumeThreshold must be a non-negative number, got {}",
                self.volume_threshold
            )));
        }
        if !(self.geometry_tolerance.is_finite() && self.geometry_tolerance >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "geometryTolerance must be a non-negative number, got {}",
                self.geometry_tolerance
            )));
        }
        if self.coordinate_precision > 12 {
            return Err(ConfigError::Invalid(format!(
                "coordinatePrecision must be at most 12, got {}",
                self.coordinate_precision
            )));
        }
        if let Some(precision) = self.lossy_rounding_precision.filter(|&p| p > 12) {
            return Err(ConfigError::Invalid(format!(
                "lossyRoundingPrecision must be at most 12, got {}",
                precision
            )));
        }
        if self.batch_size == 0 || self.max_passes == 0 {
            return Err(ConfigError::Invalid("batchSize and maxPasses must be positive".into()));
        }
        Ok(())
    }

    pub fn is_enabled(&self, stage: Stage) -> bool {
        self.stages_enabled.contains(&stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[test]
    fn defaults() {
        let config = OptimizerConfig::default();
        assert_eq!(config.volume_threshold, 0.001);
        assert_eq!(config.coordinate_precision, 6);
        assert!(!config.enable_near_duplicate_merge);
        assert_eq!(config.lossy_rounding_precision, None);
        assert_eq!(config.unmapped_policy, UnmappedPolicy::Keep);
        assert_eq!(config.stages_enabled.len(), 6);
        assert_eq!(config.max_passes, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_uses_camel_case_and_defaults() {
        let config = OptimizerConfig::from_json(
            r#"{"volumeThreshold": 1.0, "targetSchema": "IFC2X3", "unmappedPolicy": "fallback", "stagesEnabled": ["unused", "schema"]}"#,
        )
        .unwrap();
        assert_eq!(config.volume_threshold, 1.0);
        assert_eq!(config.target_schema, TargetSchema::Ifc2x3);
        assert_eq!(config.unmapped_policy, UnmappedPolicy::Fallback);
        assert!(config.is_enabled(Stage::Schema));
        assert!(!config.is_enabled(Stage::Dedup));
        assert_eq!(config.placeholder_value, "-");

        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains("\"geometryTolerance\""));
        assert!(text.contains("\"stagesEnabled\":[\"unused\",\"schema\"]"));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            OptimizerConfig::from_json(r#"{"volumeThreshold": -1.0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            OptimizerConfig::from_json(r#"{"batchSize": "many"}"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            OptimizerConfig::from_json(r#"{"lossyRoundingPrecision": 13}"#),
            Err(ConfigError::Invalid(_))
        ));
        let config = OptimizerConfig::from_json(r#"{"lossyRoundingPrecision": 3}"#).unwrap();
        assert_eq!(config.lossy_rounding_precision, Some(3));
    }

    #[test]
    fn environment_overrides() {
        let vars: FxHashMap<&str, &str> = [
            ("IFC_OPT_VOLUME_THRESHOLD", "0.5"),
            ("IFC_OPT_TARGET_SCHEMA", "ifc4x3_add2"),
            ("IFC_OPT_UNMAPPED_POLICY", "DROP"),
            ("IFC_OPT_STAGES", "dedup, clean"),
            ("IFC_OPT_MAX_PASSES", "not a number"),
            ("IFC_OPT_LOSSY_ROUNDING", "4"),
        ]
        .into_iter()
        .collect();
        let config = OptimizerConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.volume_threshold, 0.5);
        assert_eq!(config.target_schema, TargetSchema::Ifc4x3);
        assert_eq!(config.unmapped_policy, UnmappedPolicy::Drop);
        assert_eq!(
            config.stages_enabled.iter().copied().collect::<Vec<_>>(),
            vec![Stage::Dedup, Stage::Clean]
        );
        assert_eq!(config.max_passes, 4);
        assert_eq!(config.lossy_rounding_precision, Some(4));

        let off = config.with_overrides(|key| (key == "IFC_OPT_LOSSY_ROUNDING").then(|| "off".to_string()));
        assert_eq!(off.lossy_rounding_precision, None);
    }
}
