// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Optimization pipeline
//!
//! Runs the enabled stages in their fixed order, each inside a graph
//! transaction followed by an integrity check. The structural stages repeat
//! until a pass changes nothing (at most `max_passes`); schema mapping runs
//! once at the end.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use ifc_lite_core::{estimate_bytes, layout, EntityGraph, EntityId, Error, Result};
use ifc_lite_geometry::{DefaultKernel, GeometryKernel};

use crate::config::{OptimizerConfig, Stage};
use crate::progress::{CancellationToken, ProgressCallback, ProgressEvent, StageContext};
use crate::stats::{OptimizationStats, StageStats};
use crate::{analysis, cleaner, dedup, flatten, mapping, volume};

type StageFn = fn(&mut EntityGraph, &mut StageContext<'_>) -> Result<usize>;

fn stage_fn(stage: Stage) -> StageFn {
    match stage {
        Stage::Unused => analysis::run,
        Stage::Dedup => dedup::run,
        Stage::Flatten => flatten::run,
        Stage::Volume => volume::run,
        Stage::Clean => cleaner::run,
        Stage::Schema => mapping::run,
    }
}

/// Integrity checks run after every stage, before its transaction commits.
///
/// Mandatory slots that were empty before the stage, or belong to entities
/// the stage reported as unmapped, are not counted.
fn check_integrity(
    graph: &EntityGraph,
    gaps_before: &BTreeSet<(EntityId, usize)>,
    unmapped: &BTreeSet<EntityId>,
) -> Result<()> {
    graph.validate()?;
    let cleared = graph
        .mandatory_gaps()
        .into_iter()
        .find(|gap| !gaps_before.contains(gap) && !unmapped.contains(&gap.0));
    if let Some((id, slot)) = cleared {
        let kind = &graph.entity(id)?.ifc_type;
        let attribute = layout::attribute_def(graph.schema(), kind, slot)
            .map_or_else(|| format!("#{}", slot), |def| def.name.to_string());
        return Err(Error::MandatoryAttributeCleared { id, attribute });
    }
    Ok(())
}

/// Configured optimizer: settings, geometry capability, progress and
/// cancellation hooks
pub struct Optimizer {
    config: OptimizerConfig,
    kernel: Box<dyn GeometryKernel>,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            kernel: Box::new(DefaultKernel),
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the built-in geometry capability
    pub fn with_kernel(mut self, kernel: impl GeometryKernel + 'static) -> Self {
        self.kernel = Box::new(kernel);
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Token that cancels runs of this optimizer; clones share the flag
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize `graph` in place.
    ///
    /// On error the stage that failed is rolled back and the error returned;
    /// stages committed before it stay applied.
    pub fn run(&self, graph: &mut EntityGraph) -> Result<OptimizationStats> {
        self.config
            .validate()
            .map_err(|e| Error::structural(e.to_string()))?;

        let start = Instant::now();
        let mut stats = OptimizationStats {
            entities_before: graph.len(),
            bytes_before: estimate_bytes(graph),
            ..OptimizationStats::default()
        };
        tracing::info!(
            entities = stats.entities_before,
            bytes = stats.bytes_before,
            schema = %graph.schema(),
            "Starting IFC optimization"
        );

        let structural: Vec<Stage> = Stage::ALL
            .into_iter()
            .filter(|&stage| stage != Stage::Schema && self.config.is_enabled(stage))
            .collect();

        let mut converged = structural.is_empty();
        for pass in 1..=self.config.max_passes {
            if structural.is_empty() {
                break;
            }
            stats.passes = pass;
            let mut changes = 0;
            for &stage in &structural {
                changes += self.run_stage(graph, stage, pass, &mut stats)?;
            }
            tracing::debug!(pass, changes, entities = graph.len(), "Pass complete");
            if changes == 0 {
                converged = true;
                break;
            }
        }
        if !converged {
            tracing::warn!(
                passes = self.config.max_passes,
                "Optimization did not reach a fixpoint within maxPasses"
            );
        }

        if self.config.is_enabled(Stage::Schema)
            && self.config.target_schema.resolve(graph.schema()) != graph.schema()
        {
            self.run_stage(graph, Stage::Schema, stats.passes.max(1), &mut stats)?;
        }

        stats.entities_after = graph.len();
        stats.bytes_after = estimate_bytes(graph);
        tracing::info!(
            entities_before = stats.entities_before,
            entities_after = stats.entities_after,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            passes = stats.passes,
            unmapped = stats.unmapped_entities.len(),
            skipped = stats.skipped_entities.len(),
            total_time_ms = start.elapsed().as_millis(),
            "IFC optimization complete"
        );
        Ok(stats)
    }

    fn run_stage(
        &self,
        graph: &mut EntityGraph,
        stage: Stage,
        pass: usize,
        stats: &mut OptimizationStats,
    ) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let start = Instant::now();
        let entities_before = graph.len();
        let gaps_before = graph.mandatory_gaps();
        let result = graph.transaction(|g| {
            let mut ctx = StageContext::new(
                &self.config,
                self.kernel.as_ref(),
                stats,
                stage,
                self.progress.as_ref(),
                &self.cancel,
            );
            let changes = stage_fn(stage)(g, &mut ctx)?;
            let unmapped: BTreeSet<EntityId> = ctx.stats.unmapped_entities.iter().map(|issue| issue.id).collect();
            check_integrity(g, &gaps_before, &unmapped)?;
            Ok(changes)
        });

        let changes = match result {
            Ok(changes) => changes,
            Err(e) => {
                tracing::warn!(stage = %stage, pass, error = %e, "Stage failed and was rolled back");
                return Err(e);
            }
        };

        stats.stages.push(StageStats {
            stage,
            pass,
            entities_before,
            entities_after: graph.len(),
            changes,
        });
        tracing::info!(
            stage = %stage,
            pass,
            changes,
            entities = graph.len(),
            time_ms = start.elapsed().as_millis(),
            "Stage complete"
        );
        Ok(changes)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

/// Optimize `graph` with the built-in geometry capability
pub fn optimize(graph: &mut EntityGraph, config: &OptimizerConfig) -> Result<OptimizationStats> {
    Optimizer::new(config.clone()).run(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifc_lite_core::parse_model;

    const MODEL: &str = r#"
#1=IFCPROJECT('p',$,'Project',$,$,$,$,$,$);
#2=IFCSITE('s',$,'Site',$,$,$,$,$,.ELEMENT.,$,$,$,$,$);
#3=IFCRELAGGREGATES('a',$,$,$,#1,(#2));
#4=IFCWALL('w',$,'Wall',$,$,$,$,$,.NOTDEFINED.);
#5=IFCRELCONTAINEDINSPATIALSTRUCTURE('c',$,$,$,(#4),#2);
#6=IFCCARTESIANPOINT((0.,0.,0.));
#7=IFCPROPERTYSET('ps',$,'Pset_Orphan',$,(#8));
#8=IFCPROPERTYSINGLEVALUE('Note',$,IFCLABEL('x'),$);
"#;

    #[test]
    fn removes_dead_entities_and_reaches_a_fixpoint() {
        let mut graph = parse_model(MODEL).unwrap();
        let stats = optimize(&mut graph, &OptimizerConfig::default()).unwrap();

        for id in [6, 7, 8] {
            assert!(!graph.contains(id));
        }
        // Wall PredefinedType equals the schema default
        assert!(graph.get(4).unwrap().get(8).unwrap().is_null());
        assert_eq!(stats.entities_before, 8);
        assert_eq!(stats.entities_after, 5);
        assert!(stats.bytes_after < stats.bytes_before);
        assert_eq!(stats.passes, 2);
        assert!(stats.stages.iter().all(|s| s.pass <= 2));
        assert!(stats.stages.iter().filter(|s| s.pass == 2).all(|s| s.changes == 0));
    }

    #[test]
    fn disabled_stages_do_not_run() {
        let mut graph = parse_model(MODEL).unwrap();
        let config = OptimizerConfig {
            stages_enabled: [Stage::Clean].into_iter().collect(),
            ..OptimizerConfig::default()
        };
        let stats = optimize(&mut graph, &config).unwrap();
        assert!(stats.stages.iter().all(|s| s.stage == Stage::Clean));
        assert!(graph.contains(6));
    }

    #[test]
    fn no_stages_means_no_passes() {
        let mut graph = parse_model(MODEL).unwrap();
        let config = OptimizerConfig {
            stages_enabled: BTreeSet::new(),
            ..OptimizerConfig::default()
        };
        let stats = optimize(&mut graph, &config).unwrap();
        assert_eq!(stats.passes, 0);
        assert_eq!(stats.entities_after, stats.entities_before);
    }

    #[test]
    fn cancelled_before_start() {
        let mut graph = parse_model(MODEL).unwrap();
        let optimizer = Optimizer::default();
        optimizer.cancellation_token().cancel();
        assert!(matches!(optimizer.run(&mut graph), Err(Error::Cancelled)));
        assert_eq!(graph.len(), 8);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut graph = parse_model(MODEL).unwrap();
        let config = OptimizerConfig {
            max_passes: 0,
            ..OptimizerConfig::default()
        };
        assert!(matches!(
            optimize(&mut graph, &config),
            Err(Error::StructuralInvariantViolation(_))
        ));
    }

    #[test]
    fn cleared_mandatory_slots_fail_the_check() {
        let mut graph = parse_model(MODEL).unwrap();
        let before = graph.mandatory_gaps();
        graph.set_attribute(7, 4, ifc_lite_core::AttributeValue::List(Vec::new())).unwrap();
        let err = check_integrity(&graph, &before, &BTreeSet::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::MandatoryAttributeCleared { id: 7, ref attribute } if attribute == "HasProperties"
        ));
        assert!(check_integrity(&graph, &before, &[7].into_iter().collect()).is_ok());
    }
}
