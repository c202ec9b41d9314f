// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Progress reporting, cooperative cancellation and the per-stage context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ifc_lite_core::{Error, Result};
use ifc_lite_geometry::GeometryKernel;
use serde::Serialize;

use crate::config::{OptimizerConfig, Stage};
use crate::stats::OptimizationStats;

/// Progress of one stage, delivered at batch granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub processed: usize,
    pub total: usize,
}

/// Progress callback shared with the caller
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Cooperative cancellation flag; clones share the flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything a stage needs besides the graph
pub struct StageContext<'a> {
    pub config: &'a OptimizerConfig,
    pub kernel: &'a dyn GeometryKernel,
    pub stats: &'a mut OptimizationStats,
    pub stage: Stage,
    progress: Option<&'a ProgressCallback>,
    cancel: &'a CancellationToken,
}

impl<'a> StageContext<'a> {
    pub fn new(
        config: &'a OptimizerConfig,
        kernel: &'a dyn GeometryKernel,
        stats: &'a mut OptimizationStats,
        stage: Stage,
        progress: Option<&'a ProgressCallback>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            config,
            kernel,
            stats,
            stage,
            progress,
            cancel,
        }
    }

    pub fn report(&self, processed: usize, total: usize) {
        if let Some(callback) = self.progress {
            callback(ProgressEvent {
                stage: self.stage,
                processed,
                total,
            });
        }
    }

    /// Fails with `Cancelled` once the token has been triggered
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifc_lite_geometry::DefaultKernel;
    use std::sync::Mutex;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn context_reports_and_checks() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: ProgressCallback = Arc::new(move |event| {
            if let Ok(mut events) = sink.lock() {
                events.push(event);
            }
        });
        let config = OptimizerConfig::default();
        let mut stats = OptimizationStats::default();
        let token = CancellationToken::new();
        let ctx = StageContext::new(&config, &DefaultKernel, &mut stats, Stage::Dedup, Some(&callback), &token);

        ctx.report(256, 1000);
        assert!(ctx.checkpoint().is_ok());
        token.cancel();
        assert!(matches!(ctx.checkpoint(), Err(Error::Cancelled)));

        let events = events.lock().unwrap();
        assert_eq!(
            events.as_slice(),
            &[ProgressEvent {
                stage: Stage::Dedup,
                processed: 256,
                total: 1000
            }]
        );
    }
}
