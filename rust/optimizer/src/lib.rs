// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-Lite Optimizer
//!
//! Size optimization for IFC entity graphs.
//!
//! ## Overview
//!
//! Stages run in a fixed order, each inside a graph transaction followed by
//! an integrity check:
//!
//! 1. **Unused**: remove everything unreachable from the projects and pinned roots
//! 2. **Dedup**: round coordinates when configured, merge coincident points and
//!    equivalent shape representations
//! 3. **Flatten**: collapse anonymous spatial levels and drop empty spaces
//! 4. **Volume**: remove elements below the volume threshold
//! 5. **Clean**: clear default values, drop placeholder and unused definitions
//! 6. **Schema**: convert between IFC2X3, IFC4 and IFC4X3 (optional)
//!
//! Stages 1 to 5 repeat until a pass changes nothing.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ifc_lite_core::{parse_model, write_model};
//! use ifc_lite_optimizer::{Optimizer, OptimizerConfig};
//!
//! let mut graph = parse_model(&content)?;
//! let optimizer = Optimizer::new(OptimizerConfig::from_env())
//!     .on_progress(|event| println!("{} {}/{}", event.stage, event.processed, event.total));
//! let stats = optimizer.run(&mut graph)?;
//! println!("{}", stats.to_json()?);
//! let text = write_model(&mut graph)?;
//! ```

pub mod analysis;
pub mod cleaner;
pub mod config;
pub mod dedup;
pub mod flatten;
pub mod mapping;
pub mod pipeline;
pub mod progress;
pub mod rewire;
pub mod stats;
pub mod volume;

pub use analysis::{analyze, liveness, ReachabilityReport};
pub use config::{ConfigError, OptimizerConfig, Stage, TargetSchema, UnmappedPolicy};
pub use pipeline::{optimize, Optimizer};
pub use progress::{CancellationToken, ProgressCallback, ProgressEvent, StageContext};
pub use stats::{EntityIssue, MergedIdentity, OptimizationStats, RemovedByCategory, StageStats};
