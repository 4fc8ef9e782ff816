// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # atlas-splitter
//!
//! Splits coarse regions of a volumetric brain-atlas annotation into finer
//! sub-regions and keeps the region hierarchy (ontology) in step.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! atlas-splitter = "0.1"
//! ```
//!
//! ```rust
//! use atlas_splitter::prelude::*;
//! use ndarray::Array3;
//!
//! let config = AtlasSplitterConfig::default();
//! let mut tree = HierarchyTree::from_nested_json(&serde_json::json!({"msg": [{
//!     "id": 100, "acronym": "grey", "name": "Grey matter", "children": [
//!         {"id": 5, "acronym": "A", "name": "Area A", "children": []}
//!     ]
//! }]}))?;
//! let mut volume = AnnotationVolume::new(Array3::from_elem((4, 1, 1), 5));
//! let depth = Array3::from_shape_vec((4, 1, 1), vec![0.1f32, 0.2, 0.7, 0.9])?;
//! let inputs = AuxiliaryInputs::new().with_scalar("depth", depth);
//!
//! let plan = SplitPlan::new(vec![SplitRule::threshold(5, "depth")
//!     .with_target(SplitTarget::new("Area A upper", "A-u").with_criterion_value("<0.5"))
//!     .with_target(SplitTarget::new("Area A lower", "A-l").with_criterion_value(">=0.5"))]);
//!
//! let report = run_plan(&config, &mut tree, &mut volume, &inputs, &plan)?;
//! assert!(report.is_clean());
//! assert_eq!(volume.count(101), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: atlas-structures, atlas-config             │
//! │  (RegionNode, AnnotationVolume, TOML configuration)     │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Algorithms: atlas-splitting                            │
//! │  (HierarchyTree, split rules, engine, consistency)      │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Infrastructure: atlas-observability                    │
//! │  (tracing subscriber, per-crate debug flags)            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

use anyhow::{Context, Result};
use tracing::info;

pub use atlas_config as config;
pub use atlas_observability as observability;
pub use atlas_splitting as splitting;
pub use atlas_structures as structures;

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::{init_logging, run_plan};
    pub use atlas_config::{load_config, AtlasSplitterConfig, IdStrategy, UndefinedVoxelPolicy};
    pub use atlas_splitting::presets::{barrel_rule, layer_23_rules, DEFAULT_RATIO};
    pub use atlas_splitting::{
        check_pair, ConsistencyReport, HierarchyTree, IdAllocator, Placement, RunReport,
        SplitEngine, SplitPlan, SplitRule, SplitTarget,
    };
    pub use atlas_structures::{AnnotationVolume, AuxiliaryInputs, RegionId, RegionNode, VoxelCoord};
}

/// Install the global log subscriber described by `config.logging`, plus any
/// `--debug-<crate>` flags and `ATLAS_SPLITTER_DEBUG` crates
pub fn init_logging(config: &atlas_config::AtlasSplitterConfig) -> Result<()> {
    let flags = atlas_observability::parse_debug_flags();
    atlas_observability::init_logging(&config.logging, &flags)
}

/// Validate `plan` and run it with an engine built from `config`
///
/// # Errors
///
/// An invalid plan, or the first rule that failed (with its index). Rules
/// before the failing one stay applied.
pub fn run_plan(
    config: &atlas_config::AtlasSplitterConfig,
    tree: &mut atlas_splitting::HierarchyTree,
    volume: &mut atlas_structures::AnnotationVolume,
    inputs: &atlas_structures::AuxiliaryInputs,
    plan: &atlas_splitting::SplitPlan,
) -> Result<atlas_splitting::RunReport> {
    plan.validate().context("Invalid split plan")?;
    let mut engine = atlas_splitting::SplitEngine::new(config);
    let report = engine
        .run(tree, volume, inputs, plan.rules())
        .context("Split plan aborted")?;
    info!(
        target: "atlas-splitter",
        "Plan of {} rules applied, {} ids issued",
        plan.len(),
        engine.allocator().issued().count()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use ndarray::Array3;

    #[test]
    fn test_facade_imports() {
        let node = RegionNode::new(1, "root", "root").unwrap();
        let tree = HierarchyTree::with_root(node).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_parallel_feature_reaches_splitting() {
        assert_eq!(
            atlas_splitting::PARALLEL_CLASSIFICATION,
            cfg!(feature = "parallel")
        );
    }

    #[test]
    fn test_run_plan_rejects_invalid_plan() {
        let mut tree = HierarchyTree::with_root(RegionNode::new(1, "root", "root").unwrap()).unwrap();
        let mut volume = AnnotationVolume::new(Array3::from_elem((1, 1, 1), 1));
        let plan = SplitPlan::new(vec![SplitRule::threshold(1, "depth")]);

        let err = run_plan(
            &AtlasSplitterConfig::default(),
            &mut tree,
            &mut volume,
            &AuxiliaryInputs::new(),
            &plan,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Invalid split plan"));
        assert_eq!(volume.count(1), 1);
    }
}
