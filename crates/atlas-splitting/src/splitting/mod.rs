// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Split rules and their application.

- [`rule`]: declarative [`SplitRule`]s and [`SplitPlan`]s
- [`criterion`]: per-voxel classification
- [`splitter`]: one rule against a volume/hierarchy pair
- [`engine`]: an ordered rule list with consistency checks
*/

pub mod criterion;
pub mod engine;
pub mod rule;
pub mod splitter;

pub use criterion::{resolve_classifier, Classification, ThresholdInterval, VoxelClassifier};
pub use engine::{RunReport, SplitEngine};
pub use rule::{Criterion, Placement, SplitPlan, SplitRule, SplitTarget};
pub use splitter::{AbsorbedRegion, RegionSplitter, SplitRecord};
