// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# Atlas Splitting

Splits coarse regions of a volumetric brain atlas into finer sub-regions and
keeps the region hierarchy in step with the relabeled voxels.

## Pieces

- [`HierarchyTree`]: id-indexed ontology arena with all-or-nothing edits
- [`IdAllocator`]: deterministic, collision-free region ids
- [`SplitRule`] / [`SplitPlan`]: declarative split descriptions
- [`RegionSplitter`]: one rule, planned then committed atomically
- [`SplitEngine`]: an ordered rule list with consistency checks between rules
- [`ConsistencyChecker`]: label, structure and lineage-conservation checks
- [`presets`]: layer 2/3 and barrel-column rule builders

## Example

```rust
use atlas_splitting::{HierarchyTree, SplitEngine, SplitRule, SplitTarget};
use atlas_structures::{AnnotationVolume, AuxiliaryInputs, RegionNode};
use ndarray::Array3;

let mut tree = HierarchyTree::new();
tree.insert(RegionNode::new(1, "root", "root").unwrap()).unwrap();
tree.insert(RegionNode::new(5, "area", "A").unwrap().with_parent(Some(1))).unwrap();

let mut volume = AnnotationVolume::new(Array3::from_elem((2, 1, 1), 5));
let depth = Array3::from_shape_vec((2, 1, 1), vec![0.2f32, 0.8]).unwrap();
let inputs = AuxiliaryInputs::new().with_scalar("depth", depth);

let rule = SplitRule::threshold(5, "depth")
    .with_target(SplitTarget::new("upper", "A-u").with_criterion_value("<0.5"))
    .with_target(SplitTarget::new("lower", "A-l").with_criterion_value(">=0.5"));

let report = SplitEngine::default()
    .run(&mut tree, &mut volume, &inputs, &[rule])
    .unwrap();
assert!(report.is_clean());
assert_eq!(tree.children_of(1).unwrap(), &[6, 7]);
```
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Whether voxel classification can run on rayon (feature `parallel`)
pub const PARALLEL_CLASSIFICATION: bool = cfg!(feature = "parallel");

pub mod allocation;
pub mod consistency;
pub mod models;
pub mod presets;
pub mod splitting;
pub mod types;

pub use allocation::IdAllocator;
pub use consistency::{
    check_pair, check_structure, subtree_totals, ConsistencyChecker, ConsistencyReport,
    ConsistencyViolation,
};
pub use models::{Adoption, HierarchyTree};
pub use splitting::{
    AbsorbedRegion, Classification, Criterion, Placement, RegionSplitter, RunReport, SplitEngine,
    SplitPlan, SplitRecord, SplitRule, SplitTarget, ThresholdInterval, VoxelClassifier,
};
pub use types::{RuleFailure, SplitError, SplitResult};
