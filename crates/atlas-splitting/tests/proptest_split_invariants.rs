// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Property-based invariant tests for region splitting.
//!
//! These tests verify invariants that must hold for any small atlas and any
//! threshold:
//!
//! 1. The split partitions the source voxels: every one lands in exactly one target.
//! 2. Each voxel lands in the target its scalar value selects.
//! 3. Voxels outside the source region keep their labels.
//! 4. The hierarchy stays a valid forest with unique ids.
//! 5. Chained splits conserve every lineage's voxel count.
//! 6. Hemisphere splits put exactly the voxels below the midline in target 0.
//! 7. Sequential and parallel classification produce identical atlases.

use atlas_config::SplittingConfig;
use atlas_splitting::{
    check_pair, check_structure, HierarchyTree, IdAllocator, Placement, SplitEngine, SplitRule,
    SplitTarget,
};
use atlas_structures::{AnnotationVolume, AuxiliaryInputs, RegionNode, RegionId};
use ndarray::Array3;
use proptest::prelude::*;

const ROOT: RegionId = 1;
const SOURCE: RegionId = 5;
const BYSTANDER: RegionId = 7;

// ── Helpers ─────────────────────────────────────────────────────────────

/// Small atlas: labels drawn from {background, SOURCE, BYSTANDER} with a
/// scalar value in [0, 1) per voxel
#[derive(Debug, Clone)]
struct Atlas {
    shape: (usize, usize, usize),
    labels: Vec<RegionId>,
    values: Vec<f32>,
}

impl Atlas {
    fn tree(&self) -> HierarchyTree {
        let mut tree = HierarchyTree::new();
        tree.insert(RegionNode::new(ROOT, "root", "root").unwrap())
            .unwrap();
        for (id, acronym) in [(SOURCE, "SRC"), (BYSTANDER, "BYS")] {
            tree.insert(
                RegionNode::new(id, acronym, acronym)
                    .unwrap()
                    .with_parent(Some(ROOT)),
            )
            .unwrap();
        }
        tree
    }

    fn volume(&self) -> AnnotationVolume {
        AnnotationVolume::new(Array3::from_shape_vec(self.shape, self.labels.clone()).unwrap())
    }

    fn inputs(&self) -> AuxiliaryInputs {
        let depth = Array3::from_shape_vec(self.shape, self.values.clone()).unwrap();
        AuxiliaryInputs::new().with_scalar("depth", depth)
    }
}

fn atlas_strategy() -> impl Strategy<Value = Atlas> {
    (1usize..=6, 1usize..=6, 1usize..=4).prop_flat_map(|(x, y, z)| {
        let len = x * y * z;
        (
            prop::collection::vec(prop_oneof![Just(0), Just(SOURCE), Just(BYSTANDER)], len),
            prop::collection::vec(0.0f32..1.0, len),
        )
            .prop_map(move |(labels, values)| Atlas {
                shape: (x, y, z),
                labels,
                values,
            })
    })
}

fn threshold_strategy() -> impl Strategy<Value = f64> {
    (0u32..=20).prop_map(|step| f64::from(step) / 20.0)
}

fn placement_strategy() -> impl Strategy<Value = Placement> {
    prop_oneof![Just(Placement::ReplaceSource), Just(Placement::NestUnderSource)]
}

fn threshold_rule(source: RegionId, threshold: f64, tag: &str) -> SplitRule {
    SplitRule::threshold(source, "depth")
        .with_target(
            SplitTarget::new(format!("{} shallow", tag), format!("{}-s", tag))
                .with_criterion_value(format!("<{}", threshold)),
        )
        .with_target(
            SplitTarget::new(format!("{} deep", tag), format!("{}-d", tag))
                .with_criterion_value(format!(">={}", threshold)),
        )
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Partition, classification and untouched bystanders
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn split_partitions_source_voxels(
        atlas in atlas_strategy(),
        threshold in threshold_strategy(),
        placement in placement_strategy(),
    ) {
        let mut tree = atlas.tree();
        let mut volume = atlas.volume();
        let before = volume.clone();
        let rule = threshold_rule(SOURCE, threshold, "SRC").with_placement(placement);

        let report = SplitEngine::default()
            .run(&mut tree, &mut volume, &atlas.inputs(), &[rule])
            .unwrap();
        let record = &report.records[0];
        let (shallow, deep) = (record.new_ids[0], record.new_ids[1]);

        prop_assert_eq!(
            record.relabeled_voxels(),
            before.count(SOURCE),
            "relabeled voxels must equal the source voxel count"
        );
        prop_assert_eq!(volume.count(SOURCE), 0, "source voxels remain after split");
        prop_assert_eq!(volume.count(BYSTANDER), before.count(BYSTANDER));
        prop_assert_eq!(volume.count(0), before.count(0));

        for ((label, old), value) in volume
            .labels()
            .iter()
            .zip(before.labels().iter())
            .zip(atlas.values.iter())
        {
            if *old == SOURCE {
                let expected = if f64::from(*value) < threshold { shallow } else { deep };
                prop_assert_eq!(*label, expected, "value {} vs threshold {}", value, threshold);
            } else {
                prop_assert_eq!(*label, *old, "voxel outside the source was relabeled");
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Hierarchy stays a valid forest
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn hierarchy_stays_valid(
        atlas in atlas_strategy(),
        threshold in threshold_strategy(),
        placement in placement_strategy(),
    ) {
        let mut tree = atlas.tree();
        let mut volume = atlas.volume();
        let rule = threshold_rule(SOURCE, threshold, "SRC").with_placement(placement);

        let report = SplitEngine::default()
            .run(&mut tree, &mut volume, &atlas.inputs(), &[rule])
            .unwrap();
        let record = &report.records[0];

        let structure = check_structure(&tree);
        prop_assert!(structure.is_clean(), "structure violations: {}", structure);
        prop_assert_eq!(tree.contains(SOURCE), placement == Placement::NestUnderSource);
        prop_assert!(record.new_ids.iter().all(|id| *id != SOURCE && *id != BYSTANDER));
        prop_assert_ne!(record.new_ids[0], record.new_ids[1]);

        let expected_parent = match placement {
            Placement::ReplaceSource => ROOT,
            Placement::NestUnderSource => SOURCE,
        };
        for id in &record.new_ids {
            prop_assert_eq!(tree.parent_of(*id), Some(expected_parent));
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Chained splits conserve lineage counts
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn chained_splits_conserve_lineage(
        atlas in atlas_strategy(),
        first in threshold_strategy(),
        second in threshold_strategy(),
        placement in placement_strategy(),
    ) {
        let mut tree = atlas.tree();
        let mut volume = atlas.volume();
        let source_voxels = volume.count(SOURCE);
        let inputs = atlas.inputs();
        let mut engine = SplitEngine::default();

        let first_report = engine
            .run(&mut tree, &mut volume, &inputs, &[
                threshold_rule(SOURCE, first, "SRC").with_placement(placement),
            ])
            .unwrap();
        let deep = first_report.records[0].new_ids[1];
        let second_report = engine
            .run(&mut tree, &mut volume, &inputs, &[threshold_rule(deep, second, "DEEP")])
            .unwrap();

        prop_assert!(first_report.is_clean(), "{}", first_report.report);
        prop_assert!(second_report.is_clean(), "{}", second_report.report);
        prop_assert!(check_pair(&tree, &volume).is_clean());

        let shallow = first_report.records[0].new_ids[0];
        let descendants: usize = second_report.records[0]
            .new_ids
            .iter()
            .chain(std::iter::once(&shallow))
            .map(|id| volume.count(*id))
            .sum();
        prop_assert_eq!(descendants, source_voxels, "lineage lost voxels");
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Hemisphere split follows the midline
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn hemisphere_follows_midline(atlas in atlas_strategy(), axis in 0usize..3) {
        let mut tree = atlas.tree();
        let mut volume = atlas.volume();
        let before = volume.clone();
        let rule = SplitRule::hemisphere(SOURCE, axis, None)
            .with_target(SplitTarget::new("left", "SRC-l"))
            .with_target(SplitTarget::new("right", "SRC-r"));

        let report = SplitEngine::default()
            .run(&mut tree, &mut volume, &AuxiliaryInputs::new(), &[rule])
            .unwrap();
        let left = report.records[0].new_ids[0];

        let extent = before.shape()[axis] as f64;
        let expected_left = before
            .voxels_with(SOURCE)
            .filter(|coord| {
                let position = coord.axis(axis).unwrap() as f64;
                position + 0.5 < extent / 2.0
            })
            .count();
        prop_assert_eq!(volume.count(left), expected_left);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. Parallel and sequential classification agree
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn parallel_matches_sequential(atlas in atlas_strategy(), threshold in threshold_strategy()) {
        let run = |parallel: bool| {
            let mut tree = atlas.tree();
            let mut volume = atlas.volume();
            let config = SplittingConfig {
                parallel,
                min_parallel_voxels: 1,
                ..Default::default()
            };
            SplitEngine::with_parts(config, IdAllocator::sequential())
                .run(&mut tree, &mut volume, &atlas.inputs(), &[threshold_rule(SOURCE, threshold, "SRC")])
                .unwrap();
            (tree, volume)
        };

        let (sequential_tree, sequential_volume) = run(false);
        let (parallel_tree, parallel_volume) = run(true);
        prop_assert_eq!(sequential_tree, parallel_tree);
        prop_assert_eq!(sequential_volume, parallel_volume);
    }
}
