// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
SplitEngine - runs an ordered list of split rules.

Rules are applied strictly in order because later rules may target regions
created by earlier ones. Within a rule the commit is atomic (see
[`RegionSplitter`]); across rules there is no rollback: after a
[`RuleFailure`] the caller should discard the partially edited pair.
*/

use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

use super::rule::SplitRule;
use super::splitter::{RegionSplitter, SplitRecord};
use crate::allocation::IdAllocator;
use crate::consistency::{ConsistencyChecker, ConsistencyReport};
use crate::models::HierarchyTree;
use crate::types::RuleFailure;
use atlas_config::{AtlasSplitterConfig, SplittingConfig};
use atlas_structures::{AnnotationVolume, AuxiliaryInputs};

/// Outcome of a successful run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// One record per applied rule, in order
    pub records: Vec<SplitRecord>,
    /// Non-empty intermediate reports, keyed by rule index
    pub rule_reports: Vec<(usize, ConsistencyReport)>,
    /// Check of the final volume/hierarchy pair
    pub report: ConsistencyReport,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.report.is_clean() && self.rule_reports.is_empty()
    }
}

/// Split engine orchestrator
///
/// Owns the id allocator, so ids stay unique across every rule of every run
/// made with the same engine.
#[derive(Debug, Clone, Default)]
pub struct SplitEngine {
    splitter: RegionSplitter,
    allocator: IdAllocator,
}

impl SplitEngine {
    pub fn new(config: &AtlasSplitterConfig) -> Self {
        Self::with_parts(
            config.splitting.clone(),
            IdAllocator::from(&config.ids),
        )
    }

    pub fn with_parts(splitting: SplittingConfig, allocator: IdAllocator) -> Self {
        Self {
            splitter: RegionSplitter::new(splitting),
            allocator,
        }
    }

    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    pub fn splitter(&self) -> &RegionSplitter {
        &self.splitter
    }

    /// Apply `rules` in order, then check the result.
    ///
    /// # Errors
    ///
    /// The first structural failure, tagged with the index of its rule. The
    /// failing rule itself left `tree` and `volume` untouched; earlier rules
    /// stay applied.
    pub fn run(
        &mut self,
        tree: &mut HierarchyTree,
        volume: &mut AnnotationVolume,
        inputs: &AuxiliaryInputs,
        rules: &[SplitRule],
    ) -> Result<RunReport, RuleFailure> {
        let start = Instant::now();
        info!(
            target: "atlas-splitting",
            "🧬 Applying {} split rules to {} regions / {} voxels",
            rules.len(),
            tree.len(),
            volume.voxel_count()
        );

        let check_each = self.splitter.config().check_after_each_rule;
        let mut checker = ConsistencyChecker::new(tree, volume);
        let mut report = RunReport::default();

        for (index, rule) in rules.iter().enumerate() {
            let record = self
                .splitter
                .apply(rule, tree, volume, inputs, &mut self.allocator)
                .map_err(|err| {
                    warn!(
                        target: "atlas-splitting",
                        "⚠️ Rule #{} (region {}) failed: {}", index, rule.source_id(), err
                    );
                    RuleFailure::new(index, err)
                })?;
            checker.record_split(&record);
            report.records.push(record);

            if check_each {
                let rule_report = checker.check(tree, volume);
                if !rule_report.is_clean() {
                    warn!(
                        target: "atlas-splitting",
                        "Rule #{} left {} consistency violations", index, rule_report.len()
                    );
                    report.rule_reports.push((index, rule_report));
                }
            }
        }

        report.report = checker.check(tree, volume);
        info!(
            target: "atlas-splitting",
            "✅ Split run complete: {} rules, {} regions, {} violations in {} ms",
            rules.len(),
            tree.len(),
            report.report.len(),
            start.elapsed().as_millis()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitting::rule::SplitTarget;
    use crate::types::SplitError;
    use atlas_structures::RegionNode;
    use ndarray::Array3;

    fn setup() -> (HierarchyTree, AnnotationVolume, AuxiliaryInputs) {
        let mut tree = HierarchyTree::new();
        tree.insert(RegionNode::new(1, "root", "root").unwrap()).unwrap();
        tree.insert(
            RegionNode::new(5, "area", "A")
                .unwrap()
                .with_parent(Some(1)),
        )
        .unwrap();
        let volume = AnnotationVolume::new(Array3::from_elem((2, 2, 2), 5));
        let depth = Array3::from_shape_fn((2, 2, 2), |(x, _, _)| x as f32);
        (tree, volume, AuxiliaryInputs::new().with_scalar("depth", depth))
    }

    fn rule(source: u32, a: &str, b: &str) -> SplitRule {
        SplitRule::threshold(source, "depth")
            .with_target(SplitTarget::new(a, a).with_criterion_value("<0.5"))
            .with_target(SplitTarget::new(b, b).with_criterion_value(">=0.5"))
    }

    #[test]
    fn test_rules_chain_on_new_ids() {
        let (mut tree, mut volume, inputs) = setup();
        let mut engine = SplitEngine::default();
        // 6 and 7 come from the first rule, the second re-splits 7
        let rules = vec![rule(5, "A1", "A2"), rule(7, "A2a", "A2b")];

        let report = engine.run(&mut tree, &mut volume, &inputs, &rules).unwrap();
        assert!(report.is_clean(), "{}", report.report);
        assert_eq!(report.records.len(), 2);
        assert_eq!(tree.children_of(1).unwrap(), &[6, 8, 9]);
        assert_eq!(volume.count(6), 4);
        assert_eq!(volume.count(8), 0);
        assert_eq!(volume.count(9), 4);
    }

    #[test]
    fn test_failure_carries_rule_index() {
        let (mut tree, mut volume, inputs) = setup();
        let mut engine = SplitEngine::default();
        let rules = vec![rule(5, "A1", "A2"), rule(999, "X", "Y")];

        let failure = engine
            .run(&mut tree, &mut volume, &inputs, &rules)
            .unwrap_err();
        assert_eq!(failure.rule_index, 1);
        assert_eq!(failure.source, SplitError::UnknownRegion(999));
        // The first rule stays applied
        assert!(tree.contains(6));
    }

    #[test]
    fn test_engine_from_config() {
        let mut config = AtlasSplitterConfig::default();
        config.ids = atlas_config::IdAllocationConfig::reserved_range(500, 600);
        let (mut tree, mut volume, inputs) = setup();
        let mut engine = SplitEngine::new(&config);
        let report = engine
            .run(&mut tree, &mut volume, &inputs, &[rule(5, "A1", "A2")])
            .unwrap();
        assert_eq!(report.records[0].new_ids, vec![500, 501]);
        assert!(engine.allocator().is_issued(501));
    }
}
