// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Consistency checking between an annotation volume and its hierarchy.

Nothing here fails fast: every check appends to a [`ConsistencyReport`], so a
caller sees the whole violation set at once and decides what is tolerable.

Lineage conservation works from a baseline of subtree voxel totals taken
before any split. Each [`SplitRecord`] then updates what is expected:

- a replaced source stops being tracked and its new regions form a lineage
  group whose combined subtree total must equal the source's;
- a nested source keeps its own expectation;
- absorbed regions move their voxels into the lineage that absorbed them.
*/

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

use crate::models::HierarchyTree;
use crate::splitting::{Placement, SplitRecord};
use atlas_structures::{AnnotationVolume, RegionId, BACKGROUND_ID};

/// One detected mismatch between labels and hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyViolation {
    #[error("{voxels} voxels carry label {id}, which is not in the hierarchy")]
    UnknownLabel { id: RegionId, voxels: u64 },

    #[error("Node stored under key {key} reports id {node_id}")]
    IdMismatch { key: RegionId, node_id: RegionId },

    #[error("Region {child} is listed {occurrences} times as a child")]
    DuplicateChild { child: RegionId, occurrences: usize },

    #[error("Region {id} points to missing parent {parent}")]
    DanglingParent { id: RegionId, parent: RegionId },

    #[error("Region {parent} lists missing child {child}")]
    DanglingChild { parent: RegionId, child: RegionId },

    #[error("Region {parent} lists child {child}, whose parent is {recorded_parent:?}")]
    LinkMismatch {
        parent: RegionId,
        child: RegionId,
        recorded_parent: Option<RegionId>,
    },

    #[error("Region {id} has parent {parent:?} but is not listed among its siblings")]
    UnlistedChild { id: RegionId, parent: Option<RegionId> },

    #[error("Root list entry {id} is missing or has a parent")]
    InvalidRoot { id: RegionId },

    #[error("Lineage of {members:?} holds {actual} voxels, expected {expected}")]
    LineageCountMismatch {
        members: Vec<RegionId>,
        expected: u64,
        actual: u64,
    },

    #[error("Lineage region {id} is no longer in the hierarchy")]
    MissingLineageRegion { id: RegionId },
}

/// Aggregated result of a consistency pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub violations: Vec<ConsistencyViolation>,
}

impl ConsistencyReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn push(&mut self, violation: ConsistencyViolation) {
        self.violations.push(violation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConsistencyViolation> {
        self.violations.iter()
    }

    pub fn merge(&mut self, other: ConsistencyReport) {
        self.violations.extend(other.violations);
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "no consistency violations");
        }
        writeln!(f, "{} consistency violations:", self.violations.len())?;
        for violation in &self.violations {
            writeln!(f, "  - {}", violation)?;
        }
        Ok(())
    }
}

/// Regions whose combined subtree total is conserved
#[derive(Debug, Clone, PartialEq, Eq)]
struct LineageGroup {
    members: BTreeSet<RegionId>,
    expected: u64,
}

/// Tracks lineage totals across a run and checks volume/hierarchy pairs
#[derive(Debug, Clone, Default)]
pub struct ConsistencyChecker {
    /// Baseline regions still tracked on their own
    expected: BTreeMap<RegionId, u64>,
    groups: Vec<LineageGroup>,
}

impl ConsistencyChecker {
    /// Record the baseline subtree total of every region
    pub fn new(tree: &HierarchyTree, volume: &AnnotationVolume) -> Self {
        let histogram = volume.histogram();
        Self {
            expected: subtree_totals(tree, &histogram),
            groups: Vec::new(),
        }
    }

    /// Update lineage expectations after a split
    pub fn record_split(&mut self, record: &SplitRecord) {
        for region in &record.absorbed {
            if self.expected.remove(&region.id).is_none() {
                if let Some(group) = self.group_of(region.id) {
                    group.members.remove(&region.id);
                    group.expected = group.expected.saturating_sub(region.voxels);
                }
            }
        }
        let added = record.absorbed_voxels();
        let source = record.source_id;

        match record.placement {
            Placement::NestUnderSource => {
                if let Some(expected) = self.expected.get_mut(&source) {
                    *expected += added;
                } else if let Some(group) = self.group_of(source) {
                    group.expected += added;
                } else {
                    self.expected.insert(source, record.lineage_total);
                }
            }
            Placement::ReplaceSource => {
                if let Some(expected) = self.expected.remove(&source) {
                    self.groups.push(LineageGroup {
                        members: record.new_ids.iter().copied().collect(),
                        expected: expected + added,
                    });
                } else if let Some(group) = self.group_of(source) {
                    group.members.remove(&source);
                    group.members.extend(record.new_ids.iter().copied());
                    group.expected += added;
                } else {
                    self.groups.push(LineageGroup {
                        members: record.new_ids.iter().copied().collect(),
                        expected: record.lineage_total,
                    });
                }
            }
        }
        self.groups.retain(|group| !group.members.is_empty());
    }

    /// Full check: labels, structure and lineage conservation
    pub fn check(&self, tree: &HierarchyTree, volume: &AnnotationVolume) -> ConsistencyReport {
        let histogram = volume.histogram();
        let mut report = check_labels(tree, &histogram);
        report.merge(check_structure(tree));

        let totals = subtree_totals(tree, &histogram);
        for (&id, &expected) in &self.expected {
            match totals.get(&id) {
                Some(&actual) if actual != expected => {
                    report.push(ConsistencyViolation::LineageCountMismatch {
                        members: vec![id],
                        expected,
                        actual,
                    })
                }
                Some(_) => {}
                None => report.push(ConsistencyViolation::MissingLineageRegion { id }),
            }
        }
        for group in &self.groups {
            let mut actual = 0;
            for &id in &group.members {
                match totals.get(&id) {
                    Some(total) => actual += total,
                    None => report.push(ConsistencyViolation::MissingLineageRegion { id }),
                }
            }
            if actual != group.expected {
                report.push(ConsistencyViolation::LineageCountMismatch {
                    members: group.members.iter().copied().collect(),
                    expected: group.expected,
                    actual,
                });
            }
        }

        if !report.is_clean() {
            warn!(
                target: "atlas-splitting",
                "Consistency check found {} violations", report.len()
            );
        }
        report
    }

    fn group_of(&mut self, id: RegionId) -> Option<&mut LineageGroup> {
        self.groups.iter_mut().find(|group| group.members.contains(&id))
    }
}

/// Label and structure checks that need no baseline
pub fn check_pair(tree: &HierarchyTree, volume: &AnnotationVolume) -> ConsistencyReport {
    let mut report = check_labels(tree, &volume.histogram());
    report.merge(check_structure(tree));
    report
}

/// Tree validity: ids unique and matching their keys, every link resolvable
/// and mirrored on the other side, roots listed exactly
pub fn check_structure(tree: &HierarchyTree) -> ConsistencyReport {
    let mut report = ConsistencyReport::new();

    let mut occurrences: BTreeMap<RegionId, usize> = BTreeMap::new();
    for &root in tree.roots() {
        *occurrences.entry(root).or_insert(0) += 1;
        if tree.find(root).map_or(true, |node| node.parent_id.is_some()) {
            report.push(ConsistencyViolation::InvalidRoot { id: root });
        }
    }

    for (&key, node) in tree.entries() {
        if key != node.id {
            report.push(ConsistencyViolation::IdMismatch {
                key,
                node_id: node.id,
            });
        }

        match node.parent_id {
            Some(parent) => match tree.find(parent) {
                None => report.push(ConsistencyViolation::DanglingParent { id: key, parent }),
                Some(parent_node) if !parent_node.children_ids.contains(&key) => {
                    report.push(ConsistencyViolation::UnlistedChild {
                        id: key,
                        parent: Some(parent),
                    })
                }
                Some(_) => {}
            },
            None if !tree.roots().contains(&key) => {
                report.push(ConsistencyViolation::UnlistedChild {
                    id: key,
                    parent: None,
                })
            }
            None => {}
        }

        for &child in &node.children_ids {
            *occurrences.entry(child).or_insert(0) += 1;
            match tree.find(child) {
                None => report.push(ConsistencyViolation::DanglingChild { parent: key, child }),
                Some(child_node) if child_node.parent_id != Some(key) => {
                    report.push(ConsistencyViolation::LinkMismatch {
                        parent: key,
                        child,
                        recorded_parent: child_node.parent_id,
                    })
                }
                Some(_) => {}
            }
        }
    }

    for (child, count) in occurrences {
        if count > 1 {
            report.push(ConsistencyViolation::DuplicateChild {
                child,
                occurrences: count,
            });
        }
    }
    report
}

fn check_labels(tree: &HierarchyTree, histogram: &BTreeMap<RegionId, u64>) -> ConsistencyReport {
    let mut report = ConsistencyReport::new();
    for (&id, &voxels) in histogram {
        if id != BACKGROUND_ID && !tree.contains(id) {
            report.push(ConsistencyViolation::UnknownLabel { id, voxels });
        }
    }
    report
}

/// Voxels labeled with each region or any of its descendants
pub fn subtree_totals(
    tree: &HierarchyTree,
    histogram: &BTreeMap<RegionId, u64>,
) -> BTreeMap<RegionId, u64> {
    let mut totals: BTreeMap<RegionId, u64> = BTreeMap::new();
    for &root in tree.roots() {
        // Reverse pre-order visits every child before its parent
        for id in tree.subtree_ids(root).into_iter().rev() {
            let own = histogram.get(&id).copied().unwrap_or(0);
            let below: u64 = tree
                .find(id)
                .map(|node| {
                    node.children_ids
                        .iter()
                        .filter_map(|child| totals.get(child))
                        .sum()
                })
                .unwrap_or(0);
            totals.insert(id, own + below);
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitting::AbsorbedRegion;
    use atlas_structures::RegionNode;
    use ndarray::Array3;
    use serde_json::json;

    fn node(id: RegionId, parent: Option<RegionId>) -> RegionNode {
        RegionNode::new(id, format!("r{}", id), format!("R{}", id))
            .unwrap()
            .with_parent(parent)
    }

    fn tree() -> HierarchyTree {
        let mut tree = HierarchyTree::new();
        tree.insert(node(1, None)).unwrap();
        tree.insert(node(2, Some(1))).unwrap();
        tree.insert(node(3, Some(2))).unwrap();
        tree
    }

    fn volume(labels: Vec<RegionId>) -> AnnotationVolume {
        let n = labels.len();
        AnnotationVolume::new(Array3::from_shape_vec((n, 1, 1), labels).unwrap())
    }

    #[test]
    fn test_subtree_totals() {
        let tree = tree();
        let volume = volume(vec![1, 2, 2, 3, 0]);
        let totals = subtree_totals(&tree, &volume.histogram());
        assert_eq!(totals[&3], 1);
        assert_eq!(totals[&2], 3);
        assert_eq!(totals[&1], 4);
    }

    #[test]
    fn test_unknown_label_reported() {
        let report = check_pair(&tree(), &volume(vec![1, 42, 42, 0]));
        assert_eq!(
            report.violations,
            vec![ConsistencyViolation::UnknownLabel { id: 42, voxels: 2 }]
        );
    }

    #[test]
    fn test_structure_of_valid_tree_is_clean() {
        assert!(check_structure(&tree()).is_clean());
    }

    #[test]
    fn test_broken_links_all_reported() {
        // Hand-written arena with several independent faults
        let broken: HierarchyTree = serde_json::from_value(json!({
            "nodes": {
                "1": {"id": 1, "name": "root", "acronym": "root", "parent_id": null,
                      "children_ids": [2, 2, 9], "attributes": {}},
                "2": {"id": 2, "name": "a", "acronym": "a", "parent_id": 1,
                      "children_ids": [], "attributes": {}},
                "4": {"id": 5, "name": "b", "acronym": "b", "parent_id": 7,
                      "children_ids": [], "attributes": {}}
            },
            "roots": [1]
        }))
        .unwrap();

        let report = check_structure(&broken);
        assert!(report
            .iter()
            .any(|v| *v == ConsistencyViolation::IdMismatch { key: 4, node_id: 5 }));
        assert!(report
            .iter()
            .any(|v| *v == ConsistencyViolation::DuplicateChild { child: 2, occurrences: 2 }));
        assert!(report
            .iter()
            .any(|v| *v == ConsistencyViolation::DanglingChild { parent: 1, child: 9 }));
        assert!(report
            .iter()
            .any(|v| *v == ConsistencyViolation::DanglingParent { id: 4, parent: 7 }));
    }

    #[test]
    fn test_lineage_after_replace() {
        let mut tree = tree();
        let mut volume = volume(vec![2, 2, 2, 3]);
        let mut checker = ConsistencyChecker::new(&tree, &volume);

        // Replace 3 (a leaf under 2) by 10 and 11
        tree.replace_leaf(3, vec![node(10, None), node(11, None)]).unwrap();
        volume.relabel(&[atlas_structures::VoxelCoord::new(3, 0, 0)], 11).unwrap();
        checker.record_split(&SplitRecord {
            source_id: 3,
            placement: Placement::ReplaceSource,
            new_ids: vec![10, 11],
            voxel_counts: vec![0, 1],
            absorbed: Vec::new(),
            migrated_children: Vec::new(),
            undefined_voxels: 0,
            lineage_total: 1,
        });
        assert!(checker.check(&tree, &volume).is_clean());

        // Losing a voxel to the background breaks conservation up the lineage
        volume.relabel(&[atlas_structures::VoxelCoord::new(0, 0, 0)], 0).unwrap();
        let report = checker.check(&tree, &volume);
        assert!(report.iter().any(|v| matches!(
            v,
            ConsistencyViolation::LineageCountMismatch { members, expected: 4, actual: 3 }
                if members == &vec![1]
        )));
    }

    #[test]
    fn test_absorbed_region_moves_between_lineages() {
        // root(1) -> {2, 3}; 2 is nested-split and absorbs sibling 3
        let mut tree = HierarchyTree::new();
        tree.insert(node(1, None)).unwrap();
        tree.insert(node(2, Some(1))).unwrap();
        tree.insert(node(3, Some(1))).unwrap();
        let mut volume = volume(vec![2, 2, 3]);
        let mut checker = ConsistencyChecker::new(&tree, &volume);

        tree.remove(3).unwrap();
        tree.nest_with_adoptions(2, vec![node(3, None), node(4, None)], &[])
            .unwrap();
        volume
            .relabel(&[atlas_structures::VoxelCoord::new(0, 0, 0)], 3)
            .unwrap();
        volume
            .relabel(&[atlas_structures::VoxelCoord::new(1, 0, 0)], 4)
            .unwrap();
        checker.record_split(&SplitRecord {
            source_id: 2,
            placement: Placement::NestUnderSource,
            new_ids: vec![3, 4],
            voxel_counts: vec![1, 1],
            absorbed: vec![AbsorbedRegion { id: 3, voxels: 1 }],
            migrated_children: Vec::new(),
            undefined_voxels: 0,
            lineage_total: 3,
        });

        let report = checker.check(&tree, &volume);
        assert!(report.is_clean(), "{}", report);
    }
}
