// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
RegionSplitter - applies one [`SplitRule`] to an annotation/hierarchy pair.

A split runs in two phases:

1. **Planning** reads the tree and the volume only: voxel selection, criterion
   evaluation, id allocation, sibling reuse and child migration targets are
   all decided and buffered in a [`PendingSplit`].
2. **Commit** relabels the selected voxels and splices the hierarchy. If any
   edit fails, the voxels are written back to the source id and the tree
   snapshot taken before the commit is restored.

Planning errors leave both structures untouched. Ids issued by the allocator
for a rule that fails are not handed out again.
*/

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use serde_json::Map;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::criterion::{resolve_classifier, Classification, VoxelClassifier};
use super::rule::{Placement, SplitRule};
use crate::allocation::IdAllocator;
use crate::models::{Adoption, HierarchyTree};
use crate::types::{SplitError, SplitResult};
use atlas_config::{SplittingConfig, UndefinedVoxelPolicy};
use atlas_structures::{AnnotationVolume, AuxiliaryInputs, RegionId, RegionNode, VoxelCoord};

/// An existing sibling whose id was reused by one of the targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AbsorbedRegion {
    pub id: RegionId,
    /// Voxels the region carried when it was absorbed
    pub voxels: u64,
}

/// Audit record of one applied split
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitRecord {
    pub source_id: RegionId,
    pub placement: Placement,
    /// Id of every target, in rule order
    pub new_ids: Vec<RegionId>,
    /// Voxels relabeled to each target, in rule order
    pub voxel_counts: Vec<usize>,
    pub absorbed: Vec<AbsorbedRegion>,
    pub migrated_children: Vec<Adoption>,
    /// Selected voxels the criterion could not place
    pub undefined_voxels: usize,
    /// Voxels under the source subtree plus absorbed regions, before the split
    pub lineage_total: u64,
}

impl SplitRecord {
    pub fn absorbed_voxels(&self) -> u64 {
        self.absorbed.iter().map(|region| region.voxels).sum()
    }

    pub fn relabeled_voxels(&self) -> usize {
        self.voxel_counts.iter().sum()
    }
}

/// Everything decided for a rule before anything is written
#[derive(Debug, Clone)]
struct PendingSplit {
    source_id: RegionId,
    placement: Placement,
    selection: Vec<VoxelCoord>,
    /// Target index for every entry of `selection`
    assignment: Vec<usize>,
    new_nodes: Vec<RegionNode>,
    absorbed: Vec<AbsorbedRegion>,
    /// Reparenting worklist, drained into the hierarchy splice
    adoptions: VecDeque<Adoption>,
    undefined_voxels: usize,
    lineage_total: u64,
}

/// Applies split rules one at a time
#[derive(Debug, Clone, Default)]
pub struct RegionSplitter {
    config: SplittingConfig,
}

impl RegionSplitter {
    pub fn new(config: SplittingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SplittingConfig {
        &self.config
    }

    /// Apply one rule, mutating `tree` and `volume`.
    ///
    /// # Errors
    ///
    /// - `InvalidRule` if the rule is malformed
    /// - `UnknownRegion` if the source id is not in the hierarchy
    /// - `UndefinedCriterionInput` for missing or mismatched auxiliary inputs, or
    ///   undefined voxels under the `reject` policy
    /// - `DuplicateId` / `ExhaustedRange` from id allocation
    ///
    /// On error `tree` and `volume` are as they were before the call.
    pub fn apply(
        &self,
        rule: &SplitRule,
        tree: &mut HierarchyTree,
        volume: &mut AnnotationVolume,
        inputs: &AuxiliaryInputs,
        allocator: &mut IdAllocator,
    ) -> SplitResult<SplitRecord> {
        rule.validate()?;
        let source_id = rule.source_id();
        let source = tree
            .find(source_id)
            .ok_or(SplitError::UnknownRegion(source_id))?;
        info!(
            target: "atlas-splitting",
            "Splitting region {} ({}) into {} targets by {}",
            source_id,
            source.acronym,
            rule.targets().len(),
            rule.criterion().kind()
        );

        let pending = self.plan(rule, tree, volume, inputs, allocator)?;
        self.commit(tree, volume, pending)
    }

    fn plan(
        &self,
        rule: &SplitRule,
        tree: &HierarchyTree,
        volume: &AnnotationVolume,
        inputs: &AuxiliaryInputs,
        allocator: &mut IdAllocator,
    ) -> SplitResult<PendingSplit> {
        let source_id = rule.source_id();
        let classifier = resolve_classifier(rule, inputs, volume.shape())?;

        // One pass over the lineage: source voxels and every child's subtree
        let children = tree.children_of(source_id)?;
        let LineageScan {
            selection,
            child_voxels,
            child_slots,
        } = scan_lineage(tree, volume, source_id, children);
        let source_total = (selection.len() + child_voxels.len()) as u64;

        // Voxel assignment
        let classes = self.classify_all(classifier.as_ref(), &selection);
        let undefined_voxels = classes
            .iter()
            .filter(|class| **class == Classification::Undefined)
            .count();
        if undefined_voxels > 0 && self.config.undefined_voxels == UndefinedVoxelPolicy::Reject {
            return Err(SplitError::UndefinedCriterionInput(format!(
                "{} of {} voxels in region {} have no defined criterion value",
                undefined_voxels,
                selection.len(),
                source_id
            )));
        }
        let default_index = rule.default_target_index();
        let assignment: Vec<usize> = classes
            .iter()
            .map(|class| match class {
                Classification::Target(index) => *index,
                Classification::Undefined => default_index,
            })
            .collect();
        if undefined_voxels > 0 {
            debug!(
                target: "atlas-splitting",
                "{} undefined voxels of region {} sent to target #{}",
                undefined_voxels, source_id, default_index
            );
        }

        // Ids and nodes
        let (new_nodes, absorbed) = self.build_targets(rule, tree, volume, allocator)?;

        // Children of the source follow the majority of their subtree's voxels
        let tallies = self.child_tallies(
            rule,
            classifier.as_ref(),
            &child_voxels,
            &child_slots,
            children.len(),
        );
        let mut adoptions = VecDeque::new();
        for (&child, tally) in children.iter().zip(&tallies) {
            let winner = majority_index(tally);
            debug!(
                target: "atlas-splitting",
                "Child {} voxel tally {:?} -> target #{}", child, tally, winner
            );
            let new_parent = new_nodes
                .get(winner)
                .map(|node| node.id)
                .ok_or_else(|| SplitError::Internal(format!("no target #{}", winner)))?;
            adoptions.push_back(Adoption { child, new_parent });
        }

        let lineage_total = source_total + absorbed.iter().map(|r| r.voxels).sum::<u64>();

        Ok(PendingSplit {
            source_id,
            placement: rule.placement(),
            selection,
            assignment,
            new_nodes,
            absorbed,
            adoptions,
            undefined_voxels,
            lineage_total,
        })
    }

    /// One node per target: pinned ids first, then reused sibling ids, then
    /// freshly allocated ones
    fn build_targets(
        &self,
        rule: &SplitRule,
        tree: &HierarchyTree,
        volume: &AnnotationVolume,
        allocator: &mut IdAllocator,
    ) -> SplitResult<(Vec<RegionNode>, Vec<AbsorbedRegion>)> {
        for id in rule.targets().iter().filter_map(|target| target.id) {
            allocator.reserve(tree, id)?;
        }

        let siblings = if rule.reuse_existing_acronyms() {
            tree.siblings_of(rule.source_id())?
        } else {
            Vec::new()
        };

        let mut nodes = Vec::with_capacity(rule.targets().len());
        let mut absorbed = Vec::new();
        for target in rule.targets() {
            let reusable = siblings
                .iter()
                .filter_map(|&sibling| tree.find(sibling))
                .find(|node| node.is_leaf() && node.acronym == target.acronym);

            let (id, mut attributes) = match (target.id, reusable) {
                (Some(id), _) => (id, Map::new()),
                (None, Some(existing)) => {
                    absorbed.push(AbsorbedRegion {
                        id: existing.id,
                        voxels: volume.count(existing.id) as u64,
                    });
                    debug!(
                        target: "atlas-splitting",
                        "Reusing id {} of existing region '{}'", existing.id, existing.acronym
                    );
                    (existing.id, existing.attributes.clone())
                }
                (None, None) => (allocator.next_id_for(tree, &target.acronym)?, Map::new()),
            };
            attributes.extend(target.attributes.clone());
            nodes.push(
                RegionNode::new(id, target.name.clone(), target.acronym.clone())?
                    .with_attributes(attributes),
            );
        }
        Ok((nodes, absorbed))
    }

    /// Per-child voxel tally over the targets; `slots[i]` is the position in
    /// the child list of the child owning `coords[i]`
    fn child_tallies(
        &self,
        rule: &SplitRule,
        classifier: &dyn VoxelClassifier,
        coords: &[VoxelCoord],
        slots: &[usize],
        child_count: usize,
    ) -> Vec<Vec<usize>> {
        let mut tallies = vec![vec![0usize; rule.targets().len()]; child_count];
        let classes = self.classify_all(classifier, coords);
        for (class, &slot) in classes.iter().zip(slots) {
            let index = match *class {
                Classification::Target(index) => index,
                Classification::Undefined => match self.config.undefined_voxels {
                    UndefinedVoxelPolicy::DefaultTarget => rule.default_target_index(),
                    UndefinedVoxelPolicy::Reject => continue,
                },
            };
            if let Some(count) = tallies.get_mut(slot).and_then(|tally| tally.get_mut(index)) {
                *count += 1;
            }
        }
        tallies
    }

    fn classify_all(
        &self,
        classifier: &dyn VoxelClassifier,
        coords: &[VoxelCoord],
    ) -> Vec<Classification> {
        #[cfg(feature = "parallel")]
        if self.config.parallel && coords.len() >= self.config.min_parallel_voxels {
            use rayon::prelude::*;
            return coords
                .par_iter()
                .map(|&coord| classifier.classify(coord))
                .collect();
        }
        coords
            .iter()
            .map(|&coord| classifier.classify(coord))
            .collect()
    }

    fn commit(
        &self,
        tree: &mut HierarchyTree,
        volume: &mut AnnotationVolume,
        pending: PendingSplit,
    ) -> SplitResult<SplitRecord> {
        let PendingSplit {
            source_id,
            placement,
            selection,
            assignment,
            new_nodes,
            absorbed,
            mut adoptions,
            undefined_voxels,
            lineage_total,
        } = pending;

        let new_ids: Vec<RegionId> = new_nodes.iter().map(|node| node.id).collect();
        let mut groups: Vec<Vec<VoxelCoord>> = vec![Vec::new(); new_ids.len()];
        for (&coord, &index) in selection.iter().zip(&assignment) {
            match groups.get_mut(index) {
                Some(group) => group.push(coord),
                None => {
                    return Err(SplitError::Internal(format!(
                        "assignment to target #{} of {}",
                        index,
                        new_ids.len()
                    )))
                }
            }
        }
        let migrated: Vec<Adoption> = adoptions.drain(..).collect();

        let snapshot = tree.clone();
        let result = Self::write(
            tree, volume, source_id, placement, &groups, &new_ids, new_nodes, &absorbed, &migrated,
        );
        if let Err(err) = result {
            warn!(
                target: "atlas-splitting",
                "Split of region {} failed during commit, rolling back: {}", source_id, err
            );
            if let Err(restore) = volume.relabel(&selection, source_id) {
                warn!(target: "atlas-splitting", "Voxel rollback failed: {}", restore);
            }
            *tree = snapshot;
            return Err(err);
        }

        let voxel_counts: Vec<usize> = groups.iter().map(Vec::len).collect();
        for (id, count) in new_ids.iter().zip(&voxel_counts) {
            debug!(target: "atlas-splitting", "Region {} <- {} voxels", id, count);
        }
        info!(
            target: "atlas-splitting",
            "Split region {} into {:?} ({} voxels, {} children migrated, {} regions absorbed)",
            source_id,
            new_ids,
            selection.len(),
            migrated.len(),
            absorbed.len()
        );

        Ok(SplitRecord {
            source_id,
            placement,
            new_ids,
            voxel_counts,
            absorbed,
            migrated_children: migrated,
            undefined_voxels,
            lineage_total,
        })
    }

    /// Relabel, then edit the hierarchy. Any error is rolled back by the caller.
    #[allow(clippy::too_many_arguments)]
    fn write(
        tree: &mut HierarchyTree,
        volume: &mut AnnotationVolume,
        source_id: RegionId,
        placement: Placement,
        groups: &[Vec<VoxelCoord>],
        new_ids: &[RegionId],
        new_nodes: Vec<RegionNode>,
        absorbed: &[AbsorbedRegion],
        adoptions: &[Adoption],
    ) -> SplitResult<()> {
        for (coords, &id) in groups.iter().zip(new_ids) {
            volume.relabel(coords, id)?;
        }
        for region in absorbed {
            tree.remove(region.id)?;
        }
        match placement {
            Placement::ReplaceSource => tree.replace_with_adoptions(source_id, new_nodes, adoptions),
            Placement::NestUnderSource => tree.nest_with_adoptions(source_id, new_nodes, adoptions),
        }
    }
}

/// Voxels of a source lineage, gathered in one pass over the grid
#[derive(Debug, Default)]
struct LineageScan {
    /// Voxels labeled with the source itself, in memory order
    selection: Vec<VoxelCoord>,
    /// Voxels labeled with any region below the source
    child_voxels: Vec<VoxelCoord>,
    /// Position of the owning direct child for each entry of `child_voxels`
    child_slots: Vec<usize>,
}

fn scan_lineage(
    tree: &HierarchyTree,
    volume: &AnnotationVolume,
    source_id: RegionId,
    children: &[RegionId],
) -> LineageScan {
    let mut owner: AHashMap<RegionId, usize> = AHashMap::new();
    for (slot, &child) in children.iter().enumerate() {
        owner.extend(tree.subtree_ids(child).into_iter().map(|id| (id, slot)));
    }
    let mut lineage: AHashSet<RegionId> = owner.keys().copied().collect();
    lineage.insert(source_id);

    let mut scan = LineageScan::default();
    for (coord, label) in volume.voxels_in(&lineage) {
        match owner.get(&label) {
            Some(&slot) => {
                scan.child_voxels.push(coord);
                scan.child_slots.push(slot);
            }
            None => scan.selection.push(coord),
        }
    }
    scan
}

/// Index of the largest count, lowest index on ties
fn majority_index(tally: &[usize]) -> usize {
    let mut winner = 0;
    for (index, &count) in tally.iter().enumerate() {
        if count > tally[winner] {
            winner = index;
        }
    }
    winner
}
