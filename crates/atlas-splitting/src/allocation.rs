// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Region id allocation.

An [`IdAllocator`] hands out ids that are neither present in the hierarchy nor
previously issued by the same allocator. Allocation is deterministic: the same
tree, configuration and call sequence always produce the same ids.
*/

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::HierarchyTree;
use crate::types::{SplitError, SplitResult};
use atlas_config::{IdAllocationConfig, IdStrategy};
use atlas_structures::{RegionId, BACKGROUND_ID};

/// Allocates collision-free region ids
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    config: IdAllocationConfig,
    issued: BTreeSet<RegionId>,
}

impl IdAllocator {
    pub fn new(config: IdAllocationConfig) -> Self {
        Self {
            config,
            issued: BTreeSet::new(),
        }
    }

    /// Smallest-unused-above-maximum allocation with no upper bound
    pub fn sequential() -> Self {
        Self::new(IdAllocationConfig::sequential())
    }

    pub fn config(&self) -> &IdAllocationConfig {
        &self.config
    }

    /// Every id this allocator has issued or reserved, ascending
    pub fn issued(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.issued.iter().copied()
    }

    pub fn is_issued(&self, id: RegionId) -> bool {
        self.issued.contains(&id)
    }

    /// Next id for a region that has no acronym to hash
    pub fn next_id(&mut self, tree: &HierarchyTree) -> SplitResult<RegionId> {
        let id = match self.config.strategy {
            IdStrategy::Sequential => self.next_sequential(tree)?,
            IdStrategy::ReservedRange | IdStrategy::AcronymHash => self.next_in_range(tree)?,
        };
        self.issued.insert(id);
        debug!(target: "atlas-splitting", "Allocated region id {}", id);
        Ok(id)
    }

    /// Next id for a region with the given acronym.
    ///
    /// Only the acronym-hash strategy looks at the acronym; a hash that lands
    /// on an id already in use is reported as [`SplitError::DuplicateId`].
    pub fn next_id_for(&mut self, tree: &HierarchyTree, acronym: &str) -> SplitResult<RegionId> {
        if self.config.strategy != IdStrategy::AcronymHash || acronym.is_empty() {
            return self.next_id(tree);
        }

        let id = self.hashed(acronym)?;
        if tree.contains(id) || self.issued.contains(&id) {
            return Err(SplitError::DuplicateId(id));
        }
        self.issued.insert(id);
        debug!(target: "atlas-splitting", "Allocated region id {} for acronym '{}'", id, acronym);
        Ok(id)
    }

    /// Mark a caller-pinned id as issued
    pub fn reserve(&mut self, tree: &HierarchyTree, id: RegionId) -> SplitResult<()> {
        if id == BACKGROUND_ID {
            return Err(SplitError::InvalidRule(format!(
                "id {} is reserved for background voxels",
                BACKGROUND_ID
            )));
        }
        if tree.contains(id) || !self.issued.insert(id) {
            return Err(SplitError::DuplicateId(id));
        }
        Ok(())
    }

    fn exhausted(&self) -> SplitError {
        SplitError::ExhaustedRange {
            min: self.config.min_id,
            max: self.config.max_id,
        }
    }

    fn next_sequential(&self, tree: &HierarchyTree) -> SplitResult<RegionId> {
        let highest = tree
            .max_id()
            .into_iter()
            .chain(self.issued.last().copied())
            .max()
            .unwrap_or(BACKGROUND_ID);
        let candidate = highest
            .checked_add(1)
            .ok_or_else(|| self.exhausted())?
            .max(self.config.min_id);
        if candidate > self.config.max_id {
            return Err(self.exhausted());
        }
        Ok(candidate)
    }

    fn next_in_range(&self, tree: &HierarchyTree) -> SplitResult<RegionId> {
        let start = self.config.min_id.max(BACKGROUND_ID + 1);
        if start > self.config.max_id {
            return Err(self.exhausted());
        }
        (start..=self.config.max_id)
            .find(|id| !tree.contains(*id) && !self.issued.contains(id))
            .ok_or_else(|| self.exhausted())
    }

    fn hashed(&self, acronym: &str) -> SplitResult<RegionId> {
        let span = self.config.max_id.saturating_sub(self.config.min_id);
        if span == 0 {
            return Err(self.exhausted());
        }
        let digest = Sha256::digest(acronym.as_bytes());
        // Big-endian digest reduced modulo the span, byte by byte
        let remainder = digest
            .iter()
            .fold(0u64, |acc, &byte| (acc * 256 + u64::from(byte)) % u64::from(span));
        let offset = RegionId::try_from(remainder)
            .map_err(|_| SplitError::Internal("hash remainder exceeds id range".to_string()))?;
        Ok(self.config.min_id + offset)
    }
}

impl From<&IdAllocationConfig> for IdAllocator {
    fn from(config: &IdAllocationConfig) -> Self {
        Self::new(config.clone())
    }
}
