// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Core types for splitting operations.
*/

use atlas_structures::{AtlasDataError, RegionId};

/// Result type for splitting operations
pub type SplitResult<T> = Result<T, SplitError>;

/// Errors that can occur while editing the hierarchy or splitting a region
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SplitError {
    #[error("Unknown region: {0} is not in the hierarchy")]
    UnknownRegion(RegionId),

    #[error("Region {0} does not exist")]
    NotFound(RegionId),

    #[error("Region id {0} already exists")]
    DuplicateId(RegionId),

    #[error("Region {id} still has children {children:?}")]
    HasChildren { id: RegionId, children: Vec<RegionId> },

    #[error("Moving region {id} under {new_parent} would create a cycle")]
    CycleDetected { id: RegionId, new_parent: RegionId },

    #[error("Id range [{min}, {max}] is exhausted")]
    ExhaustedRange { min: RegionId, max: RegionId },

    #[error("Out of bounds: voxel {coord:?} not in shape {shape:?}")]
    OutOfBounds { coord: [usize; 3], shape: [usize; 3] },

    #[error("Undefined criterion input: {0}")]
    UndefinedCriterionInput(String),

    #[error("Invalid split rule: {0}")]
    InvalidRule(String),

    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AtlasDataError> for SplitError {
    fn from(err: AtlasDataError) -> Self {
        match err {
            AtlasDataError::OutOfBounds { coord, shape } => SplitError::OutOfBounds { coord, shape },
            AtlasDataError::ShapeMismatch { expected, actual } => {
                SplitError::UndefinedCriterionInput(format!(
                    "shape mismatch: expected {:?}, got {:?}",
                    expected, actual
                ))
            }
            AtlasDataError::BadParameters(msg) => SplitError::InvalidHierarchy(msg),
        }
    }
}

/// A structural failure while applying the rule at `rule_index`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Split rule #{rule_index} failed: {source}")]
pub struct RuleFailure {
    pub rule_index: usize,
    #[source]
    pub source: SplitError,
}

impl RuleFailure {
    pub fn new(rule_index: usize, source: SplitError) -> Self {
        Self { rule_index, source }
    }
}
