// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Annotation volumes: fixed-shape 3D grids holding one region id per voxel.

The grid is a single owned `ndarray::Array3`. Shape never changes after
construction and [`AnnotationVolume::relabel`] is the only mutator, so the
splitting engine can borrow the volume exclusively for a run without locks.
*/

mod auxiliary;

pub use auxiliary::{mask_from_voxel_indices, AuxiliaryInputs, AuxiliaryVolume};

use crate::ontology::{RegionId, BACKGROUND_ID};
use crate::AtlasDataError;
use ahash::{AHashMap, AHashSet};
use ndarray::parallel::prelude::*;
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Integer voxel index (x, y, z) into a 3D grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelCoord {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl VoxelCoord {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Component along axis 0, 1 or 2
    pub fn axis(&self, axis: usize) -> Option<usize> {
        match axis {
            0 => Some(self.x),
            1 => Some(self.y),
            2 => Some(self.z),
            _ => None,
        }
    }

    pub fn as_index(&self) -> [usize; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[usize; 3]> for VoxelCoord {
    fn from(value: [usize; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

impl From<(usize, usize, usize)> for VoxelCoord {
    fn from(value: (usize, usize, usize)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}

impl fmt::Display for VoxelCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Physical voxel geometry. Carried along for writers, not used by the splitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelSize {
    /// Edge lengths in micrometers
    pub dimensions: [f64; 3],
    /// World position of voxel (0, 0, 0)
    pub offset: [f64; 3],
}

impl Default for VoxelSize {
    fn default() -> Self {
        Self {
            dimensions: [1.0, 1.0, 1.0],
            offset: [0.0, 0.0, 0.0],
        }
    }
}

/// 3D grid of region ids with its voxel geometry
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationVolume {
    labels: Array3<RegionId>,
    voxel_size: VoxelSize,
}

impl AnnotationVolume {
    /// Wrap a label grid using unit voxel geometry
    pub fn new(labels: Array3<RegionId>) -> Self {
        Self {
            labels,
            voxel_size: VoxelSize::default(),
        }
    }

    pub fn with_voxel_size(mut self, voxel_size: VoxelSize) -> Self {
        self.voxel_size = voxel_size;
        self
    }

    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z) = self.labels.dim();
        [x, y, z]
    }

    pub fn voxel_count(&self) -> usize {
        self.labels.len()
    }

    pub fn voxel_size(&self) -> &VoxelSize {
        &self.voxel_size
    }

    pub fn labels(&self) -> ArrayView3<'_, RegionId> {
        self.labels.view()
    }

    /// Give the grid back to the caller for persistence
    pub fn into_labels(self) -> Array3<RegionId> {
        self.labels
    }

    pub fn contains(&self, coord: VoxelCoord) -> bool {
        let [sx, sy, sz] = self.shape();
        coord.x < sx && coord.y < sy && coord.z < sz
    }

    /// Check that a coordinate lies inside the grid
    pub fn check_bounds(&self, coord: VoxelCoord) -> Result<(), AtlasDataError> {
        if self.contains(coord) {
            Ok(())
        } else {
            Err(AtlasDataError::OutOfBounds {
                coord: coord.as_index(),
                shape: self.shape(),
            })
        }
    }

    /// Label of one voxel
    pub fn get(&self, coord: VoxelCoord) -> Result<RegionId, AtlasDataError> {
        self.check_bounds(coord)?;
        Ok(self.labels[coord.as_index()])
    }

    /// Lazily enumerate the voxels currently labeled `id`, in memory order.
    ///
    /// Each call starts a fresh scan, so the sequence can be restarted at will.
    pub fn voxels_with(&self, id: RegionId) -> impl Iterator<Item = VoxelCoord> + '_ {
        self.labels
            .indexed_iter()
            .filter(move |&(_, &label)| label == id)
            .map(|((x, y, z), _)| VoxelCoord::new(x, y, z))
    }

    /// Lazily enumerate voxels whose label belongs to `ids`, with their label
    pub fn voxels_in<'a>(
        &'a self,
        ids: &'a AHashSet<RegionId>,
    ) -> impl Iterator<Item = (VoxelCoord, RegionId)> + 'a {
        self.labels
            .indexed_iter()
            .filter(move |&(_, label)| ids.contains(label))
            .map(|((x, y, z), &label)| (VoxelCoord::new(x, y, z), label))
    }

    /// Overwrite the given voxels with `new_id`.
    ///
    /// Every coordinate is bounds-checked before the first write, so on error
    /// the grid is untouched. Returns the number of voxels written.
    pub fn relabel(&mut self, coords: &[VoxelCoord], new_id: RegionId) -> Result<usize, AtlasDataError> {
        for coord in coords {
            self.check_bounds(*coord)?;
        }
        for coord in coords {
            self.labels[coord.as_index()] = new_id;
        }
        Ok(coords.len())
    }

    /// Number of voxels currently labeled `id`
    pub fn count(&self, id: RegionId) -> usize {
        self.labels.par_iter().filter(|&&label| label == id).count()
    }

    /// Voxel count of every label present in the grid (background included)
    pub fn histogram(&self) -> BTreeMap<RegionId, u64> {
        let counts = self
            .labels
            .par_iter()
            .fold(AHashMap::new, |mut acc: AHashMap<RegionId, u64>, &label| {
                *acc.entry(label).or_insert(0) += 1;
                acc
            })
            .reduce(AHashMap::new, |mut left, right| {
                for (label, count) in right {
                    *left.entry(label).or_insert(0) += count;
                }
                left
            });
        counts.into_iter().collect()
    }

    /// Distinct non-background labels present in the grid
    pub fn label_set(&self) -> AHashSet<RegionId> {
        self.histogram()
            .into_keys()
            .filter(|&label| label != BACKGROUND_ID)
            .collect()
    }
}
