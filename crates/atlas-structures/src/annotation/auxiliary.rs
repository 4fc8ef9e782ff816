// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Auxiliary volumes consumed by split criteria (scalar fields and masks).

use super::VoxelCoord;
use crate::AtlasDataError;
use ndarray::{Array3, ArrayView3};
use std::collections::BTreeMap;

/// A named signal aligned with the annotation grid
#[derive(Debug, Clone, PartialEq)]
pub enum AuxiliaryVolume {
    /// Per-voxel scalar, NaN marks voxels outside the field's domain
    Scalar(Array3<f32>),
    /// Per-voxel membership
    Mask(Array3<bool>),
}

impl AuxiliaryVolume {
    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z) = match self {
            AuxiliaryVolume::Scalar(values) => values.dim(),
            AuxiliaryVolume::Mask(values) => values.dim(),
        };
        [x, y, z]
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuxiliaryVolume::Scalar(_) => "scalar",
            AuxiliaryVolume::Mask(_) => "mask",
        }
    }
}

/// Registry of auxiliary volumes, referenced by name from split rules
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryInputs {
    volumes: BTreeMap<String, AuxiliaryVolume>,
}

impl AuxiliaryInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scalar field, replacing any volume with the same name
    pub fn insert_scalar(&mut self, name: impl Into<String>, values: Array3<f32>) {
        self.volumes
            .insert(name.into(), AuxiliaryVolume::Scalar(values));
    }

    /// Register a boolean mask, replacing any volume with the same name
    pub fn insert_mask(&mut self, name: impl Into<String>, values: Array3<bool>) {
        self.volumes.insert(name.into(), AuxiliaryVolume::Mask(values));
    }

    pub fn with_scalar(mut self, name: impl Into<String>, values: Array3<f32>) -> Self {
        self.insert_scalar(name, values);
        self
    }

    pub fn with_mask(mut self, name: impl Into<String>, values: Array3<bool>) -> Self {
        self.insert_mask(name, values);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AuxiliaryVolume> {
        self.volumes.get(name)
    }

    /// Scalar field by name, `None` if absent or not a scalar field
    pub fn scalar(&self, name: &str) -> Option<ArrayView3<'_, f32>> {
        match self.volumes.get(name) {
            Some(AuxiliaryVolume::Scalar(values)) => Some(values.view()),
            _ => None,
        }
    }

    /// Mask by name, `None` if absent or not a mask
    pub fn mask(&self, name: &str) -> Option<ArrayView3<'_, bool>> {
        match self.volumes.get(name) {
            Some(AuxiliaryVolume::Mask(values)) => Some(values.view()),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.volumes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

/// Build a mask of `shape` that is true exactly at the given voxel positions.
///
/// Used to turn point lists (e.g. barrel voxel positions) into a mask volume.
pub fn mask_from_voxel_indices<I>(shape: [usize; 3], indices: I) -> Result<Array3<bool>, AtlasDataError>
where
    I: IntoIterator<Item = VoxelCoord>,
{
    let mut mask = Array3::from_elem((shape[0], shape[1], shape[2]), false);
    for coord in indices {
        if coord.x >= shape[0] || coord.y >= shape[1] || coord.z >= shape[2] {
            return Err(AtlasDataError::OutOfBounds {
                coord: coord.as_index(),
                shape,
            });
        }
        mask[coord.as_index()] = true;
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_kind() {
        let inputs = AuxiliaryInputs::new()
            .with_scalar("depth", Array3::zeros((2, 2, 2)))
            .with_mask("barrel:C1", Array3::from_elem((2, 2, 2), false));

        assert!(inputs.scalar("depth").is_some());
        assert!(inputs.mask("depth").is_none());
        assert!(inputs.mask("barrel:C1").is_some());
        assert_eq!(inputs.get("depth").map(AuxiliaryVolume::kind), Some("scalar"));
        assert_eq!(inputs.names().collect::<Vec<_>>(), vec!["barrel:C1", "depth"]);
    }

    #[test]
    fn test_mask_from_voxel_indices() {
        let mask = mask_from_voxel_indices(
            [2, 3, 4],
            [VoxelCoord::new(0, 1, 2), VoxelCoord::new(1, 2, 3)],
        )
        .unwrap();
        assert_eq!(mask.iter().filter(|&&v| v).count(), 2);
        assert!(mask[[1, 2, 3]]);
    }

    #[test]
    fn test_mask_from_voxel_indices_out_of_bounds() {
        let err = mask_from_voxel_indices([2, 2, 2], [VoxelCoord::new(2, 0, 0)]).unwrap_err();
        assert!(matches!(err, AtlasDataError::OutOfBounds { .. }));
    }
}
