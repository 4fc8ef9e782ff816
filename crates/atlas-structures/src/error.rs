// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Common error type for atlas data operations.
///
/// Raised by the annotation and auxiliary volume types when a caller asks for
/// something the grid cannot satisfy (a coordinate outside the shape, two
/// volumes that do not line up, malformed constructor arguments).
///
/// # Examples
/// ```
/// use atlas_structures::{AnnotationVolume, AtlasDataError, VoxelCoord};
/// use ndarray::Array3;
///
/// let volume = AnnotationVolume::new(Array3::zeros((2, 2, 2)));
/// let err = volume.get(VoxelCoord::new(5, 0, 0)).unwrap_err();
/// assert!(matches!(err, AtlasDataError::OutOfBounds { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AtlasDataError {
    /// A voxel coordinate lies outside the volume shape
    #[error("Out of bounds: voxel {coord:?} not in shape {shape:?}")]
    OutOfBounds {
        coord: [usize; 3],
        shape: [usize; 3],
    },

    /// Two grids that must be aligned have different shapes
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// Invalid parameters provided to a function
    #[error("Bad parameters: {0}")]
    BadParameters(String),
}
