// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The core data crate for atlas splitting. Defines the region node, the
//! annotation volume and the auxiliary signals that split criteria read.

mod error;
pub mod annotation;
pub mod ontology;

pub use annotation::{
    mask_from_voxel_indices, AnnotationVolume, AuxiliaryInputs, AuxiliaryVolume, VoxelCoord,
    VoxelSize,
};
pub use error::AtlasDataError;
pub use ontology::{RegionId, RegionNode, BACKGROUND_ID};
