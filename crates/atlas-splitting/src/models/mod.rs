// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Ontology models for atlas splitting.

- `HierarchyTree`: id-indexed arena of region nodes
- nested JSON conversion for Allen-style structure graphs
*/

pub mod hierarchy_tree;
mod nested_json;

pub use hierarchy_tree::{Adoption, HierarchyTree};

// RegionNode comes from atlas_structures (single source of truth)
pub use atlas_structures::{RegionId, RegionNode};
