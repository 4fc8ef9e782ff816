// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Region node data model.

A region node is one entry of the brain-region ontology: an integer id, the
human-readable name and acronym, the links to its parent and children (stored
as ids, never as references) and free-form attributes carried through from the
source ontology (`atlas_id`, `color_hex_triplet`, `st_level`, ...).
*/

use crate::AtlasDataError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Integer identifier of a brain region. `0` is reserved for background voxels.
pub type RegionId = u32;

/// Label value of unlabeled voxels.
pub const BACKGROUND_ID: RegionId = 0;

/// Brain region metadata (ontology representation)
///
/// # Design Notes
///
/// - Links are ids; the owning tree keeps `parent_id` and `children_ids`
///   mutually consistent
/// - `children_ids` is ordered, the order is the ontology display order
/// - Attributes are kept as JSON values so unknown ontology keys round-trip
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionNode {
    /// Unique identifier for this region
    pub id: RegionId,

    /// Human-readable name
    pub name: String,

    /// Short name, e.g. "SSp-bfd4"
    pub acronym: String,

    /// Parent region, `None` for roots
    #[serde(default)]
    pub parent_id: Option<RegionId>,

    /// Ordered child regions
    #[serde(default)]
    pub children_ids: Vec<RegionId>,

    /// Additional ontology properties
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl RegionNode {
    /// Create a new leaf region without parent
    ///
    /// # Errors
    ///
    /// Returns error if the id is the background id or the name is empty
    ///
    pub fn new(
        id: RegionId,
        name: impl Into<String>,
        acronym: impl Into<String>,
    ) -> Result<Self, AtlasDataError> {
        let name = name.into();
        if id == BACKGROUND_ID {
            return Err(AtlasDataError::BadParameters(
                "region id 0 is reserved for background voxels".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(AtlasDataError::BadParameters(format!(
                "name of region {} cannot be empty",
                id
            )));
        }

        Ok(Self {
            id,
            name,
            acronym: acronym.into(),
            parent_id: None,
            children_ids: Vec::new(),
            attributes: Map::new(),
        })
    }

    /// Set the parent region
    pub fn with_parent(mut self, parent_id: Option<RegionId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Replace all attributes
    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Get an attribute value by key
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Set an attribute, returning the previous value
    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(key.into(), value)
    }

    /// True if the node has no children
    pub fn is_leaf(&self) -> bool {
        self.children_ids.is_empty()
    }

    /// True if the node has no parent
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_creation() {
        let node = RegionNode::new(195, "Prelimbic area, layer 2", "PL2").unwrap();
        assert_eq!(node.id, 195);
        assert!(node.is_leaf());
        assert!(node.is_root());
    }

    #[test]
    fn test_background_id_rejected() {
        assert!(RegionNode::new(BACKGROUND_ID, "Background", "bg").is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(RegionNode::new(7, "   ", "x").is_err());
    }

    #[test]
    fn test_attributes() {
        let mut node = RegionNode::new(3, "Region", "R").unwrap();
        assert!(node.set_attribute("st_level", json!(9)).is_none());
        assert_eq!(node.attribute("st_level"), Some(&json!(9)));
        assert_eq!(node.set_attribute("st_level", json!(10)), Some(json!(9)));
    }
}
