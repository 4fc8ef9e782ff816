// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
HierarchyTree - id-indexed arena holding the brain region ontology.

Parent and children links are stored as region ids on each node, so structural
edits are index rewrites. Every mutator validates its whole input before it
touches the arena: an `Err` always means the tree is unchanged.
*/

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{SplitError, SplitResult};
use atlas_structures::{RegionId, RegionNode, BACKGROUND_ID};

/// Move `child` (currently under the node being replaced) under `new_parent`,
/// one of the nodes being inserted in the same edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adoption {
    pub child: RegionId,
    pub new_parent: RegionId,
}

/// Hierarchical tree of brain regions
///
/// # Design Notes
///
/// - Roots have `parent_id = None` and are listed in order in `roots`
/// - `BTreeMap` keeps iteration (and therefore id allocation) deterministic
/// - Cycles are prevented by validation in [`HierarchyTree::reparent`]
///
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyTree {
    /// Map of region id -> node
    nodes: BTreeMap<RegionId, RegionNode>,

    /// Ordered root ids
    roots: Vec<RegionId>,
}

impl HierarchyTree {
    /// Create a new empty hierarchy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hierarchy with a single root region
    pub fn with_root(root: RegionNode) -> SplitResult<Self> {
        let mut tree = Self::new();
        tree.insert(root.with_parent(None))?;
        Ok(tree)
    }

    /// Insert a leaf node
    ///
    /// The node is appended to its parent's children (or to the roots when
    /// `parent_id` is `None`).
    ///
    /// # Errors
    ///
    /// - `DuplicateId` if the id already exists
    /// - `NotFound` if the parent does not exist
    /// - `InvalidHierarchy` if the node already lists children
    ///
    pub fn insert(&mut self, node: RegionNode) -> SplitResult<()> {
        self.check_insertable(&node)?;
        if let Some(parent_id) = node.parent_id {
            if !self.nodes.contains_key(&parent_id) {
                return Err(SplitError::NotFound(parent_id));
            }
        }

        let id = node.id;
        match node.parent_id {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.children_ids.push(id);
                }
            }
            None => self.roots.push(id),
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Remove a leaf node
    ///
    /// # Errors
    ///
    /// - `NotFound` if the node is absent
    /// - `HasChildren` unless all children were already moved or removed
    ///
    pub fn remove(&mut self, id: RegionId) -> SplitResult<RegionNode> {
        let node = self.nodes.get(&id).ok_or(SplitError::NotFound(id))?;
        if !node.is_leaf() {
            return Err(SplitError::HasChildren {
                id,
                children: node.children_ids.clone(),
            });
        }

        let parent_id = node.parent_id;
        self.sibling_list_mut(parent_id).retain(|&sibling| sibling != id);
        self.nodes.remove(&id).ok_or(SplitError::NotFound(id))
    }

    /// Replace the leaf `old_id` with `new_nodes`
    ///
    /// The new nodes take the position of `old_id` among its former parent's
    /// children, in the given order, and become children of that parent.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `old_id` is absent
    /// - `HasChildren` if `old_id` is not a leaf
    /// - `DuplicateId` if a new id collides with another node or with itself
    ///
    pub fn replace_leaf(&mut self, old_id: RegionId, new_nodes: Vec<RegionNode>) -> SplitResult<()> {
        let old = self.nodes.get(&old_id).ok_or(SplitError::NotFound(old_id))?;
        if !old.is_leaf() {
            return Err(SplitError::HasChildren {
                id: old_id,
                children: old.children_ids.clone(),
            });
        }
        self.splice(old_id, new_nodes, &[], false)
    }

    /// Replace `old_id` with `new_nodes`, moving every child of `old_id` under
    /// the new node named by its adoption.
    ///
    /// With no children this is exactly [`HierarchyTree::replace_leaf`].
    pub fn replace_with_adoptions(
        &mut self,
        old_id: RegionId,
        new_nodes: Vec<RegionNode>,
        adoptions: &[Adoption],
    ) -> SplitResult<()> {
        self.splice(old_id, new_nodes, adoptions, false)
    }

    /// Make `new_nodes` the only children of `parent_id`, moving the previous
    /// children under the new node named by their adoption.
    pub fn nest_with_adoptions(
        &mut self,
        parent_id: RegionId,
        new_nodes: Vec<RegionNode>,
        adoptions: &[Adoption],
    ) -> SplitResult<()> {
        self.splice(parent_id, new_nodes, adoptions, true)
    }

    /// Change a region's parent
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Region doesn't exist
    /// - New parent doesn't exist
    /// - Would create a cycle
    ///
    pub fn reparent(&mut self, id: RegionId, new_parent_id: RegionId) -> SplitResult<()> {
        if !self.nodes.contains_key(&id) {
            return Err(SplitError::NotFound(id));
        }
        if !self.nodes.contains_key(&new_parent_id) {
            return Err(SplitError::NotFound(new_parent_id));
        }
        if id == new_parent_id || self.is_descendant(new_parent_id, id) {
            return Err(SplitError::CycleDetected {
                id,
                new_parent: new_parent_id,
            });
        }

        let old_parent = self.parent_of(id);
        self.sibling_list_mut(old_parent).retain(|&sibling| sibling != id);
        if let Some(parent) = self.nodes.get_mut(&new_parent_id) {
            parent.children_ids.push(id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent_id = Some(new_parent_id);
        }
        Ok(())
    }

    /// Check if one region is a descendant of another
    pub fn is_descendant(&self, potential_descendant: RegionId, ancestor: RegionId) -> bool {
        let mut current = potential_descendant;
        while let Some(parent) = self.parent_of(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Get a region by id
    pub fn find(&self, id: RegionId) -> Option<&RegionNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: RegionId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Ordered children of a region
    pub fn children_of(&self, id: RegionId) -> SplitResult<&[RegionId]> {
        self.nodes
            .get(&id)
            .map(|node| node.children_ids.as_slice())
            .ok_or(SplitError::NotFound(id))
    }

    /// Parent of a region, `None` for roots and unknown ids
    pub fn parent_of(&self, id: RegionId) -> Option<RegionId> {
        self.nodes.get(&id).and_then(|node| node.parent_id)
    }

    /// Other children of the same parent (other roots for a root)
    pub fn siblings_of(&self, id: RegionId) -> SplitResult<Vec<RegionId>> {
        let node = self.nodes.get(&id).ok_or(SplitError::NotFound(id))?;
        let siblings = match node.parent_id {
            Some(parent_id) => self.children_of(parent_id)?,
            None => self.roots.as_slice(),
        };
        Ok(siblings.iter().copied().filter(|&sibling| sibling != id).collect())
    }

    /// All descendant regions in depth-first pre-order
    pub fn descendants(&self, id: RegionId) -> Vec<RegionId> {
        let mut descendants = Vec::new();
        let mut to_visit: Vec<RegionId> = match self.nodes.get(&id) {
            Some(node) => node.children_ids.iter().rev().copied().collect(),
            None => return descendants,
        };

        while let Some(current) = to_visit.pop() {
            descendants.push(current);
            if let Some(node) = self.nodes.get(&current) {
                to_visit.extend(node.children_ids.iter().rev().copied());
            }
        }
        descendants
    }

    /// The region itself followed by its descendants
    pub fn subtree_ids(&self, id: RegionId) -> Vec<RegionId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut ids = vec![id];
        ids.extend(self.descendants(id));
        ids
    }

    /// Ancestors from the direct parent up to the root
    pub fn ancestors(&self, id: RegionId) -> Vec<RegionId> {
        let mut ancestors = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            ancestors.push(parent);
            current = parent;
        }
        ancestors
    }

    /// First region (in id order) with the given acronym
    pub fn find_by_acronym(&self, acronym: &str) -> Option<&RegionNode> {
        self.nodes.values().find(|node| node.acronym == acronym)
    }

    pub fn roots(&self) -> &[RegionId] {
        &self.roots
    }

    pub fn ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RegionNode> {
        self.nodes.values()
    }

    /// Largest id in use
    pub fn max_id(&self) -> Option<RegionId> {
        self.nodes.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Map key of every node, for checks that must see the raw arena
    pub(crate) fn entries(&self) -> impl Iterator<Item = (&RegionId, &RegionNode)> {
        self.nodes.iter()
    }

    fn check_insertable(&self, node: &RegionNode) -> SplitResult<()> {
        if node.id == BACKGROUND_ID {
            return Err(SplitError::InvalidHierarchy(
                "region id 0 is reserved for background voxels".to_string(),
            ));
        }
        if self.nodes.contains_key(&node.id) {
            return Err(SplitError::DuplicateId(node.id));
        }
        if !node.children_ids.is_empty() {
            return Err(SplitError::InvalidHierarchy(format!(
                "region {} must be inserted as a leaf, got children {:?}",
                node.id, node.children_ids
            )));
        }
        Ok(())
    }

    fn sibling_list_mut(&mut self, parent_id: Option<RegionId>) -> &mut Vec<RegionId> {
        match parent_id.and_then(|parent| self.nodes.get_mut(&parent)) {
            Some(parent) => &mut parent.children_ids,
            None => &mut self.roots,
        }
    }

    /// Shared implementation of the replace/nest edits.
    ///
    /// `keep_source = false`: `source` is removed and the new nodes take its slot.
    /// `keep_source = true`: the new nodes become the only children of `source`.
    fn splice(
        &mut self,
        source_id: RegionId,
        new_nodes: Vec<RegionNode>,
        adoptions: &[Adoption],
        keep_source: bool,
    ) -> SplitResult<()> {
        let source = self
            .nodes
            .get(&source_id)
            .ok_or(SplitError::NotFound(source_id))?;

        // Validate new ids
        let mut new_ids = BTreeSet::new();
        for node in &new_nodes {
            if node.id == BACKGROUND_ID {
                return Err(SplitError::InvalidHierarchy(
                    "region id 0 is reserved for background voxels".to_string(),
                ));
            }
            let reuses_source = !keep_source && node.id == source_id;
            if !new_ids.insert(node.id) || (self.nodes.contains_key(&node.id) && !reuses_source) {
                return Err(SplitError::DuplicateId(node.id));
            }
        }

        // Validate adoptions cover every current child exactly once
        let mut adopted: BTreeMap<RegionId, RegionId> = BTreeMap::new();
        for adoption in adoptions {
            if !source.children_ids.contains(&adoption.child) {
                return Err(SplitError::InvalidHierarchy(format!(
                    "region {} is not a child of {}",
                    adoption.child, source_id
                )));
            }
            if !new_ids.contains(&adoption.new_parent) {
                return Err(SplitError::InvalidHierarchy(format!(
                    "adoptive parent {} of region {} is not being inserted",
                    adoption.new_parent, adoption.child
                )));
            }
            if adopted.insert(adoption.child, adoption.new_parent).is_some() {
                return Err(SplitError::InvalidHierarchy(format!(
                    "region {} is adopted twice",
                    adoption.child
                )));
            }
        }
        if let Some(orphan) = source
            .children_ids
            .iter()
            .find(|child| !adopted.contains_key(child))
        {
            return Err(SplitError::HasChildren {
                id: source_id,
                children: vec![*orphan],
            });
        }

        // Everything checked: apply
        let former_children = source.children_ids.clone();
        let new_parent = if keep_source {
            Some(source_id)
        } else {
            source.parent_id
        };
        let inserted: Vec<RegionId> = new_nodes.iter().map(|node| node.id).collect();

        if keep_source {
            if let Some(source) = self.nodes.get_mut(&source_id) {
                source.children_ids = inserted.clone();
            }
        } else {
            let siblings = self.sibling_list_mut(new_parent);
            match siblings.iter().position(|&sibling| sibling == source_id) {
                Some(position) => {
                    siblings.splice(position..=position, inserted.iter().copied());
                }
                None => siblings.extend(inserted.iter().copied()),
            }
            self.nodes.remove(&source_id);
        }

        for mut node in new_nodes {
            node.parent_id = new_parent;
            node.children_ids = former_children
                .iter()
                .copied()
                .filter(|child| adopted.get(child) == Some(&node.id))
                .collect();
            self.nodes.insert(node.id, node);
        }
        for (child, parent) in adopted {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.parent_id = Some(parent);
            }
        }
        Ok(())
    }
}
