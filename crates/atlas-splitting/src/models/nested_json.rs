// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Conversion between [`HierarchyTree`] and the nested ontology JSON layout used by
the Allen Institute structure graph (`1.json`): every node is an object with
`id`, `name`, `acronym`, `parent_structure_id` and a `children` array, the whole
tree wrapped as `{"msg": [root]}`.

Reading and writing files stays with the caller; these functions work on
`serde_json::Value`.
*/

use serde_json::{Map, Value};

use super::hierarchy_tree::HierarchyTree;
use crate::types::{SplitError, SplitResult};
use atlas_structures::{RegionId, RegionNode};

/// Keys owned by the tree structure rather than stored as attributes
const STRUCTURAL_KEYS: &[&str] = &["id", "name", "acronym", "children", "parent_structure_id"];

impl HierarchyTree {
    /// Build a tree from nested ontology JSON.
    ///
    /// Accepts `{"msg": [roots...]}`, a single root object or an array of roots.
    pub fn from_nested_json(value: &Value) -> SplitResult<Self> {
        let roots: Vec<&Value> = match value {
            Value::Object(map) if map.contains_key("msg") => match map.get("msg") {
                Some(Value::Array(items)) => items.iter().collect(),
                _ => {
                    return Err(SplitError::InvalidHierarchy(
                        "\"msg\" must be an array of root regions".to_string(),
                    ))
                }
            },
            Value::Object(_) => vec![value],
            Value::Array(items) => items.iter().collect(),
            _ => {
                return Err(SplitError::InvalidHierarchy(
                    "expected an object or an array of regions".to_string(),
                ))
            }
        };

        let mut tree = HierarchyTree::new();
        let mut stack: Vec<(&Value, Option<RegionId>)> =
            roots.into_iter().rev().map(|root| (root, None)).collect();

        while let Some((json, parent_id)) = stack.pop() {
            let node = parse_node(json)?.with_parent(parent_id);
            let id = node.id;
            tree.insert(node)?;

            match json.get("children") {
                Some(Value::Array(children)) => {
                    stack.extend(children.iter().rev().map(|child| (child, Some(id))));
                }
                Some(Value::Null) | None => {}
                Some(other) => {
                    return Err(SplitError::InvalidHierarchy(format!(
                        "region {} has a non-array \"children\" value: {}",
                        id, other
                    )))
                }
            }
        }

        Ok(tree)
    }

    /// Serialize the tree as `{"msg": [roots...]}`
    pub fn to_nested_json(&self) -> Value {
        let roots: Vec<Value> = self
            .roots()
            .iter()
            .filter_map(|&root| self.node_to_json(root))
            .collect();
        serde_json::json!({ "msg": roots })
    }

    fn node_to_json(&self, id: RegionId) -> Option<Value> {
        let node = self.find(id)?;
        let mut map = node.attributes.clone();
        map.insert("id".to_string(), Value::from(node.id));
        map.insert("name".to_string(), Value::from(node.name.clone()));
        map.insert("acronym".to_string(), Value::from(node.acronym.clone()));
        map.insert(
            "parent_structure_id".to_string(),
            node.parent_id.map_or(Value::Null, Value::from),
        );
        let children: Vec<Value> = node
            .children_ids
            .iter()
            .filter_map(|&child| self.node_to_json(child))
            .collect();
        map.insert("children".to_string(), Value::Array(children));
        Some(Value::Object(map))
    }
}

fn parse_node(json: &Value) -> SplitResult<RegionNode> {
    let object = json.as_object().ok_or_else(|| {
        SplitError::InvalidHierarchy(format!("region entry is not an object: {}", json))
    })?;

    let id = object
        .get("id")
        .and_then(Value::as_u64)
        .and_then(|id| RegionId::try_from(id).ok())
        .ok_or_else(|| {
            SplitError::InvalidHierarchy(format!(
                "region entry has no valid \"id\": {:?}",
                object.get("id")
            ))
        })?;
    let name = string_field(object, "name", id)?;
    let acronym = string_field(object, "acronym", id)?;

    let attributes: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| !STRUCTURAL_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(RegionNode::new(id, name, acronym)?.with_attributes(attributes))
}

fn string_field(object: &Map<String, Value>, key: &str, id: RegionId) -> SplitResult<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SplitError::InvalidHierarchy(format!("region {} has no \"{}\"", id, key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn aibs_sample() -> Value {
        json!({
            "msg": [{
                "id": 997, "acronym": "root", "name": "root", "st_level": 0,
                "parent_structure_id": null,
                "children": [{
                    "id": 315, "acronym": "Isocortex", "name": "Isocortex",
                    "parent_structure_id": 997,
                    "children": [
                        {"id": 972, "acronym": "PL", "name": "Prelimbic area", "children": [
                            {"id": 171, "acronym": "PL1", "name": "Prelimbic area, layer 1", "children": []},
                            {"id": 304, "acronym": "PL2/3", "name": "Prelimbic area, layer 2/3",
                             "color_hex_triplet": "2FA850", "children": []}
                        ]}
                    ]
                }]
            }]
        })
    }

    #[test]
    fn test_from_nested_json() {
        let tree = HierarchyTree::from_nested_json(&aibs_sample()).unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.roots(), &[997]);
        assert_eq!(tree.children_of(972).unwrap(), &[171, 304]);
        assert_eq!(tree.parent_of(304), Some(972));

        let node = tree.find(304).unwrap();
        assert_eq!(node.attribute("color_hex_triplet"), Some(&json!("2FA850")));
        assert!(node.attribute("parent_structure_id").is_none());
        assert_eq!(tree.find_by_acronym("Isocortex").map(|n| n.id), Some(315));
    }

    #[test]
    fn test_round_trip_keeps_structure_and_attributes() {
        let tree = HierarchyTree::from_nested_json(&aibs_sample()).unwrap();
        let json = tree.to_nested_json();
        let root = &json["msg"][0];
        assert_eq!(root["id"], json!(997));
        assert_eq!(root["st_level"], json!(0));
        assert_eq!(root["parent_structure_id"], Value::Null);
        let pl23 = &root["children"][0]["children"][0]["children"][1];
        assert_eq!(pl23["acronym"], json!("PL2/3"));
        assert_eq!(pl23["parent_structure_id"], json!(972));

        let again = HierarchyTree::from_nested_json(&json).unwrap();
        assert_eq!(again, tree);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let value = json!({"id": 1, "name": "r", "acronym": "r", "children": [
            {"id": 2, "name": "a", "acronym": "a"},
            {"id": 2, "name": "b", "acronym": "b"}
        ]});
        assert_eq!(
            HierarchyTree::from_nested_json(&value),
            Err(SplitError::DuplicateId(2))
        );
    }

    #[test]
    fn test_missing_fields_rejected() {
        let value = json!({"id": 1, "acronym": "r"});
        assert!(matches!(
            HierarchyTree::from_nested_json(&value),
            Err(SplitError::InvalidHierarchy(_))
        ));
        let value = json!({"msg": "nope"});
        assert!(HierarchyTree::from_nested_json(&value).is_err());
    }
}
