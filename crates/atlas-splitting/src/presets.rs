// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Ready-made rule builders for the two classic Allen mouse atlas refinements:

- **Isocortex layer 2/3**: every leaf region whose acronym and name end in
  `2/3` is split into layer 2 and layer 3 children by relative cortical depth.
  Existing "…2"/"…3" sibling leaves give their ids to the new children.
- **Barrel columns**: the barrel-field layer region (e.g. `SSp-bfd4`) receives
  one child per barrel, selected by per-barrel masks, plus a septa child for
  the remaining voxels.
*/

use serde_json::{Map, Value};

use crate::models::HierarchyTree;
use crate::splitting::{Placement, SplitRule, SplitTarget};
use crate::types::{SplitError, SplitResult};
use atlas_structures::RegionNode;

pub use atlas_structures::mask_from_voxel_indices;

/// Mean thickness of mouse isocortex layer 2 (um)
pub const DEFAULT_L2_THICKNESS: f64 = 95.10;
/// Mean thickness of mouse isocortex layer 3 (um)
pub const DEFAULT_L3_THICKNESS: f64 = 225.3199;
/// Share of layer 2/3 depth occupied by layer 2
pub const DEFAULT_RATIO: f64 = DEFAULT_L2_THICKNESS / (DEFAULT_L2_THICKNESS + DEFAULT_L3_THICKNESS);

const LAYER_23_SUFFIX: &str = "2/3";

/// Name of the auxiliary mask read for `barrel`
pub fn barrel_mask_name(barrel: &str) -> String {
    format!("barrel:{}", barrel)
}

/// One rule per layer 2/3 leaf under the region with acronym `scope_acronym`.
///
/// `depth_field` names a scalar field holding the relative depth inside layer
/// 2/3 (0 at the layer 1 border, 1 at the layer 4 border). Voxels at depth
/// `<= thickness_ratio` become layer 2, deeper ones layer 3.
pub fn layer_23_rules(
    tree: &HierarchyTree,
    scope_acronym: &str,
    depth_field: &str,
    thickness_ratio: f64,
) -> SplitResult<Vec<SplitRule>> {
    if !(thickness_ratio > 0.0 && thickness_ratio < 1.0) {
        return Err(SplitError::InvalidRule(format!(
            "layer 2 thickness ratio {} is not inside (0, 1)",
            thickness_ratio
        )));
    }
    let scope = find_region(tree, scope_acronym)?;

    let rules = tree
        .descendants(scope.id)
        .into_iter()
        .filter_map(|id| tree.find(id))
        .filter(|node| {
            node.is_leaf()
                && node.acronym.ends_with(LAYER_23_SUFFIX)
                && node.name.ends_with(LAYER_23_SUFFIX)
        })
        .map(|node| {
            let acronym_stem = node.acronym.strip_suffix(LAYER_23_SUFFIX).unwrap_or(&node.acronym);
            let name_stem = node.name.strip_suffix(LAYER_23_SUFFIX).unwrap_or(&node.name);
            let attributes = child_attributes(node, false);

            let layer = |digit: &str, interval: String| SplitTarget {
                name: format!("{}{}", name_stem, digit),
                acronym: format!("{}{}", acronym_stem, digit),
                criterion_value: Some(interval),
                id: None,
                attributes: attributes.clone(),
            };

            SplitRule::threshold(node.id, depth_field)
                .with_target(layer("2", format!("<={}", thickness_ratio)))
                .with_target(layer("3", format!(">{}", thickness_ratio)))
                .with_placement(Placement::NestUnderSource)
                .with_reuse_existing_acronyms(true)
        })
        .collect();
    Ok(rules)
}

/// One mask rule introducing a child per barrel under `region_acronym`.
///
/// Barrel names are sorted and deduplicated; the mask for barrel `b` is read
/// from the auxiliary input [`barrel_mask_name`]`(b)`. Voxels outside every
/// barrel go to the trailing `{acronym}-septa` target.
pub fn barrel_rule<I, S>(
    tree: &HierarchyTree,
    region_acronym: &str,
    barrel_names: I,
) -> SplitResult<SplitRule>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let region = find_region(tree, region_acronym)?;
    let mut names: Vec<String> = barrel_names
        .into_iter()
        .map(|name| name.as_ref().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    names.sort();
    names.dedup();
    if names.is_empty() {
        return Err(SplitError::InvalidRule("no barrel names given".to_string()));
    }

    let attributes = child_attributes(region, true);
    let target = |acronym: String, name: String| SplitTarget {
        name,
        acronym,
        criterion_value: None,
        id: None,
        attributes: attributes.clone(),
    };

    let septa_index = names.len();
    let rule = SplitRule::masks(region.id, names.iter().map(|name| barrel_mask_name(name)))
        .with_targets(names.iter().map(|barrel| {
            target(
                format!("{}-{}", region.acronym, barrel),
                format!("{}, {} barrel", region.name, barrel),
            )
        }))
        .with_target(target(
            format!("{}-septa", region.acronym),
            format!("{}, septa", region.name),
        ))
        .with_default_target(septa_index)
        .with_placement(Placement::NestUnderSource);
    Ok(rule)
}

fn find_region<'a>(tree: &'a HierarchyTree, acronym: &str) -> SplitResult<&'a RegionNode> {
    tree.find_by_acronym(acronym).ok_or_else(|| {
        SplitError::InvalidRule(format!("no region with acronym '{}'", acronym))
    })
}

/// Source attributes for a new child one level down
fn child_attributes(source: &RegionNode, bump_graph_order: bool) -> Map<String, Value> {
    let mut attributes = source.attributes.clone();
    if let Some(level) = source.attribute("st_level").and_then(Value::as_i64) {
        attributes.insert("st_level".to_string(), Value::from(level + 1));
    }
    if bump_graph_order {
        if let Some(order) = source.attribute("graph_order").and_then(Value::as_i64) {
            attributes.insert("graph_order".to_string(), Value::from(order + 1));
        }
    }
    attributes
}
