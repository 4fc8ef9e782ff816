// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Declarative split rules.

A [`SplitRule`] names one source region, the ordered targets it is divided
into and the criterion that picks a target for every voxel. Rules are built
with the `with_*` methods (or deserialized from a [`SplitPlan`]) and are not
modified afterwards.
*/

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::criterion::ThresholdInterval;
use crate::types::{SplitError, SplitResult};
use atlas_structures::{RegionId, BACKGROUND_ID};

/// Axis used by hemisphere splits when none is given (medio-lateral in CCF)
pub const DEFAULT_HEMISPHERE_AXIS: usize = 2;

fn default_hemisphere_axis() -> usize {
    DEFAULT_HEMISPHERE_AXIS
}

/// How a voxel is mapped to a target index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "SCREAMING_SNAKE_CASE",
    try_from = "CriterionRepr"
)]
pub enum Criterion {
    /// First target whose `criterion_value` interval contains the scalar
    ThresholdOnScalarField,
    /// First target whose mask covers the voxel
    MaskVolume,
    /// Target 0 below the midline on `axis`, target 1 at or above it
    HemisphereSide {
        #[serde(default = "default_hemisphere_axis")]
        axis: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        midline: Option<f64>,
    },
}

impl Criterion {
    pub fn kind(&self) -> &'static str {
        match self {
            Criterion::ThresholdOnScalarField => "THRESHOLD_ON_SCALAR_FIELD",
            Criterion::MaskVolume => "MASK_VOLUME",
            Criterion::HemisphereSide { .. } => "HEMISPHERE_SIDE",
        }
    }
}

/// Accepts both `criterion = "MASK_VOLUME"` and the tagged table form
#[derive(Deserialize)]
#[serde(untagged)]
enum CriterionRepr {
    Bare(CriterionKind),
    Tagged(TaggedCriterion),
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum CriterionKind {
    ThresholdOnScalarField,
    MaskVolume,
    HemisphereSide,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
enum TaggedCriterion {
    ThresholdOnScalarField,
    MaskVolume,
    HemisphereSide {
        #[serde(default = "default_hemisphere_axis")]
        axis: usize,
        #[serde(default)]
        midline: Option<f64>,
    },
}

impl TryFrom<CriterionRepr> for Criterion {
    type Error = String;

    fn try_from(repr: CriterionRepr) -> Result<Self, Self::Error> {
        Ok(match repr {
            CriterionRepr::Bare(CriterionKind::ThresholdOnScalarField)
            | CriterionRepr::Tagged(TaggedCriterion::ThresholdOnScalarField) => {
                Criterion::ThresholdOnScalarField
            }
            CriterionRepr::Bare(CriterionKind::MaskVolume)
            | CriterionRepr::Tagged(TaggedCriterion::MaskVolume) => Criterion::MaskVolume,
            CriterionRepr::Bare(CriterionKind::HemisphereSide) => Criterion::HemisphereSide {
                axis: DEFAULT_HEMISPHERE_AXIS,
                midline: None,
            },
            CriterionRepr::Tagged(TaggedCriterion::HemisphereSide { axis, midline }) => {
                Criterion::HemisphereSide { axis, midline }
            }
        })
    }
}

/// Where the new regions go in the hierarchy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// The source is removed and the targets take its place under its parent
    #[default]
    ReplaceSource,
    /// The source stays (without voxels) and the targets become its children
    NestUnderSource,
}

/// One region a split produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitTarget {
    pub name: String,
    pub acronym: String,
    /// Threshold interval for scalar-field criteria, e.g. `"<0.5"` or `"[0, 1)"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criterion_value: Option<String>,
    /// Pinned id, allocated automatically when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RegionId>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl SplitTarget {
    pub fn new(name: impl Into<String>, acronym: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            acronym: acronym.into(),
            criterion_value: None,
            id: None,
            attributes: Map::new(),
        }
    }

    pub fn with_criterion_value(mut self, value: impl Into<String>) -> Self {
        self.criterion_value = Some(value.into());
        self
    }

    pub fn with_id(mut self, id: RegionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// A single splitting operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRule {
    source_id: RegionId,
    targets: Vec<SplitTarget>,
    criterion: Criterion,
    /// Names of auxiliary volumes the criterion reads
    #[serde(default)]
    criterion_inputs: Vec<String>,
    #[serde(default)]
    default_target_index: usize,
    #[serde(default)]
    placement: Placement,
    #[serde(default)]
    reuse_existing_acronyms: bool,
}

impl SplitRule {
    pub fn new(source_id: RegionId, criterion: Criterion) -> Self {
        Self {
            source_id,
            targets: Vec::new(),
            criterion,
            criterion_inputs: Vec::new(),
            default_target_index: 0,
            placement: Placement::ReplaceSource,
            reuse_existing_acronyms: false,
        }
    }

    /// Threshold rule reading the named scalar field
    pub fn threshold(source_id: RegionId, field: impl Into<String>) -> Self {
        Self::new(source_id, Criterion::ThresholdOnScalarField).with_criterion_input(field)
    }

    /// Mask rule, one mask per target in declared order
    pub fn masks<I, S>(source_id: RegionId, masks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rule = Self::new(source_id, Criterion::MaskVolume);
        rule.criterion_inputs = masks.into_iter().map(Into::into).collect();
        rule
    }

    /// Hemisphere rule; the midline defaults to the middle of the volume
    pub fn hemisphere(source_id: RegionId, axis: usize, midline: Option<f64>) -> Self {
        Self::new(source_id, Criterion::HemisphereSide { axis, midline })
    }

    pub fn with_target(mut self, target: SplitTarget) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_targets(mut self, targets: impl IntoIterator<Item = SplitTarget>) -> Self {
        self.targets.extend(targets);
        self
    }

    pub fn with_criterion_input(mut self, name: impl Into<String>) -> Self {
        self.criterion_inputs.push(name.into());
        self
    }

    pub fn with_default_target(mut self, index: usize) -> Self {
        self.default_target_index = index;
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_reuse_existing_acronyms(mut self, reuse: bool) -> Self {
        self.reuse_existing_acronyms = reuse;
        self
    }

    pub fn source_id(&self) -> RegionId {
        self.source_id
    }

    pub fn targets(&self) -> &[SplitTarget] {
        &self.targets
    }

    pub fn criterion(&self) -> &Criterion {
        &self.criterion
    }

    pub fn criterion_inputs(&self) -> &[String] {
        &self.criterion_inputs
    }

    pub fn default_target_index(&self) -> usize {
        self.default_target_index
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn reuse_existing_acronyms(&self) -> bool {
        self.reuse_existing_acronyms
    }

    /// Check the rule on its own, without looking at tree or volume.
    ///
    /// # Errors
    ///
    /// `InvalidRule` describing the first problem found
    pub fn validate(&self) -> SplitResult<()> {
        let invalid = |msg: String| Err(SplitError::InvalidRule(msg));
        let k = self.targets.len();

        if k == 0 {
            return invalid(format!("rule for region {} has no targets", self.source_id));
        }
        if self.default_target_index >= k {
            return invalid(format!(
                "default target index {} out of range for {} targets",
                self.default_target_index, k
            ));
        }

        let mut acronyms = BTreeSet::new();
        let mut pinned = BTreeSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return invalid("target with an empty name".to_string());
            }
            if !acronyms.insert(target.acronym.as_str()) {
                return invalid(format!("acronym '{}' used by two targets", target.acronym));
            }
            if let Some(id) = target.id {
                if id == BACKGROUND_ID || !pinned.insert(id) {
                    return invalid(format!("pinned id {} is reserved or repeated", id));
                }
            }
        }

        match &self.criterion {
            Criterion::ThresholdOnScalarField => {
                if self.criterion_inputs.len() != 1 {
                    return invalid(format!(
                        "threshold criterion reads exactly one scalar field, got {:?}",
                        self.criterion_inputs
                    ));
                }
                let mut any_interval = false;
                for target in &self.targets {
                    if let Some(value) = &target.criterion_value {
                        ThresholdInterval::parse(value)?;
                        any_interval = true;
                    }
                }
                if !any_interval {
                    return invalid("no target carries a criterion_value".to_string());
                }
            }
            Criterion::MaskVolume => {
                if self.criterion_inputs.is_empty() || self.criterion_inputs.len() > k {
                    return invalid(format!(
                        "mask criterion needs between 1 and {} masks, got {}",
                        k,
                        self.criterion_inputs.len()
                    ));
                }
            }
            Criterion::HemisphereSide { axis, midline } => {
                if k != 2 {
                    return invalid(format!("hemisphere split needs exactly 2 targets, got {}", k));
                }
                if *axis > 2 {
                    return invalid(format!("hemisphere axis {} is not 0, 1 or 2", axis));
                }
                if midline.is_some_and(|m| !m.is_finite()) {
                    return invalid("hemisphere midline must be finite".to_string());
                }
            }
        }
        Ok(())
    }
}

/// An ordered list of rules in their configuration form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitPlan {
    #[serde(default)]
    pub rules: Vec<SplitRule>,
}

impl SplitPlan {
    pub fn new(rules: Vec<SplitRule>) -> Self {
        Self { rules }
    }

    /// Parse `[[rules]]` tables and validate every rule
    pub fn from_toml_str(content: &str) -> SplitResult<Self> {
        let plan: SplitPlan = toml::from_str(content)
            .map_err(|e| SplitError::InvalidRule(format!("cannot parse rule plan: {}", e)))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Parse `{"rules": [...]}` or a bare array of rules and validate every rule
    pub fn from_json_value(value: &serde_json::Value) -> SplitResult<Self> {
        let plan = match value {
            Value::Array(_) => SplitPlan {
                rules: serde_json::from_value(value.clone()).map_err(|e| {
                    SplitError::InvalidRule(format!("cannot parse rule plan: {}", e))
                })?,
            },
            _ => serde_json::from_value(value.clone())
                .map_err(|e| SplitError::InvalidRule(format!("cannot parse rule plan: {}", e)))?,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Validate every rule, naming the index of the first invalid one
    pub fn validate(&self) -> SplitResult<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            rule.validate().map_err(|err| {
                SplitError::InvalidRule(format!("rule #{}: {}", index, err))
            })?;
        }
        Ok(())
    }

    pub fn rules(&self) -> &[SplitRule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<SplitRule> {
        self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_way_threshold() -> SplitRule {
        SplitRule::threshold(5, "depth")
            .with_target(SplitTarget::new("A", "A").with_criterion_value("<0.5"))
            .with_target(SplitTarget::new("B", "B").with_criterion_value(">=0.5"))
    }

    #[test]
    fn test_valid_threshold_rule() {
        let rule = two_way_threshold();
        assert!(rule.validate().is_ok());
        assert_eq!(rule.placement(), Placement::ReplaceSource);
        assert_eq!(rule.criterion().kind(), "THRESHOLD_ON_SCALAR_FIELD");
    }

    #[test]
    fn test_invalid_rules() {
        assert!(SplitRule::threshold(5, "depth").validate().is_err());
        assert!(two_way_threshold().with_default_target(2).validate().is_err());
        assert!(two_way_threshold()
            .with_criterion_input("extra")
            .validate()
            .is_err());

        let bad_interval = SplitRule::threshold(5, "depth")
            .with_target(SplitTarget::new("A", "A").with_criterion_value("between 1 and 2"));
        assert!(bad_interval.validate().is_err());

        let same_acronym = SplitRule::threshold(5, "depth")
            .with_target(SplitTarget::new("A", "X").with_criterion_value("<1"))
            .with_target(SplitTarget::new("B", "X").with_criterion_value(">=1"));
        assert!(same_acronym.validate().is_err());

        let hemisphere = SplitRule::hemisphere(5, 2, None).with_target(SplitTarget::new("L", "L"));
        assert!(hemisphere.validate().is_err());

        let too_many_masks = SplitRule::masks(5, ["a", "b"]).with_target(SplitTarget::new("A", "A"));
        assert!(too_many_masks.validate().is_err());
    }

    #[test]
    fn test_plan_from_toml() {
        let plan = SplitPlan::from_toml_str(
            r#"
            [[rules]]
            source_id = 5
            criterion = "THRESHOLD_ON_SCALAR_FIELD"
            criterion_inputs = ["depth"]
            default_target_index = 1
            placement = "nest_under_source"

            [[rules.targets]]
            name = "A"
            acronym = "A"
            criterion_value = "<0.5"

            [[rules.targets]]
            name = "B"
            acronym = "B"
            criterion_value = ">=0.5"
            id = 102

            [[rules]]
            source_id = 7
            criterion = { kind = "HEMISPHERE_SIDE", axis = 0, midline = 3.5 }
            targets = [{ name = "left", acronym = "L" }, { name = "right", acronym = "R" }]
            "#,
        )
        .unwrap();

        assert_eq!(plan.len(), 2);
        let first = &plan.rules()[0];
        assert_eq!(first.default_target_index(), 1);
        assert_eq!(first.placement(), Placement::NestUnderSource);
        assert_eq!(first.targets()[1].id, Some(102));
        assert_eq!(
            plan.rules()[1].criterion(),
            &Criterion::HemisphereSide {
                axis: 0,
                midline: Some(3.5)
            }
        );
    }

    #[test]
    fn test_plan_reports_invalid_rule_index() {
        let value = json!([
            {"source_id": 5, "criterion": "MASK_VOLUME", "criterion_inputs": ["m"],
             "targets": [{"name": "A", "acronym": "A"}]},
            {"source_id": 6, "criterion": "MASK_VOLUME", "criterion_inputs": [],
             "targets": [{"name": "A", "acronym": "A"}]}
        ]);
        match SplitPlan::from_json_value(&value) {
            Err(SplitError::InvalidRule(msg)) => assert!(msg.starts_with("rule #1:")),
            other => panic!("expected invalid rule, got {:?}", other),
        }
    }

    #[test]
    fn test_criterion_serde_forms() {
        let tagged: Criterion = serde_json::from_value(json!({"kind": "HEMISPHERE_SIDE"})).unwrap();
        assert_eq!(
            tagged,
            Criterion::HemisphereSide {
                axis: DEFAULT_HEMISPHERE_AXIS,
                midline: None
            }
        );
        let bare: Criterion = serde_json::from_value(json!("MASK_VOLUME")).unwrap();
        assert_eq!(bare, Criterion::MaskVolume);
        assert!(serde_json::from_value::<Criterion>(json!("GRADIENT")).is_err());

        let rule = two_way_threshold();
        let back: SplitRule = serde_json::from_value(serde_json::to_value(&rule).unwrap()).unwrap();
        assert_eq!(back, rule);
    }
}
