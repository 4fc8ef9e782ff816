// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Criterion evaluation.

A rule's criterion is resolved once against the auxiliary inputs into a
[`VoxelClassifier`], which is then evaluated independently for every selected
voxel (and therefore safely from several rayon workers).
*/

use ndarray::ArrayView3;
use std::fmt;
use std::ops::Bound;

use super::rule::{Criterion, SplitRule};
use crate::types::{SplitError, SplitResult};
use atlas_structures::{AuxiliaryInputs, AuxiliaryVolume, VoxelCoord};

/// Outcome of classifying one voxel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Target(usize),
    /// The criterion input gives no answer for this voxel
    Undefined,
}

/// Maps a voxel to a target index
pub trait VoxelClassifier: Sync {
    fn classify(&self, coord: VoxelCoord) -> Classification;
}

/// A scalar interval parsed from a target's `criterion_value`.
///
/// Accepted forms: `<a`, `<=a`, `>a`, `>=a`, `[a, b)`, `(a, b]`, `[a, b]`,
/// `(a, b)` and `*` for any defined value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdInterval {
    lower: Bound<f64>,
    upper: Bound<f64>,
}

impl ThresholdInterval {
    pub const ANY: ThresholdInterval = ThresholdInterval {
        lower: Bound::Unbounded,
        upper: Bound::Unbounded,
    };

    pub fn new(lower: Bound<f64>, upper: Bound<f64>) -> Self {
        Self { lower, upper }
    }

    pub fn parse(text: &str) -> SplitResult<Self> {
        let text = text.trim();
        let invalid =
            || SplitError::InvalidRule(format!("cannot parse criterion value '{}'", text));
        let number = |s: &str| -> SplitResult<f64> {
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| !v.is_nan())
                .ok_or_else(invalid)
        };

        if text == "*" {
            return Ok(Self::ANY);
        }
        let interval = if let Some(rest) = text.strip_prefix("<=") {
            Self::new(Bound::Unbounded, Bound::Included(number(rest)?))
        } else if let Some(rest) = text.strip_prefix('<') {
            Self::new(Bound::Unbounded, Bound::Excluded(number(rest)?))
        } else if let Some(rest) = text.strip_prefix(">=") {
            Self::new(Bound::Included(number(rest)?), Bound::Unbounded)
        } else if let Some(rest) = text.strip_prefix('>') {
            Self::new(Bound::Excluded(number(rest)?), Bound::Unbounded)
        } else {
            let mut chars = text.chars();
            let open = chars.next().ok_or_else(invalid)?;
            let close = chars.next_back().ok_or_else(invalid)?;
            let (low, high) = chars.as_str().split_once(',').ok_or_else(invalid)?;
            let (low, high) = (number(low)?, number(high)?);
            if low > high {
                return Err(invalid());
            }
            let lower = match open {
                '[' => Bound::Included(low),
                '(' => Bound::Excluded(low),
                _ => return Err(invalid()),
            };
            let upper = match close {
                ']' => Bound::Included(high),
                ')' => Bound::Excluded(high),
                _ => return Err(invalid()),
            };
            Self::new(lower, upper)
        };
        Ok(interval)
    }

    /// NaN is never contained
    pub fn contains(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        let above = match self.lower {
            Bound::Included(low) => value >= low,
            Bound::Excluded(low) => value > low,
            Bound::Unbounded => true,
        };
        let below = match self.upper {
            Bound::Included(high) => value <= high,
            Bound::Excluded(high) => value < high,
            Bound::Unbounded => true,
        };
        above && below
    }
}

impl fmt::Display for ThresholdInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.lower, self.upper) {
            (Bound::Unbounded, Bound::Unbounded) => write!(f, "*"),
            (Bound::Unbounded, Bound::Included(b)) => write!(f, "<={}", b),
            (Bound::Unbounded, Bound::Excluded(b)) => write!(f, "<{}", b),
            (Bound::Included(a), Bound::Unbounded) => write!(f, ">={}", a),
            (Bound::Excluded(a), Bound::Unbounded) => write!(f, ">{}", a),
            (lower, upper) => {
                match lower {
                    Bound::Included(a) => write!(f, "[{}, ", a)?,
                    Bound::Excluded(a) => write!(f, "({}, ", a)?,
                    Bound::Unbounded => write!(f, "(-inf, ")?,
                }
                match upper {
                    Bound::Included(b) => write!(f, "{}]", b),
                    Bound::Excluded(b) => write!(f, "{})", b),
                    Bound::Unbounded => write!(f, "inf)"),
                }
            }
        }
    }
}

/// First target whose interval contains the scalar at the voxel
pub struct ScalarThresholdClassifier<'a> {
    field: ArrayView3<'a, f32>,
    intervals: Vec<Option<ThresholdInterval>>,
}

impl<'a> ScalarThresholdClassifier<'a> {
    pub fn new(field: ArrayView3<'a, f32>, intervals: Vec<Option<ThresholdInterval>>) -> Self {
        Self { field, intervals }
    }
}

impl VoxelClassifier for ScalarThresholdClassifier<'_> {
    fn classify(&self, coord: VoxelCoord) -> Classification {
        let value = match self.field.get(coord.as_index()) {
            Some(&value) => f64::from(value),
            None => return Classification::Undefined,
        };
        self.intervals
            .iter()
            .position(|interval| interval.as_ref().is_some_and(|i| i.contains(value)))
            .map_or(Classification::Undefined, Classification::Target)
    }
}

/// First target (in declared order) whose mask covers the voxel
pub struct MaskClassifier<'a> {
    masks: Vec<ArrayView3<'a, bool>>,
}

impl<'a> MaskClassifier<'a> {
    pub fn new(masks: Vec<ArrayView3<'a, bool>>) -> Self {
        Self { masks }
    }
}

impl VoxelClassifier for MaskClassifier<'_> {
    fn classify(&self, coord: VoxelCoord) -> Classification {
        let index = coord.as_index();
        self.masks
            .iter()
            .position(|mask| mask.get(index).copied().unwrap_or(false))
            .map_or(Classification::Undefined, Classification::Target)
    }
}

/// Target 0 for voxel centres below the midline, target 1 otherwise
#[derive(Debug, Clone, Copy)]
pub struct HemisphereClassifier {
    axis: usize,
    midline: f64,
}

impl HemisphereClassifier {
    pub fn new(axis: usize, midline: f64) -> Self {
        Self { axis, midline }
    }
}

impl VoxelClassifier for HemisphereClassifier {
    fn classify(&self, coord: VoxelCoord) -> Classification {
        match coord.axis(self.axis) {
            Some(position) if (position as f64) + 0.5 < self.midline => Classification::Target(0),
            Some(_) => Classification::Target(1),
            None => Classification::Undefined,
        }
    }
}

/// Bind a rule's criterion to its auxiliary inputs.
///
/// # Errors
///
/// - `UndefinedCriterionInput` if an input is missing, has the wrong kind or
///   does not match the annotation shape
/// - `InvalidRule` if a threshold cannot be parsed
pub fn resolve_classifier<'a>(
    rule: &SplitRule,
    inputs: &'a AuxiliaryInputs,
    shape: [usize; 3],
) -> SplitResult<Box<dyn VoxelClassifier + 'a>> {
    match rule.criterion() {
        Criterion::ThresholdOnScalarField => {
            let name = rule.criterion_inputs().first().ok_or_else(|| {
                SplitError::InvalidRule("threshold criterion without a scalar field".to_string())
            })?;
            let field = match lookup(inputs, name, shape)? {
                AuxiliaryVolume::Scalar(values) => values.view(),
                AuxiliaryVolume::Mask(_) => {
                    return Err(SplitError::UndefinedCriterionInput(format!(
                        "'{}' is a mask, a scalar field is required",
                        name
                    )))
                }
            };
            let intervals = rule
                .targets()
                .iter()
                .map(|target| {
                    target
                        .criterion_value
                        .as_deref()
                        .map(ThresholdInterval::parse)
                        .transpose()
                })
                .collect::<SplitResult<Vec<_>>>()?;
            Ok(Box::new(ScalarThresholdClassifier::new(field, intervals)))
        }
        Criterion::MaskVolume => {
            let masks = rule
                .criterion_inputs()
                .iter()
                .map(|name| match lookup(inputs, name, shape)? {
                    AuxiliaryVolume::Mask(values) => Ok(values.view()),
                    AuxiliaryVolume::Scalar(_) => Err(SplitError::UndefinedCriterionInput(
                        format!("'{}' is a scalar field, a mask is required", name),
                    )),
                })
                .collect::<SplitResult<Vec<_>>>()?;
            Ok(Box::new(MaskClassifier::new(masks)))
        }
        Criterion::HemisphereSide { axis, midline } => {
            let extent = shape.get(*axis).ok_or_else(|| {
                SplitError::InvalidRule(format!("hemisphere axis {} is not 0, 1 or 2", axis))
            })?;
            let midline = midline.unwrap_or(*extent as f64 / 2.0);
            Ok(Box::new(HemisphereClassifier::new(*axis, midline)))
        }
    }
}

fn lookup<'a>(
    inputs: &'a AuxiliaryInputs,
    name: &str,
    shape: [usize; 3],
) -> SplitResult<&'a AuxiliaryVolume> {
    let volume = inputs.get(name).ok_or_else(|| {
        SplitError::UndefinedCriterionInput(format!("auxiliary input '{}' was not supplied", name))
    })?;
    if volume.shape() != shape {
        return Err(SplitError::UndefinedCriterionInput(format!(
            "auxiliary input '{}' has shape {:?}, annotation has {:?}",
            name,
            volume.shape(),
            shape
        )));
    }
    Ok(volume)
}
