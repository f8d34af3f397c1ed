// SPDX-License-Identifier: AGPL-3.0-or-later
//! Between-strain comparisons: one-way ANOVA and Tukey HSD.
//!
//! Each strain's measurements form a [`Group`]. [`anova::one_way_anova`]
//! tests whether any group mean differs; [`tukey::tukey_hsd`] then
//! compares every pair at a family-wise error rate.

pub mod anova;
pub mod tukey;

pub use anova::{one_way_anova, AnovaTable};
pub use tukey::{tukey_hsd, TukeyComparison};

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Measurements sharing one label.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Group label (strain name).
    pub name: String,
    /// Observations.
    pub values: Vec<f64>,
}

impl Group {
    /// Build a group from a label and observations.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Arithmetic mean; NaN when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if there are no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Group long-format `(label, value)` pairs by label, in sorted label order.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the slices differ in length.
pub fn groups_from_long<S: AsRef<str>>(labels: &[S], values: &[f64]) -> Result<Vec<Group>> {
    if labels.len() != values.len() {
        return Err(Error::InvalidInput(format!(
            "{} labels but {} values",
            labels.len(),
            values.len()
        )));
    }
    let mut by_name: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (label, &v) in labels.iter().zip(values) {
        by_name.entry(label.as_ref()).or_default().push(v);
    }
    Ok(by_name
        .into_iter()
        .map(|(name, values)| Group::new(name, values))
        .collect())
}

/// Checks shared by the ANOVA and Tukey tables; returns `(N, k)`.
pub(crate) fn validate_groups(groups: &[Group]) -> Result<(usize, usize)> {
    if groups.len() < 2 {
        return Err(Error::InvalidInput(format!(
            "need at least 2 groups, got {}",
            groups.len()
        )));
    }
    if let Some(g) = groups.iter().find(|g| g.is_empty()) {
        return Err(Error::InvalidInput(format!("group '{}' is empty", g.name)));
    }
    if let Some(g) = groups
        .iter()
        .find(|g| g.values.iter().any(|v| !v.is_finite()))
    {
        return Err(Error::InvalidInput(format!(
            "group '{}' has non-finite values",
            g.name
        )));
    }
    let n: usize = groups.iter().map(Group::len).sum();
    Ok((n, groups.len()))
}

/// Pooled within-group sum of squares.
pub(crate) fn within_sum_of_squares(groups: &[Group]) -> f64 {
    groups
        .iter()
        .map(|g| {
            let m = g.mean();
            g.values.iter().map(|v| (v - m) * (v - m)).sum::<f64>()
        })
        .sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn long_format_grouping_is_sorted() {
        let labels = ["WT", "dPQS", "WT", "comp", "dPQS"];
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let groups = groups_from_long(&labels, &values).unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["WT", "comp", "dPQS"]);
        assert_eq!(groups[0].values, vec![1.0, 3.0]);
        assert_eq!(groups[2].values, vec![2.0, 5.0]);
    }

    #[test]
    fn grouping_rejects_mismatch() {
        assert!(groups_from_long(&["a"], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn group_mean() {
        let g = Group::new("x", vec![1.0, 2.0, 6.0]);
        assert!((g.mean() - 3.0).abs() < f64::EPSILON);
        assert!(Group::new("e", vec![]).mean().is_nan());
    }

    #[test]
    fn group_validation() {
        let ok = vec![Group::new("a", vec![1.0]), Group::new("b", vec![2.0])];
        assert_eq!(validate_groups(&ok).unwrap(), (2, 2));
        assert!(validate_groups(&ok[..1]).is_err());
        let empty = vec![Group::new("a", vec![1.0]), Group::new("b", vec![])];
        assert!(validate_groups(&empty).is_err());
        let nan = vec![Group::new("a", vec![f64::NAN]), Group::new("b", vec![1.0])];
        assert!(validate_groups(&nan).is_err());
    }
}
