// SPDX-License-Identifier: AGPL-3.0-or-later
//! One-way analysis of variance.

use super::{validate_groups, within_sum_of_squares, Group};
use crate::error::{Error, Result};
use crate::special;

/// One-way ANOVA table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnovaTable {
    /// `MS_between / MS_within`.
    pub f_statistic: f64,
    /// Upper-tail probability of `f_statistic` under the F distribution.
    pub p_value: f64,
    /// `k − 1`.
    pub df_between: f64,
    /// `N − k`.
    pub df_within: f64,
    /// Between-group sum of squares.
    pub ss_between: f64,
    /// Within-group sum of squares.
    pub ss_within: f64,
    /// Within-group mean square (pooled variance).
    pub ms_within: f64,
}

/// Test equality of group means.
///
/// When every group is constant the within-group variance is zero: the
/// statistic is infinite (p = 0) if the means differ and NaN if they do
/// not.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for fewer than two groups, an empty or
/// non-finite group, or no within-group degrees of freedom (`N = k`).
#[allow(clippy::cast_precision_loss)]
pub fn one_way_anova(groups: &[Group]) -> Result<AnovaTable> {
    let (n, k) = validate_groups(groups)?;
    if n <= k {
        return Err(Error::InvalidInput(format!(
            "{n} observations in {k} groups leave no within-group degrees of freedom"
        )));
    }

    let grand_mean = groups.iter().flat_map(|g| &g.values).sum::<f64>() / n as f64;
    let ss_between: f64 = groups
        .iter()
        .map(|g| {
            let d = g.mean() - grand_mean;
            g.len() as f64 * d * d
        })
        .sum();
    let ss_within = within_sum_of_squares(groups);

    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    let ms_within = ss_within / df_within;
    let ms_between = ss_between / df_between;

    let (f_statistic, p_value) = if ms_within > 0.0 {
        let f = ms_between / ms_within;
        (f, special::f_sf(f, df_between, df_within))
    } else if ms_between > 0.0 {
        (f64::INFINITY, 0.0)
    } else {
        log::warn!("one-way ANOVA: all groups constant and equal; F is undefined");
        (f64::NAN, f64::NAN)
    };

    Ok(AnovaTable {
        f_statistic,
        p_value,
        df_between,
        df_within,
        ss_between,
        ss_within,
        ms_within,
    })
}
