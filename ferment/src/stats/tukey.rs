// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tukey's honestly significant difference test.
//!
//! All pairwise mean differences with Tukey–Kramer standard errors, so
//! unequal group sizes are handled. p-values come from the studentized
//! range distribution with `k` groups and `N − k` degrees of freedom;
//! confidence intervals use its `1 − alpha` quantile.

use super::{validate_groups, within_sum_of_squares, Group};
use crate::error::{Error, Result};
use crate::special;

/// One pairwise comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct TukeyComparison {
    /// First group label.
    pub group1: String,
    /// Second group label.
    pub group2: String,
    /// `mean(group2) − mean(group1)`.
    pub mean_diff: f64,
    /// Family-wise adjusted p-value.
    pub p_adj: f64,
    /// Lower simultaneous confidence bound on `mean_diff`.
    pub lower: f64,
    /// Upper simultaneous confidence bound on `mean_diff`.
    pub upper: f64,
    /// `true` if the interval excludes zero.
    pub reject: bool,
}

/// Compare every pair of groups, in input order (`i < j`).
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for fewer than two groups, empty or
/// non-finite groups, `alpha` outside `(0, 1)`, or fewer than two
/// within-group degrees of freedom. Returns [`Error::NumericalFailure`]
/// when the pooled variance is zero or the studentized range quantile
/// cannot be bracketed.
#[allow(clippy::cast_precision_loss)]
pub fn tukey_hsd(groups: &[Group], alpha: f64) -> Result<Vec<TukeyComparison>> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(Error::InvalidInput(format!("alpha must be in (0, 1), got {alpha}")));
    }
    let (n, k) = validate_groups(groups)?;
    if n < k + 2 {
        return Err(Error::InvalidInput(format!(
            "{n} observations in {k} groups: need at least 2 within-group degrees of freedom"
        )));
    }

    let df = (n - k) as f64;
    let k_f = k as f64;
    let ms_within = within_sum_of_squares(groups) / df;
    if ms_within <= 0.0 {
        return Err(Error::NumericalFailure(
            "pooled within-group variance is zero".into(),
        ));
    }
    let q_crit = special::qtukey(1.0 - alpha, k_f, df);
    if !q_crit.is_finite() {
        return Err(Error::NumericalFailure(format!(
            "no studentized range quantile for k = {k}, df = {df}"
        )));
    }

    let means: Vec<f64> = groups.iter().map(Group::mean).collect();
    let mut out = Vec::with_capacity(k * (k - 1) / 2);
    for i in 0..k {
        for j in i + 1..k {
            let mean_diff = means[j] - means[i];
            let n_i = groups[i].len() as f64;
            let n_j = groups[j].len() as f64;
            let se = (0.5 * ms_within * (1.0 / n_i + 1.0 / n_j)).sqrt();
            let q = mean_diff.abs() / se;
            let p_adj = (1.0 - special::ptukey(q, k_f, df)).clamp(0.0, 1.0);
            let half_width = q_crit * se;
            out.push(TukeyComparison {
                group1: groups[i].name.clone(),
                group2: groups[j].name.clone(),
                mean_diff,
                p_adj,
                lower: mean_diff - half_width,
                upper: mean_diff + half_width,
                reject: mean_diff.abs() > half_width,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn three_groups() -> Vec<Group> {
        vec![
            Group::new("g0", vec![24.5, 23.5, 26.4, 27.1, 29.9]),
            Group::new("g1", vec![28.4, 34.2, 29.5, 32.2, 30.1]),
            Group::new("g2", vec![26.1, 28.3, 24.3, 26.2, 27.8]),
        ]
    }

    #[test]
    fn textbook_three_group_table() {
        let res = tukey_hsd(&three_groups(), 0.05).unwrap();
        assert_eq!(res.len(), 3);

        let expected = [
            ("g0", "g1", 4.60, 0.014, 0.951, 8.249, true),
            ("g0", "g2", 0.26, 0.980, -3.389, 3.909, false),
            ("g1", "g2", -4.34, 0.020, -7.989, -0.691, true),
        ];
        for (row, (g1, g2, diff, p, lo, hi, reject)) in res.iter().zip(expected) {
            assert_eq!(row.group1, g1);
            assert_eq!(row.group2, g2);
            assert!((row.mean_diff - diff).abs() < 1e-9, "{row:?}");
            assert!((row.p_adj - p).abs() < 1e-3, "{row:?}");
            assert!((row.lower - lo).abs() < 2e-3, "{row:?}");
            assert!((row.upper - hi).abs() < 2e-3, "{row:?}");
            assert_eq!(row.reject, reject);
        }
    }

    #[test]
    fn rejection_agrees_with_p_value() {
        for row in tukey_hsd(&three_groups(), 0.05).unwrap() {
            assert_eq!(row.reject, row.p_adj < 0.05, "{row:?}");
            assert!(row.lower < row.mean_diff && row.mean_diff < row.upper);
        }
    }

    #[test]
    fn unequal_sizes_widen_intervals() {
        let mut groups = three_groups();
        groups[2].values.truncate(3);
        let res = tukey_hsd(&groups, 0.05).unwrap();
        let width = |r: &TukeyComparison| r.upper - r.lower;
        assert!(width(&res[1]) > width(&res[0]));
        assert!((width(&res[1]) - width(&res[2])).abs() < 1e-12);
    }

    #[test]
    fn stricter_alpha_widens_intervals() {
        let loose = tukey_hsd(&three_groups(), 0.10).unwrap();
        let strict = tukey_hsd(&three_groups(), 0.01).unwrap();
        for (a, b) in loose.iter().zip(&strict) {
            assert!(b.upper - b.lower > a.upper - a.lower);
            assert!((a.p_adj - b.p_adj).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn invalid_requests() {
        assert!(tukey_hsd(&three_groups(), 0.0).is_err());
        assert!(tukey_hsd(&three_groups(), 1.5).is_err());
        let tiny = vec![Group::new("a", vec![1.0, 2.0]), Group::new("b", vec![3.0])];
        assert!(matches!(tukey_hsd(&tiny, 0.05), Err(Error::InvalidInput(_))));
        let flat = vec![Group::new("a", vec![1.0, 1.0]), Group::new("b", vec![2.0, 2.0])];
        assert!(matches!(tukey_hsd(&flat, 0.05), Err(Error::NumericalFailure(_))));
    }
}
