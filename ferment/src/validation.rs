// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validation harness for baseline comparison.
//!
//! Used by validation binaries (`validate_cpc_batch`) to compare model
//! output against documented baseline values. Each check prints a
//! formatted pass/fail line with the actual value, the expected baseline,
//! and the tolerance applied.
//!
//! Every validation binary follows the same contract:
//! - Hardcoded expected values sourced from documented baseline runs
//! - Explicit pass/fail per check with human-readable output
//! - Exit code 0 = all passed, 1 = at least one failed
//!
//! Prefer the [`Validator`] struct over bare [`check`] calls; it tracks
//! pass/fail counts.

// ── Standalone helpers ────────────────────────────────────────

/// Compare `actual` against `expected` within absolute `tolerance`.
///
/// Prints a formatted `[OK]` or `[FAIL]` line and returns whether
/// the check passed. Tolerance of `0.0` requires exact match.
///
/// ```
/// use cpc_ferment::validation::check;
///
/// assert!(check("total product (kg)", 6.745, 6.745, 1e-12));
/// assert!(!check("deliberate fail", 2.0, 1.0, 0.5));
/// ```
#[must_use]
pub fn check(label: &str, actual: f64, expected: f64, tolerance: f64) -> bool {
    let pass = (actual - expected).abs() <= tolerance;
    let tag = if pass { "OK" } else { "FAIL" };
    println!("  [{tag}]  {label}: {actual:.6} (expected {expected:.6}, tol {tolerance:.6})");
    pass
}

/// Compare `actual` against `expected` within a tolerance relative to
/// `|expected|`.
///
/// ```
/// use cpc_ferment::validation::check_relative;
///
/// assert!(check_relative("final P", 562.048_001, 562.048, 1e-6));
/// assert!(!check_relative("final P", 563.0, 562.048, 1e-6));
/// ```
#[must_use]
pub fn check_relative(label: &str, actual: f64, expected: f64, rel_tol: f64) -> bool {
    let rel = (actual - expected).abs() / expected.abs().max(f64::MIN_POSITIVE);
    let pass = rel <= rel_tol;
    let tag = if pass { "OK" } else { "FAIL" };
    println!("  [{tag}]  {label}: {actual:.9} (expected {expected:.9}, rel {rel:.2e} <= {rel_tol:.0e})");
    pass
}

/// Compare an exact count.
///
/// ```
/// use cpc_ferment::validation::check_count;
///
/// assert!(check_count("grid points", 100, 100));
/// assert!(!check_count("mismatched", 10, 20));
/// ```
#[must_use]
pub fn check_count(label: &str, actual: usize, expected: usize) -> bool {
    let pass = actual == expected;
    let tag = if pass { "OK" } else { "FAIL" };
    println!("  [{tag}]  {label}: {actual} (expected {expected})");
    pass
}

/// Record a qualitative property.
#[must_use]
pub fn check_true(label: &str, condition: bool) -> bool {
    let tag = if condition { "OK" } else { "FAIL" };
    println!("  [{tag}]  {label}");
    condition
}

/// Print summary and return whether all checks passed.
#[must_use]
pub fn print_result(name: &str, passed: u32, total: u32) -> bool {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("  {name}: {passed}/{total} checks passed");
    if passed == total {
        println!("  RESULT: PASS");
    } else {
        println!("  RESULT: FAIL ({} checks failed)", total - passed);
    }
    println!("═══════════════════════════════════════════════════════════");
    passed == total
}

// ── Validator: structured check accumulator ───────────────────

/// Accumulated validation state.
///
/// # Examples
///
/// ```
/// use cpc_ferment::validation::Validator;
///
/// let mut v = Validator::new("doc-test");
/// v.check("pi", std::f64::consts::PI, 3.14159, 1e-4);
/// v.check_count("rows", 100, 100);
/// v.check_true("phase switched", true);
/// assert_eq!(v.counts(), (3, 3));
/// ```
pub struct Validator {
    name: String,
    passed: u32,
    total: u32,
}

impl Validator {
    /// Create a new validator for the given binary name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        println!("═══════════════════════════════════════════════════════════");
        println!("  {name}");
        println!("═══════════════════════════════════════════════════════════\n");
        Self {
            name,
            passed: 0,
            total: 0,
        }
    }

    /// Print a section header (no check counted).
    pub fn section(&self, label: &str) {
        println!("\n{label}");
    }

    fn record(&mut self, pass: bool) {
        self.total += 1;
        if pass {
            self.passed += 1;
        }
    }

    /// Check an f64 value against expected within absolute tolerance.
    pub fn check(&mut self, label: &str, actual: f64, expected: f64, tolerance: f64) {
        let pass = check(label, actual, expected, tolerance);
        self.record(pass);
    }

    /// Check an f64 value against expected within relative tolerance.
    pub fn check_relative(&mut self, label: &str, actual: f64, expected: f64, rel_tol: f64) {
        let pass = check_relative(label, actual, expected, rel_tol);
        self.record(pass);
    }

    /// Check an exact count.
    pub fn check_count(&mut self, label: &str, actual: usize, expected: usize) {
        let pass = check_count(label, actual, expected);
        self.record(pass);
    }

    /// Check a qualitative property.
    pub fn check_true(&mut self, label: &str, condition: bool) {
        let pass = check_true(label, condition);
        self.record(pass);
    }

    /// Count a fallible step: `Ok` passes, `Err` fails with its message.
    pub fn check_ok<T, E: std::fmt::Display>(
        &mut self,
        label: &str,
        result: Result<T, E>,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                self.record(check_true(label, true));
                Some(value)
            }
            Err(e) => {
                println!("  [FAIL]  {label}: {e}");
                self.record(false);
                None
            }
        }
    }

    /// Retrieve current (passed, total).
    #[must_use]
    pub const fn counts(&self) -> (u32, u32) {
        (self.passed, self.total)
    }

    /// Print summary and exit with 0 (pass) or 1 (fail).
    pub fn finish(self) -> ! {
        let ok = print_result(&self.name, self.passed, self.total);
        std::process::exit(i32::from(!ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(name: &str) -> Validator {
        Validator {
            name: String::from(name),
            passed: 0,
            total: 0,
        }
    }

    #[test]
    fn check_exact_match() {
        assert!(check("exact", 42.0, 42.0, 0.0));
    }

    #[test]
    fn check_within_tolerance() {
        assert!(check("close", 42.001, 42.0, 0.01));
    }

    #[test]
    fn check_outside_tolerance() {
        assert!(!check("far", 50.0, 42.0, 1.0));
    }

    #[test]
    fn relative_check_scales_with_magnitude() {
        assert!(check_relative("big", 1.000_000_5e6, 1e6, 1e-6));
        assert!(!check_relative("small", 1.1e-6, 1e-6, 1e-6));
        assert!(check_relative("zero", 0.0, 0.0, 0.0));
    }

    #[test]
    fn check_count_and_true() {
        assert!(check_count("exact", 42, 42));
        assert!(!check_count("diff", 42, 43));
        assert!(check_true("yes", true));
        assert!(!check_true("no", false));
    }

    #[test]
    fn print_result_pass_and_fail() {
        assert!(print_result("test", 3, 3));
        assert!(!print_result("test", 2, 3));
    }

    #[test]
    fn validator_accumulates() {
        let mut v = quiet("test");
        v.check("ok", 1.0, 1.0, 0.0);
        v.check("fail", 2.0, 1.0, 0.0);
        v.check_relative("rel ok", 100.0, 100.0, 1e-9);
        v.check_count("count_ok", 5, 5);
        v.check_count("count_fail", 4, 5);
        v.check_true("flag", true);
        assert_eq!(v.counts(), (4, 6));
    }

    #[test]
    fn validator_check_ok_passes_value_through() {
        let mut v = quiet("test");
        let ok: Result<u32, String> = Ok(7);
        assert_eq!(v.check_ok("run", ok), Some(7));
        let err: Result<u32, String> = Err("step size underflow".into());
        assert_eq!(v.check_ok("run", err), None);
        assert_eq!(v.counts(), (1, 2));
    }

    #[test]
    fn validator_section_does_not_count() {
        let v = Validator::new("sections");
        v.section("── some section ──");
        assert_eq!(v.counts(), (0, 0));
    }
}
