//! Error bound constants for the two-stage adaptive predicate filter.
//!
//! A predicate's fast stage evaluates the determinant with ordinary f64
//! arithmetic and compares `|det|` against `eps_p * permanent`, where
//! `permanent` is a positive bound on the roundoff of the fast evaluation
//! and `eps_p` is a constant derived from machine epsilon. If the fast
//! result is not certifiably correct, the predicate escalates to the exact
//! expansion stage in `predicates.rs`.
//!
//! The constants here are computed once, at first use, by the same
//! iterative-halving procedure used to derive machine epsilon itself,
//! rather than hardcoded as float literals — this is part of the predicate
//! contract (see spec §9): the exact bit pattern of `EPSILON` and the
//! derived `eps_p` values must match what the halving procedure produces on
//! the host, not an assumed IEEE-754 binary64 value baked in at compile
//! time.

use std::sync::OnceLock;

/// Computes machine epsilon for the current f64 implementation by iterative
/// halving until `1.0 + eps == 1.0`, then returns the last value for which
/// that was false. For IEEE-754 binary64 round-to-nearest-even this is
/// `2^-52`, but the procedure itself — not the expected numeric value — is
/// the contract.
fn compute_machine_epsilon() -> f64 {
    let mut eps = 1.0_f64;
    let mut check = 1.0 + eps;
    while check != 1.0 {
        eps *= 0.5;
        check = 1.0 + eps;
    }
    eps * 2.0
}

/// Machine epsilon for f64, computed once via iterative halving.
pub fn epsilon() -> f64 {
    static EPSILON: OnceLock<f64> = OnceLock::new();
    *EPSILON.get_or_init(compute_machine_epsilon)
}

/// Per-predicate fast-stage error bound constants, all derived from
/// [`epsilon()`] once at first use.
struct ErrorBounds {
    orient2d: f64,
    orient3d: f64,
    incircle: f64,
    insphere: f64,
    inorthosphere: f64,
}

fn compute_error_bounds() -> ErrorBounds {
    let eps = epsilon();
    ErrorBounds {
        orient2d: 4.0 * eps,
        orient3d: 8.0 * eps,
        incircle: 11.0 * eps,
        insphere: 17.0 * eps,
        inorthosphere: 19.0 * eps,
    }
}

fn bounds() -> &'static ErrorBounds {
    static BOUNDS: OnceLock<ErrorBounds> = OnceLock::new();
    BOUNDS.get_or_init(compute_error_bounds)
}

/// Fast-stage error bound multiplier for `orient2d`: `4 * epsilon()`.
pub fn orient2d_errbound() -> f64 {
    bounds().orient2d
}

/// Fast-stage error bound multiplier for `orient3d`: `8 * epsilon()`.
pub fn orient3d_errbound() -> f64 {
    bounds().orient3d
}

/// Fast-stage error bound multiplier for `incircle`: `11 * epsilon()`.
pub fn incircle_errbound() -> f64 {
    bounds().incircle
}

/// Fast-stage error bound multiplier for `insphere`: `17 * epsilon()`.
pub fn insphere_errbound() -> f64 {
    bounds().insphere
}

/// Fast-stage error bound multiplier for `inorthosphere`: `19 * epsilon()`.
pub fn inorthosphere_errbound() -> f64 {
    bounds().inorthosphere
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsilon_matches_f64_epsilon() {
        // The halving procedure should land on the same value as the
        // standard library's compile-time constant for a conforming
        // binary64 implementation.
        assert_eq!(epsilon(), f64::EPSILON);
    }

    #[test]
    fn test_epsilon_is_idempotent() {
        assert_eq!(epsilon(), epsilon());
    }

    #[test]
    fn test_error_bounds_strictly_increasing_by_predicate_complexity() {
        assert!(orient2d_errbound() < orient3d_errbound());
        assert!(orient3d_errbound() < incircle_errbound());
        assert!(incircle_errbound() < insphere_errbound());
        assert!(insphere_errbound() < inorthosphere_errbound());
    }

    #[test]
    fn test_error_bounds_positive_and_finite() {
        for b in [
            orient2d_errbound(),
            orient3d_errbound(),
            incircle_errbound(),
            insphere_errbound(),
            inorthosphere_errbound(),
        ] {
            assert!(b > 0.0);
            assert!(b.is_finite());
        }
    }
}
