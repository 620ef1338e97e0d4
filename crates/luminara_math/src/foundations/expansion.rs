//! Multi-precision floating-point expansion arithmetic.
//!
//! Represents a sum of non-overlapping f64 values for exact arithmetic.
//!
//! This module implements the error-free transforms (EFTs) that are the
//! building blocks of exact geometric predicates, following Shewchuk's
//! adaptive precision scheme. All routines are written so that no compiler
//! is free to fuse the arithmetic into a fused multiply-add: `two_product`
//! uses the classic Veltkamp split rather than `f64::mul_add`, so the exact
//! stage of a predicate gives the same answer whether or not the target has
//! hardware FMA.
//!
//! # References
//!
//! - Shewchuk, J. R. (1997). Adaptive Precision Floating-Point Arithmetic and
//!   Fast Robust Geometric Predicates. Discrete & Computational Geometry, 18(3), 305-363.
//! - Knuth, D. E. (1997). The Art of Computer Programming, Volume 2 (3rd ed.).

use smallvec::SmallVec;

/// Error-free transformation for addition: `a + b = x + y` exactly, `x = fl(a+b)`.
#[inline(always)]
pub fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let x = a + b;
    let v = x - a;
    let y = (a - (x - v)) + (b - v);
    (x, y)
}

/// Error-free transformation for addition, requiring `|a| >= |b|`.
///
/// Cheaper than [`two_sum`] when the magnitude ordering is already known,
/// e.g. the running carry in an expansion grow/scale step.
#[inline(always)]
pub fn two_sum_fast(a: f64, b: f64) -> (f64, f64) {
    let x = a + b;
    let y = b - (x - a);
    (x, y)
}

/// Error-free transformation for subtraction: `a - b = x + y` exactly.
#[inline(always)]
pub fn two_diff(a: f64, b: f64) -> (f64, f64) {
    let x = a - b;
    let v = x - a;
    let y = (a - (x - v)) - (b + v);
    (x, y)
}

/// Splitter constant `2^ceil(p/2) + 1` for `p = 53` significant bits of `f64`.
const SPLITTER: f64 = 134_217_729.0; // 2^27 + 1

/// Splits `a` into a high part and low part, each with at most 26 significant
/// bits, such that `a = hi + lo` exactly.
#[inline(always)]
pub fn split(a: f64) -> (f64, f64) {
    let c = SPLITTER * a;
    let abig = c - a;
    let hi = c - abig;
    let lo = a - hi;
    (hi, lo)
}

/// Error-free transformation for multiplication: `a * b = x + y` exactly,
/// `x = fl(a*b)`. Uses the split-based algorithm so the result does not
/// depend on whether the target has a hardware FMA instruction.
#[inline(always)]
pub fn two_product(a: f64, b: f64) -> (f64, f64) {
    let x = a * b;
    let (ahi, alo) = split(a);
    let (bhi, blo) = split(b);
    two_product_tail(a, ahi, alo, b, bhi, blo, x)
}

/// [`two_product`] variant where `a` has already been split, avoiding
/// redundant splitting when the same operand is reused across several
/// products (as happens inside the lifted-coordinate predicates).
#[inline(always)]
pub fn two_product_presplit(a: f64, ahi: f64, alo: f64, b: f64) -> (f64, f64) {
    let x = a * b;
    let (bhi, blo) = split(b);
    two_product_tail(a, ahi, alo, b, bhi, blo, x)
}

#[inline(always)]
fn two_product_tail(_a: f64, ahi: f64, alo: f64, _b: f64, bhi: f64, blo: f64, x: f64) -> (f64, f64) {
    let err1 = x - (ahi * bhi);
    let err2 = err1 - (alo * bhi);
    let err3 = err2 - (ahi * blo);
    let y = (alo * blo) - err3;
    (x, y)
}

/// Multiplies two 2-component expansions `(a1,a0)` and `(b1,b0)` (each a
/// valid nonoverlapping pair, e.g. the `(hi, lo)` returned by
/// [`two_product`]) into an 8-component nonoverlapping expansion in
/// increasing order of magnitude, with zero components eliminated.
pub fn two_two_product(a1: f64, a0: f64, b1: f64, b0: f64) -> SmallVec<[f64; 8]> {
    let ea = Expansion::from_f64(a1).grow(a0);
    let eb = Expansion::from_f64(b1).grow(b0);
    let product = ea.mul(&eb);
    let mut out = SmallVec::new();
    out.extend_from_slice(product.terms());
    out
}

/// Compresses a sequence of expansion terms (not necessarily in increasing
/// order of magnitude, and possibly overlapping) into the canonical
/// nonoverlapping, zero-eliminated, increasing-magnitude form, using
/// repeated two-sum passes (Shewchuk's `grow_expansion` applied term by
/// term starting from zero).
pub fn expansion_sum_zero_elim_fast(terms: &[f64]) -> SmallVec<[f64; 32]> {
    let mut out: SmallVec<[f64; 32]> = SmallVec::new();
    let mut q = 0.0;
    for &t in terms {
        if t == 0.0 {
            continue;
        }
        let (sum, err) = two_sum(q, t);
        if err != 0.0 {
            out.push(err);
        }
        q = sum;
    }
    if q != 0.0 || out.is_empty() {
        out.push(q);
    }
    out
}

/// Scales a nonoverlapping expansion by a scalar, eliminating zero terms,
/// using Shewchuk's Scale-Expansion algorithm.
pub fn scale_expansion_zero_elim(terms: &[f64], scalar: f64) -> SmallVec<[f64; 64]> {
    let mut out: SmallVec<[f64; 64]> = SmallVec::new();
    if scalar == 0.0 || terms.is_empty() {
        return out;
    }

    let mut iter = terms.iter();
    let (mut q, h0) = two_product(*iter.next().unwrap(), scalar);
    if h0 != 0.0 {
        out.push(h0);
    }

    for &t in iter {
        let (t_hi, t_lo) = two_product(t, scalar);
        let (sum1, err1) = two_sum(q, t_lo);
        if err1 != 0.0 {
            out.push(err1);
        }
        let (sum2, err2) = two_sum_fast(t_hi, sum1);
        if err2 != 0.0 {
            out.push(err2);
        }
        q = sum2;
    }

    if q != 0.0 || out.is_empty() {
        out.push(q);
    }
    out
}


/// Multi-precision floating-point expansion.
///
/// Represents a sum of non-overlapping f64 values for exact arithmetic. The
/// terms are stored in increasing order of magnitude; the most significant
/// nonzero term's sign equals the sign of the represented value.
#[derive(Debug, Clone)]
pub struct Expansion {
    terms: SmallVec<[f64; 32]>,
}

impl Expansion {
    /// Creates an expansion from a single f64 value.
    pub fn from_f64(value: f64) -> Self {
        if value == 0.0 {
            Self {
                terms: SmallVec::new(),
            }
        } else {
            let mut terms = SmallVec::new();
            terms.push(value);
            Self { terms }
        }
    }

    /// Returns the expansion's terms in increasing order of magnitude.
    pub fn terms(&self) -> &[f64] {
        &self.terms
    }

    /// Returns an approximation of the expansion as a single f64.
    pub fn estimate(&self) -> f64 {
        self.terms.iter().sum()
    }

    /// Returns the sign of the exact value represented by this expansion:
    /// `1` positive, `-1` negative, `0` exactly zero. Reads only the most
    /// significant (last) term, which carries the correct sign because the
    /// terms are nonoverlapping and sorted by increasing magnitude.
    pub fn sign(&self) -> i32 {
        match self.terms.last() {
            None => 0,
            Some(&v) if v > 0.0 => 1,
            Some(&v) if v < 0.0 => -1,
            Some(_) => 0,
        }
    }

    /// Returns the number of terms in the expansion.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Returns true if the expansion has no terms (represents zero).
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Adds a single f64 value to this expansion using the Grow-Expansion
    /// algorithm, preserving the nonoverlapping property.
    fn grow(&self, b: f64) -> Self {
        if b == 0.0 {
            return self.clone();
        }
        if self.is_empty() {
            return Self::from_f64(b);
        }

        let mut result = SmallVec::with_capacity(self.len() + 1);
        let mut q = b;
        for &e in &self.terms {
            let (h, q_new) = two_sum(q, e);
            if h != 0.0 {
                result.push(h);
            }
            q = q_new;
        }
        if q != 0.0 {
            result.push(q);
        }
        Self { terms: result }
    }

    /// Adds two expansions, preserving the nonoverlapping property.
    pub fn add(&self, other: &Expansion) -> Expansion {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let mut result = self.clone();
        for &term in &other.terms {
            result = result.grow(term);
        }
        result
    }

    /// Subtracts another expansion from this one: `a - b = a + (-b)`.
    pub fn sub(&self, other: &Expansion) -> Expansion {
        if other.is_empty() {
            return self.clone();
        }
        let mut negated = other.clone();
        for term in &mut negated.terms {
            *term = -*term;
        }
        self.add(&negated)
    }

    /// Scales an expansion by a scalar using the Scale-Expansion algorithm.
    pub fn scale(&self, scalar: f64) -> Expansion {
        if scalar == 0.0 || self.is_empty() {
            return Self {
                terms: SmallVec::new(),
            };
        }
        if scalar == 1.0 {
            return self.clone();
        }

        let mut result = SmallVec::with_capacity(self.len() * 2);
        let mut carry = 0.0;
        for &e in &self.terms {
            let (hi, lo) = two_product(e, scalar);
            let (sum, err) = two_sum(carry, lo);
            if sum != 0.0 {
                result.push(sum);
            }
            carry = hi + err;
        }
        if carry != 0.0 {
            result.push(carry);
        }
        Self { terms: result }
    }

    /// Multiplies two expansions using repeated scale-and-add.
    pub fn mul(&self, other: &Expansion) -> Expansion {
        if self.is_empty() || other.is_empty() {
            return Self {
                terms: SmallVec::new(),
            };
        }
        let mut result = Self {
            terms: SmallVec::new(),
        };
        for &term in &other.terms {
            let scaled = self.scale(term);
            result = result.add(&scaled);
        }
        result
    }
}
