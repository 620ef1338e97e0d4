//! Foundations module for exact predicates and adaptive precision arithmetic.
//!
//! This module provides robust geometric predicates that never fail due to
//! floating-point errors, using adaptive precision arithmetic.

pub mod error_bounds;
pub mod expansion;
pub mod predicates;

pub use error_bounds::{
    epsilon, incircle_errbound, inorthosphere_errbound, insphere_errbound, orient2d_errbound,
    orient3d_errbound,
};
pub use expansion::*;
pub use predicates::*;
