//! Markup pricing: coefficient lookup and final price calculation.

pub mod coefficient;

pub use coefficient::{Coefficient, CoefficientResolver};
