//! Nonparametric divergence estimation between bags
//!
//! A bag is treated as an i.i.d. sample from an unknown density. Divergences
//! between two such densities are estimated from k-nearest-neighbor distances
//! (see [`functional`]), for every pair of bags at once (see [`estimator`]).

pub mod estimator;
pub mod functional;

pub use self::estimator::*;
pub use self::functional::*;
