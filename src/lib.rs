//! Support distribution machines in Rust
//!
//! Learning on sets of points ("bags"): nonparametric k-nearest-neighbor
//! estimates of divergences between the bags' underlying distributions are
//! turned into a kernel and fed to a support vector machine.
//!
//! Based on "Nonparametric Divergence Estimation with Applications to Machine
//! Learning on Distributions" by Póczos, Xiong and Schneider (UAI 2011).

pub mod api;
pub mod cache;
pub mod core;
pub mod cv;
pub mod data;
pub mod divergence;
pub mod folds;
pub mod index;
pub mod kernel;
pub mod solver;
pub mod svm;
pub mod utils;

// Re-export main types for convenience
pub use crate::api::{crossvalidate, crossvalidate_divs, get_divs, transduct, Sdm};
pub use crate::cache::{CacheStats, QCache};
pub use crate::core::config::*;
pub use crate::core::error::*;
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::cv::{CvParams, CvReport, FoldSelection};
pub use crate::data::{BagDataset, CsvBags, JsonBags, JsonDivs};
pub use crate::divergence::{parse_div_funcs, DivEstimator, DivFunc};
pub use crate::folds::{partition, partition_stratified, Folds};
pub use crate::kernel::{DivergenceKernel, GaussianKernel, KernelKind};
pub use crate::svm::SvmModel;

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
