//! Error types for divergence estimation and SDM cross-validation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdmError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Unsupported scalar type: {0}")]
    UnsupportedScalarType(String),

    #[error("Invalid fold count: {folds} folds for {samples} samples")]
    InvalidFoldCount { folds: usize, samples: usize },

    #[error("Bag {bag} has {points} points but at least {required} are needed")]
    InsufficientPoints {
        bag: usize,
        points: usize,
        required: usize,
    },

    #[error("Neighbor index failure: {0}")]
    NeighborIndexFailure(String),

    #[error("Solver did not converge within {iterations} iterations")]
    SolverDidNotConverge { iterations: usize },

    #[error("Cross-validation failed: {0}")]
    CrossValidationFailed(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid divergence function: {0}")]
    InvalidDivFunc(String),

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SdmError>;
