//! Core traits: numeric kinds accepted for bags and labels

use crate::core::{ScalarKind, Task};

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
}

/// Element type of a bag (single or double precision)
///
/// Distances are always accumulated in `f64`, whatever the storage type.
pub trait Scalar: sealed::Sealed + Copy + Send + Sync + PartialOrd + 'static {
    /// Registry entry for this type
    const KIND: ScalarKind;

    /// Widen to double precision
    fn to_f64(self) -> f64;
}

impl Scalar for f32 {
    const KIND: ScalarKind = ScalarKind::F32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for f64 {
    const KIND: ScalarKind = ScalarKind::F64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

/// Label type; integral labels select classification, real labels regression
pub trait Label: sealed::Sealed + Copy + Send + Sync + 'static {
    /// Registry entry for this type
    const KIND: ScalarKind;

    /// Learning task selected by this label type
    const TASK: Task;

    /// Label as a double, the solver's working representation
    fn to_f64(self) -> f64;

    /// Label from the solver representation; integral kinds round
    fn from_f64(value: f64) -> Self;
}

impl Label for i32 {
    const KIND: ScalarKind = ScalarKind::I32;
    const TASK: Task = Task::Classification;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round() as i32
    }
}

impl Label for i64 {
    const KIND: ScalarKind = ScalarKind::I64;
    const TASK: Task = Task::Classification;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round() as i64
    }
}

impl Label for f32 {
    const KIND: ScalarKind = ScalarKind::F32;
    const TASK: Task = Task::Regression;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Label for f64 {
    const KIND: ScalarKind = ScalarKind::F64;
    const TASK: Task = Task::Regression;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Widen labels to the solver representation
pub fn labels_to_f64<L: Label>(labels: &[L]) -> Vec<f64> {
    labels.iter().map(|&l| l.to_f64()).collect()
}
