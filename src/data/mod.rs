//! Data loading: labeled bags from CSV or JSON files
//!
//! Both formats produce a [`BagDataset`] holding double-precision bags, one
//! label per bag and the bag identifiers in order of first appearance.

pub mod csv;
pub mod json;

pub use self::csv::*;
pub use self::json::*;

use crate::core::{validate_bags, Bag, Label, Result, SdmError, Task};

/// Labeled bags loaded from disk
#[derive(Debug, Clone, PartialEq)]
pub struct BagDataset {
    ids: Vec<String>,
    bags: Vec<Bag<f64>>,
    labels: Vec<f64>,
}

impl BagDataset {
    /// Assemble a dataset, checking that every bag has a label and that all
    /// bags share one dimension
    pub fn new(ids: Vec<String>, bags: Vec<Bag<f64>>, labels: Vec<f64>) -> Result<Self> {
        if bags.len() != labels.len() || bags.len() != ids.len() {
            return Err(SdmError::ShapeMismatch(format!(
                "{} bags, {} labels, {} ids",
                bags.len(),
                labels.len(),
                ids.len()
            )));
        }
        validate_bags(&bags)?;
        Ok(Self { ids, bags, labels })
    }

    pub fn len(&self) -> usize {
        self.bags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bags.is_empty()
    }

    /// Point dimension shared by every bag
    pub fn dim(&self) -> usize {
        self.bags.first().map_or(0, Bag::dim)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn bags(&self) -> &[Bag<f64>] {
        &self.bags
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    /// Labels converted to the given label type
    pub fn labels_as<L: Label>(&self) -> Vec<L> {
        self.labels.iter().map(|&v| L::from_f64(v)).collect()
    }

    /// Classification when every label is a whole number, regression otherwise
    pub fn infer_task(&self) -> Task {
        if self.labels.iter().all(|v| v.fract() == 0.0) {
            Task::Classification
        } else {
            Task::Regression
        }
    }

    pub fn into_bags(self) -> Vec<Bag<f64>> {
        self.bags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(points: &[[f64; 2]]) -> Bag<f64> {
        Bag::from_rows(points.iter().map(|p| p.to_vec()).collect()).unwrap()
    }

    #[test]
    fn test_dataset_accessors() {
        let ds = BagDataset::new(
            vec!["a".into(), "b".into()],
            vec![bag(&[[0.0, 1.0]]), bag(&[[1.0, 1.0], [2.0, 0.0]])],
            vec![1.0, 0.0],
        )
        .unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.dim(), 2);
        assert_eq!(ds.labels_as::<i32>(), vec![1, 0]);
        assert_eq!(ds.infer_task(), Task::Classification);
    }

    #[test]
    fn test_real_labels_mean_regression() {
        let ds = BagDataset::new(
            vec!["a".into()],
            vec![bag(&[[0.0, 1.0]])],
            vec![0.5],
        )
        .unwrap();
        assert_eq!(ds.infer_task(), Task::Regression);
    }

    #[test]
    fn test_mismatched_parts_rejected() {
        let result = BagDataset::new(vec!["a".into()], vec![bag(&[[0.0, 1.0]])], vec![]);
        assert!(matches!(result, Err(SdmError::ShapeMismatch(_))));
    }
}
