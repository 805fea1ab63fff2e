//! JSON inputs: labeled bags and precomputed divergence matrices

use crate::core::{Bag, Matrix, Result, SdmError};
use crate::data::BagDataset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// `{"bags": [[[x, y], ...], ...], "labels": [...], "ids": [...]}`
///
/// `ids` is optional; bags are numbered from 0 when it is missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonBags {
    pub bags: Vec<Vec<Vec<f64>>>,
    pub labels: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
}

impl JsonBags {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<BagDataset> {
        Self::from_str(&fs::read_to_string(path)?)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<BagDataset> {
        let raw: JsonBags = serde_json::from_str(text)?;
        raw.into_dataset()
    }

    pub fn into_dataset(self) -> Result<BagDataset> {
        let ids = self
            .ids
            .unwrap_or_else(|| (0..self.bags.len()).map(|i| i.to_string()).collect());
        let bags = self
            .bags
            .into_iter()
            .map(Bag::from_rows)
            .collect::<Result<Vec<_>>>()?;
        BagDataset::new(ids, bags, self.labels)
    }
}

/// `{"divs": [[...], ...], "labels": [...]}`: a square divergence matrix
/// with one label per row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonDivs {
    pub divs: Vec<Vec<Option<f64>>>,
    pub labels: Vec<f64>,
}

impl JsonDivs {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<(Matrix, Vec<f64>)> {
        Self::from_str(&fs::read_to_string(path)?)
    }

    /// Parse a divergence matrix; `null` entries become NaN
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<(Matrix, Vec<f64>)> {
        let raw: JsonDivs = serde_json::from_str(text)?;
        let rows = raw
            .divs
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect();
        let divs = Matrix::from_rows(rows)?;
        if !divs.is_square() || divs.rows() != raw.labels.len() {
            return Err(SdmError::ShapeMismatch(format!(
                "divergence matrix is {}x{} for {} labels",
                divs.rows(),
                divs.cols(),
                raw.labels.len()
            )));
        }
        Ok((divs, raw.labels))
    }

    /// Serializable form of a matrix; NaN entries become `null`
    pub fn from_matrix(divs: &Matrix, labels: Vec<f64>) -> Self {
        let divs = (0..divs.rows())
            .map(|i| {
                divs.row(i)
                    .iter()
                    .map(|&v| if v.is_nan() { None } else { Some(v) })
                    .collect()
            })
            .collect();
        Self { divs, labels }
    }
}
