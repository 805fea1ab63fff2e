//! CSV bag loader
//!
//! Every row is one point: `bag_id,label,f1,...,fD`. Rows sharing a bag id
//! form a bag; bags keep the order in which their id first appears.
//! - First row can be a header (automatically detected)
//! - Blank lines and lines starting with `#` are skipped

use crate::core::{Bag, Result, SdmError};
use crate::data::BagDataset;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Loader for bags stored one point per CSV row
pub struct CsvBags;

/// Points and label collected for one bag id
struct Pending {
    label: f64,
    values: Vec<f64>,
}

impl CsvBags {
    /// Load bags from a CSV file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<BagDataset> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load bags from a reader, detecting a header row
    pub fn from_reader<R: BufRead>(reader: R) -> Result<BagDataset> {
        Self::from_reader_with_options(reader, true)
    }

    /// Load bags from a reader with explicit header detection
    pub fn from_reader_with_options<R: BufRead>(
        reader: R,
        auto_detect_header: bool,
    ) -> Result<BagDataset> {
        let mut order: Vec<String> = Vec::new();
        let mut pending: HashMap<String, Pending> = HashMap::new();
        let mut dim: Option<usize> = None;
        let mut first_data_line = true;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if first_data_line {
                first_data_line = false;
                if auto_detect_header && Self::is_header_line(line) {
                    continue;
                }
            }

            let (id, label, point) = Self::parse_data_line(line, line_no + 1)?;
            match dim {
                None => dim = Some(point.len()),
                Some(d) if d != point.len() => {
                    return Err(SdmError::ParseError(format!(
                        "line {}: {} features, expected {}",
                        line_no + 1,
                        point.len(),
                        d
                    )));
                }
                Some(_) => {}
            }

            match pending.get_mut(id) {
                Some(bag) => {
                    if bag.label != label {
                        return Err(SdmError::ParseError(format!(
                            "line {}: bag '{}' has conflicting labels {} and {}",
                            line_no + 1,
                            id,
                            bag.label,
                            label
                        )));
                    }
                    bag.values.extend(point);
                }
                None => {
                    order.push(id.to_string());
                    pending.insert(
                        id.to_string(),
                        Pending {
                            label,
                            values: point,
                        },
                    );
                }
            }
        }

        let dim = dim.ok_or(SdmError::EmptyDataset)?;
        let mut bags = Vec::with_capacity(order.len());
        let mut labels = Vec::with_capacity(order.len());
        for id in &order {
            if let Some(bag) = pending.remove(id) {
                labels.push(bag.label);
                bags.push(Bag::new(bag.values, dim)?);
            }
        }
        BagDataset::new(order, bags, labels)
    }

    /// Check if a line appears to be a header
    ///
    /// The bag id column may be text in data rows too, so only the label and
    /// feature columns are inspected.
    fn is_header_line(line: &str) -> bool {
        let fields: Vec<&str> = line.split(',').skip(1).collect();
        if fields.is_empty() {
            return false;
        }
        let non_numeric = fields
            .iter()
            .filter(|field| field.trim().parse::<f64>().is_err())
            .count();
        non_numeric * 2 > fields.len()
    }

    /// Parse one row into (bag id, label, point)
    fn parse_data_line(line: &str, line_no: usize) -> Result<(&str, f64, Vec<f64>)> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 3 {
            return Err(SdmError::ParseError(format!(
                "line {}: expected bag_id,label,features... but got: {}",
                line_no, line
            )));
        }

        let label = fields[1].parse::<f64>().map_err(|_| {
            SdmError::ParseError(format!("line {}: invalid label: {}", line_no, fields[1]))
        })?;

        let point = fields[2..]
            .iter()
            .enumerate()
            .map(|(col, field)| {
                field.parse::<f64>().map_err(|_| {
                    SdmError::ParseError(format!(
                        "line {}: invalid feature value at column {}: {}",
                        line_no,
                        col + 3,
                        field
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok((fields[0], label, point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Task;
    use std::io::Cursor;

    #[test]
    fn test_csv_groups_rows_into_bags() {
        let data = "a,0,1.0,2.0\nb,1,5.0,5.0\na,0,1.5,2.5\nb,1,6.0,4.0\nb,1,5.5,5.5\n";
        let ds = CsvBags::from_reader(Cursor::new(data)).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.dim(), 2);
        assert_eq!(ds.ids(), &["a".to_string(), "b".to_string()]);
        assert_eq!(ds.labels(), &[0.0, 1.0]);
        assert_eq!(ds.bags()[0].rows(), 2);
        assert_eq!(ds.bags()[1].rows(), 3);
        assert_eq!(ds.bags()[0].point(1), &[1.5, 2.5]);
    }

    #[test]
    fn test_csv_with_header_and_comments() {
        let data = "# generated\nbag,label,x,y\n\nbag1,0.25,1.0,2.0\n# mid comment\nbag2,1.5,3.0,4.0\n";
        let ds = CsvBags::from_reader(Cursor::new(data)).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.infer_task(), Task::Regression);
    }

    #[test]
    fn test_csv_manual_header_control() {
        let data = "bag,label,x\n";
        let result = CsvBags::from_reader_with_options(Cursor::new(data), false);
        assert!(matches!(result, Err(SdmError::ParseError(_))));
    }

    #[test]
    fn test_csv_invalid_rows() {
        // Too few fields
        assert!(CsvBags::from_reader(Cursor::new("a,1\n")).is_err());
        // Invalid number
        assert!(CsvBags::from_reader(Cursor::new("a,1,2.0\na,1,abc\n")).is_err());
        // Ragged dimension
        assert!(CsvBags::from_reader(Cursor::new("a,1,2.0\na,1,1.0,3.0\n")).is_err());
        // Conflicting labels within one bag
        assert!(CsvBags::from_reader(Cursor::new("a,1,2.0\na,0,1.0\n")).is_err());
    }

    #[test]
    fn test_csv_empty_input() {
        let result = CsvBags::from_reader(Cursor::new("# nothing\n\n"));
        assert!(matches!(result, Err(SdmError::EmptyDataset)));
    }

    #[test]
    fn test_is_header_line() {
        assert!(CsvBags::is_header_line("bag,label,f1,f2"));
        assert!(CsvBags::is_header_line("id,y,x"));
        assert!(!CsvBags::is_header_line("sample-7,1,3.0,1.0"));
        assert!(!CsvBags::is_header_line("id"));
    }
}
