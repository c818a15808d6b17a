//! Feature matrix construction
//!
//! Numeric columns pass through unchanged. Categorical columns are one-hot
//! encoded over their declared levels, so every subset of a dataset encodes
//! to a matrix of the same width.

use super::{Column, Dataset};
use crate::error::{Result, TunerError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// How one source column maps onto matrix columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Slot {
    Numeric { column: String },
    OneHot { column: String, levels: Vec<String> },
}

impl Slot {
    fn width(&self) -> usize {
        match self {
            Slot::Numeric { .. } => 1,
            Slot::OneHot { levels, .. } => levels.len(),
        }
    }
}

/// Encodes a fixed list of feature columns into a dense `Array2<f64>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    slots: Vec<Slot>,
}

impl FeatureEncoder {
    /// Derive the layout from `features` as declared in `dataset`
    pub fn new(dataset: &Dataset, features: &[String]) -> Result<Self> {
        if features.is_empty() {
            return Err(TunerError::ConfigError("feature list is empty".to_string()));
        }

        let slots = features
            .iter()
            .map(|name| match dataset.column(name)? {
                Column::Numeric(_) => Ok(Slot::Numeric { column: name.clone() }),
                Column::Categorical { levels, .. } => Ok(Slot::OneHot {
                    column: name.clone(),
                    levels: levels.clone(),
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { slots })
    }

    /// Number of matrix columns produced
    pub fn n_outputs(&self) -> usize {
        self.slots.iter().map(Slot::width).sum()
    }

    /// Names of the produced matrix columns (`column=level` for one-hot slots)
    pub fn output_names(&self) -> Vec<String> {
        self.slots
            .iter()
            .flat_map(|slot| match slot {
                Slot::Numeric { column } => vec![column.clone()],
                Slot::OneHot { column, levels } => {
                    levels.iter().map(|l| format!("{}={}", column, l)).collect()
                }
            })
            .collect()
    }

    /// Encode all rows of `dataset`
    pub fn encode(&self, dataset: &Dataset) -> Result<Array2<f64>> {
        let n_rows = dataset.n_rows();
        let mut x = Array2::zeros((n_rows, self.n_outputs()));
        let mut offset = 0;

        for slot in &self.slots {
            match slot {
                Slot::Numeric { column } => {
                    let values = dataset.numeric(column)?;
                    for (r, &v) in values.iter().enumerate() {
                        x[[r, offset]] = v;
                    }
                }
                Slot::OneHot { column, levels } => match dataset.column(column)? {
                    Column::Categorical { levels: actual, codes } if actual == levels => {
                        for (r, &code) in codes.iter().enumerate() {
                            x[[r, offset + code]] = 1.0;
                        }
                    }
                    _ => {
                        return Err(TunerError::ColumnTypeMismatch {
                            column: column.clone(),
                            expected: format!("categorical with levels {:?}", levels),
                        })
                    }
                },
            }
            offset += slot.width();
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::new(vec![
            ("height".to_string(), Column::Numeric(vec![3.5, 7.0, 3.5])),
            (
                "orientation".to_string(),
                Column::Categorical {
                    levels: vec!["2".into(), "3".into(), "4".into()],
                    codes: vec![0, 2, 1],
                },
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_one_hot_layout() {
        let ds = dataset();
        let enc = FeatureEncoder::new(&ds, &["height".to_string(), "orientation".to_string()]).unwrap();

        assert_eq!(enc.n_outputs(), 4);
        assert_eq!(
            enc.output_names(),
            vec!["height", "orientation=2", "orientation=3", "orientation=4"]
        );

        let x = enc.encode(&ds).unwrap();
        assert_eq!(x.row(0).to_vec(), vec![3.5, 1.0, 0.0, 0.0]);
        assert_eq!(x.row(1).to_vec(), vec![7.0, 0.0, 0.0, 1.0]);
        assert_eq!(x.row(2).to_vec(), vec![3.5, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_subset_keeps_width() {
        let ds = dataset();
        let enc = FeatureEncoder::new(&ds, &["orientation".to_string()]).unwrap();
        let sub = ds.select_rows(&[0]).unwrap();
        assert_eq!(enc.encode(&sub).unwrap().ncols(), 3);
    }

    #[test]
    fn test_unknown_feature() {
        let ds = dataset();
        let err = FeatureEncoder::new(&ds, &["roof".to_string()]).unwrap_err();
        assert!(matches!(err, TunerError::ColumnNotFound(_)));
    }
}
