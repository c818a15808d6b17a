//! Typed in-memory tabular data
//!
//! A [`Dataset`] is created once from external input and never mutated.
//! Train/test subsets and cross-validation folds are built as new datasets
//! or as row selections over the encoded feature matrix.

pub mod encoder;
pub mod splitter;

pub use encoder::FeatureEncoder;
pub use splitter::train_test_split;

use crate::error::{Result, TunerError};
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Kind of a column, including the closed level set for categoricals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical { levels: Vec<String> },
}

/// Declared name and kind of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    /// Human-readable description, used by `info`
    #[serde(default)]
    pub description: Option<String>,
}

impl ColumnSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
            description: None,
        }
    }

    pub fn categorical<S: Into<String>>(name: impl Into<String>, levels: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical {
                levels: levels.into_iter().map(Into::into).collect(),
            },
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Ordered list of column declarations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Schema of the building energy-efficiency dataset: eight envelope
/// parameters (X1..X8) and the two loads (Y1 heating, Y2 cooling).
pub fn energy_efficiency_schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::numeric("X1").with_description("Relative compactness"),
        ColumnSpec::numeric("X2").with_description("Surface area"),
        ColumnSpec::numeric("X3").with_description("Wall area"),
        ColumnSpec::numeric("X4").with_description("Roof area"),
        ColumnSpec::numeric("X5").with_description("Overall height"),
        ColumnSpec::categorical("X6", ["2", "3", "4", "5"]).with_description("Orientation"),
        ColumnSpec::numeric("X7").with_description("Glazing area"),
        ColumnSpec::categorical("X8", ["0", "1", "2", "3", "4", "5"])
            .with_description("Glazing area distribution"),
        ColumnSpec::numeric("Y1").with_description("Heating load"),
        ColumnSpec::numeric("Y2").with_description("Cooling load"),
    ])
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Numeric(f64),
    Categorical(String),
}

/// One row as a mapping from column name to value
pub type Row = HashMap<String, Value>;

/// Column storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Numeric(Vec<f64>),
    /// Categorical values stored as indices into `levels`
    Categorical { levels: Vec<String>, codes: Vec<usize> },
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical { codes, .. } => codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Numeric(_) => ColumnKind::Numeric,
            Column::Categorical { levels, .. } => ColumnKind::Categorical {
                levels: levels.clone(),
            },
        }
    }

    fn value(&self, row: usize) -> Value {
        match self {
            Column::Numeric(v) => Value::Numeric(v[row]),
            Column::Categorical { levels, codes } => Value::Categorical(levels[codes[row]].clone()),
        }
    }

    fn select(&self, indices: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(indices.iter().map(|&i| v[i]).collect()),
            Column::Categorical { levels, codes } => Column::Categorical {
                levels: levels.clone(),
                codes: indices.iter().map(|&i| codes[i]).collect(),
            },
        }
    }
}

/// Immutable tabular dataset with typed columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    /// Build a dataset from named columns
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        let mut seen = HashSet::new();

        for (name, column) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(TunerError::DataError(format!("duplicate column '{}'", name)));
            }
            if column.len() != n_rows {
                return Err(TunerError::ShapeError {
                    expected: format!("{} rows in column '{}'", n_rows, name),
                    actual: format!("{} rows", column.len()),
                });
            }
            if let Column::Categorical { levels, codes } = column {
                if let Some(&bad) = codes.iter().find(|&&c| c >= levels.len()) {
                    return Err(TunerError::UnknownCategory {
                        column: name.clone(),
                        value: format!("#{}", bad),
                    });
                }
            }
        }

        let (names, columns) = columns.into_iter().unzip();
        Ok(Self { names, columns, n_rows })
    }

    /// Build a dataset from row mappings; every row must carry exactly the
    /// schema's columns with values of the declared kind.
    pub fn from_rows(schema: &Schema, rows: &[Row]) -> Result<Self> {
        let mut columns = Vec::with_capacity(schema.columns().len());

        for spec in schema.columns() {
            let column = match &spec.kind {
                ColumnKind::Numeric => {
                    let values = rows
                        .iter()
                        .map(|row| match row.get(&spec.name) {
                            Some(Value::Numeric(v)) => Ok(*v),
                            Some(Value::Categorical(_)) => Err(TunerError::ColumnTypeMismatch {
                                column: spec.name.clone(),
                                expected: "numeric".to_string(),
                            }),
                            None => Err(TunerError::ColumnNotFound(spec.name.clone())),
                        })
                        .collect::<Result<Vec<f64>>>()?;
                    Column::Numeric(values)
                }
                ColumnKind::Categorical { levels } => {
                    let codes = rows
                        .iter()
                        .map(|row| match row.get(&spec.name) {
                            Some(Value::Categorical(s)) => level_code(&spec.name, levels, s),
                            Some(Value::Numeric(v)) => level_code(&spec.name, levels, &format_level(*v)),
                            None => Err(TunerError::ColumnNotFound(spec.name.clone())),
                        })
                        .collect::<Result<Vec<usize>>>()?;
                    Column::Categorical {
                        levels: levels.clone(),
                        codes,
                    }
                }
            };
            columns.push((spec.name.clone(), column));
        }

        if let Some(extra) = rows
            .iter()
            .flat_map(|row| row.keys())
            .find(|k| schema.get(k).is_none())
        {
            return Err(TunerError::DataError(format!(
                "column '{}' is not declared in the schema",
                extra
            )));
        }

        Self::new(columns)
    }

    /// Coerce a loaded polars frame into a typed dataset following `schema`.
    /// Columns of the frame not named in the schema are ignored.
    pub fn from_dataframe(df: &DataFrame, schema: &Schema) -> Result<Self> {
        let columns = schema
            .columns()
            .iter()
            .map(|spec| {
                let series = df
                    .column(&spec.name)
                    .map_err(|_| TunerError::ColumnNotFound(spec.name.clone()))?
                    .as_materialized_series();
                let column = match &spec.kind {
                    ColumnKind::Numeric => Column::Numeric(series_to_f64(&spec.name, series)?),
                    ColumnKind::Categorical { levels } => {
                        let raw = series_to_levels(&spec.name, series)?;
                        let codes = raw
                            .iter()
                            .map(|v| level_code(&spec.name, levels, v))
                            .collect::<Result<Vec<usize>>>()?;
                        Column::Categorical {
                            levels: levels.clone(),
                            codes,
                        }
                    }
                };
                Ok((spec.name.clone(), column))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| TunerError::ColumnNotFound(name.to_string()))
    }

    /// Schema describing this dataset's columns
    pub fn schema(&self) -> Schema {
        Schema::new(
            self.names
                .iter()
                .zip(&self.columns)
                .map(|(name, col)| ColumnSpec {
                    name: name.clone(),
                    kind: col.kind(),
                    description: None,
                })
                .collect(),
        )
    }

    /// Numeric column values
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(v),
            Column::Categorical { .. } => Err(TunerError::ColumnTypeMismatch {
                column: name.to_string(),
                expected: "numeric".to_string(),
            }),
        }
    }

    /// Numeric column as a target vector
    pub fn target(&self, name: &str) -> Result<Array1<f64>> {
        Ok(Array1::from_vec(self.numeric(name)?.to_vec()))
    }

    /// A single row as a name -> value mapping
    pub fn row(&self, index: usize) -> Option<Row> {
        if index >= self.n_rows {
            return None;
        }
        Some(
            self.names
                .iter()
                .zip(&self.columns)
                .map(|(name, col)| (name.clone(), col.value(index)))
                .collect(),
        )
    }

    /// Copy of the rows at `indices`, in that order
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_rows) {
            return Err(TunerError::ShapeError {
                expected: format!("row index < {}", self.n_rows),
                actual: bad.to_string(),
            });
        }
        Ok(Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.select(indices)).collect(),
            n_rows: indices.len(),
        })
    }
}

fn level_code(column: &str, levels: &[String], value: &str) -> Result<usize> {
    levels
        .iter()
        .position(|l| l == value)
        .ok_or_else(|| TunerError::UnknownCategory {
            column: column.to_string(),
            value: value.to_string(),
        })
}

/// Integral floats render without a fractional part so that `2.0` matches level `"2"`
fn format_level(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

fn series_to_f64(name: &str, series: &Series) -> Result<Vec<f64>> {
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|_| TunerError::ColumnTypeMismatch {
            column: name.to_string(),
            expected: "numeric".to_string(),
        })?;
    casted
        .f64()?
        .into_iter()
        .map(|v| v.ok_or_else(|| TunerError::DataError(format!("missing value in column '{}'", name))))
        .collect()
}

fn series_to_levels(name: &str, series: &Series) -> Result<Vec<String>> {
    let numeric = matches!(
        series.dtype(),
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    );
    if numeric {
        return Ok(series_to_f64(name, series)?.into_iter().map(format_level).collect());
    }
    let casted = series.cast(&DataType::String)?;
    casted
        .str()?
        .into_iter()
        .map(|v| {
            v.map(|s| s.trim().to_string())
                .ok_or_else(|| TunerError::DataError(format!("missing value in column '{}'", name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_schema() -> Schema {
        Schema::new(vec![
            ColumnSpec::numeric("area"),
            ColumnSpec::categorical("orientation", ["north", "south"]),
            ColumnSpec::numeric("load"),
        ])
    }

    fn row(area: f64, orientation: &str, load: f64) -> Row {
        HashMap::from([
            ("area".to_string(), Value::Numeric(area)),
            ("orientation".to_string(), Value::Categorical(orientation.to_string())),
            ("load".to_string(), Value::Numeric(load)),
        ])
    }

    #[test]
    fn test_from_rows() {
        let ds = Dataset::from_rows(
            &small_schema(),
            &[row(100.0, "north", 10.0), row(120.0, "south", 12.0)],
        )
        .unwrap();

        assert_eq!(ds.n_rows(), 2);
        assert_eq!(ds.numeric("load").unwrap(), &[10.0, 12.0]);
        assert_eq!(
            ds.row(1).unwrap().get("orientation"),
            Some(&Value::Categorical("south".to_string()))
        );
    }

    #[test]
    fn test_unknown_category_rejected() {
        let err = Dataset::from_rows(&small_schema(), &[row(100.0, "east", 10.0)]).unwrap_err();
        assert!(matches!(err, TunerError::UnknownCategory { .. }));
    }

    #[test]
    fn test_missing_column_rejected() {
        let mut r = row(100.0, "north", 10.0);
        r.remove("load");
        let err = Dataset::from_rows(&small_schema(), &[r]).unwrap_err();
        assert!(matches!(err, TunerError::ColumnNotFound(_)));
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let err = Dataset::new(vec![
            ("a".to_string(), Column::Numeric(vec![1.0, 2.0])),
            ("b".to_string(), Column::Numeric(vec![1.0])),
        ])
        .unwrap_err();
        assert!(matches!(err, TunerError::ShapeError { .. }));
    }

    #[test]
    fn test_select_rows_leaves_source_untouched() {
        let ds = Dataset::from_rows(
            &small_schema(),
            &[row(1.0, "north", 1.0), row(2.0, "south", 2.0), row(3.0, "north", 3.0)],
        )
        .unwrap();
        let sub = ds.select_rows(&[2, 0]).unwrap();

        assert_eq!(sub.numeric("area").unwrap(), &[3.0, 1.0]);
        assert_eq!(ds.numeric("area").unwrap(), &[1.0, 2.0, 3.0]);
        assert!(ds.select_rows(&[3]).is_err());
    }

    #[test]
    fn test_from_dataframe_energy_schema() {
        let df = df!(
            "X1" => &[0.98, 0.90],
            "X2" => &[514.5, 563.5],
            "X3" => &[294.0, 318.5],
            "X4" => &[110.25, 122.5],
            "X5" => &[7.0, 7.0],
            "X6" => &[2i64, 5],
            "X7" => &[0.0, 0.1],
            "X8" => &[0i64, 3],
            "Y1" => &[15.55, 20.84],
            "Y2" => &[21.33, 28.28]
        )
        .unwrap();

        let ds = Dataset::from_dataframe(&df, &energy_efficiency_schema()).unwrap();
        assert_eq!(ds.n_rows(), 2);
        assert_eq!(
            ds.row(1).unwrap().get("X6"),
            Some(&Value::Categorical("5".to_string()))
        );
        assert_eq!(ds.numeric("Y2").unwrap(), &[21.33, 28.28]);
    }

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(2.0), "2");
        assert_eq!(format_level(2.5), "2.5");
    }
}
