//! Results aggregation and run reports
//!
//! [`ResultsTable`] is the pipeline's output: one `(label, rmse)` row per
//! target, in processing order. Rows can only be appended. [`RunReport`]
//! wraps the table with per-target search details for persisting a run.

use crate::error::{Result, TunerError};
use crate::pipeline::{PipelineOutput, TargetOutcome};
use crate::training::RegressionMetrics;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One row of the results table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub label: String,
    pub rmse: f64,
}

/// Append-only table of final test-set scores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row; existing rows are never touched
    pub fn push(&mut self, label: impl Into<String>, rmse: f64) {
        self.rows.push(ResultRow {
            label: label.into(),
            rmse,
        });
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// RMSE recorded for `label`
    pub fn get(&self, label: &str) -> Option<f64> {
        self.rows.iter().find(|r| r.label == label).map(|r| r.rmse)
    }

    /// Table as a two-column frame (`label`, `rmse`)
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let labels: Vec<&str> = self.rows.iter().map(|r| r.label.as_str()).collect();
        let rmses: Vec<f64> = self.rows.iter().map(|r| r.rmse).collect();
        Ok(df!("label" => labels, "rmse" => rmses)?)
    }

    /// CSV text with a `label,rmse` header
    pub fn to_csv(&self) -> Result<String> {
        let mut df = self.to_dataframe()?;
        let mut buffer = Vec::new();
        CsvWriter::new(&mut buffer).include_header(true).finish(&mut df)?;
        String::from_utf8(buffer).map_err(|e| TunerError::SerializationError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the table as CSV or JSON, chosen by the file extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => self.to_csv()?,
            Some("json") => self.to_json()?,
            other => {
                return Err(TunerError::ConfigError(format!(
                    "unsupported results format: {}",
                    other.unwrap_or("<none>")
                )))
            }
        };
        std::fs::write(path, text)?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ResultsTable {
    type Item = &'a ResultRow;
    type IntoIter = std::slice::Iter<'a, ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// One leaderboard line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub configuration: String,
    pub cv_rmse: f64,
    pub cv_std: f64,
    pub mean_fit_secs: f64,
}

/// A configuration left out of the ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedConfiguration {
    pub configuration: String,
    pub reason: String,
}

/// Search summary for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub label: String,
    pub best_configuration: String,
    pub cv_rmse: f64,
    /// Authoritative score of the retrained model on the test split
    pub test: RegressionMetrics,
    /// Retrained model scored on its own training data
    pub train_rmse: f64,
    pub configurations: usize,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub excluded: Vec<ExcludedConfiguration>,
}

impl From<&TargetOutcome> for TargetReport {
    fn from(outcome: &TargetOutcome) -> Self {
        use crate::optimizer::ScoreStatus;

        let leaderboard = outcome
            .search
            .ranked()
            .enumerate()
            .filter_map(|(i, record)| match &record.status {
                ScoreStatus::Scored { cv, mean_fit_secs } => Some(LeaderboardEntry {
                    rank: i + 1,
                    configuration: record.configuration.to_string(),
                    cv_rmse: cv.mean_score,
                    cv_std: cv.std_score,
                    mean_fit_secs: *mean_fit_secs,
                }),
                ScoreStatus::Unscored { .. } => None,
            })
            .collect();

        let excluded = outcome
            .search
            .unscored()
            .map(|record| ExcludedConfiguration {
                configuration: record.configuration.to_string(),
                reason: record.failure().unwrap_or_default().to_string(),
            })
            .collect();

        Self {
            target: outcome.target.clone(),
            label: outcome.label.clone(),
            best_configuration: outcome.best.configuration.to_string(),
            cv_rmse: outcome.best.score().unwrap_or(f64::NAN),
            test: outcome.test_metrics,
            train_rmse: outcome.train_rmse,
            configurations: outcome.search.total(),
            leaderboard,
            excluded,
        }
    }
}

/// Persistable record of a whole tuning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub backend: String,
    pub results: ResultsTable,
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    pub fn new(backend: impl Into<String>, output: &PipelineOutput) -> Self {
        Self {
            generated_at: Utc::now(),
            backend: backend.into(),
            results: output.results.clone(),
            targets: output.outcomes.iter().map(TargetReport::from).collect(),
        }
    }

    /// Save report to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load report from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_keep_insertion_order() {
        let mut table = ResultsTable::new();
        table.push("Heating Load", 0.5);
        table.push("Cooling Load", 0.25);
        table.push("Alpha", 9.0);

        let labels: Vec<&str> = table.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Heating Load", "Cooling Load", "Alpha"]);
        assert_eq!(table.get("Cooling Load"), Some(0.25));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_json_shape() {
        let mut table = ResultsTable::new();
        table.push("Heating Load", 1.5);
        let value: serde_json::Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!([{"label": "Heating Load", "rmse": 1.5}]));
    }

    #[test]
    fn test_csv_has_header_and_rows() {
        let mut table = ResultsTable::new();
        table.push("Heating Load", 1.5);
        table.push("Cooling Load", 2.0);

        let csv = table.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "label,rmse");
        assert!(lines[1].starts_with("Heating Load,1.5"));
    }

    #[test]
    fn test_unsupported_extension() {
        let table = ResultsTable::new();
        assert!(matches!(
            table.save(std::env::temp_dir().join("results.xlsx")),
            Err(TunerError::ConfigError(_))
        ));
    }
}
