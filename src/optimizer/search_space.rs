//! Hyperparameter grids and the configurations they enumerate

use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A candidate hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int; floats only when they are integral
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        ParameterValue::Int(v as i64)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::String(v)
    }
}

/// One named parameter with its ordered candidate values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridParameter {
    pub name: String,
    pub values: Vec<ParameterValue>,
}

/// Ordered mapping from parameter name to candidate values.
///
/// Declaration order matters: enumeration treats the first parameter as the
/// outermost loop, and that order is the tie-break precedence when ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperparameterGrid {
    parameters: Vec<GridParameter>,
}

impl HyperparameterGrid {
    /// Create a new empty grid
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter with its candidate values
    pub fn add<V: Into<ParameterValue>>(mut self, name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.parameters.push(GridParameter {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Reference grid for the random forest backend
    pub fn random_forest_default() -> Self {
        Self::new()
            .add("ntrees", [50, 100, 120])
            .add("max_depth", [40, 60])
            .add("min_rows", [1, 2])
    }

    pub fn parameters(&self) -> &[GridParameter] {
        &self.parameters
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Number of configurations: the product of the list lengths (0 for an empty grid).
    /// Saturates at `usize::MAX`; [`HyperparameterGrid::validate`] rejects such grids.
    pub fn size(&self) -> usize {
        self.checked_size().unwrap_or(usize::MAX)
    }

    /// Number of configurations, `None` when it does not fit in a `usize`
    pub fn checked_size(&self) -> Option<usize> {
        if self.parameters.is_empty() {
            return Some(0);
        }
        self.parameters
            .iter()
            .try_fold(1usize, |acc, p| acc.checked_mul(p.values.len()))
    }

    /// Every parameter must have at least one value and names must be unique
    pub fn validate(&self) -> Result<()> {
        if self.parameters.is_empty() {
            return Err(TunerError::EmptyGrid);
        }
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if param.values.is_empty() {
                return Err(TunerError::EmptyParameter(param.name.clone()));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(TunerError::ConfigError(format!(
                    "parameter '{}' declared twice",
                    param.name
                )));
            }
        }
        if self.checked_size().is_none() {
            return Err(TunerError::ConfigError(format!(
                "grid of {} parameters has too many configurations to enumerate",
                self.parameters.len()
            )));
        }
        Ok(())
    }

    /// Configuration at enumeration position `index`
    pub fn configuration_at(&self, index: usize) -> Option<Configuration> {
        if index >= self.size() {
            return None;
        }

        // Mixed-radix decode; the last parameter varies fastest
        let mut rem = index;
        let mut picks = vec![0; self.parameters.len()];
        for (slot, param) in picks.iter_mut().zip(&self.parameters).rev() {
            *slot = rem % param.values.len();
            rem /= param.values.len();
        }

        let values = self
            .parameters
            .iter()
            .zip(picks)
            .map(|(param, pick)| (param.name.clone(), param.values[pick].clone()))
            .collect();

        Some(Configuration { index, values })
    }

    /// Cartesian-product iterator in declaration order
    pub fn iter(&self) -> GridIter<'_> {
        GridIter {
            grid: self,
            next: 0,
            total: self.size(),
        }
    }
}

impl<'a> IntoIterator for &'a HyperparameterGrid {
    type Item = Configuration;
    type IntoIter = GridIter<'a>;

    fn into_iter(self) -> GridIter<'a> {
        self.iter()
    }
}

/// Iterator over a grid's configurations
#[derive(Debug, Clone)]
pub struct GridIter<'a> {
    grid: &'a HyperparameterGrid,
    next: usize,
    total: usize,
}

impl Iterator for GridIter<'_> {
    type Item = Configuration;

    fn next(&mut self) -> Option<Configuration> {
        if self.next >= self.total {
            return None;
        }
        let config = self.grid.configuration_at(self.next);
        self.next += 1;
        config
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Configuration> {
        self.next = self.next.saturating_add(n).min(self.total);
        self.next()
    }
}

impl ExactSizeIterator for GridIter<'_> {}

/// One point of the search space: a value for every grid parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    index: usize,
    values: Vec<(String, ParameterValue)>,
}

impl Configuration {
    /// A standalone configuration, outside of any grid
    pub fn new<V: Into<ParameterValue>>(values: impl IntoIterator<Item = (&'static str, V)>) -> Self {
        Self {
            index: 0,
            values: values
                .into_iter()
                .map(|(name, v)| (name.to_string(), v.into()))
                .collect(),
        }
    }

    /// Position in grid enumeration order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    /// Integer parameter; `Ok(None)` when absent
    pub fn int(&self, name: &str) -> Result<Option<i64>> {
        self.get(name)
            .map(|v| v.as_int().ok_or_else(|| invalid(name, v, "expected an integer")))
            .transpose()
    }

    /// Float parameter; `Ok(None)` when absent
    pub fn float(&self, name: &str) -> Result<Option<f64>> {
        self.get(name)
            .map(|v| v.as_float().ok_or_else(|| invalid(name, v, "expected a number")))
            .transpose()
    }

    /// Boolean parameter; `Ok(None)` when absent
    pub fn bool(&self, name: &str) -> Result<Option<bool>> {
        self.get(name)
            .map(|v| v.as_bool().ok_or_else(|| invalid(name, v, "expected a boolean")))
            .transpose()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

fn invalid(name: &str, value: &ParameterValue, reason: &str) -> TunerError {
    TunerError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
