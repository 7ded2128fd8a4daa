//! Per-algorithm grid specifications.
//!
//! A library maps algorithm names to the grids the ensembler expands into
//! candidates. It can be read from JSON or derived from the shape of the
//! training data with [`default_library`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use gz_types::{GzError, GzResult, ParamSet};

use crate::search::GridDescriptor;

/// One varying parameter plus the fixed parameters that accompany it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridEntry {
    pub param: String,
    /// Merged into every candidate generated from this entry.
    #[serde(rename = "config", alias = "premise", default)]
    pub premise: ParamSet,
    pub grid: GridDescriptor,
}

impl GridEntry {
    pub fn new(param: impl Into<String>, grid: GridDescriptor) -> Self {
        Self {
            param: param.into(),
            premise: ParamSet::new(),
            grid,
        }
    }

    pub fn with_premise(mut self, premise: ParamSet) -> Self {
        self.premise = premise;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSpec {
    pub name: String,
    /// Whether grid templating applies. `None` defers to the estimator's
    /// own capabilities.
    #[serde(default)]
    pub standard_ensemble: Option<bool>,
    pub grid: Vec<GridEntry>,
}

impl AlgorithmSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            standard_ensemble: None,
            grid: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: GridEntry) -> Self {
        self.grid.push(entry);
        self
    }

    pub fn with_standard_ensemble(mut self, standard: bool) -> Self {
        self.standard_ensemble = Some(standard);
        self
    }

    /// Upper bound on the candidates this spec yields under templating.
    pub fn max_candidates(&self) -> usize {
        self.grid.iter().map(|entry| entry.grid.len()).sum()
    }
}

/// The grid library: an ordered list of algorithm specs with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryConfig {
    algorithms: Vec<AlgorithmSpec>,
}

impl LibraryConfig {
    pub fn new(algorithms: Vec<AlgorithmSpec>) -> GzResult<Self> {
        let mut seen = HashSet::new();
        for spec in &algorithms {
            if !seen.insert(spec.name.as_str()) {
                return Err(GzError::InvalidConfiguration(format!(
                    "Algorithm '{}' is listed more than once",
                    spec.name
                )));
            }
        }
        Ok(Self { algorithms })
    }

    pub fn from_json_str(json: &str) -> GzResult<Self> {
        let algorithms: Vec<AlgorithmSpec> = serde_json::from_str(json)
            .map_err(|e| GzError::InvalidConfiguration(format!("Malformed grid library: {e}")))?;
        Self::new(algorithms)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> GzResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn get(&self, name: &str) -> Option<&AlgorithmSpec> {
        self.algorithms.iter().find(|spec| spec.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.algorithms.iter().map(|spec| spec.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlgorithmSpec> {
        self.algorithms.iter()
    }

    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }
}

/// Default grids for the bundled algorithms, scaled to the data shape.
pub fn default_library(names: &[&str], n_samples: usize, n_features: usize) -> GzResult<LibraryConfig> {
    if n_samples == 0 || n_features == 0 {
        return Err(GzError::InvalidConfiguration(format!(
            "Data shape must be non-empty, got ({n_samples}, {n_features})"
        )));
    }
    let specs = names
        .iter()
        .map(|name| default_spec(name, n_samples, n_features))
        .collect::<GzResult<Vec<_>>>()?;
    LibraryConfig::new(specs)
}

fn default_spec(name: &str, n_samples: usize, n_features: usize) -> GzResult<AlgorithmSpec> {
    let spec = match name {
        "nearest_neighbors" => {
            // Odd neighbour counts up to ~sqrt(n), never more than the sample count.
            let max_k = ((n_samples as f64).sqrt() as usize).clamp(1, n_samples);
            let ks: Vec<usize> = (1..=max_k).step_by(2).take(8).collect();
            AlgorithmSpec::new(name)
                .with_entry(
                    GridEntry::new("n_neighbors", GridDescriptor::take(ks.clone()))
                        .with_premise(ParamSet::new().with("weights", "uniform")),
                )
                .with_entry(
                    GridEntry::new("n_neighbors", GridDescriptor::take(ks))
                        .with_premise(ParamSet::new().with("weights", "distance")),
                )
        }
        "naive_bayes" => AlgorithmSpec::new(name).with_entry(GridEntry::new(
            "var_smoothing",
            GridDescriptor::log_uniform(1e-11, 1e-5, 4),
        )),
        "logistic_regression" => AlgorithmSpec::new(name).with_entry(
            GridEntry::new("C", GridDescriptor::log_uniform(1e-3, 1e2, 6))
                .with_premise(ParamSet::new().with("max_iter", 300)),
        ),
        "decision_tree" => {
            let max_depth = ((n_samples as f64).log2().ceil() as usize).clamp(2, 12);
            AlgorithmSpec::new(name)
                .with_entry(
                    GridEntry::new("max_depth", GridDescriptor::take((2..=max_depth).collect::<Vec<_>>()))
                        .with_premise(ParamSet::new().with("criterion", "gini")),
                )
                .with_entry(
                    GridEntry::new("min_samples_leaf", GridDescriptor::take(vec![1, 2, 5, 10]))
                        .with_premise(ParamSet::new().with("criterion", "entropy")),
                )
        }
        "neuralnet" => {
            let input_units = (4 * n_features).clamp(8, 250);
            AlgorithmSpec::new(name)
                .with_standard_ensemble(false)
                .with_entry(GridEntry::new("n_hidden", GridDescriptor::take(vec![1])))
                .with_entry(GridEntry::new(
                    "units",
                    GridDescriptor::take(vec![input_units, (input_units / 2).max(1)]),
                ))
                .with_entry(
                    GridEntry::new("epochs", GridDescriptor::take(vec![30]))
                        .with_premise(ParamSet::new().with("batch_size", 16)),
                )
        }
        other => {
            return Err(GzError::InvalidConfiguration(format!(
                "No default grid for algorithm '{other}'"
            )))
        }
    };
    Ok(spec)
}
