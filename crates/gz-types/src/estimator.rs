//! The fitting collaborator: what the ensembler needs from a classifier.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{ModelError, ParamError};
use crate::params::ParamSet;

/// Feature matrix, shape `(n_samples, n_features)`.
pub type Features = Array2<f64>;

/// Class labels, shape `(n_samples,)`.
pub type Labels = Array1<i64>;

/// Static capabilities of an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatorInfo {
    /// Whether grid templating (one clone per grid value) applies.
    pub standard_ensemble: bool,
    /// Neural-network style: trains in epochs and reports checkpoints.
    pub checkpointed: bool,
    pub predict_proba: bool,
    pub does_multiclass: bool,
}

impl Default for EstimatorInfo {
    fn default() -> Self {
        Self {
            standard_ensemble: true,
            checkpointed: false,
            predict_proba: false,
            does_multiclass: true,
        }
    }
}

/// Receives checkpoints from a training loop.
///
/// Called once per saved epoch with the model as it stands and its training
/// loss. Returning an error aborts training.
pub trait CheckpointSink {
    fn on_checkpoint(
        &mut self,
        epoch: usize,
        model: &dyn Estimator,
        loss: f64,
    ) -> Result<(), ModelError>;
}

/// A classifier that can be configured, fitted, queried and snapshotted.
pub trait Estimator: Send + Sync + fmt::Debug {
    /// Registry name of the algorithm (e.g. "random_forest").
    fn algorithm(&self) -> &str;

    fn info(&self) -> EstimatorInfo {
        EstimatorInfo::default()
    }

    /// Current hyperparameters.
    fn params(&self) -> ParamSet;

    /// Apply a parameter set. Either every parameter is accepted or the
    /// estimator is left unchanged.
    fn set_params(&mut self, params: &ParamSet) -> Result<(), ParamError>;

    fn fit(&mut self, x: &Features, y: &Labels) -> Result<(), ModelError>;

    /// Fit while reporting checkpoints. Estimators that do not checkpoint
    /// simply fit.
    fn fit_with_checkpoints(
        &mut self,
        x: &Features,
        y: &Labels,
        _sink: &mut dyn CheckpointSink,
    ) -> Result<(), ModelError> {
        self.fit(x, y)
    }

    fn predict(&self, x: &Features) -> Result<Labels, ModelError>;

    fn predict_proba(&self, _x: &Features) -> Result<Option<Array2<f64>>, ModelError> {
        Ok(None)
    }

    /// Opaque fitted state, restored by [`Estimator::restore`].
    fn snapshot(&self) -> Result<serde_json::Value, ModelError>;

    fn restore(&mut self, state: &serde_json::Value) -> Result<(), ModelError>;

    fn box_clone(&self) -> Box<dyn Estimator>;
}

impl Clone for Box<dyn Estimator> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Check that `x` and `y` describe the same non-empty sample set.
pub fn check_xy(x: &Features, y: &Labels) -> Result<(), ModelError> {
    if x.nrows() == 0 {
        return Err(ModelError::ShapeMismatch {
            message: "no samples".to_string(),
        });
    }
    if x.nrows() != y.len() {
        return Err(ModelError::ShapeMismatch {
            message: format!("X has {} rows but y has {} labels", x.nrows(), y.len()),
        });
    }
    Ok(())
}

/// Sorted distinct labels.
pub fn unique_classes(y: &Labels) -> Vec<i64> {
    let mut classes: Vec<i64> = y.iter().copied().collect();
    classes.sort_unstable();
    classes.dedup();
    classes
}
