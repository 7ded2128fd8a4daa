//! Stub estimators shared by the unit tests.

use std::path::PathBuf;

use ndarray::Array1;

use gz_types::{
    check_xy, AlgorithmRegistry, CheckpointSink, Estimator, EstimatorInfo, Features, Labels,
    ModelError, ParamError, ParamSet,
};

use crate::pool::{ScoredModel, ValidationPool};

/// Predicts one fixed label. `fail` makes `fit` error out.
#[derive(Debug, Clone)]
pub(crate) struct Constant {
    label: i64,
    n_jobs: usize,
    fail: bool,
    fitted: bool,
}

impl Constant {
    pub(crate) fn new(label: i64) -> Self {
        Self {
            label,
            n_jobs: 1,
            fail: false,
            fitted: false,
        }
    }
}

impl Estimator for Constant {
    fn algorithm(&self) -> &str {
        "constant"
    }

    fn params(&self) -> ParamSet {
        ParamSet::new()
            .with("label", self.label)
            .with("n_jobs", self.n_jobs)
            .with("fail", self.fail)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<(), ParamError> {
        let mut next = self.clone();
        for (name, value) in params.iter() {
            match name.as_str() {
                "label" => {
                    next.label = value
                        .as_i64()
                        .ok_or_else(|| ParamError::invalid(name, "expected an integer"))?
                }
                "n_jobs" => next.n_jobs = value.to_positive_usize(name)?,
                "fail" => next.fail = value.to_bool(name)?,
                _ => return Err(ParamError::unknown(name)),
            }
        }
        *self = next;
        Ok(())
    }

    fn fit(&mut self, x: &Features, y: &Labels) -> Result<(), ModelError> {
        check_xy(x, y)?;
        if self.fail {
            return Err(ModelError::TrainingFailed {
                message: "asked to fail".to_string(),
            });
        }
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Features) -> Result<Labels, ModelError> {
        if !self.fitted {
            return Err(ModelError::NotFitted);
        }
        Ok(Array1::from_elem(x.nrows(), self.label))
    }

    fn snapshot(&self) -> Result<serde_json::Value, ModelError> {
        Ok(serde_json::json!({ "fitted": self.fitted }))
    }

    fn restore(&mut self, state: &serde_json::Value) -> Result<(), ModelError> {
        self.fitted = state
            .get("fitted")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ModelError::InvalidSnapshot {
                message: "missing 'fitted'".to_string(),
            })?;
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

/// Trains in epochs, reporting the configured losses as checkpoints.
#[derive(Debug, Clone)]
pub(crate) struct Checkpointed {
    epochs: usize,
    losses: Vec<f64>,
    epoch: usize,
}

impl Default for Checkpointed {
    fn default() -> Self {
        Self {
            epochs: 3,
            losses: vec![0.9, 0.4, 0.6],
            epoch: 0,
        }
    }
}

impl Estimator for Checkpointed {
    fn algorithm(&self) -> &str {
        "checkpointed"
    }

    fn info(&self) -> EstimatorInfo {
        EstimatorInfo {
            standard_ensemble: false,
            checkpointed: true,
            ..Default::default()
        }
    }

    fn params(&self) -> ParamSet {
        ParamSet::new()
            .with("epochs", self.epochs)
            .with("losses", self.losses.clone())
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<(), ParamError> {
        let mut next = self.clone();
        for (name, value) in params.iter() {
            match name.as_str() {
                "epochs" => next.epochs = value.to_positive_usize(name)?,
                "losses" => {
                    next.losses = value
                        .as_list()
                        .ok_or_else(|| ParamError::invalid(name, "expected a list"))?
                        .iter()
                        .map(|v| v.to_f64(name))
                        .collect::<Result<_, _>>()?
                }
                _ => return Err(ParamError::unknown(name)),
            }
        }
        *self = next;
        Ok(())
    }

    fn fit(&mut self, x: &Features, y: &Labels) -> Result<(), ModelError> {
        check_xy(x, y)?;
        self.epoch = self.epochs;
        Ok(())
    }

    fn fit_with_checkpoints(
        &mut self,
        x: &Features,
        y: &Labels,
        sink: &mut dyn CheckpointSink,
    ) -> Result<(), ModelError> {
        check_xy(x, y)?;
        for epoch in 1..=self.epochs {
            self.epoch = epoch;
            let loss = self.losses.get(epoch - 1).copied().unwrap_or(1.0);
            sink.on_checkpoint(epoch, &*self, loss)?;
        }
        Ok(())
    }

    fn predict(&self, x: &Features) -> Result<Labels, ModelError> {
        if self.epoch == 0 {
            return Err(ModelError::NotFitted);
        }
        Ok(Array1::from_elem(x.nrows(), (self.epoch % 2) as i64))
    }

    fn snapshot(&self) -> Result<serde_json::Value, ModelError> {
        Ok(serde_json::json!({ "epoch": self.epoch }))
    }

    fn restore(&mut self, state: &serde_json::Value) -> Result<(), ModelError> {
        self.epoch = state
            .get("epoch")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ModelError::InvalidSnapshot {
                message: "missing 'epoch'".to_string(),
            })? as usize;
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

pub(crate) fn registry() -> AlgorithmRegistry {
    AlgorithmRegistry::new()
        .with("constant", || Box::new(Constant::new(0)))
        .with("checkpointed", || Box::new(Checkpointed::default()))
}

/// A pool whose entries carry the given predictions and validation scores.
pub(crate) fn pool_from(entries: Vec<(Labels, f64)>) -> ValidationPool {
    let scored = entries
        .into_iter()
        .enumerate()
        .map(|(i, (predictions, score))| ScoredModel {
            path: PathBuf::from(format!("stub_{i:04}train.json")),
            model: Box::new(Constant::new(0)),
            predictions,
            score,
        })
        .collect();
    ValidationPool::from_scored(scored)
}
