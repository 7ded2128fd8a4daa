//! Fit & persist stage.
//!
//! Every candidate is fitted on the training data, dumped to its own file
//! under `save_dir/<algorithm>/` and scored in-sample. Checkpointing
//! algorithms are trained first and contribute one record per reported
//! checkpoint, ranked by training loss instead of score.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use gz_types::{
    check_xy, config_error, CheckpointSink, Estimator, Features, GzError, GzResult, Labels,
    ModelError, ObjectiveDirection, ParamSet,
};

use crate::metrics::{get_scorer, Scorer};
use crate::store::ModelStore;
use crate::templates::CandidateSet;

/// One persisted, scored model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    pub algorithm: String,
    pub path: PathBuf,
    /// In-sample score, or training loss for checkpoints.
    pub score: f64,
    pub direction: ObjectiveDirection,
}

/// Options for [`crate::MetaEnsembler::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Scorer used for the in-sample score.
    pub scoring: String,
    /// Per-algorithm parameters applied just before fitting (e.g. `n_jobs`).
    #[serde(default)]
    pub overrides: BTreeMap<String, ParamSet>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            scoring: "accuracy".to_string(),
            overrides: BTreeMap::new(),
        }
    }
}

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scoring(mut self, scoring: &str) -> Self {
        self.scoring = scoring.to_string();
        self
    }

    pub fn with_override(mut self, algorithm: &str, params: ParamSet) -> Self {
        self.overrides
            .entry(algorithm.to_string())
            .or_default()
            .merge(&params);
        self
    }
}

/// Records of one fit call, grouped per algorithm in fitting order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitHistory {
    pub run_id: Uuid,
    pub save_dir: PathBuf,
    pub fitted_at: DateTime<Utc>,
    groups: Vec<(String, Vec<FitRecord>)>,
}

impl FitHistory {
    pub fn empty() -> Self {
        Self {
            run_id: Uuid::nil(),
            save_dir: PathBuf::new(),
            fitted_at: DateTime::<Utc>::UNIX_EPOCH,
            groups: Vec::new(),
        }
    }

    pub fn get(&self, algorithm: &str) -> Option<&[FitRecord]> {
        self.groups
            .iter()
            .find(|(name, _)| name == algorithm)
            .map(|(_, records)| records.as_slice())
    }

    /// Algorithm names in the order they were fitted.
    pub fn algorithms(&self) -> Vec<&str> {
        self.groups.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FitRecord])> {
        self.groups
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.groups.iter().map(|(_, records)| records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// All records in one sequence ordered by recorded value, highest first.
    pub fn flatten(&self) -> Vec<FitRecord> {
        let mut all: Vec<FitRecord> = self
            .groups
            .iter()
            .flat_map(|(_, records)| records.iter().cloned())
            .collect();
        all.sort_by(|a, b| ObjectiveDirection::Maximize.rank(a.score, b.score));
        all
    }
}

/// Validate inputs, claim `save_dir` and fit every candidate set.
pub(crate) fn fit_all(
    sets: &[CandidateSet],
    x: &Features,
    y: &Labels,
    save_dir: &Path,
    options: &FitOptions,
    store: &dyn ModelStore,
    run_id: Uuid,
) -> GzResult<FitHistory> {
    check_xy(x, y).map_err(|e| config_error!("training data: {e}"))?;
    let scorer = get_scorer(&options.scoring)?;
    if let Some(unknown) = options
        .overrides
        .keys()
        .find(|name| !sets.iter().any(|set| &set.algorithm == *name))
    {
        return Err(config_error!("override given for unknown algorithm '{unknown}'"));
    }
    create_save_dir(save_dir)?;

    // checkpointing algorithms go first, the rest keep their order
    let mut order: Vec<&CandidateSet> = sets.iter().collect();
    order.sort_by_key(|set| !set.checkpointed);

    let mut groups = Vec::with_capacity(order.len());
    for set in order {
        let dir = save_dir.join(&set.algorithm);
        fs::create_dir(&dir).map_err(|e| GzError::DirectoryCreateFailure {
            path: dir.clone(),
            message: e.to_string(),
        })?;
        let overrides = options.overrides.get(&set.algorithm);

        info!("Fitting {} ({} candidates)", set.algorithm, set.len());
        let start = Instant::now();
        let records = if set.checkpointed {
            fit_checkpointed(set, x, y, &dir, overrides, store)?
        } else {
            fit_templates(set, x, y, &dir, overrides, store, scorer)?
        };
        info!(
            "Fitted {} in {:.2}s, {} records",
            set.algorithm,
            start.elapsed().as_secs_f64(),
            records.len()
        );
        groups.push((set.algorithm.clone(), records));
    }

    Ok(FitHistory {
        run_id,
        save_dir: save_dir.to_path_buf(),
        fitted_at: Utc::now(),
        groups,
    })
}

fn create_save_dir(save_dir: &Path) -> GzResult<()> {
    if save_dir.as_os_str().is_empty() {
        return Err(config_error!("Please specify a valid directory."));
    }
    if save_dir.exists() {
        return Err(GzError::DirectoryConflict {
            path: save_dir.to_path_buf(),
        });
    }
    fs::create_dir_all(save_dir).map_err(|e| GzError::DirectoryCreateFailure {
        path: save_dir.to_path_buf(),
        message: e.to_string(),
    })
}

/// A fresh copy of `estimator` with the overrides applied.
fn prepare(
    algorithm: &str,
    estimator: &dyn Estimator,
    overrides: Option<&ParamSet>,
) -> GzResult<Box<dyn Estimator>> {
    let mut estimator = estimator.box_clone();
    if let Some(params) = overrides {
        estimator
            .set_params(params)
            .map_err(|e| GzError::not_fitted(algorithm, format!("override rejected: {e}")))?;
    }
    Ok(estimator)
}

fn fit_templates(
    set: &CandidateSet,
    x: &Features,
    y: &Labels,
    dir: &Path,
    overrides: Option<&ParamSet>,
    store: &dyn ModelStore,
    scorer: Scorer,
) -> GzResult<Vec<FitRecord>> {
    let mut records = Vec::with_capacity(set.len());
    for (idx, candidate) in set.candidates.iter().enumerate() {
        let mut estimator = prepare(&set.algorithm, candidate.estimator.as_ref(), overrides)?;
        estimator
            .fit(x, y)
            .map_err(|e| GzError::not_fitted(&set.algorithm, e.to_string()))?;

        let path = dir.join(format!("{}_{:04}train.json", set.algorithm, idx + 1));
        store.dump(estimator.as_ref(), &path)?;

        let predictions = estimator
            .predict(x)
            .map_err(|e| GzError::not_fitted(&set.algorithm, e.to_string()))?;
        let score = scorer.score(&predictions, y)?;
        debug!("{} -> {}: {}={:.4}", candidate, path.display(), scorer.name(), score);

        records.push(FitRecord {
            algorithm: set.algorithm.clone(),
            path,
            score,
            direction: ObjectiveDirection::Maximize,
        });
    }
    records.sort_by(|a, b| a.direction.rank(a.score, b.score));
    Ok(records)
}

/// Persists each reported checkpoint and records its loss.
struct PersistCheckpoints<'a> {
    algorithm: &'a str,
    dir: &'a Path,
    stem: String,
    store: &'a dyn ModelStore,
    records: Vec<FitRecord>,
    failure: Option<GzError>,
}

impl CheckpointSink for PersistCheckpoints<'_> {
    fn on_checkpoint(
        &mut self,
        epoch: usize,
        model: &dyn Estimator,
        loss: f64,
    ) -> Result<(), ModelError> {
        let path = self.dir.join(format!("{}_{:04}chkpt.json", self.stem, epoch));
        if let Err(e) = self.store.dump(model, &path) {
            let message = e.to_string();
            self.failure = Some(e);
            return Err(ModelError::Checkpoint { message });
        }
        debug!("{} epoch {}: loss={:.4}", self.algorithm, epoch, loss);
        self.records.push(FitRecord {
            algorithm: self.algorithm.to_string(),
            path,
            score: loss,
            direction: ObjectiveDirection::Minimize,
        });
        Ok(())
    }
}

fn fit_checkpointed(
    set: &CandidateSet,
    x: &Features,
    y: &Labels,
    dir: &Path,
    overrides: Option<&ParamSet>,
    store: &dyn ModelStore,
) -> GzResult<Vec<FitRecord>> {
    let mut records = Vec::new();
    for (idx, candidate) in set.candidates.iter().enumerate() {
        let mut estimator = prepare(&set.algorithm, candidate.estimator.as_ref(), overrides)?;
        let stem = if set.len() == 1 {
            set.algorithm.clone()
        } else {
            format!("{}_{:04}", set.algorithm, idx + 1)
        };
        let mut sink = PersistCheckpoints {
            algorithm: &set.algorithm,
            dir,
            stem,
            store,
            records: Vec::new(),
            failure: None,
        };

        if let Err(e) = estimator.fit_with_checkpoints(x, y, &mut sink) {
            return Err(match sink.failure.take() {
                Some(failure) => failure,
                None => GzError::not_fitted(&set.algorithm, e.to_string()),
            });
        }
        records.append(&mut sink.records);
    }
    records.sort_by(|a, b| a.direction.rank(a.score, b.score));
    Ok(records)
}
