//! Validation cache: every persisted model's validation predictions, computed
//! once per hillclimb call.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use gz_types::{Estimator, Features, GzError, GzResult, Labels, ObjectiveDirection};

use crate::fit::FitRecord;
use crate::metrics::Scorer;
use crate::store::ModelStore;

/// Position of an entry in the validation pool after sorting by score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolIndex(pub usize);

impl fmt::Display for PoolIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A loaded model with its validation predictions and score.
#[derive(Debug)]
pub struct ScoredModel {
    pub path: PathBuf,
    pub model: Box<dyn Estimator>,
    pub predictions: Labels,
    pub score: f64,
}

#[derive(Debug)]
pub struct PoolEntry {
    pub index: PoolIndex,
    pub path: PathBuf,
    pub model: Box<dyn Estimator>,
    pub predictions: Labels,
    pub score: f64,
}

#[derive(Debug)]
pub struct ValidationPool {
    entries: Vec<PoolEntry>,
}

impl ValidationPool {
    /// Load every record, predict the validation set and score it.
    pub fn build(
        records: &[FitRecord],
        store: &dyn ModelStore,
        x_val: &Features,
        y_val: &Labels,
        scorer: Scorer,
    ) -> GzResult<Self> {
        let mut scored = Vec::with_capacity(records.len());
        for record in records {
            let model = store.load(&record.path)?;
            let predictions = model
                .predict(x_val)
                .map_err(|e| GzError::not_fitted(&record.algorithm, e.to_string()))?;
            let score = scorer.score(&predictions, y_val)?;
            debug!("{}: validation {}={:.4}", record.path.display(), scorer.name(), score);
            scored.push(ScoredModel {
                path: record.path.clone(),
                model,
                predictions,
                score,
            });
        }

        let pool = Self::from_scored(scored);
        if let Some(max) = pool.max_score() {
            info!("Max validation score = {:.4}", max);
        }
        Ok(pool)
    }

    /// Sort by validation score, best first (stable), and index the result.
    pub fn from_scored(mut scored: Vec<ScoredModel>) -> Self {
        scored.sort_by(|a, b| ObjectiveDirection::Maximize.rank(a.score, b.score));
        let entries = scored
            .into_iter()
            .enumerate()
            .map(|(i, s)| PoolEntry {
                index: PoolIndex(i),
                path: s.path,
                model: s.model,
                predictions: s.predictions,
                score: s.score,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn get(&self, index: PoolIndex) -> Option<&PoolEntry> {
        self.entries.get(index.0)
    }

    pub fn indices(&self) -> impl Iterator<Item = PoolIndex> + '_ {
        self.entries.iter().map(|e| e.index)
    }

    pub fn max_score(&self) -> Option<f64> {
        self.entries.first().map(|e| e.score)
    }
}
