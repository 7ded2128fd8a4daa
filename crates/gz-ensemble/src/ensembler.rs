//! The orchestrator tying the stages together.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use gz_optimizer::{default_library, LibraryConfig};
use gz_types::{config_error, AlgorithmRegistry, Estimator, Features, GzError, GzResult, Labels};

use crate::fit::{fit_all, FitHistory, FitOptions};
use crate::hillclimb::{hillclimb, HillclimbConfig, Selection};
use crate::metrics::get_scorer;
use crate::pool::ValidationPool;
use crate::store::{JsonModelStore, ModelStore};
use crate::templates::{build_candidates, CandidateSet};
use crate::vote::weighted_vote;

/// Builds a pool of candidate models, fits and persists them, then
/// hillclimbs a weighted-vote ensemble on validation data.
#[derive(Debug)]
pub struct MetaEnsembler {
    run_id: Uuid,
    registry: Arc<AlgorithmRegistry>,
    library: LibraryConfig,
    store: Box<dyn ModelStore>,
    ensemble: Vec<CandidateSet>,
    history: FitHistory,
    selection: Option<Selection>,
}

impl MetaEnsembler {
    /// Ensembler over `names` using the default grids for a data set of
    /// `data_shape = (n_samples, n_features)`.
    pub fn new(registry: AlgorithmRegistry, names: &[&str], data_shape: (usize, usize)) -> GzResult<Self> {
        let (n_samples, n_features) = data_shape;
        if n_samples == 0 || n_features == 0 {
            return Err(config_error!(
                "data_shape must be (n_samples, n_features) with both > 0, got {data_shape:?}"
            ));
        }
        let library = default_library(names, n_samples, n_features)?;
        Self::with_library(registry, library)
    }

    /// Ensembler over an explicit grid library.
    pub fn with_library(registry: AlgorithmRegistry, library: LibraryConfig) -> GzResult<Self> {
        let registry = Arc::new(registry);
        let store = Box::new(JsonModelStore::new(Arc::clone(&registry)));
        let mut ensembler = Self {
            run_id: Uuid::new_v4(),
            registry,
            library,
            store,
            ensemble: Vec::new(),
            history: FitHistory::empty(),
            selection: None,
        };
        ensembler.build()?;
        Ok(ensembler)
    }

    /// Swap the model store.
    pub fn with_store(mut self, store: impl ModelStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    /// Regenerate the candidates of every algorithm in the library.
    pub fn build(&mut self) -> GzResult<()> {
        self.ensemble = self
            .library
            .iter()
            .map(|spec| build_candidates(spec, &self.registry))
            .collect::<GzResult<_>>()?;
        Ok(())
    }

    pub fn candidates(&self) -> &[CandidateSet] {
        &self.ensemble
    }

    /// Fits to expect per algorithm.
    pub fn summary(&self) -> EnsembleSummary {
        let algorithms: Vec<(String, usize)> = self
            .ensemble
            .iter()
            .map(|set| (set.algorithm.clone(), set.len()))
            .collect();
        let summary = EnsembleSummary {
            run_id: self.run_id,
            total: algorithms.iter().map(|(_, n)| n).sum(),
            algorithms,
        };
        info!("{summary}");
        summary
    }

    /// Fit every candidate on `(x, y)` and persist it under `save_dir`, which
    /// must not exist yet.
    pub fn fit(
        &mut self,
        x: &Features,
        y: &Labels,
        save_dir: impl AsRef<Path>,
        options: &FitOptions,
    ) -> GzResult<&FitHistory> {
        let history = fit_all(
            &self.ensemble,
            x,
            y,
            save_dir.as_ref(),
            options,
            self.store.as_ref(),
            self.run_id,
        )?;
        info!("Run {}: {} models persisted", self.run_id, history.total());
        self.history = history;
        self.selection = None;
        Ok(&self.history)
    }

    pub fn history(&self) -> &FitHistory {
        &self.history
    }

    /// Hillclimb on validation data. Returns the `(iteration, score)`
    /// trajectory; the selected ensemble is kept in [`Self::selection`].
    pub fn hillclimb(
        &mut self,
        x_val: &Features,
        y_val: &Labels,
        config: &HillclimbConfig,
    ) -> GzResult<Vec<(usize, f64)>> {
        if self.history.is_empty() {
            return Err(config_error!("nothing to hillclimb over, call fit first"));
        }
        config.validate()?;
        let scorer = get_scorer(&config.scoring)?;

        let pool = ValidationPool::build(
            &self.history.flatten(),
            self.store.as_ref(),
            x_val,
            y_val,
            scorer,
        )?;
        let selection = hillclimb(&pool, y_val, scorer, config)?;
        let trajectory = selection.trajectory.clone();
        self.selection = Some(selection);
        Ok(trajectory)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Load the selected members from the store.
    pub fn weighted_ensemble(&self) -> GzResult<WeightedEnsemble> {
        let selection = self
            .selection
            .as_ref()
            .ok_or_else(|| config_error!("no selection yet, call hillclimb first"))?;
        let mut members = Vec::with_capacity(selection.members.len());
        for (_, path, weight) in selection.weighted_members() {
            members.push((self.store.load(path)?, weight as f64));
        }
        Ok(WeightedEnsemble { members })
    }
}

/// Number of fits per algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSummary {
    pub run_id: Uuid,
    pub algorithms: Vec<(String, usize)>,
    pub total: usize,
}

impl fmt::Display for EnsembleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, fits) in &self.algorithms {
            writeln!(f, "Algorithm: {name} \tFits: {fits}")?;
        }
        write!(f, "\nTotal number of fits = {}", self.total)
    }
}

/// Fitted members of a selection with their vote weights.
#[derive(Debug)]
pub struct WeightedEnsemble {
    members: Vec<(Box<dyn Estimator>, f64)>,
}

impl WeightedEnsemble {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.members.iter().map(|(_, w)| *w).collect()
    }

    pub fn predict(&self, x: &Features) -> GzResult<Labels> {
        let predictions = self
            .members
            .iter()
            .map(|(model, _)| {
                model
                    .predict(x)
                    .map_err(|e| GzError::not_fitted(model.algorithm(), e.to_string()))
            })
            .collect::<GzResult<Vec<_>>>()?;
        let refs: Vec<&Labels> = predictions.iter().collect();
        weighted_vote(&refs, &self.weights())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::registry;
    use gz_optimizer::{AlgorithmSpec, GridDescriptor, GridEntry};
    use ndarray::array;
    use tempfile::TempDir;

    fn library() -> LibraryConfig {
        LibraryConfig::new(vec![
            AlgorithmSpec::new("constant")
                .with_entry(GridEntry::new("label", GridDescriptor::take(vec![0, 1, 2]))),
            AlgorithmSpec::new("checkpointed")
                .with_entry(GridEntry::new("epochs", GridDescriptor::take(vec![2]))),
        ])
        .unwrap()
    }

    #[test]
    fn summary_counts_fits() {
        let ensembler = MetaEnsembler::with_library(registry(), library()).unwrap();
        let summary = ensembler.summary();
        assert_eq!(
            summary.algorithms,
            vec![("constant".to_string(), 3), ("checkpointed".to_string(), 1)]
        );
        assert_eq!(summary.total, 4);
        assert!(summary.to_string().contains("Total number of fits = 4"));
    }

    #[test]
    fn hillclimb_before_fit_is_rejected() {
        let mut ensembler = MetaEnsembler::with_library(registry(), library()).unwrap();
        let result = ensembler.hillclimb(&array![[0.0]], &array![0], &HillclimbConfig::new());
        assert!(matches!(result, Err(GzError::InvalidConfiguration(_))));
    }

    #[test]
    fn fit_then_hillclimb_then_predict() {
        let tmp = TempDir::new().unwrap();
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1, 1, 1, 0];

        let mut ensembler = MetaEnsembler::with_library(registry(), library()).unwrap();
        let history = ensembler.fit(&x, &y, tmp.path().join("run"), &FitOptions::new()).unwrap();
        assert_eq!(history.algorithms(), vec!["checkpointed", "constant"]);
        assert_eq!(history.total(), 5);

        let config = HillclimbConfig::new()
            .with_n_best(crate::SeedSize::Count(1))
            .with_p(0.5)
            .with_iterations(5)
            .with_seed(42);
        let trajectory = ensembler.hillclimb(&x, &y, &config).unwrap();
        assert!(!trajectory.is_empty() && trajectory.len() <= 5);

        let selection = ensembler.selection().unwrap();
        assert_eq!(selection.initial_score, 0.75);
        assert!(selection.score >= selection.initial_score);

        let ensemble = ensembler.weighted_ensemble().unwrap();
        assert_eq!(ensemble.len(), selection.members.len());
        assert_eq!(ensemble.weights().len(), ensemble.len());
        // every member predicts a constant, so the vote does too
        let predicted = ensemble.predict(&x).unwrap();
        assert!(predicted.iter().all(|label| *label == predicted[0]));
    }

    #[test]
    fn second_fit_needs_a_fresh_directory() {
        let tmp = TempDir::new().unwrap();
        let x = array![[0.0], [1.0]];
        let y = array![0, 1];
        let mut ensembler = MetaEnsembler::with_library(registry(), library()).unwrap();

        ensembler.fit(&x, &y, tmp.path().join("run1"), &FitOptions::new()).unwrap();
        assert!(matches!(
            ensembler.fit(&x, &y, tmp.path().join("run1"), &FitOptions::new()),
            Err(GzError::DirectoryConflict { .. })
        ));
        assert!(ensembler.fit(&x, &y, tmp.path().join("run2"), &FitOptions::new()).is_ok());
    }

    #[test]
    fn zero_sized_data_shape_is_rejected() {
        assert!(MetaEnsembler::new(registry(), &["constant"], (0, 3)).is_err());
    }
}
