//! K-Nearest Neighbors classifier.

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use gz_types::{
    check_xy, unique_classes, Estimator, EstimatorInfo, Features, Labels, ModelError, ParamError,
    ParamSet,
};

use crate::util::{check_features, from_state, labels_from_proba, squared_distance, to_state};

pub const NAME: &str = "nearest_neighbors";

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

impl WeightScheme {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Distance => "distance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnConfig {
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    /// Worker threads used by `predict`; 1 keeps it on the calling thread.
    pub n_jobs: usize,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: WeightScheme::Uniform,
            n_jobs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Fitted {
    x: Array2<f64>,
    y: Vec<i64>,
    classes: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct KNearestNeighbors {
    config: KnnConfig,
    fitted: Option<Fitted>,
}

impl KNearestNeighbors {
    pub fn new(config: KnnConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn with_k(k: usize) -> Self {
        Self::new(KnnConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    fn class_votes(&self, fitted: &Fitted, row: ArrayView1<f64>) -> Vec<f64> {
        let mut distances: Vec<(f64, usize)> = fitted
            .x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, train)| (squared_distance(row, train).sqrt(), i))
            .collect();
        distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let k = self.config.n_neighbors.min(distances.len());
        let mut votes = vec![0.0; fitted.classes.len()];
        for &(distance, i) in &distances[..k] {
            let weight = match self.config.weights {
                WeightScheme::Uniform => 1.0,
                WeightScheme::Distance => 1.0 / distance.max(1e-12),
            };
            if let Ok(class) = fitted.classes.binary_search(&fitted.y[i]) {
                votes[class] += weight;
            }
        }
        let total: f64 = votes.iter().sum();
        if total > 0.0 {
            votes.iter_mut().for_each(|v| *v /= total);
        }
        votes
    }

    fn proba(&self, x: &Features) -> Result<Array2<f64>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(x.ncols(), fitted.x.ncols())?;

        let rows: Vec<ArrayView1<f64>> = x.rows().into_iter().collect();
        let votes: Vec<Vec<f64>> = if self.config.n_jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.n_jobs)
                .build()
                .map_err(|e| ModelError::TrainingFailed {
                    message: format!("could not start {} workers: {e}", self.config.n_jobs),
                })?;
            pool.install(|| rows.par_iter().map(|row| self.class_votes(fitted, *row)).collect())
        } else {
            rows.iter().map(|row| self.class_votes(fitted, *row)).collect()
        };

        let n_classes = fitted.classes.len();
        let flat: Vec<f64> = votes.into_iter().flatten().collect();
        Array2::from_shape_vec((x.nrows(), n_classes), flat).map_err(|e| ModelError::ShapeMismatch {
            message: e.to_string(),
        })
    }
}

impl Estimator for KNearestNeighbors {
    fn algorithm(&self) -> &str {
        NAME
    }

    fn info(&self) -> EstimatorInfo {
        EstimatorInfo {
            predict_proba: true,
            ..Default::default()
        }
    }

    fn params(&self) -> ParamSet {
        ParamSet::new()
            .with("n_neighbors", self.config.n_neighbors)
            .with("weights", self.config.weights.as_str())
            .with("n_jobs", self.config.n_jobs)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<(), ParamError> {
        let mut config = self.config.clone();
        for (name, value) in params.iter() {
            match name.as_str() {
                "n_neighbors" => config.n_neighbors = value.to_positive_usize(name)?,
                "weights" => {
                    config.weights = match value.to_text(name)? {
                        "uniform" => WeightScheme::Uniform,
                        "distance" => WeightScheme::Distance,
                        other => {
                            return Err(ParamError::invalid(
                                name,
                                format!("expected 'uniform' or 'distance', got '{other}'"),
                            ))
                        }
                    }
                }
                "n_jobs" => config.n_jobs = value.to_positive_usize(name)?,
                _ => return Err(ParamError::unknown(name)),
            }
        }
        self.config = config;
        Ok(())
    }

    fn fit(&mut self, x: &Features, y: &Labels) -> Result<(), ModelError> {
        check_xy(x, y)?;
        self.fitted = Some(Fitted {
            x: x.clone(),
            y: y.to_vec(),
            classes: unique_classes(y),
        });
        Ok(())
    }

    fn predict(&self, x: &Features) -> Result<Labels, ModelError> {
        let proba = self.proba(x)?;
        let classes = &self.fitted.as_ref().ok_or(ModelError::NotFitted)?.classes;
        Ok(labels_from_proba(&proba, classes))
    }

    fn predict_proba(&self, x: &Features) -> Result<Option<Array2<f64>>, ModelError> {
        self.proba(x).map(Some)
    }

    fn snapshot(&self) -> Result<serde_json::Value, ModelError> {
        to_state(&self.fitted)
    }

    fn restore(&mut self, state: &serde_json::Value) -> Result<(), ModelError> {
        self.fitted = from_state(state)?;
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Features, Labels) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.2],
            [0.2, 0.1],
            [5.0, 5.0],
            [5.1, 4.9],
            [4.9, 5.2],
        ];
        let y = array![0, 0, 0, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();
        let mut knn = KNearestNeighbors::with_k(3);
        knn.fit(&x, &y).unwrap();

        let predictions = knn.predict(&array![[0.05, 0.05], [5.0, 5.1]]).unwrap();
        assert_eq!(predictions, array![0, 1]);
    }

    #[test]
    fn test_parallel_predict_matches_serial() {
        let (x, y) = create_classification_data();
        let mut serial = KNearestNeighbors::with_k(3);
        serial.fit(&x, &y).unwrap();
        let mut parallel = serial.clone();
        parallel.set_params(&ParamSet::new().with("n_jobs", 2)).unwrap();

        assert_eq!(serial.predict(&x).unwrap(), parallel.predict(&x).unwrap());
    }

    #[test]
    fn test_set_params_is_atomic() {
        let mut knn = KNearestNeighbors::with_k(3);
        let params = ParamSet::new().with("n_neighbors", 7).with("leaf_size", 30);
        let err = knn.set_params(&params).unwrap_err();

        assert_eq!(err.parameter(), "leaf_size");
        assert_eq!(knn.params().get("n_neighbors").unwrap().as_i64(), Some(3));
    }

    #[test]
    fn test_snapshot_restores_predictions() {
        let (x, y) = create_classification_data();
        let mut knn = KNearestNeighbors::with_k(1);
        knn.fit(&x, &y).unwrap();

        let mut restored = KNearestNeighbors::default();
        restored.set_params(&knn.params()).unwrap();
        restored.restore(&knn.snapshot().unwrap()).unwrap();
        assert_eq!(restored.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_predict_before_fit() {
        let knn = KNearestNeighbors::with_k(1);
        assert_eq!(knn.predict(&array![[1.0, 2.0]]), Err(ModelError::NotFitted));
    }
}
