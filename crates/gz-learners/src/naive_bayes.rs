//! Gaussian Naive Bayes classifier.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use gz_types::{
    check_xy, unique_classes, Estimator, EstimatorInfo, Features, Labels, ModelError, ParamError,
    ParamSet,
};

use crate::util::{check_features, from_state, labels_from_proba, softmax_rows, to_state};

pub const NAME: &str = "naive_bayes";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Fitted {
    classes: Vec<i64>,
    /// `(n_classes, n_features)`
    means: Array2<f64>,
    variances: Array2<f64>,
    log_priors: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct GaussianNaiveBayes {
    /// Portion of the largest feature variance added to all variances.
    var_smoothing: f64,
    fitted: Option<Fitted>,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            var_smoothing: 1e-9,
            fitted: None,
        }
    }

    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    fn joint_log_likelihood(&self, x: &Features) -> Result<Array2<f64>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(x.ncols(), fitted.means.ncols())?;

        let n_classes = fitted.classes.len();
        let mut jll = Array2::zeros((x.nrows(), n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for c in 0..n_classes {
                let mut ll = fitted.log_priors[c];
                for (j, &value) in row.iter().enumerate() {
                    let var = fitted.variances[[c, j]];
                    let diff = value - fitted.means[[c, j]];
                    ll -= 0.5 * (2.0 * PI * var).ln() + diff * diff / (2.0 * var);
                }
                jll[[i, c]] = ll;
            }
        }
        Ok(jll)
    }
}

impl Estimator for GaussianNaiveBayes {
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
        ParamSet::new().with("var_smoothing", self.var_smoothing)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<(), ParamError> {
        let mut var_smoothing = self.var_smoothing;
        for (name, value) in params.iter() {
            match name.as_str() {
                "var_smoothing" => var_smoothing = value.to_positive_f64(name)?,
                _ => return Err(ParamError::unknown(name)),
            }
        }
        self.var_smoothing = var_smoothing;
        Ok(())
    }

    fn fit(&mut self, x: &Features, y: &Labels) -> Result<(), ModelError> {
        check_xy(x, y)?;
        let classes = unique_classes(y);
        let (n_samples, n_features) = x.dim();

        let max_variance = x
            .var_axis(Axis(0), 0.0)
            .fold(0.0_f64, |acc, &v| acc.max(v));
        let epsilon = self.var_smoothing * max_variance.max(f64::MIN_POSITIVE);

        let mut means = Array2::zeros((classes.len(), n_features));
        let mut variances = Array2::zeros((classes.len(), n_features));
        let mut log_priors = Array1::zeros(classes.len());

        for (c, &class) in classes.iter().enumerate() {
            let indices: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|(_, label)| **label == class)
                .map(|(i, _)| i)
                .collect();
            let rows = x.select(Axis(0), &indices);

            // Welford's single pass per feature
            for j in 0..n_features {
                let (mut mean, mut m2) = (0.0, 0.0);
                for (count, &value) in rows.column(j).iter().enumerate() {
                    let delta = value - mean;
                    mean += delta / (count + 1) as f64;
                    m2 += delta * (value - mean);
                }
                means[[c, j]] = mean;
                variances[[c, j]] = m2 / indices.len() as f64 + epsilon;
            }
            log_priors[c] = (indices.len() as f64 / n_samples as f64).ln();
        }

        self.fitted = Some(Fitted {
            classes,
            means,
            variances,
            log_priors,
        });
        Ok(())
    }

    fn predict(&self, x: &Features) -> Result<Labels, ModelError> {
        let jll = self.joint_log_likelihood(x)?;
        let classes = &self.fitted.as_ref().ok_or(ModelError::NotFitted)?.classes;
        Ok(labels_from_proba(&jll, classes))
    }

    fn predict_proba(&self, x: &Features) -> Result<Option<Array2<f64>>, ModelError> {
        let mut jll = self.joint_log_likelihood(x)?;
        softmax_rows(&mut jll);
        Ok(Some(jll))
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
            [1.0, 2.0],
            [1.2, 1.8],
            [0.8, 2.2],
            [6.0, 7.0],
            [6.2, 6.8],
            [5.8, 7.2],
        ];
        let y = array![0, 0, 0, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_gaussian_naive_bayes() {
        let (x, y) = create_classification_data();
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();

        assert_eq!(nb.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_gaussian_proba() {
        let (x, y) = create_classification_data();
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();

        let proba = nb.predict_proba(&x).unwrap().unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!(proba[[0, 0]] > 0.99);
    }

    #[test]
    fn test_var_smoothing_must_be_positive() {
        let mut nb = GaussianNaiveBayes::new();
        assert!(nb.set_params(&ParamSet::new().with("var_smoothing", -1.0)).is_err());
        assert!(nb.set_params(&ParamSet::new().with("var_smoothing", 1e-6)).is_ok());
        assert_eq!(nb.params().get("var_smoothing").unwrap().as_f64(), Some(1e-6));
    }
}
