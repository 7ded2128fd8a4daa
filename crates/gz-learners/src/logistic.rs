//! Multinomial logistic regression trained by full-batch gradient descent.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use gz_types::{
    check_xy, unique_classes, Estimator, EstimatorInfo, Features, Labels, ModelError, ParamError,
    ParamSet,
};

use crate::util::{
    check_features, column_means, cross_entropy, from_state, labels_from_proba, one_hot,
    softmax_rows, to_state,
};

pub const NAME: &str = "logistic_regression";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticConfig {
    /// Inverse regularization strength.
    pub c: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Stop when the loss improves by less than this between iterations.
    pub tol: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            learning_rate: 0.1,
            tol: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Fitted {
    classes: Vec<i64>,
    /// Standardization applied before the linear map.
    mean: Array1<f64>,
    scale: Array1<f64>,
    /// `(n_features, n_classes)`
    coef: Array2<f64>,
    intercept: Array1<f64>,
    n_iter: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LogisticRegression {
    config: LogisticConfig,
    fitted: Option<Fitted>,
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    /// Iterations run by the last `fit`.
    pub fn n_iter(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.n_iter)
    }

    fn standardize(x: &Features, mean: &Array1<f64>, scale: &Array1<f64>) -> Array2<f64> {
        (x - mean) / scale
    }

    fn proba(&self, x: &Features) -> Result<Array2<f64>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(x.ncols(), fitted.coef.nrows())?;
        let xs = Self::standardize(x, &fitted.mean, &fitted.scale);
        let mut z = xs.dot(&fitted.coef) + &fitted.intercept;
        softmax_rows(&mut z);
        Ok(z)
    }
}

impl Estimator for LogisticRegression {
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
            .with("C", self.config.c)
            .with("max_iter", self.config.max_iter)
            .with("learning_rate", self.config.learning_rate)
            .with("tol", self.config.tol)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<(), ParamError> {
        let mut config = self.config.clone();
        for (name, value) in params.iter() {
            match name.as_str() {
                "C" => config.c = value.to_positive_f64(name)?,
                "max_iter" => config.max_iter = value.to_positive_usize(name)?,
                "learning_rate" => config.learning_rate = value.to_positive_f64(name)?,
                "tol" => config.tol = value.to_f64(name)?.max(0.0),
                _ => return Err(ParamError::unknown(name)),
            }
        }
        self.config = config;
        Ok(())
    }

    fn fit(&mut self, x: &Features, y: &Labels) -> Result<(), ModelError> {
        check_xy(x, y)?;
        let classes = unique_classes(y);
        let (n_samples, n_features) = x.dim();

        let mean = column_means(x);
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let xs = Self::standardize(x, &mean, &scale);
        let targets = one_hot(y, &classes);

        let mut coef = Array2::<f64>::zeros((n_features, classes.len()));
        let mut intercept = Array1::<f64>::zeros(classes.len());
        let alpha = 1.0 / (self.config.c * n_samples as f64);
        let mut previous_loss = f64::INFINITY;
        let mut n_iter = 0;

        for _ in 0..self.config.max_iter {
            n_iter += 1;
            let mut proba = xs.dot(&coef) + &intercept;
            softmax_rows(&mut proba);

            let loss = cross_entropy(&proba, &targets)
                + 0.5 * alpha * coef.iter().map(|w| w * w).sum::<f64>();
            if !loss.is_finite() {
                return Err(ModelError::TrainingFailed {
                    message: format!("loss diverged at iteration {n_iter}"),
                });
            }
            if (previous_loss - loss).abs() < self.config.tol {
                break;
            }
            previous_loss = loss;

            let error = (&proba - &targets) / n_samples as f64;
            let grad_coef = xs.t().dot(&error) + &coef * alpha;
            let grad_intercept = error.sum_axis(Axis(0));
            coef = coef - grad_coef * self.config.learning_rate;
            intercept = intercept - grad_intercept * self.config.learning_rate;
        }

        self.fitted = Some(Fitted {
            classes,
            mean,
            scale,
            coef,
            intercept,
            n_iter,
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
            [0.0, 1.0],
            [0.5, 0.8],
            [1.0, 1.2],
            [4.0, 5.0],
            [4.5, 4.8],
            [5.0, 5.3],
            [9.0, 0.5],
            [9.5, 0.2],
            [8.8, 0.9],
        ];
        let y = array![0, 0, 0, 1, 1, 1, 2, 2, 2];
        (x, y)
    }

    #[test]
    fn test_multiclass_fit() {
        let (x, y) = create_classification_data();
        let mut model = LogisticRegression::new(LogisticConfig {
            max_iter: 500,
            learning_rate: 0.5,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.dim(), (9, 3));
    }

    #[test]
    fn test_params_use_sklearn_names() {
        let mut model = LogisticRegression::default();
        model
            .set_params(&ParamSet::new().with("C", 0.01).with("max_iter", 50))
            .unwrap();
        assert_eq!(model.params().get("C").unwrap().as_f64(), Some(0.01));
        assert!(model.set_params(&ParamSet::new().with("penalty", "l1")).is_err());
    }

    #[test]
    fn test_feature_count_checked() {
        let (x, y) = create_classification_data();
        let mut model = LogisticRegression::default();
        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0, 3.0]]),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }
}
