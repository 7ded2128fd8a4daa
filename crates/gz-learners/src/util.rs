use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::de::DeserializeOwned;
use serde::Serialize;

use gz_types::{Labels, ModelError};

pub(crate) fn to_state<T: Serialize>(state: &T) -> Result<serde_json::Value, ModelError> {
    serde_json::to_value(state).map_err(|e| ModelError::InvalidSnapshot {
        message: e.to_string(),
    })
}

pub(crate) fn from_state<T: DeserializeOwned>(state: &serde_json::Value) -> Result<T, ModelError> {
    serde_json::from_value(state.clone()).map_err(|e| ModelError::InvalidSnapshot {
        message: e.to_string(),
    })
}

pub(crate) fn check_features(x_cols: usize, expected: usize) -> Result<(), ModelError> {
    if x_cols != expected {
        return Err(ModelError::ShapeMismatch {
            message: format!("expected {expected} features, got {x_cols}"),
        });
    }
    Ok(())
}

/// Index of the largest value; the first one wins on ties.
pub(crate) fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Map each row's most probable column back to its class label.
pub(crate) fn labels_from_proba(proba: &Array2<f64>, classes: &[i64]) -> Labels {
    proba
        .rows()
        .into_iter()
        .map(|row| classes[argmax(row)])
        .collect()
}

/// Row-wise softmax, shifted by the row maximum for stability.
pub(crate) fn softmax_rows(z: &mut Array2<f64>) {
    for mut row in z.axis_iter_mut(Axis(0)) {
        let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

pub(crate) fn one_hot(y: &Labels, classes: &[i64]) -> Array2<f64> {
    let mut encoded = Array2::zeros((y.len(), classes.len()));
    for (i, label) in y.iter().enumerate() {
        if let Ok(j) = classes.binary_search(label) {
            encoded[[i, j]] = 1.0;
        }
    }
    encoded
}

/// Mean cross-entropy of `proba` against one-hot `targets`.
pub(crate) fn cross_entropy(proba: &Array2<f64>, targets: &Array2<f64>) -> f64 {
    let eps = 1e-15;
    let total: f64 = proba
        .iter()
        .zip(targets.iter())
        .filter(|(_, t)| **t > 0.0)
        .map(|(p, t)| -t * p.clamp(eps, 1.0).ln())
        .sum();
    total / proba.nrows().max(1) as f64
}

pub(crate) fn gather_rows(x: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    x.select(Axis(0), indices)
}

pub(crate) fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub(crate) fn column_means(x: &Array2<f64>) -> Array1<f64> {
    x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()))
}
