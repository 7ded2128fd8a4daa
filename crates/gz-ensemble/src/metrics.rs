//! Scorers selectable by name.
//!
//! | Name                | Measures                                          |
//! |---------------------|---------------------------------------------------|
//! | `accuracy`          | fraction of exact matches                         |
//! | `balanced_accuracy` | mean per-class recall over the true classes       |
//! | `precision`         | macro-averaged precision                          |
//! | `recall`            | macro-averaged recall                             |
//! | `f1`                | macro-averaged F1                                 |
//! | `mcc`               | multiclass Matthews correlation coefficient       |
//! | `neg_log_loss`      | negated log loss of hard labels (clipped)         |
//!
//! Every scorer is "higher is better" and takes `(y_pred, y_true)`.

use std::collections::BTreeSet;
use std::fmt;

use gz_types::{config_error, GzResult, Labels, ModelError};

type ScoreFn = fn(&[i64], &[i64]) -> f64;

const SCORERS: &[(&str, ScoreFn)] = &[
    ("accuracy", accuracy),
    ("balanced_accuracy", balanced_accuracy),
    ("precision", precision),
    ("recall", recall),
    ("f1", f1),
    ("mcc", mcc),
    ("neg_log_loss", neg_log_loss),
];

const LOG_LOSS_EPS: f64 = 1e-15;

/// A named scoring function.
#[derive(Clone, Copy)]
pub struct Scorer {
    name: &'static str,
    func: ScoreFn,
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scorer").field(&self.name).finish()
    }
}

impl Scorer {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn score(&self, y_pred: &Labels, y_true: &Labels) -> GzResult<f64> {
        if y_pred.len() != y_true.len() {
            return Err(ModelError::ShapeMismatch {
                message: format!(
                    "{} predictions for {} labels",
                    y_pred.len(),
                    y_true.len()
                ),
            }
            .into());
        }
        if y_true.is_empty() {
            return Err(config_error!("cannot score an empty label set"));
        }
        Ok((self.func)(&y_pred.to_vec(), &y_true.to_vec()))
    }
}

/// Look up a scorer by name.
pub fn get_scorer(name: &str) -> GzResult<Scorer> {
    SCORERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(name, func)| Scorer { name, func })
        .ok_or_else(|| {
            config_error!(
                "Unknown scorer '{name}'. Valid options: {}",
                scorer_names().join(", ")
            )
        })
}

pub fn scorer_names() -> Vec<&'static str> {
    SCORERS.iter().map(|(name, _)| *name).collect()
}

/// Per-class true positive, predicted and actual counts.
struct ClassCounts {
    classes: Vec<i64>,
    true_positive: Vec<f64>,
    predicted: Vec<f64>,
    actual: Vec<f64>,
}

impl ClassCounts {
    fn new(y_pred: &[i64], y_true: &[i64]) -> Self {
        let classes: Vec<i64> = y_pred
            .iter()
            .chain(y_true.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut counts = Self {
            true_positive: vec![0.0; classes.len()],
            predicted: vec![0.0; classes.len()],
            actual: vec![0.0; classes.len()],
            classes,
        };
        for (p, t) in y_pred.iter().zip(y_true) {
            let (Ok(pi), Ok(ti)) = (counts.classes.binary_search(p), counts.classes.binary_search(t))
            else {
                continue;
            };
            counts.predicted[pi] += 1.0;
            counts.actual[ti] += 1.0;
            if pi == ti {
                counts.true_positive[pi] += 1.0;
            }
        }
        counts
    }

    fn ratio(num: f64, den: f64) -> f64 {
        if den > 0.0 {
            num / den
        } else {
            0.0
        }
    }

    fn precision(&self) -> Vec<f64> {
        self.true_positive
            .iter()
            .zip(&self.predicted)
            .map(|(tp, p)| Self::ratio(*tp, *p))
            .collect()
    }

    fn recall(&self) -> Vec<f64> {
        self.true_positive
            .iter()
            .zip(&self.actual)
            .map(|(tp, a)| Self::ratio(*tp, *a))
            .collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn accuracy(y_pred: &[i64], y_true: &[i64]) -> f64 {
    let hits = y_pred.iter().zip(y_true).filter(|(p, t)| p == t).count();
    hits as f64 / y_true.len() as f64
}

fn balanced_accuracy(y_pred: &[i64], y_true: &[i64]) -> f64 {
    let counts = ClassCounts::new(y_pred, y_true);
    let recalls: Vec<f64> = counts
        .recall()
        .into_iter()
        .zip(&counts.actual)
        .filter(|(_, actual)| **actual > 0.0)
        .map(|(r, _)| r)
        .collect();
    mean(&recalls)
}

fn precision(y_pred: &[i64], y_true: &[i64]) -> f64 {
    mean(&ClassCounts::new(y_pred, y_true).precision())
}

fn recall(y_pred: &[i64], y_true: &[i64]) -> f64 {
    mean(&ClassCounts::new(y_pred, y_true).recall())
}

fn f1(y_pred: &[i64], y_true: &[i64]) -> f64 {
    let counts = ClassCounts::new(y_pred, y_true);
    let f1s: Vec<f64> = counts
        .precision()
        .into_iter()
        .zip(counts.recall())
        .map(|(p, r)| ClassCounts::ratio(2.0 * p * r, p + r))
        .collect();
    mean(&f1s)
}

fn mcc(y_pred: &[i64], y_true: &[i64]) -> f64 {
    let counts = ClassCounts::new(y_pred, y_true);
    let s = y_true.len() as f64;
    let c: f64 = counts.true_positive.iter().sum();
    let pt: f64 = counts.predicted.iter().zip(&counts.actual).map(|(p, t)| p * t).sum();
    let pp: f64 = counts.predicted.iter().map(|p| p * p).sum();
    let tt: f64 = counts.actual.iter().map(|t| t * t).sum();

    let denominator = ((s * s - pp) * (s * s - tt)).sqrt();
    ClassCounts::ratio(c * s - pt, denominator)
}

fn neg_log_loss(y_pred: &[i64], y_true: &[i64]) -> f64 {
    let correct = (1.0 - LOG_LOSS_EPS).ln();
    let wrong = LOG_LOSS_EPS.ln();
    let total: f64 = y_pred
        .iter()
        .zip(y_true)
        .map(|(p, t)| if p == t { correct } else { wrong })
        .sum();
    total / y_true.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn score(name: &str, y_pred: Labels, y_true: Labels) -> f64 {
        get_scorer(name).unwrap().score(&y_pred, &y_true).unwrap()
    }

    #[test]
    fn accuracy_counts_matches() {
        assert_eq!(score("accuracy", array![0, 1, 1, 0], array![0, 1, 0, 0]), 0.75);
    }

    #[test]
    fn macro_scores_on_imbalanced_labels() {
        let y_true = array![0, 0, 0, 1];
        let y_pred = array![0, 0, 0, 0];
        // class 0: precision 3/4, recall 1; class 1: precision 0, recall 0
        assert!((score("precision", y_pred.clone(), y_true.clone()) - 0.375).abs() < 1e-12);
        assert!((score("recall", y_pred.clone(), y_true.clone()) - 0.5).abs() < 1e-12);
        assert!((score("balanced_accuracy", y_pred.clone(), y_true.clone()) - 0.5).abs() < 1e-12);
        let f1_class0 = 2.0 * 0.75 / 1.75;
        assert!((score("f1", y_pred, y_true) - f1_class0 / 2.0).abs() < 1e-12);
    }

    #[test]
    fn mcc_bounds() {
        assert!((score("mcc", array![0, 1, 2], array![0, 1, 2]) - 1.0).abs() < 1e-12);
        assert!((score("mcc", array![1, 0, 1, 0], array![0, 1, 0, 1]) + 1.0).abs() < 1e-12);
        // constant predictions carry no information
        assert_eq!(score("mcc", array![1, 1, 1], array![0, 1, 0]), 0.0);
    }

    #[test]
    fn neg_log_loss_prefers_correct_labels() {
        let perfect = score("neg_log_loss", array![0, 1], array![0, 1]);
        let half = score("neg_log_loss", array![0, 0], array![0, 1]);
        assert!(perfect > half);
        assert!(perfect <= 0.0);
    }

    #[test]
    fn unknown_scorer_lists_options() {
        let err = get_scorer("roc_auc").unwrap_err().to_string();
        assert!(err.contains("roc_auc"));
        assert!(err.contains("accuracy"));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let scorer = get_scorer("accuracy").unwrap();
        assert!(scorer.score(&array![0, 1], &array![0]).is_err());
    }
}
