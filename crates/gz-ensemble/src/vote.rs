//! Weighted majority vote.

use std::collections::BTreeMap;

use gz_types::{GzResult, Labels, ModelError};

/// Combine per-member predictions into one label per sample.
///
/// Unanimous samples take the agreed label. Otherwise each distinct label
/// collects the weights of the members predicting it and the heaviest label
/// wins; on a tie the smallest label wins.
pub fn weighted_vote(predictions: &[&Labels], weights: &[f64]) -> GzResult<Labels> {
    if predictions.len() != weights.len() {
        return Err(ModelError::ShapeMismatch {
            message: format!("{} members but {} weights", predictions.len(), weights.len()),
        }
        .into());
    }
    let Some(n_samples) = predictions.first().map(|p| p.len()) else {
        return Err(gz_types::config_error!("cannot vote with an empty ensemble"));
    };
    if let Some(bad) = predictions.iter().find(|p| p.len() != n_samples) {
        return Err(ModelError::ShapeMismatch {
            message: format!("expected {n_samples} predictions per member, got {}", bad.len()),
        }
        .into());
    }

    let mut conviction: BTreeMap<i64, f64> = BTreeMap::new();
    let voted = (0..n_samples)
        .map(|i| {
            let first = predictions[0][i];
            if predictions.iter().all(|p| p[i] == first) {
                return first;
            }
            conviction.clear();
            for (member, weight) in predictions.iter().zip(weights) {
                *conviction.entry(member[i]).or_insert(0.0) += weight;
            }
            let mut winner = first;
            let mut best = f64::NEG_INFINITY;
            for (&label, &total) in &conviction {
                if total > best {
                    winner = label;
                    best = total;
                }
            }
            winner
        })
        .collect();
    Ok(voted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn unanimous_members_agree() {
        let a = array![2, 0, 1];
        let b = array![2, 0, 1];
        assert_eq!(weighted_vote(&[&a, &b], &[0.0, 5.0]).unwrap(), a);
    }

    #[test]
    fn heaviest_label_wins() {
        let a = array![0, 0];
        let b = array![1, 1];
        let c = array![1, 0];
        let voted = weighted_vote(&[&a, &b, &c], &[3.0, 1.0, 1.0]).unwrap();
        assert_eq!(voted, array![0, 0]);

        let voted = weighted_vote(&[&a, &b, &c], &[1.0, 2.0, 1.0]).unwrap();
        assert_eq!(voted, array![1, 0]);
    }

    #[test]
    fn ties_go_to_the_smallest_label() {
        let a = array![5];
        let b = array![3];
        assert_eq!(weighted_vote(&[&a, &b], &[1.0, 1.0]).unwrap(), array![3]);
    }

    #[test]
    fn repeated_member_counts_twice() {
        let a = array![0];
        let b = array![1];
        // b appears twice with weight 1 each, outvoting a's 1.5
        assert_eq!(weighted_vote(&[&a, &b, &b], &[1.5, 1.0, 1.0]).unwrap(), array![1]);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let a = array![0, 1];
        let b = array![1];
        assert!(weighted_vote(&[&a, &b], &[1.0, 1.0]).is_err());
        assert!(weighted_vote(&[&a], &[1.0, 1.0]).is_err());
        assert!(weighted_vote(&[], &[]).is_err());
    }
}
