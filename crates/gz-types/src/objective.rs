use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Whether a recorded value is a score (higher is better) or a loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    /// Ordering that puts the better value first when used with `sort_by`.
    pub fn rank(&self, a: f64, b: f64) -> Ordering {
        let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        match self {
            Self::Maximize => ord.reverse(),
            Self::Minimize => ord,
        }
    }

    pub fn is_better(&self, candidate: f64, current: f64) -> bool {
        match self {
            Self::Maximize => candidate > current,
            Self::Minimize => candidate < current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_puts_best_first() {
        let mut scores = vec![0.2, 0.9, 0.5];
        scores.sort_by(|a, b| ObjectiveDirection::Maximize.rank(*a, *b));
        assert_eq!(scores, vec![0.9, 0.5, 0.2]);

        let mut losses = vec![0.2, 0.9, 0.5];
        losses.sort_by(|a, b| ObjectiveDirection::Minimize.rank(*a, *b));
        assert_eq!(losses, vec![0.2, 0.5, 0.9]);
    }

    #[test]
    fn is_better_respects_direction() {
        assert!(ObjectiveDirection::Maximize.is_better(1.5, 1.0));
        assert!(!ObjectiveDirection::Maximize.is_better(1.0, 1.0));
        assert!(ObjectiveDirection::Minimize.is_better(0.05, 0.15));
    }
}
