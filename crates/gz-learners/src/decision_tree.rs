//! CART decision tree classifier.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use gz_types::{
    check_xy, unique_classes, Estimator, EstimatorInfo, Features, Labels, ModelError, ParamError,
    ParamSet,
};

use crate::util::{check_features, from_state, labels_from_proba, to_state};

pub const NAME: &str = "decision_tree";

/// Split quality criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Gini,
    Entropy,
}

impl Criterion {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Gini => "gini",
            Self::Entropy => "entropy",
        }
    }

    fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self {
            Self::Gini => 1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>(),
            Self::Entropy => counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    -p * p.log2()
                })
                .sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub criterion: Criterion,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        /// Class distribution at the leaf, normalized.
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Fitted {
    classes: Vec<i64>,
    n_features: usize,
    root: Node,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionTree {
    config: TreeConfig,
    fitted: Option<Fitted>,
}

impl DecisionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = Some(depth);
        self
    }

    pub fn depth(&self) -> Option<usize> {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.fitted.as_ref().map(|f| walk(&f.root))
    }

    fn build(&self, x: &Features, y_idx: &[usize], indices: Vec<usize>, n_classes: usize, depth: usize) -> Node {
        let mut counts = vec![0usize; n_classes];
        for &i in &indices {
            counts[y_idx[i]] += 1;
        }
        let leaf = || Node::Leaf {
            distribution: counts.iter().map(|&c| c as f64 / indices.len() as f64).collect(),
        };

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let too_deep = self.config.max_depth.is_some_and(|max| depth >= max);
        if pure || too_deep || indices.len() < self.config.min_samples_split {
            return leaf();
        }

        let Some((feature, threshold)) = self.best_split(x, y_idx, &indices, &counts) else {
            return leaf();
        };
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature]] <= threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(x, y_idx, left, n_classes, depth + 1)),
            right: Box::new(self.build(x, y_idx, right, n_classes, depth + 1)),
        }
    }

    /// Best (feature, threshold) by impurity decrease, scanning sorted values.
    fn best_split(&self, x: &Features, y_idx: &[usize], indices: &[usize], counts: &[usize]) -> Option<(usize, f64)> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let parent = self.config.criterion.impurity(counts, n);
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in 0..x.ncols() {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| {
                x[[a, feature]]
                    .partial_cmp(&x[[b, feature]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let mut left = vec![0usize; counts.len()];
            let mut right = counts.to_vec();
            for pos in 0..n - 1 {
                let class = y_idx[order[pos]];
                left[class] += 1;
                right[class] -= 1;

                let (current, next) = (x[[order[pos], feature]], x[[order[pos + 1], feature]]);
                let n_left = pos + 1;
                if current == next || n_left < min_leaf || n - n_left < min_leaf {
                    continue;
                }
                let weighted = (n_left as f64 * self.config.criterion.impurity(&left, n_left)
                    + (n - n_left) as f64 * self.config.criterion.impurity(&right, n - n_left))
                    / n as f64;
                let gain = parent - weighted;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (current + next) / 2.0, gain));
                }
            }
        }
        best.map(|(feature, threshold, _)| (feature, threshold))
    }

    fn leaf_for<'a>(node: &'a Node, row: ArrayView1<f64>) -> &'a [f64] {
        match node {
            Node::Leaf { distribution } => distribution,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    Self::leaf_for(left, row)
                } else {
                    Self::leaf_for(right, row)
                }
            }
        }
    }

    fn proba(&self, x: &Features) -> Result<Array2<f64>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(x.ncols(), fitted.n_features)?;
        let mut proba = Array2::zeros((x.nrows(), fitted.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (j, &p) in Self::leaf_for(&fitted.root, row).iter().enumerate() {
                proba[[i, j]] = p;
            }
        }
        Ok(proba)
    }
}

impl Estimator for DecisionTree {
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
        let mut params = ParamSet::new()
            .with("min_samples_split", self.config.min_samples_split)
            .with("min_samples_leaf", self.config.min_samples_leaf)
            .with("criterion", self.config.criterion.as_str());
        if let Some(depth) = self.config.max_depth {
            params.insert("max_depth", depth);
        }
        params
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<(), ParamError> {
        let mut config = self.config.clone();
        for (name, value) in params.iter() {
            match name.as_str() {
                "max_depth" => config.max_depth = Some(value.to_positive_usize(name)?),
                "min_samples_split" => {
                    let split = value.to_usize(name)?;
                    if split < 2 {
                        return Err(ParamError::invalid(name, "must be at least 2"));
                    }
                    config.min_samples_split = split;
                }
                "min_samples_leaf" => config.min_samples_leaf = value.to_positive_usize(name)?,
                "criterion" => {
                    config.criterion = match value.to_text(name)? {
                        "gini" => Criterion::Gini,
                        "entropy" => Criterion::Entropy,
                        other => {
                            return Err(ParamError::invalid(
                                name,
                                format!("expected 'gini' or 'entropy', got '{other}'"),
                            ))
                        }
                    }
                }
                _ => return Err(ParamError::unknown(name)),
            }
        }
        self.config = config;
        Ok(())
    }

    fn fit(&mut self, x: &Features, y: &Labels) -> Result<(), ModelError> {
        check_xy(x, y)?;
        let classes = unique_classes(y);
        let y_idx: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or(0))
            .collect();

        let root = self.build(x, &y_idx, (0..x.nrows()).collect(), classes.len(), 0);
        self.fitted = Some(Fitted {
            classes,
            n_features: x.ncols(),
            root,
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

    #[test]
    fn test_tree_needs_two_levels_for_conjunction() {
        let x = array![
            [0.0, 0.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.1, 0.1],
            [0.1, 0.9],
            [0.9, 0.1],
            [0.9, 0.9],
        ];
        let y = array![0, 0, 0, 1, 0, 0, 0, 1];
        let mut tree = DecisionTree::default();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.depth(), Some(2));
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![0, 1, 0, 1, 0, 1];
        let mut tree = DecisionTree::default().with_max_depth(1);
        tree.fit(&x, &y).unwrap();
        assert!(tree.depth().unwrap() <= 1);
    }

    #[test]
    fn test_rejects_bad_criterion() {
        let mut tree = DecisionTree::default();
        let err = tree
            .set_params(&ParamSet::new().with("criterion", "mse"))
            .unwrap_err();
        assert_eq!(err.parameter(), "criterion");
    }
}
