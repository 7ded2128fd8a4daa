//! # gz-learners
//!
//! Classifiers implementing [`gz_types::Estimator`], and the registry that
//! maps algorithm names to them.

pub mod decision_tree;
pub mod knn;
pub mod logistic;
pub mod naive_bayes;
pub mod neural_network;
mod util;

pub use decision_tree::{Criterion, DecisionTree, TreeConfig};
pub use knn::{KNearestNeighbors, KnnConfig, WeightScheme};
pub use logistic::{LogisticConfig, LogisticRegression};
pub use naive_bayes::GaussianNaiveBayes;
pub use neural_network::{LayerUnits, NetworkConfig, NeuralNetwork};

use gz_types::AlgorithmRegistry;

/// Registry holding every classifier in this crate under its algorithm name.
pub fn default_registry() -> AlgorithmRegistry {
    AlgorithmRegistry::new()
        .with(knn::NAME, || Box::new(KNearestNeighbors::default()))
        .with(naive_bayes::NAME, || Box::new(GaussianNaiveBayes::new()))
        .with(logistic::NAME, || Box::new(LogisticRegression::default()))
        .with(decision_tree::NAME, || Box::new(DecisionTree::default()))
        .with(neural_network::NAME, || Box::new(NeuralNetwork::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_match_estimators() {
        let registry = default_registry();
        for name in registry.names() {
            let estimator = registry.create(name).unwrap();
            assert_eq!(estimator.algorithm(), name);
        }
        assert_eq!(registry.names().len(), 5);
    }

    #[test]
    fn only_the_network_checkpoints() {
        let registry = default_registry();
        let checkpointed: Vec<&str> = registry
            .names()
            .into_iter()
            .filter(|name| registry.create(name).unwrap().info().checkpointed)
            .collect();
        assert_eq!(checkpointed, vec![neural_network::NAME]);
    }
}
