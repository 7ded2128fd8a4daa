//! # gz-ensemble
//!
//! Ensemble construction for Gazer.
//!
//! A [`MetaEnsembler`] expands each algorithm's grid into candidates, fits
//! and persists every candidate, then runs hillclimbing on validation data
//! to build a weighted majority-vote ensemble.

mod ensembler;
mod fit;
mod hillclimb;
mod metrics;
mod pool;
mod store;
mod templates;
mod vote;

#[cfg(test)]
mod testing;

pub use ensembler::{EnsembleSummary, MetaEnsembler, WeightedEnsemble};
pub use fit::{FitHistory, FitOptions, FitRecord};
pub use hillclimb::{hillclimb, HillclimbConfig, SeedSize, Selection, PATIENCE};
pub use metrics::{get_scorer, scorer_names, Scorer};
pub use pool::{PoolEntry, PoolIndex, ScoredModel, ValidationPool};
pub use store::{JsonModelStore, ModelStore, PersistedModel};
pub use templates::{build_candidates, Candidate, CandidateSet, RejectedParams};
pub use vote::weighted_vote;
