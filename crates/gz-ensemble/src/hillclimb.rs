//! Greedy forward selection over the validation pool.
//!
//! The ensemble is seeded with the best `n_best` pool entries. Each iteration
//! draws a fresh sample of candidates (with replacement), scores the ensemble
//! with each candidate added once more, and accepts the best addition when it
//! does not lower the current score. Accepting a candidate bumps its weight;
//! it joins the member list only the first time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use gz_types::{config_error, GzResult, Labels};

use crate::metrics::Scorer;
use crate::pool::{PoolIndex, ValidationPool};
use crate::vote::weighted_vote;

/// Consecutive iterations without strict improvement before stopping.
pub const PATIENCE: usize = 10;

/// Size of the initial ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedSize {
    Count(usize),
    /// Fraction of the pool, in `(0, 1]`.
    Fraction(f64),
}

impl Default for SeedSize {
    fn default() -> Self {
        Self::Fraction(0.1)
    }
}

impl SeedSize {
    /// Number of seed members for a pool of `pool_size`, within `[1, pool_size]`.
    pub fn resolve(&self, pool_size: usize) -> GzResult<usize> {
        let grab = match *self {
            Self::Count(n) => n,
            Self::Fraction(f) => {
                if !(f > 0.0 && f <= 1.0) {
                    return Err(config_error!("n_best fraction must lie in (0, 1], got {f}"));
                }
                (f * pool_size as f64).round() as usize
            }
        };
        Ok(grab.clamp(1, pool_size.max(1)))
    }
}

/// Hillclimbing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HillclimbConfig {
    pub n_best: SeedSize,
    /// Fraction of the pool drawn as candidates each iteration.
    pub p: f64,
    pub iterations: usize,
    pub scoring: String,
    /// Fixed seed for the candidate draws; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for HillclimbConfig {
    fn default() -> Self {
        Self {
            n_best: SeedSize::default(),
            p: 0.3,
            iterations: 10,
            scoring: "accuracy".to_string(),
            seed: None,
        }
    }
}

impl HillclimbConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_best(mut self, n_best: SeedSize) -> Self {
        self.n_best = n_best;
        self
    }

    pub fn with_p(mut self, p: f64) -> Self {
        self.p = p;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_scoring(mut self, scoring: &str) -> Self {
        self.scoring = scoring.to_string();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> GzResult<()> {
        if !(self.p > 0.0 && self.p <= 1.0) {
            return Err(config_error!("p must lie in (0, 1], got {}", self.p));
        }
        if let SeedSize::Fraction(f) = self.n_best {
            if !(f > 0.0 && f <= 1.0) {
                return Err(config_error!("n_best fraction must lie in (0, 1], got {f}"));
            }
        }
        Ok(())
    }

    /// Candidates drawn per iteration, at least one.
    pub fn sample_size(&self, pool_size: usize) -> usize {
        ((self.p * pool_size as f64).round() as usize).max(1)
    }
}

/// Selector state kept after hillclimbing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Members in acceptance order.
    pub members: Vec<PoolIndex>,
    /// Weight of every pool entry; zero for non-members.
    pub weights: BTreeMap<PoolIndex, u32>,
    pub initial_score: f64,
    pub score: f64,
    /// `(iteration, score after the iteration)`
    pub trajectory: Vec<(usize, f64)>,
    paths: BTreeMap<PoolIndex, PathBuf>,
}

impl Selection {
    /// The top `grab` entries, each with weight 1.
    pub fn seeded(pool: &ValidationPool, grab: usize) -> Self {
        let mut weights: BTreeMap<PoolIndex, u32> = pool.indices().map(|i| (i, 0)).collect();
        let members: Vec<PoolIndex> = pool.indices().take(grab).collect();
        for index in &members {
            weights.insert(*index, 1);
        }
        let paths = pool
            .entries()
            .iter()
            .map(|e| (e.index, e.path.clone()))
            .collect();
        Self {
            members,
            weights,
            initial_score: f64::NAN,
            score: f64::NAN,
            trajectory: Vec::new(),
            paths,
        }
    }

    pub fn weight(&self, index: PoolIndex) -> u32 {
        self.weights.get(&index).copied().unwrap_or(0)
    }

    /// Members with the path of their persisted model and their weight.
    pub fn weighted_members(&self) -> Vec<(PoolIndex, &Path, u32)> {
        self.members
            .iter()
            .filter_map(|i| self.paths.get(i).map(|p| (*i, p.as_path(), self.weight(*i))))
            .collect()
    }

    pub fn total_weight(&self) -> u32 {
        self.weights.values().sum()
    }
}

/// Score `members` (repeats allowed) by weighted vote against `y`.
fn ensemble_score(
    pool: &ValidationPool,
    members: &[PoolIndex],
    weights: &BTreeMap<PoolIndex, u32>,
    y: &Labels,
    scorer: Scorer,
) -> GzResult<f64> {
    let mut predictions = Vec::with_capacity(members.len());
    let mut member_weights = Vec::with_capacity(members.len());
    for index in members {
        let entry = pool
            .get(*index)
            .ok_or_else(|| gz_types::internal_error!("pool index {index} out of range"))?;
        predictions.push(&entry.predictions);
        member_weights.push(weights.get(index).copied().unwrap_or(0) as f64);
    }
    let voted = weighted_vote(&predictions, &member_weights)?;
    scorer.score(&voted, y)
}

/// Run hillclimbing over `pool` against the validation labels.
pub fn hillclimb(
    pool: &ValidationPool,
    y_val: &Labels,
    scorer: Scorer,
    config: &HillclimbConfig,
) -> GzResult<Selection> {
    config.validate()?;
    if pool.is_empty() {
        return Err(config_error!("the validation pool is empty"));
    }

    let grab = config.n_best.resolve(pool.len())?;
    let mut selection = Selection::seeded(pool, grab);
    info!("Algorithms in initial ensemble: {}", selection.members.len());

    let mut current = ensemble_score(pool, &selection.members, &selection.weights, y_val, scorer)?;
    selection.initial_score = current;
    info!("Initial {}-score: {:.4}", scorer.name(), current);

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let draws = config.sample_size(pool.len());
    let mut impatience = 0;

    for iteration in 1..=config.iterations {
        let mut best: Option<(PoolIndex, f64)> = None;
        for _ in 0..draws {
            let candidate = PoolIndex(rng.random_range(0..pool.len()));

            let mut members = selection.members.clone();
            members.push(candidate);
            let mut weights = selection.weights.clone();
            *weights.entry(candidate).or_insert(0) += 1;

            let score = ensemble_score(pool, &members, &weights, y_val, scorer)?;
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((candidate, score));
            }
        }

        let improved = match best {
            Some((candidate, score)) if score >= current => {
                *selection.weights.entry(candidate).or_insert(0) += 1;
                if !selection.members.contains(&candidate) {
                    selection.members.push(candidate);
                }
                let strict = score > current;
                current = score;
                debug!("Iteration {iteration}: accepted {candidate}");
                strict
            }
            _ => false,
        };

        info!("Iteration: {} \tScore: {:.6}", iteration, current);
        selection.trajectory.push((iteration, current));

        impatience = if improved { 0 } else { impatience + 1 };
        if impatience == PATIENCE {
            info!("No improvement for {PATIENCE} iterations, stopping");
            break;
        }
    }

    selection.score = current;
    Ok(selection)
}
