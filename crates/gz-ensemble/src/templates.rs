//! Candidate factory: turns an algorithm's grid into configured, unfitted
//! estimators.

use std::fmt;

use tracing::{debug, warn};

use gz_optimizer::AlgorithmSpec;
use gz_types::{AlgorithmRegistry, Estimator, GzError, GzResult, ParamSet, ParamValue};

/// A configured but unfitted estimator.
///
/// Identity is structural: two candidates with the same algorithm and
/// parameters are the same candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub algorithm: String,
    pub params: ParamSet,
    pub estimator: Box<dyn Estimator>,
}

impl Candidate {
    fn new(estimator: Box<dyn Estimator>) -> Self {
        Self {
            algorithm: estimator.algorithm().to_string(),
            params: estimator.params(),
            estimator,
        }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.params == other.params
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.algorithm, self.params)
    }
}

/// Candidates produced for one algorithm, plus the parameter sets that were
/// rejected along the way.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub algorithm: String,
    /// Whether the algorithm trains in epochs and reports checkpoints.
    pub checkpointed: bool,
    pub candidates: Vec<Candidate>,
    pub rejected: Vec<RejectedParams>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// A parameter set the estimator refused, kept as a value for callers that
/// want more than the warning.
#[derive(Debug, Clone)]
pub struct RejectedParams {
    pub params: ParamSet,
    pub parameter: String,
    pub message: String,
}

impl RejectedParams {
    pub fn to_error(&self, algorithm: &str) -> GzError {
        GzError::ParameterApplyFailure {
            algorithm: algorithm.to_string(),
            parameter: self.parameter.clone(),
            message: self.message.clone(),
        }
    }
}

/// Build the candidates for `spec`, starting from the registry's default
/// estimator for its name.
pub fn build_candidates(spec: &AlgorithmSpec, registry: &AlgorithmRegistry) -> GzResult<CandidateSet> {
    let base = registry.create(&spec.name)?;
    let info = base.info();
    let standard = spec.standard_ensemble.unwrap_or(info.standard_ensemble);

    let (candidates, rejected) = if standard {
        templated(&spec.name, base, spec)?
    } else {
        configured(&spec.name, base, spec)?
    };
    debug!(
        "{}: {} candidates, {} rejected parameter sets",
        spec.name,
        candidates.len(),
        rejected.len()
    );

    Ok(CandidateSet {
        algorithm: spec.name.clone(),
        checkpointed: info.checkpointed,
        candidates,
        rejected,
    })
}

/// One clone per grid value; the premise is merged over `{param: value}`.
fn templated(
    name: &str,
    base: Box<dyn Estimator>,
    spec: &AlgorithmSpec,
) -> GzResult<(Vec<Candidate>, Vec<RejectedParams>)> {
    let mut candidates = Vec::new();
    let mut rejected = Vec::new();

    for entry in &spec.grid {
        for value in entry.grid.expand()? {
            let params = ParamSet::new()
                .with(entry.param.clone(), value)
                .merged(&entry.premise);
            let mut estimator = base.clone();
            match estimator.set_params(&params) {
                Ok(()) => candidates.push(Candidate::new(estimator)),
                Err(e) => {
                    warn!("Failed to set {} on {}: {}", entry.param, name, e);
                    rejected.push(RejectedParams {
                        params,
                        parameter: e.parameter().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }
    Ok((candidates, rejected))
}

/// Apply every entry in place to a single estimator.
fn configured(
    name: &str,
    mut estimator: Box<dyn Estimator>,
    spec: &AlgorithmSpec,
) -> GzResult<(Vec<Candidate>, Vec<RejectedParams>)> {
    let mut rejected = Vec::new();

    for entry in &spec.grid {
        let mut values = entry.grid.expand()?;
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            ParamValue::List(values)
        };
        let params = ParamSet::new()
            .with(entry.param.clone(), value)
            .merged(&entry.premise);
        if let Err(e) = estimator.set_params(&params) {
            warn!("Failed to set {} on {}: {}", entry.param, name, e);
            rejected.push(RejectedParams {
                params,
                parameter: e.parameter().to_string(),
                message: e.to_string(),
            });
        }
    }
    Ok((vec![Candidate::new(estimator)], rejected))
}
