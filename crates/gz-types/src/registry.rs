//! Startup-time registry of algorithm name -> estimator factory.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{GzError, GzResult};
use crate::estimator::Estimator;
use crate::params::ParamSet;

pub type EstimatorFactory = Box<dyn Fn() -> Box<dyn Estimator> + Send + Sync>;

/// Maps algorithm names to factories producing a default-configured estimator.
#[derive(Default)]
pub struct AlgorithmRegistry {
    factories: BTreeMap<String, EstimatorFactory>,
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("algorithms", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Estimator> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Estimator> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// A fresh, default-configured estimator for `name`.
    pub fn create(&self, name: &str) -> GzResult<Box<dyn Estimator>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            GzError::InvalidConfiguration(format!(
                "Unknown algorithm '{name}'. Valid options: {}",
                self.names().join(", ")
            ))
        })?;
        Ok(factory())
    }

    /// Rebuild a fitted estimator from its parameters and snapshot.
    pub fn restore(
        &self,
        name: &str,
        params: &ParamSet,
        state: &serde_json::Value,
    ) -> GzResult<Box<dyn Estimator>> {
        let mut estimator = self.create(name)?;
        estimator
            .set_params(params)
            .map_err(|e| GzError::param_rejected(name, &e))?;
        estimator.restore(state)?;
        Ok(estimator)
    }
}
