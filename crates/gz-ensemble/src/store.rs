//! Model persistence: one fitted estimator per file, addressed by path.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use gz_types::{AlgorithmRegistry, Estimator, GzError, GzResult, ParamSet};

/// Dumps and loads fitted estimators. The path is the whole contract.
pub trait ModelStore: Send + Sync + std::fmt::Debug {
    fn dump(&self, model: &dyn Estimator, path: &Path) -> GzResult<()>;

    fn load(&self, path: &Path) -> GzResult<Box<dyn Estimator>>;
}

/// On-disk document written by [`JsonModelStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedModel {
    pub id: Uuid,
    pub algorithm: String,
    pub params: ParamSet,
    pub state: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

impl PersistedModel {
    pub fn capture(model: &dyn Estimator) -> GzResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            algorithm: model.algorithm().to_string(),
            params: model.params(),
            state: model.snapshot()?,
            saved_at: Utc::now(),
        })
    }
}

/// Stores estimators as JSON and rebuilds them through the registry.
#[derive(Debug, Clone)]
pub struct JsonModelStore {
    registry: Arc<AlgorithmRegistry>,
}

impl JsonModelStore {
    pub fn new(registry: Arc<AlgorithmRegistry>) -> Self {
        Self { registry }
    }

    pub fn read_document(&self, path: &Path) -> GzResult<PersistedModel> {
        let bytes = fs::read(path).map_err(|e| GzError::persistence(path, e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| GzError::persistence(path, e.to_string()))
    }
}

impl ModelStore for JsonModelStore {
    fn dump(&self, model: &dyn Estimator, path: &Path) -> GzResult<()> {
        let document =
            PersistedModel::capture(model).map_err(|e| GzError::persistence(path, e.to_string()))?;
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| GzError::persistence(path, e.to_string()))?;
        fs::write(path, bytes).map_err(|e| GzError::persistence(path, e.to_string()))?;
        debug!("Saved {} model {} to {}", document.algorithm, document.id, path.display());
        Ok(())
    }

    fn load(&self, path: &Path) -> GzResult<Box<dyn Estimator>> {
        let document = self.read_document(path)?;
        self.registry
            .restore(&document.algorithm, &document.params, &document.state)
            .map_err(|e| GzError::persistence(path, e.to_string()))
    }
}
