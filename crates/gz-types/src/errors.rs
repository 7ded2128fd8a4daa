use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the Gazer system
#[derive(Error, Debug)]
pub enum GzError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to set {parameter} on {algorithm}: {message}")]
    ParameterApplyFailure {
        algorithm: String,
        parameter: String,
        message: String,
    },

    #[error("Could not fit {algorithm}: {message}")]
    NotFitted { algorithm: String, message: String },

    #[error("Could not persist {}: {message}", .path.display())]
    PersistenceFailure { path: PathBuf, message: String },

    #[error("{} already exists. Please choose a different directory.", .path.display())]
    DirectoryConflict { path: PathBuf },

    #[error("Could not create folder {}: {message}", .path.display())]
    DirectoryCreateFailure { path: PathBuf, message: String },

    #[error("Discrete sampling not implemented yet")]
    UnimplementedSampling,

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GzError {
    /// Wrap a rejected parameter set for `algorithm`.
    pub fn param_rejected(algorithm: &str, error: &ParamError) -> Self {
        GzError::ParameterApplyFailure {
            algorithm: algorithm.to_string(),
            parameter: error.parameter().to_string(),
            message: error.to_string(),
        }
    }

    pub fn not_fitted(algorithm: &str, message: impl Into<String>) -> Self {
        GzError::NotFitted {
            algorithm: algorithm.to_string(),
            message: message.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        GzError::PersistenceFailure {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by an estimator while fitting, predicting or (de)serializing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    #[error("Training failed: {message}")]
    TrainingFailed { message: String },

    #[error("Invalid model snapshot: {message}")]
    InvalidSnapshot { message: String },

    #[error("Checkpoint rejected: {message}")]
    Checkpoint { message: String },
}

/// Rejection of a single parameter by `Estimator::set_params`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("Unknown parameter: {parameter}")]
    Unknown { parameter: String },

    #[error("Invalid value for {parameter}: {message}")]
    InvalidValue { parameter: String, message: String },
}

impl ParamError {
    pub fn unknown(parameter: &str) -> Self {
        ParamError::Unknown {
            parameter: parameter.to_string(),
        }
    }

    pub fn invalid(parameter: &str, message: impl Into<String>) -> Self {
        ParamError::InvalidValue {
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }

    /// Name of the offending parameter
    pub fn parameter(&self) -> &str {
        match self {
            ParamError::Unknown { parameter } => parameter,
            ParamError::InvalidValue { parameter, .. } => parameter,
        }
    }
}

/// Result type alias for Gazer operations
pub type GzResult<T> = Result<T, GzError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::GzError::InvalidConfiguration(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::GzError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GzError::DirectoryConflict {
            path: PathBuf::from("./run1"),
        };
        assert!(error.to_string().contains("./run1"));
        assert!(error.to_string().contains("already exists"));

        let error = GzError::persistence("/tmp/x/knn_0001train.json", "disk full");
        assert!(error.to_string().contains("knn_0001train.json"));
    }

    #[test]
    fn test_param_rejection_names_parameter() {
        let param_error = ParamError::invalid("n_neighbors", "must be positive");
        let error = GzError::param_rejected("nearest_neighbors", &param_error);

        match error {
            GzError::ParameterApplyFailure {
                algorithm,
                parameter,
                ..
            } => {
                assert_eq!(algorithm, "nearest_neighbors");
                assert_eq!(parameter, "n_neighbors");
            }
            other => panic!("Expected ParameterApplyFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_model_error_conversion() {
        let gz_error: GzError = ModelError::NotFitted.into();
        match gz_error {
            GzError::Model(ModelError::NotFitted) => (),
            _ => panic!("Expected Model error"),
        }
    }

    #[test]
    fn test_macros() {
        let config_err = config_error!("Unknown scorer: {}", "auc");
        assert!(matches!(config_err, GzError::InvalidConfiguration(_)));
        let internal_err = internal_error!("Something went wrong");
        assert!(matches!(internal_err, GzError::Internal(_)));
    }
}
