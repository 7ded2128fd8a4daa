//! Grid descriptors and their expansion into concrete parameter values.

use serde::{Deserialize, Serialize};

use gz_types::{GzError, GzResult, ParamValue};

/// Prior used when sampling a continuous range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prior {
    /// Linearly spaced.
    #[default]
    Uniform,
    /// Geometrically spaced (evenly in log-space).
    LogUniform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Discrete,
    Continuous,
}

/// Describes how the values of one hyperparameter are generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum GridDescriptor {
    /// Enumerate the listed values as-is.
    Take { values: Vec<ParamValue> },
    /// Generate `count` values between `low` and `high` inclusive.
    Sample {
        low: f64,
        high: f64,
        #[serde(alias = "numval")]
        count: usize,
        #[serde(default)]
        prior: Prior,
        category: Category,
    },
}

impl GridDescriptor {
    pub fn take<V: Into<ParamValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Take {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn linear(low: f64, high: f64, count: usize) -> Self {
        Self::Sample {
            low,
            high,
            count,
            prior: Prior::Uniform,
            category: Category::Continuous,
        }
    }

    pub fn log_uniform(low: f64, high: f64, count: usize) -> Self {
        Self::Sample {
            low,
            high,
            count,
            prior: Prior::LogUniform,
            category: Category::Continuous,
        }
    }

    /// Parse a descriptor from JSON, reporting malformed input (unknown
    /// method, category or prior, missing fields) as a configuration error.
    pub fn from_json(value: serde_json::Value) -> GzResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| GzError::InvalidConfiguration(format!("Malformed grid descriptor: {e}")))
    }

    /// Number of values `expand` produces, without generating them.
    pub fn len(&self) -> usize {
        match self {
            Self::Take { values } => values.len(),
            Self::Sample { count, .. } => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produce the ordered values described by this grid.
    pub fn expand(&self) -> GzResult<Vec<ParamValue>> {
        match self {
            Self::Take { values } => Ok(values.clone()),
            Self::Sample {
                low,
                high,
                count,
                prior,
                category,
            } => {
                if *category == Category::Discrete {
                    return Err(GzError::UnimplementedSampling);
                }
                let (low, high, count) = (*low, *high, *count);
                if count == 0 {
                    return Err(GzError::InvalidConfiguration(
                        "Sampled grid must produce at least one value".to_string(),
                    ));
                }
                if !low.is_finite() || !high.is_finite() || low > high {
                    return Err(GzError::InvalidConfiguration(format!(
                        "Invalid sampling range [{low}, {high}]"
                    )));
                }
                let values = match prior {
                    Prior::LogUniform => {
                        if low <= 0.0 {
                            return Err(GzError::InvalidConfiguration(format!(
                                "Log-uniform range must be positive, got low={low}"
                            )));
                        }
                        spaced(low.ln(), high.ln(), count)
                            .into_iter()
                            .map(f64::exp)
                            .collect::<Vec<_>>()
                    }
                    Prior::Uniform => spaced(low, high, count),
                };
                Ok(pin_endpoints(values, low, high)
                    .into_iter()
                    .map(ParamValue::Float)
                    .collect())
            }
        }
    }
}

/// `count` evenly spaced points over `[start, stop]`.
fn spaced(start: f64, stop: f64, count: usize) -> Vec<f64> {
    if count == 1 {
        return vec![start];
    }
    let step = (stop - start) / (count - 1) as f64;
    (0..count).map(|i| start + step * i as f64).collect()
}

// Rounding in the step arithmetic (and exp/ln) must not move the endpoints.
fn pin_endpoints(mut values: Vec<f64>, low: f64, high: f64) -> Vec<f64> {
    if let Some(first) = values.first_mut() {
        *first = low;
    }
    if values.len() > 1 {
        if let Some(last) = values.last_mut() {
            *last = high;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn floats(values: &[ParamValue]) -> Vec<f64> {
        values.iter().map(|v| v.as_f64().unwrap()).collect()
    }

    #[test]
    fn take_returns_literal_values_in_order() {
        let grid = GridDescriptor::take(vec![5, 1, 3]);
        assert_eq!(
            grid.expand().unwrap(),
            vec![ParamValue::Int(5), ParamValue::Int(1), ParamValue::Int(3)]
        );

        let mixed = GridDescriptor::Take {
            values: vec!["gini".into(), "entropy".into()],
        };
        assert_eq!(mixed.expand().unwrap(), vec![ParamValue::from("gini"), ParamValue::from("entropy")]);
    }

    #[test]
    fn linear_sampling_hits_endpoints_and_is_monotone() {
        for count in [2usize, 3, 7, 11] {
            let grid = GridDescriptor::linear(0.1, 0.7, count);
            let values = floats(&grid.expand().unwrap());
            assert_eq!(values.len(), count);
            assert_eq!(values[0], 0.1);
            assert_eq!(values[count - 1], 0.7);
            assert!(values.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn linear_sampling_single_value_is_low() {
        let values = floats(&GridDescriptor::linear(2.0, 9.0, 1).expand().unwrap());
        assert_eq!(values, vec![2.0]);
    }

    #[test]
    fn log_uniform_is_geometric() {
        let values = floats(&GridDescriptor::log_uniform(1e-4, 1.0, 5).expand().unwrap());
        assert_eq!(values.len(), 5);
        assert_eq!(values[0], 1e-4);
        assert_eq!(values[4], 1.0);
        for (v, expected) in values.iter().zip([1e-4, 1e-3, 1e-2, 1e-1, 1.0]) {
            assert!((v / expected - 1.0).abs() < 1e-9, "{v} vs {expected}");
        }
    }

    #[test]
    fn discrete_sampling_is_unimplemented() {
        let grid = GridDescriptor::Sample {
            low: 1.0,
            high: 10.0,
            count: 4,
            prior: Prior::Uniform,
            category: Category::Discrete,
        };
        assert!(matches!(grid.expand(), Err(GzError::UnimplementedSampling)));
    }

    #[test]
    fn discrete_sampling_from_json_is_unimplemented() {
        let grid = GridDescriptor::from_json(json!({
            "method": "sample",
            "category": "discrete",
            "low": 1,
            "high": 10,
            "numval": 3,
            "prior": "uniform"
        }))
        .unwrap();
        assert!(matches!(grid.expand(), Err(GzError::UnimplementedSampling)));
    }

    #[test]
    fn invalid_ranges_are_configuration_errors() {
        let reversed = GridDescriptor::linear(5.0, 1.0, 3);
        assert!(matches!(reversed.expand(), Err(GzError::InvalidConfiguration(_))));

        let empty = GridDescriptor::linear(0.0, 1.0, 0);
        assert!(matches!(empty.expand(), Err(GzError::InvalidConfiguration(_))));

        let non_positive_log = GridDescriptor::log_uniform(0.0, 1.0, 3);
        assert!(matches!(non_positive_log.expand(), Err(GzError::InvalidConfiguration(_))));
    }

    #[test]
    fn unknown_method_or_category_is_configuration_error() {
        let bad_method = GridDescriptor::from_json(json!({"method": "bayes", "values": [1]}));
        assert!(matches!(bad_method, Err(GzError::InvalidConfiguration(_))));

        let bad_category = GridDescriptor::from_json(json!({
            "method": "sample", "category": "ordinal", "low": 0, "high": 1, "count": 2
        }));
        assert!(matches!(bad_category, Err(GzError::InvalidConfiguration(_))));
    }

    #[test]
    fn json_descriptors_parse() {
        let take = GridDescriptor::from_json(json!({"method": "take", "values": [1, 2.5, "auto"]})).unwrap();
        assert_eq!(take.len(), 3);

        let sample = GridDescriptor::from_json(json!({
            "method": "sample", "category": "continuous", "prior": "loguniform",
            "low": 0.001, "high": 10.0, "numval": 5
        }))
        .unwrap();
        assert_eq!(sample, GridDescriptor::log_uniform(0.001, 10.0, 5));
    }
}
