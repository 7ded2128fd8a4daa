//! Hyperparameter values and parameter sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::ParamError;

/// A concrete hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::List(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers, and floats with no fractional part (grids produced by
    /// linear sampling are floats).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    // Typed accessors used by `Estimator::set_params` implementations.

    pub fn to_f64(&self, parameter: &str) -> Result<f64, ParamError> {
        self.as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ParamError::invalid(parameter, format!("expected a number, got {self}")))
    }

    pub fn to_positive_f64(&self, parameter: &str) -> Result<f64, ParamError> {
        let value = self.to_f64(parameter)?;
        if value <= 0.0 {
            return Err(ParamError::invalid(parameter, format!("must be > 0, got {value}")));
        }
        Ok(value)
    }

    pub fn to_usize(&self, parameter: &str) -> Result<usize, ParamError> {
        match self.as_i64() {
            Some(v) if v >= 0 => Ok(v as usize),
            _ => Err(ParamError::invalid(
                parameter,
                format!("expected a non-negative integer, got {self}"),
            )),
        }
    }

    pub fn to_positive_usize(&self, parameter: &str) -> Result<usize, ParamError> {
        match self.to_usize(parameter)? {
            0 => Err(ParamError::invalid(parameter, "must be at least 1")),
            v => Ok(v),
        }
    }

    pub fn to_bool(&self, parameter: &str) -> Result<bool, ParamError> {
        self.as_bool()
            .ok_or_else(|| ParamError::invalid(parameter, format!("expected a boolean, got {self}")))
    }

    pub fn to_text(&self, parameter: &str) -> Result<&str, ParamError> {
        self.as_str()
            .ok_or_else(|| ParamError::invalid(parameter, format!("expected a string, got {self}")))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// An ordered assignment of parameter names to values.
///
/// Ordering is by name, so two sets holding the same assignments compare and
/// print identically regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, ParamValue>);

impl ParamSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(&mut self, other: &ParamSet) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    pub fn merged(mut self, other: &ParamSet) -> Self {
        self.merge(other);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_keeps_integers_and_floats_apart() {
        let values: Vec<ParamValue> = serde_json::from_str(r#"[3, 0.5, true, "gini", [1, 2]]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Int(3),
                ParamValue::Float(0.5),
                ParamValue::Bool(true),
                ParamValue::Text("gini".into()),
                ParamValue::List(vec![ParamValue::Int(1), ParamValue::Int(2)]),
            ]
        );
    }

    #[test]
    fn integral_floats_coerce_to_integers() {
        assert_eq!(ParamValue::Float(4.0).to_usize("k"), Ok(4));
        assert!(ParamValue::Float(4.5).to_usize("k").is_err());
        assert!(ParamValue::Int(-1).to_usize("k").is_err());
        assert!(ParamValue::Int(0).to_positive_usize("k").is_err());
    }

    #[test]
    fn merge_lets_overlay_win() {
        let mut base = ParamSet::new().with("C", 1.0).with("max_iter", 100);
        let premise = ParamSet::new().with("max_iter", 500);
        base.merge(&premise);

        assert_eq!(base.get("C"), Some(&ParamValue::Float(1.0)));
        assert_eq!(base.get("max_iter"), Some(&ParamValue::Int(500)));
    }

    #[test]
    fn display_is_sorted_by_name() {
        let set = ParamSet::new().with("b", 2).with("a", "x");
        assert_eq!(set.to_string(), "a=x, b=2");
    }
}
