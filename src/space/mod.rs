//! Configuration space: named parameters and their Cartesian product
//!
//! A [`ConfigSpace`] is an ordered list of [`Parameter`]s. Enumeration walks
//! the Cartesian product lazily, varying the last-declared parameter fastest,
//! so identical declarations always produce identical orderings.
//!
//! ```rust
//! use trueno_sweep::space::ConfigSpace;
//!
//! # fn main() -> trueno_sweep::Result<()> {
//! let space = ConfigSpace::builder()
//!     .param("r", [1, 2])
//!     .param("trace", ["gcc", "mcf"])
//!     .build()?;
//!
//! assert_eq!(space.len(), 4);
//! let first = space.iter().next().unwrap();
//! assert_eq!(first.to_string(), "(r=1, trace=gcc)");
//! # Ok(())
//! # }
//! ```

mod iter;
mod value;

pub use iter::ConfigIter;
pub use value::Value;

use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// A named sweep knob and its candidate values, in enumeration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    values: Vec<Value>,
}

impl Parameter {
    /// Create a parameter from a name and its candidate values.
    ///
    /// Validation happens when the parameter joins a [`ConfigSpace`].
    #[must_use]
    pub fn new<V: Into<Value>>(name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Get the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the candidate values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ConfigSpace("parameter name must not be empty".to_string()));
        }
        if self.values.is_empty() {
            return Err(Error::ConfigSpace(format!(
                "parameter '{}' has no candidate values",
                self.name
            )));
        }
        for (i, value) in self.values.iter().enumerate() {
            if self.values[..i].contains(value) {
                return Err(Error::ConfigSpace(format!(
                    "parameter '{}' lists value {value} more than once",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Ordered set of parameters spanning a design space.
#[derive(Debug, Clone)]
pub struct ConfigSpace {
    names: Arc<[String]>,
    params: Vec<Parameter>,
}

impl ConfigSpace {
    /// Create a configuration space from declared parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigSpace`] if no parameters are declared, a name
    /// is empty or repeated, a candidate list is empty or repeats a value,
    /// or the product of list lengths overflows `usize`.
    pub fn new(params: Vec<Parameter>) -> Result<Self> {
        if params.is_empty() {
            return Err(Error::ConfigSpace("no parameters declared".to_string()));
        }

        for (i, param) in params.iter().enumerate() {
            param.validate()?;
            if params[..i].iter().any(|p| p.name == param.name) {
                return Err(Error::ConfigSpace(format!(
                    "parameter '{}' declared more than once",
                    param.name
                )));
            }
        }

        params
            .iter()
            .try_fold(1usize, |acc, p| acc.checked_mul(p.values.len()))
            .ok_or_else(|| {
                Error::ConfigSpace("configuration count overflows usize".to_string())
            })?;

        let names: Arc<[String]> = params.iter().map(|p| p.name.clone()).collect();
        Ok(Self { names, params })
    }

    /// Create a builder for declaring parameters one at a time.
    #[must_use]
    pub fn builder() -> ConfigSpaceBuilder {
        ConfigSpaceBuilder::default()
    }

    /// Get the declared parameters, in tuple order.
    #[must_use]
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Get the parameter names, in tuple order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Total number of configurations (product of candidate-list lengths).
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.iter().map(|p| p.values.len()).product()
    }

    /// A validated space always holds at least one configuration.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Lazily enumerate every configuration, last parameter varying fastest.
    #[must_use]
    pub fn iter(&self) -> ConfigIter {
        ConfigIter::new(self.clone())
    }

    /// Build a configuration from explicit values, checking each value is
    /// declared for its parameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the arity is wrong or a value is
    /// not among the parameter's candidates.
    pub fn configuration<V: Into<Value>>(
        &self,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Configuration> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.len() != self.params.len() {
            return Err(Error::InvalidInput(format!(
                "expected {} values, got {}",
                self.params.len(),
                values.len()
            )));
        }
        for (param, value) in self.params.iter().zip(&values) {
            if !param.values.contains(value) {
                return Err(Error::InvalidInput(format!(
                    "value {value} is not a candidate of parameter '{}'",
                    param.name
                )));
            }
        }
        Ok(Configuration::new(Arc::clone(&self.names), values))
    }

    /// Check that a configuration was drawn from this space.
    #[must_use]
    pub fn contains(&self, config: &Configuration) -> bool {
        config.names() == self.names()
            && self
                .params
                .iter()
                .zip(config.values())
                .all(|(p, v)| p.values.contains(v))
    }

    pub(crate) fn shared_names(&self) -> Arc<[String]> {
        Arc::clone(&self.names)
    }
}

impl<'a> IntoIterator for &'a ConfigSpace {
    type Item = Configuration;
    type IntoIter = ConfigIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Builder for `ConfigSpace`.
#[derive(Debug, Default)]
pub struct ConfigSpaceBuilder {
    params: Vec<Parameter>,
}

impl ConfigSpaceBuilder {
    /// Declare the next parameter.
    #[must_use]
    pub fn param<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.params.push(Parameter::new(name, values));
        self
    }

    /// Build the `ConfigSpace`.
    ///
    /// # Errors
    ///
    /// See [`ConfigSpace::new`].
    pub fn build(self) -> Result<ConfigSpace> {
        ConfigSpace::new(self.params)
    }
}

/// One point of the design space: a value per parameter, in declared order.
///
/// Identity is the tuple of values (plus the shared parameter names), so a
/// configuration can key result lookups directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Configuration {
    names: Arc<[String]>,
    values: Arc<[Value]>,
}

impl Configuration {
    pub(crate) fn new(names: Arc<[String]>, values: Vec<Value>) -> Self {
        Self {
            names,
            values: values.into(),
        }
    }

    /// Get the parameter names, in tuple order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Get the chosen values, in tuple order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get the value chosen for a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.values[i])
    }

    /// Iterate `(name, value)` pairs in tuple order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for a zero-parameter tuple (never produced by a `ConfigSpace`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_len_is_product() {
        let space = ConfigSpace::builder()
            .param("r", [1, 2, 3])
            .param("j", [1, 2])
            .param("trace", ["gcc", "mcf"])
            .build()
            .unwrap();
        assert_eq!(space.len(), 12);
        assert_eq!(space.iter().count(), 12);
    }

    #[test]
    fn test_empty_parameter_rejected() {
        let err = ConfigSpace::builder()
            .param("r", [1, 2])
            .param("j", Vec::<i64>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigSpace(_)));
        assert!(err.to_string().contains("'j' has no candidate values"));
    }

    #[test]
    fn test_no_parameters_rejected() {
        assert!(matches!(
            ConfigSpace::new(Vec::new()),
            Err(Error::ConfigSpace(_))
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = ConfigSpace::builder()
            .param("r", [1])
            .param("r", [2])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn test_duplicate_value_rejected() {
        let err = ConfigSpace::builder().param("r", [1, 1]).build().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_configuration_lookup() {
        let space = ConfigSpace::builder()
            .param("r", [1, 2])
            .param("trace", ["gcc"])
            .build()
            .unwrap();
        let config = space.configuration([Value::Int(2), Value::from("gcc")]).unwrap();
        assert_eq!(config.get("r"), Some(&Value::Int(2)));
        assert_eq!(config.get("missing"), None);
        assert!(space.contains(&config));
        assert_eq!(config.to_string(), "(r=2, trace=gcc)");
    }

    #[test]
    fn test_configuration_rejects_foreign_value() {
        let space = ConfigSpace::builder().param("r", [1, 2]).build().unwrap();
        assert!(space.configuration([3]).is_err());
        assert!(space.configuration([1, 2]).is_err());
    }
}
