//! Output extraction: captured stdout → typed metrics
//!
//! Every external tool prints its statistics in its own layout, so the
//! extraction rule is a strategy supplied by the caller. An [`Extractor`]
//! either produces a [`Metrics`] set or fails with an [`ExtractionError`]
//! carrying the offending raw text; it never substitutes a sentinel value.
//!
//! [`LineFieldExtractor`] covers the common "N-th line from the end, split,
//! pick fields" layout. Closures `Fn(&str) -> Result<Metrics, ExtractionError>`
//! are extractors as well.
//!
//! ```rust
//! use trueno_sweep::extract::{Delimiter, Extractor, LineFieldExtractor, MetricKind};
//!
//! let extractor = LineFieldExtractor::new(2)
//!     .delimiter(Delimiter::Char(':'))
//!     .field("ipc", 1, MetricKind::Float);
//!
//! let metrics = extractor.extract("cycles: 1000\nAverage IPC: 1.5\ndone\n").unwrap();
//! assert_eq!(metrics.get_f64("ipc"), Some(1.5));
//! ```

mod line_field;

pub use line_field::{Delimiter, FieldRule, LineFieldExtractor, MetricKind, RatioRule};
pub(crate) use line_field::tail;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single extracted statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Counter-like statistic (accesses, hits, misses)
    Int(i64),
    /// Rate-like statistic (IPC, EDP, miss rate)
    Float(f64),
}

impl MetricValue {
    /// Numeric value as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Named metric values extracted from one run, in extraction order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    entries: Vec<(String, MetricValue)>,
}

impl Metrics {
    /// Create an empty metric set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a metric, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: MetricValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Add a metric, replacing any previous value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: MetricValue) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Get a metric by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Get a metric by name as `f64`.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).map(MetricValue::as_f64)
    }

    /// Iterate `(name, value)` pairs in extraction order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, MetricValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Metric names in extraction order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no metric was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, MetricValue)> for Metrics {
    fn from_iter<T: IntoIterator<Item = (S, MetricValue)>>(iter: T) -> Self {
        let mut metrics = Self::new();
        for (name, value) in iter {
            metrics.insert(name, value);
        }
        metrics
    }
}

/// Captured output did not have the expected statistic shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("extraction failed: {reason}")]
pub struct ExtractionError {
    reason: String,
    raw: String,
}

impl ExtractionError {
    /// Create an extraction error with the raw text that caused it.
    #[must_use]
    pub fn new(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Why extraction failed.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The offending raw text (line or output tail).
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Strategy turning one run's captured stdout into metrics.
///
/// Implementations must be deterministic: identical text yields identical
/// metrics (or an identical error).
pub trait Extractor: Send + Sync {
    /// Extract metrics from captured stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError`] when the text does not match the
    /// expected layout.
    fn extract(&self, output: &str) -> Result<Metrics, ExtractionError>;
}

impl<F> Extractor for F
where
    F: Fn(&str) -> Result<Metrics, ExtractionError> + Send + Sync,
{
    fn extract(&self, output: &str) -> Result<Metrics, ExtractionError> {
        self(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_insert_replaces() {
        let mut metrics = Metrics::new().with("ipc", MetricValue::Float(1.0));
        metrics.insert("ipc", MetricValue::Float(2.0));
        metrics.insert("hit", MetricValue::Int(3));
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics.get_f64("ipc"), Some(2.0));
        assert_eq!(metrics.names().collect::<Vec<_>>(), vec!["ipc", "hit"]);
    }

    #[test]
    fn test_metric_value_as_f64() {
        assert!((MetricValue::Int(7).as_f64() - 7.0).abs() < f64::EPSILON);
        assert_eq!(MetricValue::Float(0.5).to_string(), "0.5");
    }

    #[test]
    fn test_closure_extractor() {
        let extractor = |output: &str| {
            output
                .trim()
                .parse::<i64>()
                .map(|v| Metrics::new().with("value", MetricValue::Int(v)))
                .map_err(|e| ExtractionError::new(e.to_string(), output))
        };
        assert_eq!(extractor.extract("42\n").unwrap().get("value"), Some(MetricValue::Int(42)));

        let err = extractor.extract("oops").unwrap_err();
        assert_eq!(err.raw(), "oops");
        assert!(err.to_string().starts_with("extraction failed"));
    }
}
