//! Fixed-offset stat-line extraction
//!
//! Many simulators print a summary block at the end of their output. The
//! rule here picks one line counted from the end, splits it and parses the
//! requested fields, optionally deriving ratio metrics.
//!
//! Typical layouts:
//!
//! | Tool output | Rule |
//! |---|---|
//! | `Average IPC: 1.53` on the second-to-last line | `new(2)`, `Char(':')`, field `1`, float |
//! | `LLC TOTAL ACCESS: a HIT: h MISS: m` five lines from the end | `new(5)`, whitespace, fields `3`/`5`/`7`, int |
//! | `... EDP = 2.1e9 J.s` on the last line | `new(1)`, whitespace, field `-2`, float |

use super::{ExtractionError, Extractor, MetricValue, Metrics};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Raw text attached to "line missing" errors is capped to the output tail.
const RAW_TAIL_BYTES: usize = 4096;

/// How a stat line is split into fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    /// Runs of whitespace (empty fields dropped)
    #[default]
    Whitespace,
    /// A single character (empty fields kept)
    Char(char),
}

/// Numeric type a field is parsed as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Parse as `i64`
    Int,
    /// Parse as `f64`
    #[default]
    Float,
}

/// One field to pull out of the stat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Metric name
    pub name: String,
    /// Field index; negative values count from the end of the line
    pub index: isize,
    /// Numeric type
    #[serde(default)]
    pub kind: MetricKind,
}

/// Derived metric `numerator / denominator` over already-extracted fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioRule {
    /// Derived metric name
    pub name: String,
    /// Metric divided
    pub numerator: String,
    /// Metric divided by
    pub denominator: String,
}

/// Extract fields from the N-th line counted from the end of the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFieldExtractor {
    line_from_end: usize,
    #[serde(default)]
    delimiter: Delimiter,
    fields: Vec<FieldRule>,
    #[serde(default)]
    ratios: Vec<RatioRule>,
}

impl LineFieldExtractor {
    /// Create a rule reading the `line_from_end`-th line from the end
    /// (1 = last line). Trailing newlines do not count as lines.
    #[must_use]
    pub const fn new(line_from_end: usize) -> Self {
        Self {
            line_from_end,
            delimiter: Delimiter::Whitespace,
            fields: Vec::new(),
            ratios: Vec::new(),
        }
    }

    /// Set the field delimiter.
    #[must_use]
    pub const fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Add a field to extract.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, index: isize, kind: MetricKind) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            index,
            kind,
        });
        self
    }

    /// Add a derived `numerator / denominator` metric.
    #[must_use]
    pub fn with_ratio(
        mut self,
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        self.ratios.push(RatioRule {
            name: name.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
        });
        self
    }

    /// Names of the metrics this rule produces, in output order.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.ratios.iter().map(|r| r.name.as_str()))
    }

    /// Check the rule is usable before a sweep starts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the line offset is zero, no field
    /// is declared, or a ratio references an undeclared metric.
    pub fn validate(&self) -> Result<()> {
        if self.line_from_end == 0 {
            return Err(Error::InvalidInput(
                "line_from_end counts from 1 (the last line)".to_string(),
            ));
        }
        if self.fields.is_empty() {
            return Err(Error::InvalidInput("extractor declares no fields".to_string()));
        }
        for ratio in &self.ratios {
            for operand in [&ratio.numerator, &ratio.denominator] {
                if !self.fields.iter().any(|f| &f.name == operand) {
                    return Err(Error::InvalidInput(format!(
                        "ratio '{}' references unknown metric '{operand}'",
                        ratio.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self.delimiter {
            Delimiter::Whitespace => line.split_whitespace().collect(),
            Delimiter::Char(c) => line.split(c).collect(),
        }
    }
}

impl Extractor for LineFieldExtractor {
    fn extract(&self, output: &str) -> std::result::Result<Metrics, ExtractionError> {
        let lines: Vec<&str> = output.lines().collect();
        let line = lines
            .len()
            .checked_sub(self.line_from_end)
            .and_then(|i| lines.get(i))
            .ok_or_else(|| {
                ExtractionError::new(
                    format!(
                        "output has {} lines, stat line {} from the end is missing",
                        lines.len(),
                        self.line_from_end
                    ),
                    tail(output, RAW_TAIL_BYTES),
                )
            })?;

        let fields = self.split(line);
        let mut metrics = Metrics::new();

        for rule in &self.fields {
            let raw = resolve_index(fields.len(), rule.index)
                .map(|i| fields[i].trim())
                .ok_or_else(|| {
                    ExtractionError::new(
                        format!(
                            "field {} for '{}' out of range ({} fields)",
                            rule.index,
                            rule.name,
                            fields.len()
                        ),
                        *line,
                    )
                })?;

            let value = match rule.kind {
                MetricKind::Int => raw.parse().map(MetricValue::Int).ok(),
                MetricKind::Float => raw.parse().map(MetricValue::Float).ok(),
            }
            .ok_or_else(|| {
                ExtractionError::new(
                    format!("field '{}' is not a {:?} number: {raw:?}", rule.name, rule.kind),
                    *line,
                )
            })?;

            metrics.insert(rule.name.clone(), value);
        }

        for ratio in &self.ratios {
            let numerator = metrics.get_f64(&ratio.numerator);
            let denominator = metrics.get_f64(&ratio.denominator);
            match (numerator, denominator) {
                (Some(n), Some(d)) if d != 0.0 => {
                    metrics.insert(ratio.name.clone(), MetricValue::Float(n / d));
                }
                (Some(_), Some(_)) => {
                    return Err(ExtractionError::new(
                        format!(
                            "ratio '{}' has a zero denominator '{}'",
                            ratio.name, ratio.denominator
                        ),
                        *line,
                    ));
                }
                _ => {
                    return Err(ExtractionError::new(
                        format!("ratio '{}' references an unextracted metric", ratio.name),
                        *line,
                    ));
                }
            }
        }

        Ok(metrics)
    }
}

fn resolve_index(len: usize, index: isize) -> Option<usize> {
    let resolved = if index < 0 {
        len.checked_sub(index.unsigned_abs())?
    } else {
        index.unsigned_abs()
    };
    (resolved < len).then_some(resolved)
}

/// Last `max_bytes` of `text`, cut on a char boundary.
pub(crate) fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROCSIM_OUTPUT: &str = "\
Processor settings
R: 2
Total instructions: 100000
Average IPC: 1.873
Total run time (cycles): 53391
";

    const CACHE_OUTPUT: &str = "\
Region of Interest Statistics
LLC TOTAL     ACCESS:    2000000  HIT:    1500000  MISS:     500000
LLC LOAD      ACCESS:    1200000  HIT:    1000000  MISS:     200000
LLC RFO       ACCESS:     800000  HIT:     500000  MISS:     300000
LLC PREFETCH  ACCESS:          0  HIT:          0  MISS:          0
LLC WRITEBACK ACCESS:          0  HIT:          0  MISS:          0
";

    const USIMM_OUTPUT: &str = "\
Total memory system power = 10.5 W
Energy Delay product (EDP) = 2.5e9 J.s
";

    #[test]
    fn test_average_ipc_layout() {
        let extractor = LineFieldExtractor::new(2)
            .delimiter(Delimiter::Char(':'))
            .field("ipc", 1, MetricKind::Float);
        let metrics = extractor.extract(PROCSIM_OUTPUT).unwrap();
        assert_eq!(metrics.get("ipc"), Some(MetricValue::Float(1.873)));
    }

    #[test]
    fn test_llc_total_layout_with_ratio() {
        let extractor = LineFieldExtractor::new(5)
            .field("access", 3, MetricKind::Int)
            .field("hit", 5, MetricKind::Int)
            .field("miss", 7, MetricKind::Int)
            .with_ratio("miss_rate", "miss", "access");
        extractor.validate().unwrap();

        let metrics = extractor.extract(CACHE_OUTPUT).unwrap();
        assert_eq!(metrics.get("access"), Some(MetricValue::Int(2_000_000)));
        assert_eq!(metrics.get("hit"), Some(MetricValue::Int(1_500_000)));
        assert_eq!(metrics.get("miss"), Some(MetricValue::Int(500_000)));
        assert_eq!(metrics.get_f64("miss_rate"), Some(0.25));
        assert_eq!(
            extractor.metric_names().collect::<Vec<_>>(),
            vec!["access", "hit", "miss", "miss_rate"]
        );
    }

    #[test]
    fn test_negative_index_layout() {
        let extractor = LineFieldExtractor::new(1).field("edp", -2, MetricKind::Float);
        let metrics = extractor.extract(USIMM_OUTPUT).unwrap();
        assert_eq!(metrics.get_f64("edp"), Some(2.5e9));
    }

    #[test]
    fn test_missing_line_carries_output() {
        let extractor = LineFieldExtractor::new(10).field("ipc", 0, MetricKind::Float);
        let err = extractor.extract("only\ntwo lines\n").unwrap_err();
        assert!(err.reason().contains("missing"));
        assert_eq!(err.raw(), "only\ntwo lines\n");
    }

    #[test]
    fn test_non_numeric_field_carries_line() {
        let extractor = LineFieldExtractor::new(1)
            .delimiter(Delimiter::Char(':'))
            .field("ipc", 1, MetricKind::Float);
        let err = extractor.extract("Average IPC: n/a").unwrap_err();
        assert_eq!(err.raw(), "Average IPC: n/a");
        assert!(err.reason().contains("ipc"));
    }

    #[test]
    fn test_index_out_of_range() {
        let extractor = LineFieldExtractor::new(1).field("x", 4, MetricKind::Int);
        let err = extractor.extract("a b c").unwrap_err();
        assert!(err.reason().contains("out of range"));
        assert_eq!(err.raw(), "a b c");

        let extractor = LineFieldExtractor::new(1).field("x", -4, MetricKind::Int);
        assert!(extractor.extract("a b c").is_err());
    }

    #[test]
    fn test_zero_denominator_fails() {
        let extractor = LineFieldExtractor::new(1)
            .field("miss", 0, MetricKind::Int)
            .field("access", 1, MetricKind::Int)
            .with_ratio("miss_rate", "miss", "access");
        let err = extractor.extract("0 0").unwrap_err();
        assert!(err.reason().contains("zero denominator"));
    }

    #[test]
    fn test_int_field_rejects_float_text() {
        let extractor = LineFieldExtractor::new(1).field("hits", 0, MetricKind::Int);
        assert!(extractor.extract("1.5").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(LineFieldExtractor::new(0).field("x", 0, MetricKind::Int).validate().is_err());
        assert!(LineFieldExtractor::new(1).validate().is_err());
        assert!(LineFieldExtractor::new(1)
            .field("x", 0, MetricKind::Int)
            .with_ratio("r", "x", "y")
            .validate()
            .is_err());
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(3, 0), Some(0));
        assert_eq!(resolve_index(3, -1), Some(2));
        assert_eq!(resolve_index(3, -3), Some(0));
        assert_eq!(resolve_index(3, -4), None);
        assert_eq!(resolve_index(3, 3), None);
    }

    #[test]
    fn test_tail_respects_char_boundary() {
        let text = "ééé";
        let t = tail(text, 3);
        assert_eq!(t, "é");
    }

    #[test]
    fn test_deserialize_rule() {
        let json = r#"{
            "line_from_end": 2,
            "delimiter": {"char": ":"},
            "fields": [{"name": "ipc", "index": 1, "kind": "float"}]
        }"#;
        let extractor: LineFieldExtractor = serde_json::from_str(json).unwrap();
        assert_eq!(
            extractor,
            LineFieldExtractor::new(2)
                .delimiter(Delimiter::Char(':'))
                .field("ipc", 1, MetricKind::Float)
        );
    }
}
