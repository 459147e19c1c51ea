//! Frozen result table
//!
//! A [`ResultTable`] is produced once per sweep after every worker has
//! finished. It maps each configuration to its [`Outcome`], keeps the
//! enumeration order for reproducible reports, and is read-only: the
//! aggregation queries in this module never mutate it.

mod aggregate;
#[cfg(feature = "arrow")]
mod export;

pub use aggregate::{sum_of, Candidate, Selection};

use crate::extract::{MetricValue, Metrics};
use crate::space::{ConfigSpace, Configuration, Value};
use crate::sweep::{Failure, FailureKind, Outcome};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One configuration paired with its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    configuration: Configuration,
    outcome: Outcome,
}

impl ResultRecord {
    /// Pair a configuration with its outcome.
    #[must_use]
    pub const fn new(configuration: Configuration, outcome: Outcome) -> Self {
        Self {
            configuration,
            outcome,
        }
    }

    /// The configuration evaluated.
    #[must_use]
    pub const fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Its outcome.
    #[must_use]
    pub const fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Metrics, for a successful record.
    #[must_use]
    pub const fn metrics(&self) -> Option<&Metrics> {
        self.outcome.metrics()
    }

    /// One metric as `f64`, for a successful record that has it.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics().and_then(|m| m.get_f64(name))
    }
}

/// Every configuration of one sweep and what happened to it.
#[derive(Debug, Clone)]
pub struct ResultTable {
    names: Arc<[String]>,
    records: Vec<ResultRecord>,
    index: FxHashMap<Configuration, usize>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl ResultTable {
    pub(crate) fn new(
        names: Arc<[String]>,
        records: Vec<ResultRecord>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.configuration.clone(), i))
            .collect();
        Self {
            names,
            records,
            index,
            started_at,
            finished_at,
        }
    }

    /// Build a table from outcomes computed elsewhere (e.g. merged
    /// re-submissions or a reloaded report).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a configuration does not belong to
    /// `space` or appears twice.
    pub fn from_records(
        space: &ConfigSpace,
        records: impl IntoIterator<Item = (Configuration, Outcome)>,
    ) -> Result<Self> {
        let now = Utc::now();
        let mut rows = Vec::new();
        let mut index = FxHashMap::default();

        for (configuration, outcome) in records {
            if !space.contains(&configuration) {
                return Err(Error::InvalidInput(format!(
                    "configuration {configuration} is not part of the space"
                )));
            }
            if index.insert(configuration.clone(), rows.len()).is_some() {
                return Err(Error::InvalidInput(format!(
                    "configuration {configuration} recorded twice"
                )));
            }
            rows.push(ResultRecord::new(configuration, outcome));
        }

        Ok(Self {
            names: space.shared_names(),
            records: rows,
            index,
            started_at: now,
            finished_at: now,
        })
    }

    /// Parameter names, in declaration order.
    #[must_use]
    pub fn parameter_names(&self) -> &[String] {
        &self.names
    }

    /// Number of records (successes, failures and skipped).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the table holds no record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in enumeration order.
    #[must_use]
    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    /// Iterate all records in enumeration order.
    pub fn iter(&self) -> std::slice::Iter<'_, ResultRecord> {
        self.records.iter()
    }

    /// Look up one configuration's outcome.
    #[must_use]
    pub fn get(&self, configuration: &Configuration) -> Option<&Outcome> {
        self.index
            .get(configuration)
            .map(|&i| &self.records[i].outcome)
    }

    /// Successful configurations and their metrics.
    pub fn successes(&self) -> impl Iterator<Item = (&Configuration, &Metrics)> {
        self.records
            .iter()
            .filter_map(|r| r.metrics().map(|m| (&r.configuration, m)))
    }

    /// Failed configurations and why they failed.
    pub fn failures(&self) -> impl Iterator<Item = (&Configuration, &Failure)> {
        self.records
            .iter()
            .filter_map(|r| r.outcome.failure().map(|f| (&r.configuration, f)))
    }

    /// Configurations never dispatched.
    pub fn skipped(&self) -> impl Iterator<Item = &Configuration> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Skipped))
            .map(|r| &r.configuration)
    }

    /// Metric names seen across successful records, in first-seen order.
    #[must_use]
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (_, metrics) in self.successes() {
            for name in metrics.names() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// When the sweep started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the last worker finished.
    #[must_use]
    pub const fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Projection returning one parameter's value, for grouping queries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no parameter has this name.
    pub fn param_key(&self, name: &str) -> Result<impl Fn(&Configuration) -> Value> {
        let position = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown parameter '{name}'")))?;
        Ok(move |configuration: &Configuration| configuration.values()[position].clone())
    }

    /// Outcome counts with one sample per failure kind.
    #[must_use]
    pub fn summary(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        for record in &self.records {
            match &record.outcome {
                Outcome::Success(_) => summary.succeeded += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failure(failure) => {
                    summary.failed += 1;
                    summary
                        .by_kind
                        .entry(failure.kind())
                        .and_modify(|k| k.count += 1)
                        .or_insert_with(|| KindSummary {
                            count: 1,
                            sample_configuration: record.configuration.clone(),
                            sample: failure.clone(),
                        });
                }
            }
        }
        summary
    }

    /// Flat rows: parameter values, then one cell per metric in
    /// [`ResultTable::metric_names`] order, then status and error text.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        let metric_names = self.metric_names();
        self.records
            .iter()
            .map(|record| Row {
                values: record.configuration.values().to_vec(),
                metrics: metric_names
                    .iter()
                    .map(|name| record.metrics().and_then(|m| m.get(name)))
                    .collect(),
                status: record.outcome.status(),
                error: record.outcome.failure().map(ToString::to_string),
            })
            .collect()
    }

    /// Rows as JSON objects keyed by column name.
    #[must_use]
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        let metric_names = self.metric_names();
        self.rows()
            .into_iter()
            .map(|row| {
                let mut object = serde_json::Map::new();
                for (name, value) in self.names.iter().zip(&row.values) {
                    object.insert(name.clone(), json_value(value));
                }
                for (name, metric) in metric_names.iter().zip(&row.metrics) {
                    object.insert(name.clone(), metric.map_or(serde_json::Value::Null, json_metric));
                }
                object.insert("status".to_string(), row.status.into());
                object.insert(
                    "error".to_string(),
                    row.error.map_or(serde_json::Value::Null, serde_json::Value::String),
                );
                serde_json::Value::Object(object)
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ResultTable {
    type Item = &'a ResultRecord;
    type IntoIter = std::slice::Iter<'a, ResultRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(v) => (*v).into(),
        Value::Float(v) => serde_json::Number::from_f64(*v).map_or(serde_json::Value::Null, Into::into),
        Value::Label(s) => s.clone().into(),
    }
}

fn json_metric(metric: MetricValue) -> serde_json::Value {
    match metric {
        MetricValue::Int(v) => v.into(),
        MetricValue::Float(v) => serde_json::Number::from_f64(v).map_or(serde_json::Value::Null, Into::into),
    }
}

/// One exported row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Parameter values, in declaration order
    pub values: Vec<Value>,
    /// Metric cells; `None` where the record has no such metric
    pub metrics: Vec<Option<MetricValue>>,
    /// `ok`, `skipped` or the failure kind
    pub status: &'static str,
    /// Failure message
    pub error: Option<String>,
}

/// Per-kind failure count with a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct KindSummary {
    /// Failures of this kind
    pub count: usize,
    /// Configuration of the first failure seen
    pub sample_configuration: Configuration,
    /// First failure seen (carries raw text where available)
    pub sample: Failure,
}

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSummary {
    succeeded: usize,
    failed: usize,
    skipped: usize,
    by_kind: BTreeMap<FailureKind, KindSummary>,
}

impl SweepSummary {
    /// Successful configurations.
    #[must_use]
    pub const fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Failed configurations.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.failed
    }

    /// Never-dispatched configurations.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// All configurations.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Failure counts per kind.
    #[must_use]
    pub const fn by_kind(&self) -> &BTreeMap<FailureKind, KindSummary> {
        &self.by_kind
    }
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} configurations succeeded, {} failed, {} skipped",
            self.succeeded, self.failed, self.skipped
        )?;
        for (kind, summary) in &self.by_kind {
            write!(
                f,
                "\n  {kind}: {} (e.g. {}: {})",
                summary.count, summary.sample_configuration, summary.sample
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionError;
    use std::time::Duration;

    fn space() -> ConfigSpace {
        ConfigSpace::builder()
            .param("r", [1, 2])
            .param("trace", ["gcc", "mcf"])
            .build()
            .unwrap()
    }

    fn table() -> ResultTable {
        let space = space();
        let outcomes = vec![
            Outcome::Success(Metrics::new().with("ipc", MetricValue::Float(1.5))),
            Outcome::Failure(Failure::Extraction(ExtractionError::new("line missing", "garbage"))),
            Outcome::Failure(Failure::Timeout {
                after: Duration::from_secs(1),
            }),
            Outcome::Skipped,
        ];
        ResultTable::from_records(&space, space.iter().zip(outcomes)).unwrap()
    }

    #[test]
    fn test_lookup_by_configuration() {
        let table = table();
        let config = space().configuration([Value::from(1), Value::from("gcc")]).unwrap();
        assert!(table.get(&config).unwrap().is_success());
        assert_eq!(table.len(), 4);
        assert_eq!(table.successes().count(), 1);
        assert_eq!(table.failures().count(), 2);
        assert_eq!(table.skipped().count(), 1);
    }

    #[test]
    fn test_summary_display() {
        let summary = table().summary();
        assert_eq!(summary.total(), 4);
        let text = summary.to_string();
        assert!(text.starts_with("1 configurations succeeded, 2 failed, 1 skipped"));
        assert!(text.contains("extraction: 1"));
        assert!(text.contains("garbage"));
        assert!(text.contains("timeout: 1"));
    }

    #[test]
    fn test_from_records_rejects_duplicates() {
        let space = space();
        let config = space.iter().next().unwrap();
        let err = ResultTable::from_records(
            &space,
            vec![(config.clone(), Outcome::Skipped), (config, Outcome::Skipped)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_rows_and_json() {
        let table = table();
        let rows = table.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].metrics, vec![Some(MetricValue::Float(1.5))]);
        assert_eq!(rows[1].status, "extraction");
        assert_eq!(rows[1].metrics, vec![None]);

        let json = table.to_json_rows();
        assert_eq!(json[0]["r"], 1);
        assert_eq!(json[0]["trace"], "gcc");
        assert_eq!(json[0]["ipc"], 1.5);
        assert_eq!(json[0]["status"], "ok");
        assert!(json[0]["error"].is_null());
        assert_eq!(json[3]["status"], "skipped");
    }

    #[test]
    fn test_param_key() {
        let table = table();
        let key = table.param_key("trace").unwrap();
        let first = table.records()[0].configuration();
        assert_eq!(key(first), Value::from("gcc"));
        assert!(table.param_key("missing").is_err());
    }
}
