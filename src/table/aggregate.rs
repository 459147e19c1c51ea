//! Aggregation queries over a frozen [`ResultTable`]
//!
//! Only successful records carrying the queried metric take part; failures,
//! skipped configurations and records without the metric are ignored.
//! Groups are keyed by any projection of the configuration and returned in
//! key order; within a group, candidates keep enumeration order, and every
//! tie resolves to the earliest configuration.

use super::{ResultRecord, ResultTable};
use crate::extract::Metrics;
use crate::space::Configuration;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// A successful record scored on one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<'a> {
    /// Configuration evaluated
    pub configuration: &'a Configuration,
    /// All metrics of the run
    pub metrics: &'a Metrics,
    /// Value of the queried metric
    pub value: f64,
}

/// Minimum-cost pick among near-optimal candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection<'a> {
    /// Chosen candidate
    pub candidate: Candidate<'a>,
    /// Its cost
    pub cost: f64,
    /// Best metric value in the group
    pub group_max: f64,
}

impl ResultTable {
    /// Successful records grouped by `key`.
    pub fn group_by<K, F>(&self, key: F) -> BTreeMap<K, Vec<&ResultRecord>>
    where
        K: Ord,
        F: Fn(&Configuration) -> K,
    {
        let mut groups: BTreeMap<K, Vec<&ResultRecord>> = BTreeMap::new();
        for record in self.records.iter().filter(|r| r.outcome.is_success()) {
            groups
                .entry(key(&record.configuration))
                .or_default()
                .push(record);
        }
        groups
    }

    /// Candidates scored on `metric`, grouped by `key`.
    fn scored<K, F>(&self, key: F, metric: &str) -> BTreeMap<K, Vec<Candidate<'_>>>
    where
        K: Ord,
        F: Fn(&Configuration) -> K,
    {
        let mut groups: BTreeMap<K, Vec<Candidate<'_>>> = BTreeMap::new();
        for (configuration, metrics) in self.successes() {
            if let Some(value) = metrics.get_f64(metric) {
                groups.entry(key(configuration)).or_default().push(Candidate {
                    configuration,
                    metrics,
                    value,
                });
            }
        }
        groups
    }

    /// Best candidate per group on `metric`.
    pub fn group_max<K, F>(&self, key: F, metric: &str) -> BTreeMap<K, Candidate<'_>>
    where
        K: Ord,
        F: Fn(&Configuration) -> K,
    {
        self.scored(key, metric)
            .into_iter()
            .filter_map(|(k, candidates)| best(&candidates).map(|c| (k, c)))
            .collect()
    }

    /// Candidates within `fraction` of their group's best on `metric`:
    /// `value >= max - |max| * fraction`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless `fraction` is finite and
    /// non-negative.
    pub fn within_threshold<K, F>(
        &self,
        key: F,
        metric: &str,
        fraction: f64,
    ) -> Result<BTreeMap<K, Vec<Candidate<'_>>>>
    where
        K: Ord,
        F: Fn(&Configuration) -> K,
    {
        check_fraction(fraction)?;
        Ok(self
            .scored(key, metric)
            .into_iter()
            .filter_map(|(k, candidates)| {
                let max = best(&candidates)?.value;
                let floor = max - max.abs() * fraction;
                let kept: Vec<_> = candidates.into_iter().filter(|c| c.value >= floor).collect();
                Some((k, kept))
            })
            .collect())
    }

    /// Per group, the near-optimal candidate (see
    /// [`ResultTable::within_threshold`]) with the lowest `cost`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid `fraction`.
    pub fn select_min_cost<K, F, C>(
        &self,
        key: F,
        metric: &str,
        fraction: f64,
        cost: C,
    ) -> Result<BTreeMap<K, Selection<'_>>>
    where
        K: Ord,
        F: Fn(&Configuration) -> K,
        C: Fn(&Configuration) -> f64,
    {
        check_fraction(fraction)?;
        let mut selections = BTreeMap::new();

        for (k, candidates) in self.scored(key, metric) {
            let Some(group_max) = best(&candidates).map(|c| c.value) else {
                continue;
            };
            let floor = group_max - group_max.abs() * fraction;

            let mut chosen: Option<(Candidate<'_>, f64)> = None;
            for candidate in candidates.into_iter().filter(|c| c.value >= floor) {
                let c = cost(candidate.configuration);
                if chosen.map_or(true, |(_, current)| c.total_cmp(&current).is_lt()) {
                    chosen = Some((candidate, c));
                }
            }

            if let Some((candidate, cost)) = chosen {
                selections.insert(
                    k,
                    Selection {
                        candidate,
                        cost,
                        group_max,
                    },
                );
            }
        }
        Ok(selections)
    }

    /// Mean of `metric` over successful records that have it.
    #[must_use]
    pub fn mean(&self, metric: &str) -> Option<f64> {
        mean(self.successes().filter_map(|(_, m)| m.get_f64(metric)))
    }

    /// Mean of `metric` per group.
    pub fn group_mean<K, F>(&self, key: F, metric: &str) -> BTreeMap<K, f64>
    where
        K: Ord,
        F: Fn(&Configuration) -> K,
    {
        self.scored(key, metric)
            .into_iter()
            .filter_map(|(k, candidates)| {
                mean(candidates.iter().map(|c| c.value)).map(|m| (k, m))
            })
            .collect()
    }
}

/// Cost function summing the numeric values of the named parameters.
///
/// Label values and unknown names contribute nothing.
pub fn sum_of<I, S>(params: I) -> impl Fn(&Configuration) -> f64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let params: Vec<String> = params
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .collect();
    move |configuration: &Configuration| {
        params
            .iter()
            .filter_map(|p| configuration.get(p).and_then(|v| v.as_f64()))
            .sum()
    }
}

/// Highest value; the earliest candidate wins ties.
fn best<'a>(candidates: &[Candidate<'a>]) -> Option<Candidate<'a>> {
    candidates.iter().copied().fold(None, |acc, c| match acc {
        Some(top) if c.value.total_cmp(&top.value).is_le() => Some(top),
        _ => Some(c),
    })
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

fn check_fraction(fraction: f64) -> Result<()> {
    if fraction.is_finite() && fraction >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "threshold fraction must be finite and non-negative, got {fraction}"
        )))
    }
}
