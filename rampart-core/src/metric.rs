use crate::ThresholdParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonic sum.
    Counter,
    /// Distribution of observations, queryable by percentile.
    Trend,
    /// Fraction of boolean observations that were true.
    Rate,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Trend => write!(f, "trend"),
            MetricKind::Rate => write!(f, "rate"),
        }
    }
}

/// A single observation emitted by a step.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub tags: Tags,
    pub timestamp: SystemTime,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, kind: MetricKind, value: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
            tags: Tags::new(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn counter(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricKind::Counter, value)
    }

    pub fn trend(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricKind::Trend, value)
    }

    /// Trend sample in milliseconds.
    pub fn duration(name: impl Into<String>, elapsed: Duration) -> Self {
        Self::trend(name, elapsed.as_secs_f64() * 1_000.)
    }

    pub fn rate(name: impl Into<String>, observed: bool) -> Self {
        Self::new(name, MetricKind::Rate, if observed { 1. } else { 0. })
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> MetricKey {
        MetricKey {
            name: self.name.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Identity of one aggregated series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    pub name: String,
    pub tags: Tags,
}

impl MetricKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Tags::new(),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_with_tags(f, &self.name, &self.tags)
    }
}

/// Picks every series of a metric whose tags include the selector's tags.
///
/// Written the same way thresholds name their metric: `http_req_duration` or
/// `http_req_duration{endpoint:getMessages}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelector {
    pub name: String,
    pub tags: Tags,
}

impl MetricSelector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Tags::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, key: &MetricKey) -> bool {
        key.name == self.name
            && self
                .tags
                .iter()
                .all(|(k, v)| key.tags.get(k).is_some_and(|found| found == v))
    }

    pub fn parse(input: &str) -> Result<Self, ThresholdParseError> {
        let input = input.trim();
        let malformed = || ThresholdParseError::Selector(input.to_string());

        let Some(open) = input.find('{') else {
            if input.is_empty() || input.contains('}') {
                return Err(malformed());
            }
            return Ok(Self::new(input));
        };

        let name = input[..open].trim();
        let body = input[open + 1..].strip_suffix('}').ok_or_else(malformed)?;
        if name.is_empty() {
            return Err(malformed());
        }

        let mut selector = Self::new(name);
        for pair in body.split(',').filter(|p| !p.trim().is_empty()) {
            let (k, v) = pair.split_once(':').ok_or_else(malformed)?;
            let (k, v) = (k.trim(), v.trim());
            if k.is_empty() {
                return Err(malformed());
            }
            selector.tags.insert(k.to_string(), v.to_string());
        }
        Ok(selector)
    }
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_with_tags(f, &self.name, &self.tags)
    }
}

fn write_with_tags(f: &mut fmt::Formatter<'_>, name: &str, tags: &Tags) -> fmt::Result {
    write!(f, "{name}")?;
    if !tags.is_empty() {
        let tags: Vec<_> = tags.iter().map(|(k, v)| format!("{k}:{v}")).collect();
        write!(f, "{{{}}}", tags.join(","))?;
    }
    Ok(())
}

/// Point-in-time value of one series (or of several merged series).
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Counter { value: f64 },
    /// Values are kept sorted ascending.
    Trend { values: Vec<f64> },
    Rate { trues: u64, total: u64 },
}

impl Aggregate {
    pub fn trend(mut values: Vec<f64>) -> Self {
        values.sort_by(f64::total_cmp);
        Aggregate::Trend { values }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Aggregate::Counter { .. } => MetricKind::Counter,
            Aggregate::Trend { .. } => MetricKind::Trend,
            Aggregate::Rate { .. } => MetricKind::Rate,
        }
    }

    /// Folds `other` into `self`. Returns `false` (and leaves `self` untouched)
    /// when the kinds differ.
    pub fn merge(&mut self, other: &Aggregate) -> bool {
        match (self, other) {
            (Aggregate::Counter { value }, Aggregate::Counter { value: v }) => {
                *value += v;
                true
            }
            (Aggregate::Trend { values }, Aggregate::Trend { values: other }) => {
                values.extend_from_slice(other);
                values.sort_by(f64::total_cmp);
                true
            }
            (Aggregate::Rate { trues, total }, Aggregate::Rate { trues: t, total: n }) => {
                *trues += t;
                *total += n;
                true
            }
            _ => false,
        }
    }

    /// Number of observations; for counters, the accumulated value.
    pub fn count(&self) -> f64 {
        match self {
            Aggregate::Counter { value } => *value,
            Aggregate::Trend { values } => values.len() as f64,
            Aggregate::Rate { total, .. } => *total as f64,
        }
    }

    pub fn sum(&self) -> f64 {
        match self {
            Aggregate::Counter { value } => *value,
            Aggregate::Trend { values } => values.iter().sum(),
            Aggregate::Rate { trues, .. } => *trues as f64,
        }
    }

    pub fn rate(&self) -> Option<f64> {
        match self {
            Aggregate::Rate { total: 0, .. } => None,
            Aggregate::Rate { trues, total } => Some(*trues as f64 / *total as f64),
            _ => None,
        }
    }

    pub fn avg(&self) -> Option<f64> {
        match self {
            Aggregate::Trend { values } if !values.is_empty() => {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
            _ => None,
        }
    }

    pub fn min(&self) -> Option<f64> {
        match self {
            Aggregate::Trend { values } => values.first().copied(),
            _ => None,
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self {
            Aggregate::Trend { values } => values.last().copied(),
            _ => None,
        }
    }

    /// Nearest-rank percentile, `p` in `[0, 100]`.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        match self {
            Aggregate::Trend { values } if !values.is_empty() => {
                let rank = (p * values.len() as f64 / 100.).ceil() as usize;
                let idx = rank.clamp(1, values.len()) - 1;
                Some(values[idx])
            }
            _ => None,
        }
    }
}

/// Immutable copy of every series held by a collector at one instant.
#[derive(Debug, Clone, Default)]
pub struct MetricSnapshot {
    series: BTreeMap<MetricKey, Aggregate>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: MetricKey, aggregate: Aggregate) {
        self.series.insert(key, aggregate);
    }

    pub fn get(&self, key: &MetricKey) -> Option<&Aggregate> {
        self.series.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricKey, &Aggregate)> {
        self.series.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Distinct metric names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.series.keys().map(|k| k.name.as_str()).collect();
        names.dedup();
        names
    }

    /// Merges every series matched by `selector`. `None` when nothing matches.
    pub fn select(&self, selector: &MetricSelector) -> Option<Aggregate> {
        let mut merged: Option<Aggregate> = None;
        for (key, aggregate) in self.series.iter().filter(|(k, _)| selector.matches(k)) {
            match &mut merged {
                None => merged = Some(aggregate.clone()),
                Some(acc) => {
                    if !acc.merge(aggregate) {
                        tracing::warn!("Ignoring {key}: its kind differs from other {} series.", selector.name);
                    }
                }
            }
        }
        merged
    }
}

impl FromIterator<(MetricKey, Aggregate)> for MetricSnapshot {
    fn from_iter<I: IntoIterator<Item = (MetricKey, Aggregate)>>(iter: I) -> Self {
        Self {
            series: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str, tags: &[(&str, &str)]) -> MetricKey {
        MetricKey {
            name: name.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let trend = Aggregate::trend((1..=10).rev().map(|v| v as f64 * 100.).collect());

        assert_eq!(trend.percentile(50.), Some(500.));
        assert_eq!(trend.percentile(90.), Some(900.));
        assert_eq!(trend.percentile(95.), Some(1000.));
        assert_eq!(trend.percentile(0.), Some(100.));
        assert_eq!(trend.min(), Some(100.));
        assert_eq!(trend.max(), Some(1000.));
        assert_eq!(trend.avg(), Some(550.));
    }

    #[test]
    fn integer_percentiles_of_a_hundred_values() {
        let trend = Aggregate::trend((1..=100).map(f64::from).collect());
        for p in 1..=100 {
            assert_eq!(trend.percentile(f64::from(p)), Some(f64::from(p)), "p({p})");
        }
    }

    #[test]
    fn empty_trend_has_no_percentiles() {
        let trend = Aggregate::trend(vec![]);
        assert_eq!(trend.percentile(95.), None);
        assert_eq!(trend.avg(), None);
        assert_eq!(trend.count(), 0.);
    }

    #[test]
    fn rate_is_trues_over_total() {
        let rate = Aggregate::Rate {
            trues: 1,
            total: 100,
        };
        assert_eq!(rate.rate(), Some(0.01));
        assert_eq!(Aggregate::Rate { trues: 0, total: 0 }.rate(), None);
    }

    #[test]
    fn selector_parses_tags() {
        let selector = MetricSelector::parse("http_req_duration{endpoint:getMessages}").unwrap();
        assert_eq!(selector.name, "http_req_duration");
        assert_eq!(selector.tags.get("endpoint").unwrap(), "getMessages");
        assert_eq!(selector.to_string(), "http_req_duration{endpoint:getMessages}");

        assert!(MetricSelector::parse("{endpoint:x}").is_err());
        assert!(MetricSelector::parse("name{endpoint}").is_err());
        assert!(MetricSelector::parse("name{endpoint:x").is_err());
    }

    #[test]
    fn select_merges_matching_series() {
        let snapshot: MetricSnapshot = [
            (
                key("http_req_duration", &[("endpoint", "login")]),
                Aggregate::trend(vec![10., 20.]),
            ),
            (
                key("http_req_duration", &[("endpoint", "getMessages")]),
                Aggregate::trend(vec![30.]),
            ),
            (key("iterations", &[]), Aggregate::Counter { value: 3. }),
        ]
        .into_iter()
        .collect();

        let all = snapshot
            .select(&MetricSelector::new("http_req_duration"))
            .unwrap();
        assert_eq!(all.count(), 3.);
        assert_eq!(all.max(), Some(30.));

        let messages = snapshot
            .select(&MetricSelector::new("http_req_duration").with_tag("endpoint", "getMessages"))
            .unwrap();
        assert_eq!(messages.count(), 1.);

        assert!(snapshot.select(&MetricSelector::new("missing")).is_none());
        assert_eq!(snapshot.names(), vec!["http_req_duration", "iterations"]);
    }
}
