use crate::{Aggregate, MetricKind, MetricSnapshot, ThresholdSpec};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdOutcome {
    Pass,
    Fail,
    /// The metric has no value for the aggregation yet. Does not fail the run.
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdResult {
    pub metric: String,
    pub condition: String,
    pub outcome: ThresholdOutcome,
    pub observed: Option<f64>,
}

impl ThresholdResult {
    pub fn new(spec: &ThresholdSpec, outcome: ThresholdOutcome, observed: Option<f64>) -> Self {
        Self {
            metric: spec.selector.to_string(),
            condition: spec.expr.to_string(),
            outcome,
            observed,
        }
    }
}

/// Verdict of every threshold at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThresholdReport {
    pub results: Vec<ThresholdResult>,
}

impl ThresholdReport {
    pub fn passed(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.outcome != ThresholdOutcome::Fail)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == ThresholdOutcome::Fail)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SummaryValues {
    Counter {
        value: f64,
    },
    Rate {
        rate: Option<f64>,
        trues: u64,
        total: u64,
    },
    Trend {
        count: usize,
        avg: Option<f64>,
        min: Option<f64>,
        med: Option<f64>,
        max: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
    },
}

impl From<&Aggregate> for SummaryValues {
    fn from(aggregate: &Aggregate) -> Self {
        match aggregate {
            Aggregate::Counter { value } => SummaryValues::Counter { value: *value },
            Aggregate::Rate { trues, total } => SummaryValues::Rate {
                rate: aggregate.rate(),
                trues: *trues,
                total: *total,
            },
            Aggregate::Trend { values } => SummaryValues::Trend {
                count: values.len(),
                avg: aggregate.avg(),
                min: aggregate.min(),
                med: aggregate.percentile(50.),
                max: aggregate.max(),
                p90: aggregate.percentile(90.),
                p95: aggregate.percentile(95.),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    /// Metric name, with tags for per-series rows.
    pub metric: String,
    pub kind: MetricKind,
    pub values: SummaryValues,
}

/// Summarises a snapshot: one merged row per metric name followed by one row per
/// tagged series.
pub fn summarize_metrics(snapshot: &MetricSnapshot) -> Vec<MetricSummary> {
    let mut rows = vec![];
    for name in snapshot.names() {
        let mut merged: Option<Aggregate> = None;
        let mut tagged = vec![];
        for (key, aggregate) in snapshot.iter().filter(|(k, _)| k.name == name) {
            match merged.as_mut() {
                Some(acc) => {
                    acc.merge(aggregate);
                }
                None => merged = Some(aggregate.clone()),
            }
            if !key.tags.is_empty() {
                tagged.push(MetricSummary {
                    metric: key.to_string(),
                    kind: aggregate.kind(),
                    values: aggregate.into(),
                });
            }
        }

        if let Some(merged) = merged {
            rows.push(MetricSummary {
                metric: name.to_string(),
                kind: merged.kind(),
                values: (&merged).into(),
            });
        }
        rows.extend(tagged);
    }
    rows
}

/// Final result of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub scenario: String,
    pub passed: bool,
    /// Set when the run was stopped before its last stage finished.
    pub aborted: bool,
    /// Length of the ramp, from its first tick to the end of the last stage.
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub thresholds: Vec<ThresholdResult>,
    pub metrics: Vec<MetricSummary>,
    pub peak_active_workers: usize,
    pub spawned_workers: usize,
    pub abandoned_requests: u64,
    pub setup_error: Option<String>,
    /// Text returned by teardown, or its error.
    pub teardown: Option<String>,
}

impl RunSummary {
    pub fn metric(&self, metric: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.metric == metric)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn as_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = Duration::from_millis(self.elapsed.as_millis() as u64);
        writeln!(
            f,
            "scenario {} finished in {}{}: {}",
            self.scenario,
            humantime::format_duration(elapsed),
            if self.aborted { " (aborted)" } else { "" },
            if self.passed { "PASSED" } else { "FAILED" }
        )?;
        writeln!(
            f,
            "  workers: peak {}, spawned {}, abandoned requests {}",
            self.peak_active_workers, self.spawned_workers, self.abandoned_requests
        )?;

        if !self.thresholds.is_empty() {
            writeln!(f, "thresholds:")?;
            for t in &self.thresholds {
                let mark = match t.outcome {
                    ThresholdOutcome::Pass => "ok  ",
                    ThresholdOutcome::Fail => "FAIL",
                    ThresholdOutcome::NoData => "n/a ",
                };
                match t.observed {
                    Some(v) => writeln!(f, "  {mark} {} {} (observed {v:.4})", t.metric, t.condition)?,
                    None => writeln!(f, "  {mark} {} {}", t.metric, t.condition)?,
                }
            }
        }

        if !self.metrics.is_empty() {
            writeln!(f, "metrics:")?;
            for m in &self.metrics {
                writeln!(f, "  {:.<48} {}", format!("{} ", m.metric), m.values)?;
            }
        }

        if let Some(err) = &self.setup_error {
            writeln!(f, "setup failed: {err}")?;
        }
        if let Some(teardown) = &self.teardown {
            writeln!(f, "{teardown}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SummaryValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: &Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
        match self {
            SummaryValues::Counter { value } => write!(f, "{value}"),
            SummaryValues::Rate { rate, trues, total } => {
                let pct = rate.map_or_else(|| "-".to_string(), |r| format!("{:.2}%", r * 100.));
                write!(f, "{pct} ({trues} of {total})")
            }
            SummaryValues::Trend {
                count,
                avg,
                min,
                med,
                max,
                p90,
                p95,
            } => write!(
                f,
                "avg={} min={} med={} max={} p(90)={} p(95)={} count={count}",
                opt(avg),
                opt(min),
                opt(med),
                opt(max),
                opt(p90),
                opt(p95)
            ),
        }
    }
}
