use rampart_core::{
    Aggregation, MetricSelector, MetricSnapshot, ThresholdOutcome, ThresholdReport, ThresholdResult, ThresholdSpec,
};

/// Evaluates thresholds against metric snapshots.
///
/// Evaluation only reads the snapshot, so it can run as often as needed while
/// the run is in progress; the evaluation on the final snapshot decides the run.
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    specs: Vec<ThresholdSpec>,
}

impl ThresholdEvaluator {
    pub fn new(specs: &[ThresholdSpec]) -> Self {
        Self {
            specs: specs.to_vec(),
        }
    }

    /// Every metric selector the thresholds read.
    pub fn selectors(&self) -> Vec<MetricSelector> {
        self.specs.iter().map(|spec| spec.selector.clone()).collect()
    }

    pub fn evaluate(&self, snapshot: &MetricSnapshot) -> ThresholdReport {
        ThresholdReport {
            results: self.specs.iter().map(|spec| evaluate_one(spec, snapshot)).collect(),
        }
    }
}

fn evaluate_one(spec: &ThresholdSpec, snapshot: &MetricSnapshot) -> ThresholdResult {
    let observed = match snapshot.select(&spec.selector) {
        Some(aggregate) => spec.expr.aggregation.apply(&aggregate),
        // Only count and sum have a value without samples.
        None => match spec.expr.aggregation {
            Aggregation::Count | Aggregation::Sum => Some(0.),
            _ => None,
        },
    };

    let outcome = match observed {
        None => ThresholdOutcome::NoData,
        Some(value) if spec.expr.comparison.holds(value, spec.expr.bound) => ThresholdOutcome::Pass,
        Some(_) => ThresholdOutcome::Fail,
    };
    ThresholdResult::new(spec, outcome, observed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::{Aggregate, MetricKey};

    fn spec(metric: &str, expr: &str) -> ThresholdSpec {
        ThresholdSpec::parse(metric, expr).unwrap()
    }

    fn snapshot() -> MetricSnapshot {
        let mut messages = MetricKey::new("http_req_duration");
        messages.tags.insert("endpoint".into(), "getMessages".into());
        let mut login = MetricKey::new("http_req_duration");
        login.tags.insert("endpoint".into(), "login".into());

        let mut failed = vec![true];
        failed.extend([false; 99]);
        [
            (
                messages,
                Aggregate::trend((1..=10).map(|v| v as f64 * 100.).collect()),
            ),
            (login, Aggregate::trend(vec![50.])),
            (
                MetricKey::new("http_req_failed"),
                Aggregate::Rate {
                    trues: failed.iter().filter(|f| **f).count() as u64,
                    total: failed.len() as u64,
                },
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn rate_at_the_bound_fails_a_strict_comparison() {
        let evaluator = ThresholdEvaluator::new(&[
            spec("http_req_failed", "rate<0.01"),
            spec("http_req_failed", "rate<=0.01"),
        ]);
        let report = evaluator.evaluate(&snapshot());

        assert_eq!(report.results[0].outcome, ThresholdOutcome::Fail);
        assert_eq!(report.results[0].observed, Some(0.01));
        assert_eq!(report.results[1].outcome, ThresholdOutcome::Pass);
        assert!(!report.passed());
    }

    #[test]
    fn tagged_selector_only_sees_its_series() {
        let evaluator = ThresholdEvaluator::new(&[
            spec("http_req_duration{endpoint:getMessages}", "p(95)<800"),
            spec("http_req_duration{endpoint:login}", "p(95)<800"),
            spec("http_req_duration", "max<=1000"),
        ]);
        let report = evaluator.evaluate(&snapshot());

        assert_eq!(report.results[0].outcome, ThresholdOutcome::Fail);
        assert_eq!(report.results[0].observed, Some(1000.));
        assert_eq!(report.results[1].outcome, ThresholdOutcome::Pass);
        assert_eq!(report.results[2].outcome, ThresholdOutcome::Pass);
    }

    #[test]
    fn missing_metric_has_no_data_except_for_counts() {
        let evaluator = ThresholdEvaluator::new(&[
            spec("error_rate", "rate<0.1"),
            spec("messages_received", "count>0"),
            spec("abandoned_requests", "sum==0"),
        ]);
        let report = evaluator.evaluate(&MetricSnapshot::new());

        assert_eq!(report.results[0].outcome, ThresholdOutcome::NoData);
        assert_eq!(report.results[0].observed, None);
        assert_eq!(report.results[1].outcome, ThresholdOutcome::Fail);
        assert_eq!(report.results[2].outcome, ThresholdOutcome::Pass);
        assert!(!report.passed());
    }

    #[test]
    fn evaluation_is_repeatable() {
        let evaluator = ThresholdEvaluator::new(&[spec("http_req_duration", "p(90)<2000")]);
        let snapshot = snapshot();
        assert_eq!(evaluator.evaluate(&snapshot), evaluator.evaluate(&snapshot));
    }

    #[test]
    fn selected_series_are_enough_to_evaluate() {
        use crate::collector::MetricCollector;
        use rampart_core::MetricSample;

        let collector = MetricCollector::new();
        for v in [120., 80., 900.] {
            collector.record(MetricSample::trend("http_req_duration", v).with_tag("endpoint", "getMessages"));
        }
        collector.record(MetricSample::trend("message_latency", 5.));
        collector.record(MetricSample::rate("http_req_failed", true));

        let evaluator = ThresholdEvaluator::new(&[
            spec("http_req_duration{endpoint:getMessages}", "p(95)<800"),
            spec("http_req_failed", "rate<0.01"),
            spec("messages_received", "count>0"),
        ]);
        let partial = collector.snapshot_matching(&evaluator.selectors());

        assert!(partial.get(&MetricKey::new("message_latency")).is_none());
        assert_eq!(evaluator.evaluate(&partial), evaluator.evaluate(&collector.snapshot()));
    }
}
