mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use mock_service::{MockConfig, StatusCode};
    use rampart::chat::{ChatOptions, Pacing, ScenarioPreset};
    use rampart::{
        LoadTest, NoopReporter, RunSchedule, StageSpec, ThresholdOutcome, HTTP_REQ_DURATION,
        HTTP_REQ_FAILED, ITERATIONS,
    };
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(250);

    fn short_schedule() -> RunSchedule {
        RunSchedule::new(vec![
            StageSpec::new(Duration::from_secs(1), 3),
            StageSpec::new(Duration::from_secs(1), 3),
            StageSpec::new(Duration::from_millis(500), 0),
        ])
        .unwrap()
        .tick(TICK)
        .unwrap()
        .graceful_stop(Duration::from_secs(5))
        .live_evaluation(Duration::ZERO)
    }

    fn paced_options() -> ChatOptions {
        ChatOptions {
            pacing: Pacing {
                iteration_end: Duration::from_millis(100),
                ..Pacing::none()
            },
            ..fast_options()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn short_run_passes() {
        let mock = mock(MockConfig::default()).await;
        let schedule = short_schedule()
            .threshold(HTTP_REQ_FAILED, "rate<0.01")
            .unwrap()
            .threshold(HTTP_REQ_DURATION, "p(95)<1000")
            .unwrap()
            .threshold("checks{check:get messages status 200}", "rate>0.99")
            .unwrap();

        let summary = LoadTest::new(scenario(&mock, paced_options()), schedule)
            .reporter(NoopReporter)
            .await;

        assert!(summary.passed, "{summary}");
        assert!(!summary.aborted);
        assert_eq!(summary.abandoned_requests, 0);
        assert!(summary.peak_active_workers <= 3);
        assert!(summary.spawned_workers >= 3);

        let total = Duration::from_millis(2_500);
        assert!(summary.elapsed + TICK >= total, "{:?}", summary.elapsed);
        assert!(summary.elapsed <= total + TICK, "{:?}", summary.elapsed);

        assert!(summary.metric(ITERATIONS).is_some());
        assert!(mock.requests_to("/join").len() >= 3);
        assert!(mock
            .requests_to("/join")
            .iter()
            .all(|r| r.path.ends_with("/group/1/join")));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn failing_endpoint_breaches_threshold() {
        let mock = mock(MockConfig {
            join_status: StatusCode::INTERNAL_SERVER_ERROR,
            ..MockConfig::default()
        })
        .await;
        let schedule = short_schedule()
            .threshold("http_req_failed{endpoint:joinRoom}", "rate<0.01")
            .unwrap()
            .threshold("http_req_failed{endpoint:login}", "rate<0.01")
            .unwrap();

        let summary = LoadTest::new(scenario(&mock, paced_options()), schedule)
            .reporter(NoopReporter)
            .await;

        assert!(!summary.passed);
        let outcomes: Vec<_> = summary.thresholds.iter().map(|t| t.outcome).collect();
        assert_eq!(outcomes, vec![ThresholdOutcome::Fail, ThresholdOutcome::Pass]);
        assert_eq!(summary.thresholds[0].observed, Some(1.));
        assert!(mock.requests_to("/messages").iter().all(|r| r.path.contains("/77/")));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn stress_metrics_are_recorded() {
        let mock = mock(MockConfig {
            login_status: StatusCode::UNAUTHORIZED,
            ..MockConfig::default()
        })
        .await;
        let options = ChatOptions {
            pacing: Pacing {
                after_failed_login: Duration::from_millis(100),
                ..Pacing::none()
            },
            ..ScenarioPreset::Stress.options()
        };
        let schedule = short_schedule()
            .threshold("error_rate", "rate<0.10")
            .unwrap();

        let summary = LoadTest::new(scenario(&mock, options), schedule)
            .reporter(NoopReporter)
            .await;

        assert!(!summary.passed);
        assert_eq!(summary.thresholds[0].observed, Some(1.));
        assert!(summary.metric("concurrent_users").is_some());
        assert!(summary.metric("request_duration").is_some());
        assert!(mock.requests_to("/rooms/group").is_empty());
    }
}
