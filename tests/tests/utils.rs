use mock_service::{MockConfig, MockHandle};
use rampart::chat::{ChatOptions, ChatScenario, Pacing, UserPool};
use rampart::{MetricCollector, MetricSelector, MetricSnapshot};
use std::sync::{Arc, OnceLock};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        FmtSubscriber::builder()
            .with_env_filter("rampart=debug,mock_service=debug")
            .with_test_writer()
            .init();
    });
}

#[allow(unused)]
pub async fn mock(config: MockConfig) -> MockHandle {
    init();
    mock_service::spawn(config)
        .await
        .expect("mock service failed to bind")
}

/// Full flow, no pauses, reproducible room picks.
#[allow(unused)]
pub fn fast_options() -> ChatOptions {
    ChatOptions {
        pacing: Pacing::none(),
        seed: Some(42),
        ..ChatOptions::default()
    }
}

#[allow(unused)]
pub fn scenario(mock: &MockHandle, options: ChatOptions) -> ChatScenario {
    ChatScenario::new(mock.base_url(), UserPool::builtin(), options)
}

#[allow(unused)]
pub fn collector() -> Arc<MetricCollector> {
    Arc::new(MetricCollector::new())
}

#[allow(unused)]
pub fn rate(snapshot: &MetricSnapshot, selector: &str) -> Option<f64> {
    let selector = MetricSelector::parse(selector).expect("bad selector");
    snapshot.select(&selector).and_then(|agg| agg.rate())
}

#[allow(unused)]
pub fn count(snapshot: &MetricSnapshot, selector: &str) -> f64 {
    let selector = MetricSelector::parse(selector).expect("bad selector");
    snapshot.select(&selector).map_or(0., |agg| agg.count())
}
