use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use rampart::chat::{ChatScenario, ScenarioPreset, UserPool};
use rampart::{resolve_base_url, Environment, LoadProfile, LoadTest, RunSchedule};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit status of a run that breached a threshold.
const THRESHOLD_BREACH_EXIT: i32 = 99;

/// Staged load against the chat API.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Target URL, wins over `--env`.
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// local, dev, staging or prod.
    #[arg(long = "env", env = "ENV")]
    environment: Option<String>,

    /// smoke, load, stress, spike or soak. Replaces the scenario's own stages and thresholds.
    #[arg(long, env = "PROFILE")]
    profile: Option<String>,

    /// chat, quick or stress.
    #[arg(long, env = "SCENARIO", default_value = "chat")]
    scenario: ScenarioPreset,

    /// JSON schedule file, wins over `--profile`.
    #[arg(long)]
    schedule: Option<PathBuf>,

    /// JSON file with the test users.
    #[arg(long)]
    users: Option<PathBuf>,

    /// Write the JSON summary to this file.
    #[arg(long)]
    summary_export: Option<PathBuf>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    prometheus: Option<SocketAddr>,

    /// Seed for room selection.
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn schedule(&self) -> anyhow::Result<RunSchedule> {
        if let Some(path) = &self.schedule {
            info!("Using schedule from {}", path.display());
            return Ok(RunSchedule::from_json_file(path)?);
        }
        if self.profile.is_some() {
            let profile = LoadProfile::lookup(self.profile.as_deref());
            info!("Using the {profile} profile");
            return Ok(profile.schedule()?);
        }
        Ok(self.scenario.schedule()?)
    }

    fn users(&self) -> anyhow::Result<UserPool> {
        match &self.users {
            Some(path) => Ok(UserPool::from_json_file(path)?),
            None => Ok(UserPool::builtin()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rampart=info,load_tests=info")),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install the Prometheus exporter")?;
    }

    let environment = Environment::lookup(cli.environment.as_deref());
    let base_url = resolve_base_url(cli.base_url.as_deref(), environment);
    let schedule = cli.schedule()?;
    let users = cli.users()?;

    let mut options = cli.scenario.options();
    options.seed = cli.seed;
    let scenario = ChatScenario::new(&base_url, users, options).named(cli.scenario.to_string());

    info!("Running {} against {base_url} ({environment})", cli.scenario);

    let test = LoadTest::new(scenario, schedule);
    let stop = test.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, draining workers");
            stop.stop();
        }
    });

    let summary = test.await;
    println!("{summary}");

    if let Some(path) = &cli.summary_export {
        std::fs::write(path, summary.to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }

    if !summary.passed {
        std::process::exit(THRESHOLD_BREACH_EXIT);
    }
    Ok(())
}
