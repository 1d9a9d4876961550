use anyhow::{Context, Result};
use community_solar::config::{Config, DEFAULT_CONFIG_PATH};
use community_solar::domain::DataProvider;
use community_solar::optimizer::GoodLpSolver;
use community_solar::scenario::{ScenarioReport, ScenarioRunner, SweepPoint};
use community_solar::telemetry::init_tracing;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Serialize)]
struct RunOutput {
    scenarios: Vec<ScenarioReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sweep: Option<Vec<SweepPoint>>,
}

fn main() -> Result<()> {
    init_tracing();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = Config::load(&path)
        .with_context(|| format!("loading configuration from {}", path))?;
    let community = cfg.community().context("building community snapshot")?;

    let runner = ScenarioRunner::new(community, GoodLpSolver::new());
    let scenarios = runner
        .run_all(&cfg.scenarios)
        .context("running configured scenarios")?;
    let failed = scenarios.iter().filter(|report| !report.is_success()).count();
    if failed > 0 {
        warn!(failed, total = scenarios.len(), "some scenarios failed");
    }

    let sweep = cfg
        .sweep
        .as_ref()
        .map(|sweep| sweep.run(&runner))
        .transpose()
        .context("running sensitivity sweep")?;

    let output = RunOutput { scenarios, sweep };
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("serialising run output")?
    );
    info!("run complete");
    Ok(())
}
