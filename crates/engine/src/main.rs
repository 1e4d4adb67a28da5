use std::path::PathBuf;

use anyhow::{Context, bail};

use tallyup_engine::{EngineConfig, GroupService, Scenario};

const USAGE: &str = "usage: tallyup <scenario.json> [--config <config.json>]";

fn main() -> anyhow::Result<()> {
    let (scenario_path, config_path) = parse_args(std::env::args().skip(1))?;

    let config = match &config_path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::from_env().context("reading TALLYUP_* environment")?,
    };
    tallyup_observability::tracing::init(config.log_format);

    let raw = std::fs::read_to_string(&scenario_path)
        .with_context(|| format!("reading scenario {}", scenario_path.display()))?;
    let scenario = Scenario::from_json(&raw)
        .with_context(|| format!("parsing scenario {}", scenario_path.display()))?;

    let service = GroupService::new(&config)?;
    let report = scenario.run(&service).context("replaying scenario")?;
    tracing::info!(
        members = report.balances.len(),
        transfers = report.transfers.len(),
        "scenario settled"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_args(
    mut args: impl Iterator<Item = String>,
) -> anyhow::Result<(PathBuf, Option<PathBuf>)> {
    let mut scenario = None;
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            _ if scenario.is_none() => scenario = Some(PathBuf::from(arg)),
            _ => bail!("unexpected argument '{arg}'\n{USAGE}"),
        }
    }
    let scenario = scenario.with_context(|| USAGE.to_string())?;
    Ok((scenario, config))
}
