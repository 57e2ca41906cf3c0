use anyhow::{Context, Result};
use log::info;

use experiment::configs::{CONFIG_ENV, ExperimentConfig};

fn main() -> Result<()> {
    env_logger::init();

    let config = ExperimentConfig::from_env()
        .with_context(|| format!("loading the configuration named by {CONFIG_ENV}"))?;
    info!("running in {:?} mode", config.mode);

    experiment::run(&config)?;
    Ok(())
}
