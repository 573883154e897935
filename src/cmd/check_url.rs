use std::path::Path;

use anyhow::{Context, Result};

use yomibot::{Config, PipelineSettings};

pub fn cmd_check_url(url: &str, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path).context("loading config")?;
    let settings = PipelineSettings::from(&config);

    match settings.eligible_url(url) {
        Some(parsed) => println!("allowed: {}", parsed.host_str().unwrap_or_default()),
        None => println!("rejected: {url}"),
    }
    Ok(())
}
