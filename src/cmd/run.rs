use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use yomibot::{Bot, Config};

pub async fn cmd_run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path).context("loading config")?;
    let bot = Bot::from_config(&config)?;

    info!(
        subreddit = %config.stream.subreddit,
        poll_secs = config.stream.poll_interval_secs,
        tick_secs = config.queue.tick_interval_secs,
        "yomibot {} starting",
        yomibot::VERSION
    );

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, finishing current work"),
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C, stopping"),
        }
        let _ = stop.send(true);
    });

    bot.run(shutdown).await?;
    info!("yomibot stopped");
    Ok(())
}
