//! algorun-watch
//!
//! Watches a single algod node and prints one line per state change.
//!
//! Usage: `algorun-watch [--config PATH] [--json]`

use algorun_watch::logging::{default_log_dir, init_logger, parse_level};
use algorun_watch::node::{
    AggregateState, AlgodClient, GitHubReleaseFeed, StateWatcher, WatchConfig,
};
use algorun_watch::WatchError;
use anyhow::{anyhow, bail, Context};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

struct Args {
    config: Option<PathBuf>,
    json: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        json: false,
    };
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--json" => args.json = true,
            "-h" | "--help" => {
                println!("usage: algorun-watch [--config PATH] [--json]");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn summary(state: &AggregateState) -> String {
    let status = &state.status;
    let metrics = &state.metrics;
    format!(
        "{} round={} version={} update={} round_time={:.2}s tps={:.1} rx={}B/s tx={}B/s keys={}",
        status.state,
        status.last_round,
        status.version.as_deref().unwrap_or("-"),
        status.needs_update,
        metrics.round_time.as_secs_f64(),
        metrics.tps,
        metrics.rx,
        metrics.tx,
        state.participation_keys.len(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => WatchConfig::load_from(path),
        None => WatchConfig::load(),
    };

    init_logger(&default_log_dir(), parse_level(config.log_level.as_deref()))
        .map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    let client = AlgodClient::from_config(&config).context("invalid node endpoint")?;
    log::info!("Watching node at {}", client.endpoint());
    let releases = GitHubReleaseFeed::new(config.release_feed_url.clone())
        .context("failed to build release feed client")?;

    let watcher = StateWatcher::new(Arc::new(client), Arc::new(releases), config.settings());

    let json = args.json;
    let (handle, task) = watcher.spawn(move |update: Result<&AggregateState, &WatchError>| {
        match update {
            Ok(state) if json => match serde_json::to_string(state) {
                Ok(line) => println!("{}", line),
                Err(e) => log::error!("Failed to serialize state: {}", e),
            },
            Ok(state) => println!("{}", summary(state)),
            Err(e) => log::warn!("Node error: {}", e),
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    log::info!("Stopping watcher");
    handle.stop();

    // The loop may be parked in a long poll; don't wait on it forever
    match tokio::time::timeout(std::time::Duration::from_secs(5), task).await {
        Ok(Ok(_)) => log::info!("Watcher stopped"),
        Ok(Err(e)) => log::error!("Watcher task failed: {}", e),
        Err(_) => log::warn!("Watcher did not stop in time, exiting"),
    }

    Ok(())
}
