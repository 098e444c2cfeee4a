use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use clap::Parser;
use log::{debug, info, warn};
use screenshotter::{
    browser_controller::{ChromeLauncher, ChromeOptions},
    config::{time_zone_from_env, ConfigLoader},
    pool::{every_worker_failed, PoolOptions, WorkerPool},
    utils::DEFAULT_CONFIG_FILE,
    worker::WorkerOptions,
};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Periodic full page screenshots of configured URLs", long_about = None)]
struct Args {
    /// Path to the YAML target list
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Maximum time in seconds to wait for a page to become ready
    #[arg(long, default_value_t = 10)]
    ready_timeout: u64,
    /// Maximum time in seconds a single capture may take
    #[arg(long, default_value_t = 120)]
    capture_timeout: u64,
    /// Number of times a failed worker is restarted (0 = never)
    #[arg(short = 'r', long, default_value_t = 0)]
    max_restarts: usize,
    /// Base delay in seconds before restarting a failed worker
    #[arg(long, default_value_t = 5)]
    restart_delay: u64,
    /// Initial browser window width, before it is resized to the page
    #[arg(long, default_value_t = 1920)]
    window_width: u32,
    /// Initial browser window height, before it is resized to the page
    #[arg(long, default_value_t = 1080)]
    window_height: u32,
    /// Launch chrome without its sandbox (implied when IN_DOCKER is set)
    #[arg(long)]
    no_sandbox: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    debug!("Starting with {:#?}", args.clone());

    let time_zone = time_zone_from_env()?;
    let config = ConfigLoader::new(&args.config)
        .load()
        .context(format!("could not load configuration from {:?}", args.config))?;
    info!(
        "{} targets loaded, file names use time zone {}",
        config.len(),
        time_zone
    );

    let worker_options = WorkerOptions::default_builder()
        .time_zone(time_zone)
        .ready_timeout(Duration::from_secs(args.ready_timeout))
        .capture_timeout(Duration::from_secs(args.capture_timeout))
        .build()?;
    let pool_options = PoolOptions::default_builder()
        .worker(worker_options)
        .max_restarts(args.max_restarts)
        .restart_delay(Duration::from_secs(args.restart_delay))
        .build()?;
    let chrome_options = ChromeOptions::default_builder()
        .window_size((args.window_width, args.window_height))
        .no_sandbox(args.no_sandbox)
        .capture_timeout(Duration::from_secs(args.capture_timeout))
        .build()?;

    let should_terminate = CancellationToken::new();
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let token = should_terminate.clone();
    std::thread::spawn(move || {
        for signal in signals.forever() {
            if token.is_cancelled() {
                warn!("received signal {} again, exiting now", signal);
                std::process::exit(128 + signal);
            }
            info!("received signal {}, shutting down", signal);
            token.cancel();
        }
    });

    let pool = WorkerPool::new(pool_options, Arc::new(ChromeLauncher::new(chrome_options)));
    let outcomes = pool.run_all(config, should_terminate.clone()).await;

    if every_worker_failed(&outcomes, should_terminate.is_cancelled()) {
        return Err(anyhow!("every capture worker failed"));
    }

    info!("all capture workers stopped, goodbye");
    Ok(())
}
