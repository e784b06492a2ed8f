//! Supervisor process entry point: wires the store, scanner, watcher,
//! exclusion evaluator, and encoder worker together.

pub mod config;
pub mod interfaces;

use clap::Parser;
use config::Config;
use reencode_core::bus::EventBus;
use reencode_core::classifier::Classifier;
use reencode_core::encoder::hardware::detect_hevc_nvenc;
use reencode_core::encoder::plan::PlanConfig;
use reencode_core::encoder::{Encoder, EncoderConfig};
use reencode_core::exclusion::ExclusionEvaluator;
use reencode_core::probe::Prober;
use reencode_core::scanner::Scanner;
use reencode_core::store::Store;
use reencode_core::watcher::Watcher;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "reencode-server")]
#[command(about = "Discovers, classifies, and hardware-transcodes a video library")]
struct Args {
    #[arg(long, env = "SERVER_PORT")]
    port: Option<u16>,

    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(path) = args.database_path {
        config.database_path = path;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reencode_server=info,reencode_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(database_path = %config.database_path.display(), "starting supervisor");

    let store = Arc::new(Store::open(&config.database_path).await?);

    let recovered = store.reset_encoding().await?;
    if recovered > 0 {
        warn!(count = recovered, "recovered files stuck in encoding from a previous run");
    }

    detect_hevc_nvenc(&config.transcoder_binary).await;

    let prober = Arc::new(Prober::new(config.probe_binary.clone()));
    let exclusion = Arc::new(ExclusionEvaluator::new(store.clone()));
    let classifier = Arc::new(Classifier::new(store.clone(), prober, exclusion));
    let bus = Arc::new(EventBus::new());

    let scanner = Arc::new(Scanner::new(store.clone(), classifier.clone(), bus.clone()));
    let watcher = Arc::new(Watcher::new(classifier.clone()));

    for library in store.list_libraries().await? {
        if library.enabled && library.watch_enabled {
            if let Err(e) = watcher.start(library.id, &library.path).await {
                warn!(library_id = library.id, error = %e, "failed to start watcher");
            }
        }
    }

    let encoder = Arc::new(Encoder::new(
        store.clone(),
        bus.clone(),
        EncoderConfig {
            transcoder_binary: config.transcoder_binary.clone(),
            probe_binary: config.probe_binary.clone(),
            scratch_dir: config.scratch_dir.clone(),
            plan: PlanConfig::default(),
            target_mode: None,
        },
    ));

    let encoder_handle = tokio::spawn(encoder.clone().run());

    if let Some(interval) = config.scan_interval {
        let scanner = scanner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = scanner.scan_all().await {
                    warn!(error = %e, "scheduled scan failed");
                }
            }
        });
    }

    info!(port = config.server_port, "supervisor ready");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    encoder.stop_worker();
    let _ = encoder_handle.await;

    Ok(())
}
