// SPDX-License-Identifier: CC-BY-NC-ND-4.0

mod config;
mod link;
mod meter;
mod restart;

use anyhow::{Context, Result};
use config::AppConfig;
use link::ProbeLink;
use meter::SimulatedMeter;
use powernode_core::supervisor::halt;
use powernode_core::{CURRENT_VERSION, Capabilities, SlotImageStore, Supervisor};
use restart::ProcessRestart;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" => {
                println!("PowerNode - metering node");
                println!("Version: {CURRENT_VERSION}");
                println!();
                println!("Usage: powernode [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help    Print this help message");
                println!("  -v, --version Print version");
                println!();
                println!(
                    "Configuration is read from ${} or ./{}",
                    config::CONFIG_ENV,
                    config::DEFAULT_CONFIG_PATH
                );
                return Ok(());
            }
            "--version" | "-v" => {
                println!("{CURRENT_VERSION}");
                return Ok(());
            }
            _ => {}
        }
    }

    // Respects RUST_LOG
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,powernode_core=debug")
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let config = AppConfig::load()?;

    info!("Starting PowerNode {CURRENT_VERSION}");
    info!("   Ingest: {}", config.node.endpoints.ingest_url);
    info!("   Version: {}", config.node.endpoints.version_url);
    info!("   Image: {}", config.node.endpoints.image_url);
    info!(
        "   Sampling every {} ms, queue {} slots",
        config.node.pipeline.sample_interval_ms, config.node.pipeline.queue_capacity
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: AppConfig) -> Result<()> {
    let store = SlotImageStore::open(&config.node.storage.image_dir).with_context(|| {
        format!(
            "Failed to open image store at {}",
            config.node.storage.image_dir.display()
        )
    })?;
    info!("   Boot slot: {}", store.active_slot()?.as_str());

    let capabilities = Capabilities {
        sensor: SimulatedMeter::new(&config.meter),
        link: Arc::new(ProbeLink::for_url(&config.node.endpoints.ingest_url)?),
        store: Box::new(store),
        restart: Arc::new(ProcessRestart),
    };

    match Supervisor::new(config.node).launch(capabilities).await {
        Ok(node) => {
            info!(
                boot_check = ?node.boot_check,
                sampler = node.sampler.name(),
                network = node.network.name(),
                "Node running"
            );
            // keep this runtime alive for connections opened during boot
            std::future::pending::<()>().await;
        }
        Err(e) => halt(&e).await,
    }

    Ok(())
}
