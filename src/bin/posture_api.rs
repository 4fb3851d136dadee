//! posture_api - HTTP service for posture analysis
//!
//! This daemon:
//! 1. Loads configuration (POSTURE_CONFIG + environment overrides)
//! 2. Registers detector backends
//! 3. Serves the image and video analysis API until Ctrl-C

use anyhow::Result;
use std::sync::mpsc;

use posture_kernel::{
    analysis::PostureService,
    api::{ApiConfig, ApiServer},
    config::ServiceConfig,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::load()?;
    let registry = config.detector.registry()?;
    log::info!(
        "detector backend '{}' (available: {})",
        config.detector.backend,
        registry.list().join(", ")
    );
    if config.detector.backend == "fixture" && config.detector.fixture_path.is_none() {
        log::warn!("fixture backend without POSTURE_FIXTURE_PATH reports no pose for every image");
    }

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        max_body_bytes: config.max_body_bytes,
        max_connections: config.max_connections,
        ..ApiConfig::default()
    };
    let api_handle = ApiServer::new(api_config, PostureService::new(registry)).spawn()?;
    log::info!("posture api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("posture_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
