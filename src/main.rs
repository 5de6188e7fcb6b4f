use std::sync::Arc;

use tracing::{info, warn};

use cubicled::config::Settings;
use cubicled::engine::Engine;
use cubicled::model::Principal;
use cubicled::notify::NotifyHub;
use cubicled::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env()?;
    cubicled::observability::init(settings.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&settings.data_dir)?;

    let wal_path = settings.wal_path();
    let layout = settings.layout.clone();
    let sweep_interval = settings.sweep_interval;
    let compact_threshold = settings.compact_threshold;

    let engine = Arc::new(Engine::new(wal_path.clone(), settings.clone(), Arc::new(NotifyHub::new()))?);
    info!("cubicled started");
    info!("  wal: {}", wal_path.display());
    info!("  site offset: {}", settings.site_offset);
    info!("  resources: {}", engine.list_resources().len());
    info!("  privileged emails: {}", settings.privileged_emails.len());

    if let Some(layout) = layout {
        let system = Principal::new("system", "system@cubicled.local").privileged();
        let created = engine.seed_layout(&layout, &system).await?;
        info!(created, sections = layout.sections.len(), "seeded floor layout");
    }

    let reaper = tokio::spawn(reaper::run_reaper(engine.clone(), sweep_interval));
    let compactor = tokio::spawn(reaper::run_compactor(engine.clone(), compact_threshold, sweep_interval));

    // Run until SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received");

    reaper.abort();
    compactor.abort();

    let pending = engine.wal_appends_since_compact().await;
    if pending > 0 {
        match engine.compact_wal().await {
            Ok(()) => info!(pending, "final compaction done"),
            Err(e) => warn!("final compaction failed: {e}"),
        }
    }

    info!("cubicled stopped");
    Ok(())
}
