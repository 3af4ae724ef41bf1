//! Walks through a full backup cycle against a JSON file store:
//! automatic scheduling, a manual backup, local edits, then a restore.
//!
//! Run with `RUST_LOG=luminar_backup=debug cargo run --example backup_cycle`.

use anyhow::Result;
use luminar_backup::backup::AutoConsent;
use luminar_backup::{
    AppState, BackupConfig, BackupCoordinator, JsonFileKeyValueStore, KeyValueStore, LifecycleHub,
    TokioTimerService,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let workspace = std::env::temp_dir().join("luminar-backup-demo");
    let mut config = BackupConfig::from_env()?;
    if std::env::var_os("LUMINAR_BACKUP_DIR").is_none() {
        config.backup_dir = workspace.join("Backups");
    }

    println!("Luminar backup demo\n");
    println!("Snapshot path: {}", config.snapshot_path().display());

    let store = Arc::new(JsonFileKeyValueStore::open(workspace.join("app-state.json")).await?);
    store
        .set("@luminar_tasks", r#"[{"id":"t1","title":"Plan the week"}]"#)
        .await?;
    store.set("@luminar_quote", "Small steps every day").await?;
    store.set("@user_name", "Ada").await?;

    let coordinator = BackupCoordinator::builder(config, store.clone())
        .consent_prompt(Arc::new(AutoConsent(true)))
        .build()?;

    // Automatic backups
    let lifecycle = LifecycleHub::new();
    let mut schedule = coordinator
        .schedule_automatic_backups(&TokioTimerService, &lifecycle)
        .await;
    if let Some(run) = schedule.take_immediate_run() {
        println!("Catch-up backup: {:?}", run.await?.map(|o| o.is_completed()));
    }

    // Manual backup with progress
    let mut progress = coordinator.subscribe_progress();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            if let Some(p) = progress.borrow_and_update().clone() {
                println!("  [{:>3}%] {}", p.percent_complete, p.message);
            }
        }
    });
    let result = coordinator.backup_now().await;
    println!("Manual backup: {}", result.message);

    // Local edits, then restore
    store.set("@user_name", "Someone else").await?;
    store.remove("@luminar_quote").await?;
    println!("\nBefore restore: user = {:?}", store.get("@user_name").await?);

    let result = coordinator.restore_from_backup().await;
    println!("Restore: {}", result.message);
    println!("After restore: user = {:?}", store.get("@user_name").await?);
    println!("After restore: quote = {:?}", store.get("@luminar_quote").await?);

    // Going to the background triggers a silent backup
    lifecycle.transition(AppState::Background);
    if let Some(run) = schedule.observer().take_last_run() {
        run.await?;
    }

    let status = coordinator.status();
    println!(
        "\nLast backup: {:?}, size: {} bytes",
        status.last_backup_at, status.backup_size
    );

    drop(schedule);
    drop(coordinator);
    watcher.abort();
    Ok(())
}
