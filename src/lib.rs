//! # Luminar Backup
//!
//! Local backup, restore and automatic snapshot scheduling for the Luminar productivity app.
//!
//! ## Overview
//!
//! The app keeps its state (tasks, goals, projects, journal, theme, daily quote, onboarding
//! flag, user name) as opaque strings in a key-value store. [`BackupCoordinator`] bundles all
//! of those records into one JSON snapshot on the device, keeps that snapshot fresh, and
//! writes the records back from a snapshot on request.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use luminar_backup::{BackupConfig, BackupCoordinator, LifecycleHub, MemoryKeyValueStore, TokioTimerService};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryKeyValueStore::new());
//! let coordinator = BackupCoordinator::builder(BackupConfig::from_env()?, store).build()?;
//!
//! // Automatic backups: catch-up export, every interval, and on backgrounding
//! let lifecycle = LifecycleHub::new();
//! let _schedule = coordinator
//!     .schedule_automatic_backups(&TokioTimerService, &lifecycle)
//!     .await;
//!
//! // From the settings screen
//! let result = coordinator.backup_now().await;
//! println!("{}", result.message);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`backup`]: snapshot document, coordinator, scheduling and file access
//! - [`store`]: key-value store trait and implementations
//! - [`lifecycle`]: foreground/background notifications
//! - [`timer`]: repeating timers
//! - [`clock`]: wall-clock abstraction
//! - [`config`]: configuration and environment loading

#![warn(rustdoc::missing_crate_level_docs)]

/// Snapshot export, restore and scheduling
pub mod backup;

/// Wall-clock abstraction
pub mod clock;

/// Backup configuration
pub mod config;

/// Application lifecycle events
pub mod lifecycle;

/// Key-value persistence
pub mod store;

/// Repeating timers
pub mod timer;

pub use backup::{
    BackupCoordinator, BackupDocument, BackupError, ExportOutcome, ImportOutcome, OperationResult,
    TrackedKey,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackgroundPolicy, BackupConfig, ConfigError, Pacing, Platform};
pub use lifecycle::{AppState, LifecycleHub, LifecycleObserver, LifecycleSource};
pub use store::{JsonFileKeyValueStore, KeyValueStore, MemoryKeyValueStore, StoreError};
pub use timer::{TimerHandle, TimerService, TokioTimerService};
