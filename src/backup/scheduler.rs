// Automatic backups - startup catch-up, repeating timer and backgrounding trigger

use super::coordinator::BackupCoordinator;
use super::types::ExportOutcome;
use crate::lifecycle::{AppState, LifecycleObserver, LifecycleSource, Subscription};
use crate::timer::{TimerHandle, TimerService};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Whether a backup is due given the last successful one.
///
/// Never backed up counts as due. A last backup in the future (clock moved back) does not.
pub fn is_backup_due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    let Some(last) = last else {
        return true;
    };
    let elapsed_ms = (now - last).num_milliseconds();
    let interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
    elapsed_ms >= interval_ms
}

impl BackupCoordinator {
    /// Run a silent export, logging and swallowing any failure
    pub async fn run_silent_export(&self) -> Option<ExportOutcome> {
        match self.export_snapshot(false).await {
            Ok(outcome) => {
                match &outcome {
                    ExportOutcome::Completed(report) => {
                        info!(size_bytes = report.size_bytes, "Automatic backup completed")
                    }
                    ExportOutcome::Skipped(reason) => debug!(?reason, "Automatic backup skipped"),
                    ExportOutcome::ConsentDeclined => {}
                }
                Some(outcome)
            }
            Err(e) => {
                error!(error = %e, "Automatic backup failed");
                None
            }
        }
    }

    /// Start a silent export without waiting for it
    pub fn spawn_silent_export(self: &Arc<Self>) -> JoinHandle<Option<ExportOutcome>> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run_silent_export().await })
    }

    /// Wire up automatic backups. Call once at startup.
    ///
    /// Exports immediately if the last backup is missing or at least one interval old,
    /// then every interval, and whenever the app leaves the foreground. All triggers go
    /// through the same exclusive export, so overlapping triggers are harmless.
    pub async fn schedule_automatic_backups(
        self: &Arc<Self>,
        timer: &dyn TimerService,
        lifecycle: &dyn LifecycleSource,
    ) -> ScheduleHandle {
        let interval = self.config().interval;
        let last = self.refresh_last_backup().await;
        let now = self.now();

        let immediate = if is_backup_due(last, now, interval) {
            match last {
                Some(last) => info!(%last, "Last backup is older than the interval, backing up now"),
                None => info!("No previous backup found, backing up now"),
            }
            Some(self.spawn_silent_export())
        } else {
            if let Some(last) = last {
                let remaining = chrono::Duration::from_std(interval)
                    .map(|i| i - (now - last))
                    .unwrap_or_else(|_| chrono::Duration::zero());
                info!(hours_until_next = remaining.num_hours(), "Next backup scheduled");
            }
            None
        };

        let coordinator = Arc::clone(self);
        let timer_handle = timer.every(
            interval,
            Arc::new(move || {
                let coordinator = Arc::clone(&coordinator);
                async move {
                    debug!("Scheduled backup triggered");
                    coordinator.run_silent_export().await;
                }
                .boxed()
            }),
        );

        let observer = Arc::new(BackgroundBackupObserver::new(Arc::clone(self)));
        let subscription = lifecycle.subscribe(observer.clone());

        ScheduleHandle {
            immediate,
            observer,
            _timer: timer_handle,
            _subscription: subscription,
        }
    }
}

/// Keeps automatic backups running; dropping it stops the timer and the lifecycle hook
pub struct ScheduleHandle {
    immediate: Option<JoinHandle<Option<ExportOutcome>>>,
    observer: Arc<BackgroundBackupObserver>,
    _timer: TimerHandle,
    _subscription: Subscription,
}

impl ScheduleHandle {
    /// The startup export, if one was due
    pub fn take_immediate_run(&mut self) -> Option<JoinHandle<Option<ExportOutcome>>> {
        self.immediate.take()
    }

    pub fn observer(&self) -> &Arc<BackgroundBackupObserver> {
        &self.observer
    }
}

/// Starts a silent export whenever the app leaves the foreground
pub struct BackgroundBackupObserver {
    coordinator: Arc<BackupCoordinator>,
    runtime: Option<Handle>,
    last_run: Mutex<Option<JoinHandle<Option<ExportOutcome>>>>,
}

impl BackgroundBackupObserver {
    /// Capture the current Tokio runtime so callbacks from platform threads can spawn onto it
    pub fn new(coordinator: Arc<BackupCoordinator>) -> Self {
        Self {
            coordinator,
            runtime: Handle::try_current().ok(),
            last_run: Mutex::new(None),
        }
    }

    /// The export started by the most recent backgrounding, if not yet taken
    pub fn take_last_run(&self) -> Option<JoinHandle<Option<ExportOutcome>>> {
        self.last_run.lock().take()
    }
}

impl LifecycleObserver for BackgroundBackupObserver {
    fn on_background(&self, state: AppState) {
        let Some(runtime) = &self.runtime else {
            warn!(?state, "No async runtime available, skipping backgrounding backup");
            return;
        };
        info!(?state, "App going to background, triggering backup");
        let coordinator = Arc::clone(&self.coordinator);
        let run = runtime.spawn(async move { coordinator.run_silent_export().await });
        *self.last_run.lock() = Some(run);
    }
}
