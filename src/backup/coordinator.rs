// Backup Coordinator - snapshot export, restore and consent orchestration

use super::consent::{AutoConsent, ConsentPrompt, ConsentRequest};
use super::storage::{DocumentPicker, FileStore, LocalFileStore, NoDocumentPicker, SNAPSHOT_MIME_TYPE};
use super::types::{
    BackupDocument, BackupError, BackupProgress, BackupStatus, CloudPermission, ExportOutcome,
    ExportReport, FormatVersion, ImportOutcome, ImportReport, OperationResult, ProgressStage,
    SkipReason, SnapshotSource, TrackedKey, LAST_BACKUP_KEY,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{BackgroundPolicy, BackupConfig, ConfigError};
use crate::store::KeyValueStore;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

const IDLE: u8 = 0;
const EXPORTING: u8 = 1;
const IMPORTING: u8 = 2;

/// Exclusion token shared by exports and imports; released on drop
struct RunGuard<'a> {
    state: &'a AtomicU8,
}

impl<'a> RunGuard<'a> {
    fn acquire(state: &'a AtomicU8, kind: u8) -> Option<Self> {
        state
            .compare_exchange(IDLE, kind, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { state })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.store(IDLE, Ordering::Release);
    }
}

#[derive(Debug)]
struct CoordinatorState {
    last_backup_at: Option<DateTime<Utc>>,
    cloud_permission: CloudPermission,
    last_error: Option<String>,
    backup_size: u64,
}

/// Owns snapshot export, restore and the user's backup consent.
///
/// At most one export or import runs at a time: both take the same exclusion token, so a
/// restore can never read the snapshot while an export is replacing it.
pub struct BackupCoordinator {
    config: BackupConfig,
    store: Arc<dyn KeyValueStore>,
    files: Arc<dyn FileStore>,
    picker: Arc<dyn DocumentPicker>,
    consent: Arc<dyn ConsentPrompt>,
    clock: Arc<dyn Clock>,
    run_state: AtomicU8,
    state: RwLock<CoordinatorState>,
    progress: watch::Sender<Option<BackupProgress>>,
}

/// Wires a [`BackupCoordinator`] to its collaborators
pub struct BackupCoordinatorBuilder {
    config: BackupConfig,
    store: Arc<dyn KeyValueStore>,
    files: Arc<dyn FileStore>,
    picker: Arc<dyn DocumentPicker>,
    consent: Arc<dyn ConsentPrompt>,
    clock: Arc<dyn Clock>,
}

impl BackupCoordinatorBuilder {
    pub fn file_store(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = files;
        self
    }

    pub fn document_picker(mut self, picker: Arc<dyn DocumentPicker>) -> Self {
        self.picker = picker;
        self
    }

    pub fn consent_prompt(mut self, consent: Arc<dyn ConsentPrompt>) -> Self {
        self.consent = consent;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<Arc<BackupCoordinator>, ConfigError> {
        self.config.validate()?;
        let provider = self.config.platform.cloud_provider();
        let (progress, _) = watch::channel(None);

        Ok(Arc::new(BackupCoordinator {
            config: self.config,
            store: self.store,
            files: self.files,
            picker: self.picker,
            consent: self.consent,
            clock: self.clock,
            run_state: AtomicU8::new(IDLE),
            state: RwLock::new(CoordinatorState {
                last_backup_at: None,
                cloud_permission: CloudPermission::undecided(provider),
                last_error: None,
                backup_size: 0,
            }),
            progress,
        }))
    }
}

impl BackupCoordinator {
    /// Start building a coordinator.
    ///
    /// Defaults: local filesystem, no document picker, consent always declined, system clock.
    pub fn builder(config: BackupConfig, store: Arc<dyn KeyValueStore>) -> BackupCoordinatorBuilder {
        BackupCoordinatorBuilder {
            config,
            store,
            files: Arc::new(LocalFileStore::new()),
            picker: Arc::new(NoDocumentPicker),
            consent: Arc::new(AutoConsent(false)),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_exporting(&self) -> bool {
        self.run_state.load(Ordering::Acquire) == EXPORTING
    }

    pub fn is_importing(&self) -> bool {
        self.run_state.load(Ordering::Acquire) == IMPORTING
    }

    fn is_busy(&self) -> bool {
        self.run_state.load(Ordering::Acquire) != IDLE
    }

    pub fn cloud_permission(&self) -> CloudPermission {
        self.state.read().cloud_permission
    }

    /// Ask for consent again before the next manual backup
    pub fn reset_consent(&self) {
        let provider = self.config.platform.cloud_provider();
        self.state.write().cloud_permission = CloudPermission::undecided(provider);
    }

    pub fn last_backup_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_backup_at
    }

    pub fn status(&self) -> BackupStatus {
        let state = self.state.read();
        BackupStatus {
            last_backup_at: state.last_backup_at,
            is_exporting: self.is_exporting(),
            is_importing: self.is_importing(),
            progress: self.progress.borrow().clone(),
            cloud_permission: state.cloud_permission,
            last_error: state.last_error.clone(),
            backup_size: state.backup_size,
        }
    }

    /// Progress of interactive exports; `None` between runs
    pub fn subscribe_progress(&self) -> watch::Receiver<Option<BackupProgress>> {
        self.progress.subscribe()
    }

    /// Reload the last-backup time from the store.
    ///
    /// Unreadable or malformed values count as "never backed up".
    pub async fn refresh_last_backup(&self) -> Option<DateTime<Utc>> {
        let loaded = match self.store.get(LAST_BACKUP_KEY).await {
            Ok(Some(raw)) => {
                let parsed = parse_backup_time(&raw);
                if parsed.is_none() {
                    warn!(value = %raw, "Ignoring malformed last backup time");
                }
                parsed
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to load last backup time");
                None
            }
        };
        self.state.write().last_backup_at = loaded;
        loaded
    }

    /// Total bytes of tracked values currently in the store
    pub async fn estimate_data_size(&self) -> u64 {
        let mut total = 0u64;
        for key in TrackedKey::ALL {
            match self.store.get(key.as_str()).await {
                Ok(Some(value)) => total += value.len() as u64,
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to size record"),
            }
        }
        total
    }

    /// Ask the user whether backups may be made.
    ///
    /// Prompts only while consent is undecided. Returns whether an export may go ahead:
    /// `true` once granted, and also after an earlier "Not Now" (the user is not asked
    /// again until [`reset_consent`](Self::reset_consent)). Always `false` on platforms
    /// without local files.
    #[instrument(skip(self))]
    pub async fn request_export_consent(&self) -> bool {
        if !self.config.platform.has_local_files() {
            return false;
        }

        let permission = self.cloud_permission();
        if permission.granted || !permission.needs_prompt {
            return true;
        }

        let request = ConsentRequest::for_provider(permission.provider);
        let agreed = self.consent.confirm(&request).await;
        info!(agreed, provider = ?permission.provider, "Backup consent answered");

        self.state.write().cloud_permission = CloudPermission {
            granted: agreed,
            provider: permission.provider,
            needs_prompt: false,
        };
        agreed
    }

    /// Write a snapshot of every tracked record to the on-device backup file.
    ///
    /// Interactive runs ask for consent first and publish progress; silent runs never prompt
    /// and never pause. Returns `Skipped(Busy)` without doing anything while another export
    /// or import is running.
    #[instrument(skip(self))]
    pub async fn export_snapshot(&self, interactive: bool) -> Result<ExportOutcome, BackupError> {
        if !self.config.platform.has_local_files() {
            debug!(platform = %self.config.platform, "Skipping backup, no local file access");
            return Ok(ExportOutcome::Skipped(SkipReason::UnsupportedPlatform));
        }
        if self.is_busy() {
            debug!("Skipping backup, another operation is running");
            return Ok(ExportOutcome::Skipped(SkipReason::Busy));
        }

        if interactive {
            if !self.request_export_consent().await {
                info!("Backup canceled, consent declined");
                return Ok(ExportOutcome::ConsentDeclined);
            }
        } else if self.config.background_policy == BackgroundPolicy::RequireConsent
            && !self.cloud_permission().granted
        {
            debug!("Skipping silent backup, consent not granted");
            return Ok(ExportOutcome::Skipped(SkipReason::ConsentNotGranted));
        }

        let Some(_guard) = RunGuard::acquire(&self.run_state, EXPORTING) else {
            debug!("Skipping backup, another operation is running");
            return Ok(ExportOutcome::Skipped(SkipReason::Busy));
        };

        info!(interactive, "Starting backup");
        self.state.write().last_error = None;

        let result = self.bounded(self.write_snapshot(interactive)).await;
        if interactive {
            self.progress.send_replace(None);
        }

        match result {
            Ok(report) => {
                info!(
                    path = %report.path.display(),
                    size_bytes = report.size_bytes,
                    checksum = %report.checksum,
                    failed_reads = report.failed_reads.len(),
                    "Backup completed successfully"
                );
                Ok(ExportOutcome::Completed(report))
            }
            Err(e) => {
                error!(error = %e, "Backup failed");
                self.state.write().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn write_snapshot(&self, interactive: bool) -> Result<ExportReport, BackupError> {
        self.report_stage(interactive, ProgressStage::Preparing, "Preparing backup...")
            .await;

        self.report_stage(interactive, ProgressStage::Collecting, "Collecting data...")
            .await;
        let (records, failed_reads) = self.collect_records().await;
        let absent_keys = records
            .iter()
            .filter(|(key, value)| value.is_none() && !failed_reads.contains(*key))
            .map(|(key, _)| *key)
            .collect();

        self.report_stage(interactive, ProgressStage::Compressing, "Compressing data...")
            .await;
        let created_at = self.clock.now();
        let document = BackupDocument::capture(
            self.config.format_version,
            created_at,
            self.config.platform.tag(),
            records,
        );
        let json = document.to_json()?;
        let size_bytes = json.len() as u64;

        let destination = match self.config.platform.cloud_provider() {
            Some(provider) => format!("Uploading to {}...", provider.display_name()),
            None => "Saving to device storage...".to_string(),
        };
        self.report_stage(interactive, ProgressStage::Uploading, destination)
            .await;
        self.files.ensure_dir(&self.config.backup_dir).await?;
        let path = self.config.snapshot_path();
        self.files.write_replace(&path, json.as_bytes()).await?;

        self.report_stage(interactive, ProgressStage::Verifying, "Verifying backup...")
            .await;
        let checksum = format!("{:x}", Sha256::digest(json.as_bytes()));

        let stamp = created_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        self.store.set(LAST_BACKUP_KEY, &stamp).await?;
        {
            let mut state = self.state.write();
            state.last_backup_at = Some(created_at);
            state.backup_size = size_bytes;
        }

        self.report_stage(interactive, ProgressStage::Complete, "Backup complete!")
            .await;

        Ok(ExportReport {
            path,
            created_at,
            size_bytes,
            checksum,
            absent_keys,
            failed_reads,
        })
    }

    /// Read every tracked key; a failed read is recorded as absent
    async fn collect_records(&self) -> (BTreeMap<TrackedKey, Option<String>>, Vec<TrackedKey>) {
        let mut records = BTreeMap::new();
        let mut failed = Vec::new();

        for key in TrackedKey::ALL {
            match self.store.get(key.as_str()).await {
                Ok(value) => {
                    debug!(key = %key, has_data = value.is_some(), "Exported record");
                    records.insert(key, value);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read record, exporting it as absent");
                    records.insert(key, None);
                    failed.push(key);
                }
            }
        }
        (records, failed)
    }

    async fn report_stage(&self, interactive: bool, stage: ProgressStage, message: impl Into<String>) {
        if !interactive {
            return;
        }
        self.progress
            .send_replace(Some(BackupProgress::new(stage, message)));
        match self.config.pacing.delay_for(stage) {
            Some(pause) => tokio::time::sleep(pause).await,
            // let progress subscribers observe every stage
            None => tokio::task::yield_now().await,
        }
    }

    /// Restore every tracked record from a snapshot.
    ///
    /// Uses the on-device snapshot when present, otherwise asks the user to pick a file.
    /// The document is fully parsed and validated before the store is touched. Individual
    /// key writes that fail are reported in [`ImportReport::failed_keys`] without stopping
    /// the restore.
    #[instrument(skip(self))]
    pub async fn import_snapshot(&self) -> Result<ImportOutcome, BackupError> {
        let Some(_guard) = RunGuard::acquire(&self.run_state, IMPORTING) else {
            warn!("Restore refused, another operation is running");
            return Err(BackupError::Busy);
        };

        info!("Starting restore");
        let result = self.bounded(self.restore()).await;
        match &result {
            Ok(ImportOutcome::Restored(report)) => info!(
                restored = report.restored.len(),
                removed = report.removed.len(),
                failed = report.failed_keys.len(),
                "Restore completed"
            ),
            Ok(ImportOutcome::Canceled) => info!("Restore canceled by user"),
            Err(e) => error!(error = %e, "Restore failed"),
        }
        result
    }

    async fn restore(&self) -> Result<ImportOutcome, BackupError> {
        let Some(source) = self.locate_snapshot().await? else {
            return Ok(ImportOutcome::Canceled);
        };
        let path = match &source {
            SnapshotSource::Local(path) | SnapshotSource::Picked(path) => path,
        };

        debug!(path = %path.display(), "Reading snapshot");
        let text = self.files.read_to_string(path).await?;
        let document = BackupDocument::parse(&text)?;
        let format_version = document.ensure_readable_by(&self.config.format_version)?;

        Ok(ImportOutcome::Restored(
            self.apply_document(document, source, format_version).await,
        ))
    }

    async fn locate_snapshot(&self) -> Result<Option<SnapshotSource>, BackupError> {
        if self.config.platform.has_local_files() {
            let path = self.config.snapshot_path();
            if self.files.exists(&path).await? {
                return Ok(Some(SnapshotSource::Local(path)));
            }
            info!("No on-device snapshot found, asking the user to pick a file");
        }
        let picked = self.picker.pick_document(SNAPSHOT_MIME_TYPE).await?;
        Ok(picked.map(SnapshotSource::Picked))
    }

    async fn apply_document(
        &self,
        document: BackupDocument,
        source: SnapshotSource,
        format_version: FormatVersion,
    ) -> ImportReport {
        let mut report = ImportReport {
            source,
            format_version,
            restored: Vec::new(),
            removed: Vec::new(),
            failed_keys: Vec::new(),
            ignored_keys: Vec::new(),
            requires_restart: true,
        };

        for (name, value) in document.data {
            let Some(key) = TrackedKey::from_key(&name) else {
                warn!(key = %name, "Ignoring untracked record in snapshot");
                report.ignored_keys.push(name);
                continue;
            };

            let applied = match &value {
                Some(v) => self.store.set(key.as_str(), v).await,
                None => self.store.remove(key.as_str()).await,
            };
            match (applied, value) {
                (Ok(()), Some(_)) => {
                    debug!(key = %key, "Imported record");
                    report.restored.push(key);
                }
                (Ok(()), None) => {
                    debug!(key = %key, "Removed record");
                    report.removed.push(key);
                }
                (Err(e), _) => {
                    warn!(key = %key, error = %e, "Failed to import record");
                    report.failed_keys.push(key);
                }
            }
        }
        report
    }

    /// Manual backup from the settings screen
    pub async fn backup_now(&self) -> OperationResult {
        info!("Manual backup triggered");
        match self.export_snapshot(true).await {
            Ok(ExportOutcome::Completed(_)) => match self.config.platform.cloud_provider() {
                Some(provider) => OperationResult::success(format!(
                    "Backup saved to {} successfully!",
                    provider.drive_name()
                )),
                None => OperationResult::success("Backup saved successfully"),
            },
            Ok(ExportOutcome::ConsentDeclined)
            | Ok(ExportOutcome::Skipped(SkipReason::ConsentNotGranted)) => {
                OperationResult::failure("Backup canceled. Cloud storage access is required.")
            }
            Ok(ExportOutcome::Skipped(SkipReason::Busy)) if self.is_importing() => {
                OperationResult::failure("A restore is in progress")
            }
            Ok(ExportOutcome::Skipped(SkipReason::Busy)) => {
                OperationResult::failure("A backup is already in progress")
            }
            Ok(ExportOutcome::Skipped(SkipReason::UnsupportedPlatform)) => {
                OperationResult::failure("Backup is not supported on this platform")
            }
            Err(e) => OperationResult::failure(format!("Backup failed: {}", e)),
        }
    }

    /// Manual restore from the settings screen
    pub async fn restore_from_backup(&self) -> OperationResult {
        match self.import_snapshot().await {
            Ok(ImportOutcome::Restored(report)) if report.failed_keys.is_empty() => {
                OperationResult::success(
                    "Backup restored successfully. Please restart the app to see changes.",
                )
            }
            Ok(ImportOutcome::Restored(report)) => OperationResult::success(format!(
                "Backup restored with {} record(s) that could not be written. \
                 Please restart the app to see changes.",
                report.failed_keys.len()
            )),
            Ok(ImportOutcome::Canceled) => OperationResult::failure("Restore canceled"),
            Err(BackupError::InvalidFormat(_)) => {
                OperationResult::failure("Invalid backup file format")
            }
            Err(BackupError::InvalidStructure(_)) => {
                OperationResult::failure("Invalid backup file structure")
            }
            Err(e) => OperationResult::failure(format!("Restore failed: {}", e)),
        }
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, BackupError>
    where
        F: Future<Output = Result<T, BackupError>>,
    {
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| BackupError::Timeout(limit))?,
            None => operation.await,
        }
    }
}

/// Parse a stored last-backup time: RFC 3339, or integer epoch milliseconds
pub(crate) fn parse_backup_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}
