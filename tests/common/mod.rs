//! Shared test doubles for the backup integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use luminar_backup::backup::{
    BackupCoordinator, BackupError, ConsentPrompt, ConsentRequest, DocumentPicker, FileStore,
    LocalFileStore,
};
use luminar_backup::timer::{TimerHandle, TimerService, TimerTask};
use luminar_backup::{
    BackupConfig, KeyValueStore, ManualClock, MemoryKeyValueStore, Pacing, Platform, StoreError,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

/// Config pointing at a scratch directory, with no pacing
pub fn test_config(dir: &TempDir) -> BackupConfig {
    BackupConfig::new(dir.path().join("Backups"))
        .with_platform(Platform::Other("linux".to_string()))
        .with_pacing(Pacing::Disabled)
}

/// Key-value store whose reads and writes can be made to fail per key
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryKeyValueStore,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryKeyValueStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_reads_of(&self, key: &str) {
        self.failing_reads.lock().insert(key.to_string());
    }

    pub fn fail_writes_of(&self, key: &str) {
        self.failing_writes.lock().insert(key.to_string());
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.failing_reads.lock().contains(key) {
            return Err(StoreError::ReadFailed {
                key: key.to_string(),
                message: "simulated read failure".to_string(),
            });
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.failing_writes.lock().contains(key) {
            return Err(StoreError::WriteFailed {
                key: key.to_string(),
                message: "simulated write failure".to_string(),
            });
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        if self.failing_writes.lock().contains(key) {
            return Err(StoreError::RemoveFailed {
                key: key.to_string(),
                message: "simulated remove failure".to_string(),
            });
        }
        self.inner.remove(key).await
    }
}

/// Key-value store whose reads and writes park until released, to hold an operation in flight
pub struct GatedStore {
    pub inner: MemoryKeyValueStore,
    gated: AtomicBool,
    gate: Semaphore,
    entered: Notify,
}

impl GatedStore {
    pub fn new(inner: MemoryKeyValueStore) -> Self {
        Self {
            inner,
            gated: AtomicBool::new(true),
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    /// Wait until some read is parked at the gate
    pub async fn wait_until_blocked(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    async fn pass_gate(&self) -> Result<(), StoreError> {
        if self.gated.load(Ordering::SeqCst) {
            self.entered.notify_one();
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            drop(permit);
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for GatedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.pass_gate().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.pass_gate().await?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.pass_gate().await?;
        self.inner.remove(key).await
    }
}

/// File store kept entirely in memory; never touches the disk or the blocking pool
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn ensure_dir(&self, _dir: &Path) -> Result<(), BackupError> {
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool, BackupError> {
        Ok(self.files.lock().contains_key(path))
    }

    async fn read_to_string(&self, path: &Path) -> Result<String, BackupError> {
        self.contents(path).ok_or_else(|| {
            BackupError::io(
                "Failed to read backup file",
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            )
        })
    }

    async fn write_replace(&self, path: &Path, contents: &[u8]) -> Result<(), BackupError> {
        self.files.lock().insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }
}

/// Local file store whose writes can be switched off
#[derive(Default)]
pub struct BrokenWrites {
    inner: LocalFileStore,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl FileStore for BrokenWrites {
    async fn ensure_dir(&self, dir: &Path) -> Result<(), BackupError> {
        self.inner.ensure_dir(dir).await
    }

    async fn exists(&self, path: &Path) -> Result<bool, BackupError> {
        self.inner.exists(path).await
    }

    async fn read_to_string(&self, path: &Path) -> Result<String, BackupError> {
        self.inner.read_to_string(path).await
    }

    async fn write_replace(&self, path: &Path, contents: &[u8]) -> Result<(), BackupError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackupError::io(
                "Failed to write backup file",
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ));
        }
        self.inner.write_replace(path, contents).await
    }
}

/// Document picker returning a fixed answer and counting calls
pub struct ScriptedPicker {
    answer: Option<PathBuf>,
    pub calls: AtomicUsize,
}

impl ScriptedPicker {
    pub fn cancel() -> Self {
        Self {
            answer: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn choose(path: impl Into<PathBuf>) -> Self {
        Self {
            answer: Some(path.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentPicker for ScriptedPicker {
    async fn pick_document(&self, mime_type: &str) -> Result<Option<PathBuf>, BackupError> {
        assert_eq!(mime_type, "application/json");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

/// Consent prompt with a fixed answer that records what it was asked
pub struct RecordingConsent {
    answer: bool,
    pub asked: Mutex<Vec<ConsentRequest>>,
}

impl RecordingConsent {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.lock().len()
    }
}

#[async_trait]
impl ConsentPrompt for RecordingConsent {
    async fn confirm(&self, request: &ConsentRequest) -> bool {
        self.asked.lock().push(request.clone());
        self.answer
    }
}

/// Timer service that only ticks when the test says so
#[derive(Default)]
pub struct ManualTimer {
    registered: Mutex<Vec<(Duration, TimerTask, Arc<AtomicBool>)>>,
}

impl ManualTimer {
    pub fn periods(&self) -> Vec<Duration> {
        self.registered.lock().iter().map(|(p, _, _)| *p).collect()
    }

    pub fn active_count(&self) -> usize {
        self.registered
            .lock()
            .iter()
            .filter(|(_, _, cancelled)| !cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Run one tick of every active timer and wait for the work to finish
    pub async fn tick(&self) {
        let tasks: Vec<TimerTask> = self
            .registered
            .lock()
            .iter()
            .filter(|(_, _, cancelled)| !cancelled.load(Ordering::SeqCst))
            .map(|(_, task, _)| task.clone())
            .collect();
        for task in tasks {
            task().await;
        }
    }
}

impl TimerService for ManualTimer {
    fn every(&self, period: Duration, task: TimerTask) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.registered
            .lock()
            .push((period, task, cancelled.clone()));
        TimerHandle::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub clock: ManualClock,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            clock: ManualClock::new(start_time()),
        }
    }

    pub fn config(&self) -> BackupConfig {
        test_config(&self.dir)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.config().snapshot_path()
    }

    /// Coordinator over `store` with default collaborators and the manual clock
    pub fn coordinator(&self, store: Arc<dyn KeyValueStore>) -> Arc<BackupCoordinator> {
        BackupCoordinator::builder(self.config(), store)
            .clock(Arc::new(self.clock.clone()))
            .build()
            .unwrap()
    }

    pub fn read_snapshot(&self) -> serde_json::Value {
        let text = std::fs::read_to_string(self.snapshot_path()).unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

/// A store holding a value for every tracked key except the user name
pub fn populated_store() -> MemoryKeyValueStore {
    MemoryKeyValueStore::with_records([
        ("@luminar_tasks", r#"[{"id":"t1","title":"Write report","deleted":false}]"#),
        ("@luminar_goals", r#"[{"id":"g1","title":"Run 10k"}]"#),
        ("@luminar_projects", "[]"),
        ("@luminar_journal", r#"[{"id":"j1","mood":"calm"}]"#),
        ("@theme_colors", r##"{"primary":"#6C5CE7"}"##),
        ("@luminar_quote", "Small steps every day"),
        ("@onboarding_complete", "true"),
    ])
}
