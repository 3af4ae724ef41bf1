// Backup System Types - snapshot document, outcomes and errors

use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Store key holding the time of the last successful export
pub const LAST_BACKUP_KEY: &str = "@last_backup_date";

/// One of the fixed application records included in every snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrackedKey {
    Tasks,
    Goals,
    Projects,
    Journal,
    ThemeColors,
    Quote,
    OnboardingComplete,
    UserName,
}

impl TrackedKey {
    /// Every tracked key, in snapshot order
    pub const ALL: [TrackedKey; 8] = [
        TrackedKey::Tasks,
        TrackedKey::Goals,
        TrackedKey::Projects,
        TrackedKey::Journal,
        TrackedKey::ThemeColors,
        TrackedKey::Quote,
        TrackedKey::OnboardingComplete,
        TrackedKey::UserName,
    ];

    /// Storage key name
    pub fn as_str(self) -> &'static str {
        match self {
            TrackedKey::Tasks => "@luminar_tasks",
            TrackedKey::Goals => "@luminar_goals",
            TrackedKey::Projects => "@luminar_projects",
            TrackedKey::Journal => "@luminar_journal",
            TrackedKey::ThemeColors => "@theme_colors",
            TrackedKey::Quote => "@luminar_quote",
            TrackedKey::OnboardingComplete => "@onboarding_complete",
            TrackedKey::UserName => "@user_name",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for TrackedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `MAJOR.MINOR.PATCH` tag of the snapshot document shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FormatVersion {
    pub const CURRENT: FormatVersion = FormatVersion::new(1, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse `MAJOR.MINOR.PATCH`. Pre-release and build suffixes (`-beta`, `+build.5`) are
    /// accepted and ignored; they play no part in the read policy.
    pub fn parse(text: &str) -> Option<Self> {
        let core = text.trim().split(|c: char| c == '-' || c == '+').next()?;
        let mut parts = core.splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        Some(Self::new(major, minor, patch))
    }

    /// Whether a reader at `self` can import a document written at `other`.
    ///
    /// Same or older major versions are read best-effort; newer majors are refused.
    pub fn can_read(&self, other: &FormatVersion) -> bool {
        other.major <= self.major
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The serialized snapshot.
///
/// `data` maps storage key names to their raw value; `None` (JSON `null`) marks a key that
/// held nothing at export time and is removed from the store on import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub version: String,
    pub timestamp: i64,
    pub platform: String,
    pub data: BTreeMap<String, Option<String>>,
}

impl BackupDocument {
    /// Build a document holding exactly the tracked key set.
    ///
    /// Keys missing from `records` are recorded as absent.
    pub fn capture(
        version: FormatVersion,
        created_at: DateTime<Utc>,
        platform: &str,
        mut records: BTreeMap<TrackedKey, Option<String>>,
    ) -> Self {
        let data = TrackedKey::ALL
            .into_iter()
            .map(|key| (key.as_str().to_string(), records.remove(&key).flatten()))
            .collect();
        Self {
            version: version.to_string(),
            timestamp: created_at.timestamp_millis(),
            platform: platform.to_string(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, BackupError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and structurally validate snapshot text.
    ///
    /// Fails with [`BackupError::InvalidFormat`] when the text is not JSON and with
    /// [`BackupError::InvalidStructure`] when `version` or `data` is missing or malformed.
    pub fn parse(text: &str) -> Result<Self, BackupError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| BackupError::InvalidFormat(e.to_string()))?;

        let Value::Object(mut root) = value else {
            return Err(BackupError::InvalidStructure(
                "top-level value is not an object".to_string(),
            ));
        };

        let version = match root.remove("version") {
            Some(Value::String(v)) if !v.trim().is_empty() => v,
            _ => return Err(BackupError::InvalidStructure("missing version".to_string())),
        };
        if FormatVersion::parse(&version).is_none() {
            return Err(BackupError::InvalidStructure(format!(
                "unrecognised version {:?}",
                version
            )));
        }

        let raw_data = match root.remove("data") {
            Some(Value::Object(map)) => map,
            _ => return Err(BackupError::InvalidStructure("missing data".to_string())),
        };
        let mut data = BTreeMap::new();
        for (key, value) in raw_data {
            let record = match value {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => {
                    return Err(BackupError::InvalidStructure(format!(
                        "record {} holds a {} instead of a string or null",
                        key,
                        json_kind(&other)
                    )))
                }
            };
            data.insert(key, record);
        }

        let timestamp = root.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
        let platform = root
            .get("platform")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            version,
            timestamp,
            platform,
            data,
        })
    }

    pub fn format_version(&self) -> Option<FormatVersion> {
        FormatVersion::parse(&self.version)
    }

    /// Refuse documents written by a newer, incompatible format
    pub fn ensure_readable_by(&self, reader: &FormatVersion) -> Result<FormatVersion, BackupError> {
        let found = self
            .format_version()
            .ok_or_else(|| BackupError::InvalidStructure(format!("unrecognised version {:?}", self.version)))?;
        if !reader.can_read(&found) {
            return Err(BackupError::UnsupportedVersion {
                found: found.to_string(),
                supported: reader.to_string(),
            });
        }
        Ok(found)
    }

    pub fn record(&self, key: TrackedKey) -> Option<&Option<String>> {
        self.data.get(key.as_str())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Checkpoints reported during an interactive export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Preparing,
    Collecting,
    Compressing,
    Uploading,
    Verifying,
    Complete,
}

impl ProgressStage {
    pub fn percent(self) -> u8 {
        match self {
            ProgressStage::Preparing => 10,
            ProgressStage::Collecting => 30,
            ProgressStage::Compressing => 50,
            ProgressStage::Uploading => 70,
            ProgressStage::Verifying => 90,
            ProgressStage::Complete => 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupProgress {
    pub stage: ProgressStage,
    pub percent_complete: u8,
    pub message: String,
}

impl BackupProgress {
    pub fn new(stage: ProgressStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent_complete: stage.percent(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloudProvider {
    #[serde(rename = "icloud")]
    ICloud,
    #[serde(rename = "google-drive")]
    GoogleDrive,
}

impl CloudProvider {
    pub fn display_name(self) -> &'static str {
        match self {
            CloudProvider::ICloud => "iCloud",
            CloudProvider::GoogleDrive => "Google Drive",
        }
    }

    /// Where snapshots end up, as shown to the user
    pub fn drive_name(self) -> &'static str {
        match self {
            CloudProvider::ICloud => "iCloud Drive",
            CloudProvider::GoogleDrive => "Google Drive",
        }
    }
}

/// User consent for backing data up to the platform's cloud drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudPermission {
    pub granted: bool,
    pub provider: Option<CloudProvider>,
    pub needs_prompt: bool,
}

impl CloudPermission {
    /// Initial state: nothing granted, ask before the first manual backup
    pub fn undecided(provider: Option<CloudProvider>) -> Self {
        Self {
            granted: false,
            provider,
            needs_prompt: true,
        }
    }
}

/// Why an export did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another export or import holds the exclusion token
    Busy,
    /// The platform has no local file access
    UnsupportedPlatform,
    /// Silent export under a policy that requires consent
    ConsentNotGranted,
}

/// Details of a written snapshot
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// SHA-256 of the written document, hex encoded
    pub checksum: String,
    /// Keys that held no value
    pub absent_keys: Vec<TrackedKey>,
    /// Keys whose read failed and were recorded as absent
    pub failed_reads: Vec<TrackedKey>,
}

#[derive(Debug, Clone)]
pub enum ExportOutcome {
    Completed(ExportReport),
    Skipped(SkipReason),
    ConsentDeclined,
}

impl ExportOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExportOutcome::Completed(_))
    }
}

/// Where an imported snapshot came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    /// The well-known on-device snapshot
    Local(PathBuf),
    /// A file the user picked
    Picked(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub source: SnapshotSource,
    pub format_version: FormatVersion,
    pub restored: Vec<TrackedKey>,
    pub removed: Vec<TrackedKey>,
    /// Keys whose write or removal failed; the rest of the restore went ahead
    pub failed_keys: Vec<TrackedKey>,
    /// Record names in the document that are not tracked keys
    pub ignored_keys: Vec<String>,
    /// Restored values only take effect after the app restarts
    pub requires_restart: bool,
}

#[derive(Debug, Clone)]
pub enum ImportOutcome {
    Restored(ImportReport),
    Canceled,
}

/// User-facing result of a manual backup or restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Point-in-time view of the coordinator for a settings screen
#[derive(Debug, Clone)]
pub struct BackupStatus {
    pub last_backup_at: Option<DateTime<Utc>>,
    pub is_exporting: bool,
    pub is_importing: bool,
    pub progress: Option<BackupProgress>,
    pub cloud_permission: CloudPermission,
    pub last_error: Option<String>,
    pub backup_size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid backup file format: {0}")]
    InvalidFormat(String),
    #[error("Invalid backup file structure: {0}")]
    InvalidStructure(String),
    #[error("Backup format {found} is newer than supported format {supported}")]
    UnsupportedVersion { found: String, supported: String },
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Another backup operation is in progress")]
    Busy,
}

impl BackupError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BackupError::Io {
            context: context.into(),
            source,
        }
    }
}
