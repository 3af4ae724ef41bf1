//! Backup configuration.
//!
//! Defaults reproduce the shipped app: one snapshot file named
//! `luminar-backup-latest.json` under a `Backups` directory, refreshed every three days.
//!
//! # Environment Variables
//!
//! - `LUMINAR_BACKUP_DIR`: directory holding the snapshot file
//! - `LUMINAR_BACKUP_INTERVAL_HOURS`: automatic backup interval in hours
//! - `LUMINAR_PLATFORM`: platform tag (`ios`, `android`, `web`, anything else)
//! - `LUMINAR_BACKUP_TIMEOUT_SECS`: per-operation timeout, `0` disables it
//! - `LUMINAR_BACKGROUND_POLICY`: `always` or `require-consent`

use crate::backup::{CloudProvider, FormatVersion, ProgressStage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default snapshot file name
pub const DEFAULT_FILE_NAME: &str = "luminar-backup-latest.json";

/// Default automatic backup interval: three days
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Longest accepted automatic backup interval: one year
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Operating system that produced or consumes a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Ios,
    Android,
    Web,
    Other(String),
}

impl Platform {
    /// Platform of the running process
    pub fn current() -> Self {
        Self::from_tag(std::env::consts::OS)
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "ios" => Platform::Ios,
            "android" => Platform::Android,
            "web" => Platform::Web,
            other => Platform::Other(other.to_string()),
        }
    }

    /// Tag written into the snapshot's `platform` field
    pub fn tag(&self) -> &str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
            Platform::Other(tag) => tag,
        }
    }

    /// Whether the app can read and write files on the device
    pub fn has_local_files(&self) -> bool {
        !matches!(self, Platform::Web)
    }

    /// Cloud drive the platform syncs app documents to, if any
    pub fn cloud_provider(&self) -> Option<CloudProvider> {
        match self {
            Platform::Ios => Some(CloudProvider::ICloud),
            Platform::Android => Some(CloudProvider::GoogleDrive),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What a silent (timer or backgrounding) export does when the user never granted consent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackgroundPolicy {
    /// Always write the local snapshot
    #[default]
    Always,
    /// Skip until consent has been granted
    RequireConsent,
}

/// Pauses between progress stages of an interactive export.
///
/// Purely cosmetic; silent exports never pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    Disabled,
    Fixed {
        preparing: Duration,
        compressing: Duration,
        verifying: Duration,
        complete: Duration,
    },
}

impl Pacing {
    /// The pauses used by the mobile app
    pub fn standard() -> Self {
        Pacing::Fixed {
            preparing: Duration::from_millis(300),
            compressing: Duration::from_millis(400),
            verifying: Duration::from_millis(300),
            complete: Duration::from_millis(500),
        }
    }

    pub fn delay_for(&self, stage: ProgressStage) -> Option<Duration> {
        let Pacing::Fixed {
            preparing,
            compressing,
            verifying,
            complete,
        } = self
        else {
            return None;
        };
        let delay = match stage {
            ProgressStage::Preparing => *preparing,
            ProgressStage::Compressing => *compressing,
            ProgressStage::Verifying => *verifying,
            ProgressStage::Complete => *complete,
            ProgressStage::Collecting | ProgressStage::Uploading => return None,
        };
        (!delay.is_zero()).then_some(delay)
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::standard()
    }
}

/// Backup coordinator configuration
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub backup_dir: PathBuf,
    pub file_name: String,
    pub interval: Duration,
    pub format_version: FormatVersion,
    pub platform: Platform,
    pub background_policy: BackgroundPolicy,
    pub pacing: Pacing,
    /// Upper bound for one export or import; `None` waits forever
    pub operation_timeout: Option<Duration>,
}

impl BackupConfig {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_background_policy(mut self, policy: BackgroundPolicy) -> Self {
        self.background_policy = policy;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_format_version(mut self, version: FormatVersion) -> Self {
        self.format_version = version;
        self
    }

    /// Full path of the on-device snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        self.backup_dir.join(&self.file_name)
    }

    /// Defaults overlaid with `LUMINAR_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("LUMINAR_BACKUP_DIR") {
            config.backup_dir = PathBuf::from(dir);
        }
        if let Some(hours) = lookup("LUMINAR_BACKUP_INTERVAL_HOURS") {
            let parsed: u64 = hours.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: "LUMINAR_BACKUP_INTERVAL_HOURS".to_string(),
                value: hours.clone(),
                reason: "expected a whole number of hours".to_string(),
            })?;
            let secs = parsed.checked_mul(60 * 60).ok_or_else(|| ConfigError::InvalidValue {
                name: "LUMINAR_BACKUP_INTERVAL_HOURS".to_string(),
                value: hours.clone(),
                reason: "interval is too large".to_string(),
            })?;
            config.interval = Duration::from_secs(secs);
        }
        if let Some(tag) = lookup("LUMINAR_PLATFORM") {
            config.platform = Platform::from_tag(tag.trim());
        }
        if let Some(secs) = lookup("LUMINAR_BACKUP_TIMEOUT_SECS") {
            let parsed: u64 = secs.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: "LUMINAR_BACKUP_TIMEOUT_SECS".to_string(),
                value: secs.clone(),
                reason: "expected a whole number of seconds".to_string(),
            })?;
            config.operation_timeout = (parsed > 0).then(|| Duration::from_secs(parsed));
        }
        if let Some(policy) = lookup("LUMINAR_BACKGROUND_POLICY") {
            config.background_policy = match policy.trim() {
                "always" => BackgroundPolicy::Always,
                "require-consent" => BackgroundPolicy::RequireConsent,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "LUMINAR_BACKGROUND_POLICY".to_string(),
                        value: policy,
                        reason: "expected \"always\" or \"require-consent\"".to_string(),
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("backup interval must be non-zero".to_string()));
        }
        if self.interval > MAX_INTERVAL {
            return Err(ConfigError::Invalid(format!(
                "backup interval of {} hours exceeds the maximum of {} hours",
                self.interval.as_secs() / 3600,
                MAX_INTERVAL.as_secs() / 3600
            )));
        }
        if self.file_name.trim().is_empty() {
            return Err(ConfigError::Invalid("snapshot file name is empty".to_string()));
        }
        if self.file_name.contains('/') || self.file_name.contains('\\') {
            return Err(ConfigError::Invalid(format!(
                "snapshot file name {:?} must not contain a path separator",
                self.file_name
            )));
        }
        Ok(())
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("Backups"),
            file_name: DEFAULT_FILE_NAME.to_string(),
            interval: DEFAULT_INTERVAL,
            format_version: FormatVersion::CURRENT,
            platform: Platform::current(),
            background_policy: BackgroundPolicy::default(),
            pacing: Pacing::default(),
            operation_timeout: Some(Duration::from_secs(60)),
        }
    }
}
