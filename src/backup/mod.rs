// Backup and Restore System
// One JSON snapshot of every tracked record, refreshed automatically and restorable on demand

pub mod consent;
pub mod coordinator;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use consent::{AutoConsent, ConsentPrompt, ConsentRequest};
pub use coordinator::{BackupCoordinator, BackupCoordinatorBuilder};
pub use scheduler::{is_backup_due, BackgroundBackupObserver, ScheduleHandle};
pub use storage::{DocumentPicker, FileStore, LocalFileStore, NoDocumentPicker, SNAPSHOT_MIME_TYPE};
pub use types::{
    BackupDocument, BackupError, BackupProgress, BackupStatus, CloudPermission, CloudProvider,
    ExportOutcome, ExportReport, FormatVersion, ImportOutcome, ImportReport, OperationResult,
    ProgressStage, SkipReason, SnapshotSource, TrackedKey, LAST_BACKUP_KEY,
};
