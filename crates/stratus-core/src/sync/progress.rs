//! Sync progress stages and reporting

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Stage of the sync state machine
///
/// Fetching the remote backup belongs to `CheckingRemote`. After
/// `AnalyzingLocal` a pass enters one branch: `Uploading` when there is no
/// remote backup, `Downloading` when the remote copy replaces local data, or
/// `ResolvingConflicts` followed by `Uploading` of the merged result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Idle,
    Initializing,
    CheckingRemote,
    AnalyzingLocal,
    Uploading,
    Downloading,
    ResolvingConflicts,
    Completed,
    Error,
}

impl SyncStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::CheckingRemote => "checking_remote",
            Self::AnalyzingLocal => "analyzing_local",
            Self::Uploading => "uploading",
            Self::Downloading => "downloading",
            Self::ResolvingConflicts => "resolving_conflicts",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub stage: SyncStage,
    pub message: String,
}

/// Callback invoked on every stage transition
pub type ProgressCallback = Arc<dyn Fn(&SyncProgress) + Send + Sync>;

/// Emits progress events to an optional callback and the log.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self { callback }
    }

    pub fn emit(&self, stage: SyncStage, message: impl Into<String>) {
        let progress = SyncProgress {
            stage,
            message: message.into(),
        };
        tracing::debug!("Sync stage {}: {}", progress.stage, progress.message);
        if let Some(callback) = &self.callback {
            callback(&progress);
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProgressReporter")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
