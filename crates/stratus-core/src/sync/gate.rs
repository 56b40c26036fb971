//! Process-wide single-flight gate for syncs
//!
//! A sync runs only while its [`SyncSession`] is alive; dropping the session
//! (normal return, error, or a cancelled future) hands the permit back.

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::{Error, Result};

/// What started a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Manual,
    Periodic,
    Shutdown,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::Periodic => "periodic",
            Self::Shutdown => "shutdown",
        })
    }
}

/// One-permit semaphore guarding sync sessions.
#[derive(Debug, Clone)]
pub struct SyncGate {
    permits: Arc<Semaphore>,
}

static GLOBAL_GATE: OnceLock<SyncGate> = OnceLock::new();

impl SyncGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Gate shared by every sync in this process.
    pub fn global() -> &'static Self {
        GLOBAL_GATE.get_or_init(Self::new)
    }

    /// Open a session.
    ///
    /// `Shutdown` waits for a running sync to finish; other triggers fail
    /// fast with [`Error::SyncInProgress`].
    pub async fn acquire(&self, trigger: SyncTrigger) -> Result<SyncSession> {
        let permit = match trigger {
            SyncTrigger::Shutdown => Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|_| Error::Cancelled("sync gate closed".to_string()))?,
            SyncTrigger::Manual | SyncTrigger::Periodic => {
                match Arc::clone(&self.permits).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(TryAcquireError::NoPermits) => return Err(Error::SyncInProgress),
                    Err(TryAcquireError::Closed) => {
                        return Err(Error::Cancelled("sync gate closed".to_string()))
                    }
                }
            }
        };

        tracing::debug!("Sync session opened ({trigger})");
        Ok(SyncSession {
            trigger,
            started_at: Utc::now(),
            _permit: permit,
        })
    }

    /// Whether a session is currently open.
    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

impl Default for SyncGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the caller holds the sync gate.
#[derive(Debug)]
pub struct SyncSession {
    trigger: SyncTrigger,
    started_at: DateTime<Utc>,
    _permit: OwnedSemaphorePermit,
}

impl SyncSession {
    #[must_use]
    pub const fn trigger(&self) -> SyncTrigger {
        self.trigger
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
