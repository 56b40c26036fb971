//! Shared services used across clients.

mod sync_service;

pub use sync_service::{SyncService, DEFAULT_SHUTDOWN_TIMEOUT};
