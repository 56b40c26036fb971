//! stratus-core - Core library for Stratus
//!
//! This crate contains the snapshot models, conflict resolution, the remote
//! backup store, the encryption envelope and the sync engine shared by every
//! Stratus front end.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod local;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncSettings;
pub use error::{Error, ErrorKind, Result};
pub use models::{DatasetSnapshot, Note, SyncMetadata};
pub use services::SyncService;
pub use state::SyncState;
pub use sync::{MergeStrategy, SyncAction, SyncResult, SyncTrigger};
