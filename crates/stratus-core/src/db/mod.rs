//! Database layer for Stratus

mod connection;
mod entity_repository;
mod migrations;
mod store;
mod sync_state_repository;

pub use connection::Database;
pub use entity_repository::{
    EntityRepository, LibSqlEntityRepository, CONVERSATIONS, NOTES, NOTE_TAGS, TAGS,
};
pub use store::LibSqlStore;
pub use sync_state_repository::{LibSqlSyncStateRepository, SyncStateRepository};
