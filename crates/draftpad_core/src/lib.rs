//! Core domain and storage logic for DraftPad.
//! This crate is the single source of truth for business invariants,
//! including the hot-backup and restore machinery for the live store.

pub mod backup;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use backup::registry::{
    BackupDescriptor, BackupRegistry, JsonFileRegistryStore, RegistryError, RegistryStore,
};
pub use backup::restore::{RestoreOrchestrator, RestoreOutcome, RestorePhase};
pub use backup::snapshot::SnapshotBuilder;
pub use backup::{BackupArtifact, BackupError, BackupResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entry::{Entry, EntryId, EntryValidationError};
pub use repo::entry_repo::{EntryRepository, RepoError, RepoResult, SqliteEntryRepository};
pub use store::{StoreCoordinator, StoreError, StoreIndex, StoreSignals, DEFAULT_STORE_NAME};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
