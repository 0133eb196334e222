//! Hot backup and restore for the live store.
//!
//! # Responsibility
//! - Produce consistent single-file snapshots of an active store without
//!   interrupting its availability (`snapshot`).
//! - Atomically swap a previously made snapshot back into the live store
//!   slot and signal the application to discard stale state (`restore`).
//! - Track artifacts by name through the backup registry.
//!
//! # Invariants
//! - Validation failures surface before any file I/O is attempted.
//! - A created artifact is a complete, self-consistent store readable on its
//!   own, with no companion journal files.
//! - Engine-level failures are logged and surfaced typed, never swallowed.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod registry;
pub mod restore;
pub mod snapshot;

use registry::RegistryError;

pub type BackupResult<T> = Result<T, BackupError>;

/// A point-in-time, self-contained copy of one store slot.
///
/// Never mutated after creation; deletion is the caller's responsibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    /// Name of the source store slot.
    pub store: String,
    /// `<source-basename>-<YYYYMMDDTHHMMSS>.<ext>`, UTC, second granularity.
    pub file_name: String,
    /// Absolute artifact location.
    pub path: PathBuf,
    /// Unix epoch milliseconds at creation time.
    pub created_at_ms: i64,
}

/// Backup/restore error taxonomy.
#[derive(Debug)]
pub enum BackupError {
    /// Backup reference missing, out of range, or unreadable.
    InvalidSource(String),
    /// Live store path cannot be resolved (in-memory or detached store).
    InvalidDestination(String),
    /// A stale file occupies the migration destination and resisted removal.
    DestinationNotRemoved {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Engine-level migration or replace failure.
    CopyStore {
        context: &'static str,
        source: DbError,
    },
    /// Another backup or restore already holds the store's admin lock.
    Busy { store: String },
    /// Registry persistence collaborator failure.
    Registry(RegistryError),
}

impl Display for BackupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSource(message) => write!(f, "invalid backup source: {message}"),
            Self::InvalidDestination(message) => {
                write!(f, "invalid backup destination: {message}")
            }
            Self::DestinationNotRemoved { path, source } => write!(
                f,
                "stale destination file `{}` could not be removed: {source}",
                path.display()
            ),
            Self::CopyStore { context, source } => {
                write!(f, "store copy failed while {context}: {source}")
            }
            Self::Busy { store } => write!(
                f,
                "store `{store}` is busy with another backup or restore operation"
            ),
            Self::Registry(err) => write!(f, "backup registry failure: {err}"),
        }
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DestinationNotRemoved { source, .. } => Some(source),
            Self::CopyStore { source, .. } => Some(source),
            Self::Registry(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RegistryError> for BackupError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}
