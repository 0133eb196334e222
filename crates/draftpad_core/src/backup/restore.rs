//! Restore orchestrator swapping a backup artifact into the live store slot.
//!
//! # Responsibility
//! - Validate the registered artifact, detach the live handle, replace the
//!   live file content through the engine's online-backup primitive, and
//!   reattach a fresh handle at the same path.
//! - Signal the application through the generation token so all previously
//!   fetched data objects are treated as invalid.
//!
//! # State machine
//! `Idle -> Validating -> Detaching -> Replacing -> Reattaching -> Done`,
//! with `Failed` reachable from `Validating`, `Replacing` and `Reattaching`.
//!
//! # Invariants
//! - The live-connection lock is held for the whole detach/reattach window;
//!   application access blocks instead of observing a detached store.
//! - Replacement is engine-managed, never a raw file copy, so journals and
//!   file locks are released and re-established correctly.
//! - A reattach failure is propagated as `CopyStore`, never swallowed.
//! - No cancellation once `Replacing` begins; a replace failure may leave
//!   the live store partially replaced and the application must instruct
//!   the user to restart.

use crate::backup::registry::RegistryStore;
use crate::backup::{BackupError, BackupResult};
use crate::db::{open_db, DbError};
use crate::store::{StoreCoordinator, StoreIndex, StoreSlot};
use log::{error, info};
use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Phases of one restore run, logged as structured events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    Idle,
    Validating,
    Detaching,
    Replacing,
    Reattaching,
    Done,
    Failed,
}

impl RestorePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Detaching => "detaching",
            Self::Replacing => "replacing",
            Self::Reattaching => "reattaching",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Result of a completed restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Name of the restored store slot.
    pub store: String,
    /// Artifact filename that was swapped in.
    pub artifact_file: String,
    /// New generation token value; differs from every pre-restore value.
    pub generation: u64,
}

/// Orchestrates the swap of a backup artifact into a live store slot.
pub struct RestoreOrchestrator<'a> {
    coordinator: &'a StoreCoordinator,
    backup_dir: PathBuf,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(coordinator: &'a StoreCoordinator, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            coordinator,
            backup_dir: backup_dir.into(),
        }
    }

    /// Replaces the live store content with its most recent registered backup.
    ///
    /// Caller contract: no data-object references obtained from the store
    /// before this call may be dereferenced until the new generation token
    /// is observed.
    ///
    /// # Errors
    /// - `InvalidSource` when no backup is registered for the slot or the
    ///   registered artifact file is missing; the live store is untouched.
    /// - `InvalidDestination` when the live store has no resolvable path.
    /// - `Busy` when a backup or restore already runs against the slot.
    /// - `CopyStore` on engine failure during replace or reattach; the live
    ///   store may be partially replaced and the caller must surface a
    ///   restart instruction to the user.
    pub fn restore_latest(
        &self,
        store: StoreIndex,
        registry_store: &dyn RegistryStore,
    ) -> BackupResult<RestoreOutcome> {
        let slot = self.coordinator.slot(store).ok_or_else(|| {
            BackupError::InvalidSource(format!("store index {store} is out of range"))
        })?;
        let _admin = slot.try_admin().ok_or_else(|| BackupError::Busy {
            store: slot.name.clone(),
        })?;

        let started_at = Instant::now();
        info!(
            "event=restore module=backup status=start store={}",
            slot.name
        );
        slot.signals.set_restore_in_progress(true);
        let result = self.run(slot, registry_store);
        slot.signals.set_restore_in_progress(false);

        match &result {
            Ok(outcome) => info!(
                "event=restore module=backup status=ok store={} file={} generation={} duration_ms={}",
                outcome.store,
                outcome.artifact_file,
                outcome.generation,
                started_at.elapsed().as_millis()
            ),
            Err(err) => {
                log_phase(&slot.name, RestorePhase::Failed);
                error!(
                    "event=restore module=backup status=error store={} duration_ms={} error={err}",
                    slot.name,
                    started_at.elapsed().as_millis()
                );
            }
        }

        result
    }

    fn run(
        &self,
        slot: &StoreSlot,
        registry_store: &dyn RegistryStore,
    ) -> BackupResult<RestoreOutcome> {
        log_phase(&slot.name, RestorePhase::Validating);
        let registry = registry_store.load()?;
        let artifact_file = registry
            .latest_for(&slot.name)
            .ok_or_else(|| {
                BackupError::InvalidSource(format!(
                    "no backup registered for store `{}`",
                    slot.name
                ))
            })?
            .to_string();
        let artifact_path = self.backup_dir.join(&artifact_file);
        if !artifact_path.is_file() {
            return Err(BackupError::InvalidSource(format!(
                "registered backup `{artifact_file}` is missing from `{}`",
                self.backup_dir.display()
            )));
        }
        let live_path = slot.path.clone().ok_or_else(|| {
            BackupError::InvalidDestination(format!(
                "store `{}` has no resolvable file path",
                slot.name
            ))
        })?;

        // Exclusion window: holds until reattach completes.
        let mut conn_guard = slot.lock_conn();

        log_phase(&slot.name, RestorePhase::Detaching);
        // Dropping the handle closes the file and checkpoints the WAL.
        drop(conn_guard.take());

        log_phase(&slot.name, RestorePhase::Replacing);
        replace_store_content(&live_path, &artifact_path).map_err(|source| {
            BackupError::CopyStore {
                context: "replacing live store content",
                source,
            }
        })?;

        log_phase(&slot.name, RestorePhase::Reattaching);
        let conn = open_db(&live_path).map_err(|source| BackupError::CopyStore {
            context: "reattaching live store",
            source,
        })?;
        *conn_guard = Some(conn);

        let generation = slot.signals.bump_generation();
        log_phase(&slot.name, RestorePhase::Done);

        Ok(RestoreOutcome {
            store: slot.name.clone(),
            artifact_file,
            generation,
        })
    }
}

/// Engine-level "replace store content at `live_path` from `artifact_path`".
///
/// Runs SQLite's online backup from the artifact into a fresh connection at
/// the live path, so internal locks and journal state are handled by the
/// engine instead of a raw file copy.
fn replace_store_content(live_path: &Path, artifact_path: &Path) -> Result<(), DbError> {
    let source = Connection::open_with_flags(
        artifact_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut destination = Connection::open(live_path)?;
    let replace = Backup::new(&source, &mut destination)?;
    replace.run_to_completion(128, Duration::from_millis(10), None)?;
    Ok(())
}

fn log_phase(store: &str, phase: RestorePhase) {
    info!(
        "event=restore_phase module=backup store={store} phase={}",
        phase.as_str()
    );
}
