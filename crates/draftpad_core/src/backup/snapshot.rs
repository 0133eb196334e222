//! Snapshot builder producing single-file backup artifacts from a live store.
//!
//! # Responsibility
//! - Copy an active store to a new artifact without disrupting its
//!   availability, via a throwaway read-only attachment to the same file.
//! - Compact the copy (`VACUUM INTO`) so the artifact is a minimal,
//!   self-contained store with delete-journal mode and no sidecar files.
//! - Register the artifact in the backup registry (last write wins).
//!
//! # Invariants
//! - The live handle is never touched; the live store keeps serving reads
//!   and writes for the whole copy (WAL multi-reader semantics).
//! - The artifact appears at its final path only after a fully successful
//!   migration; failed runs leave no partial file behind.

use crate::backup::registry::{BackupDescriptor, RegistryStore};
use crate::backup::{BackupArtifact, BackupError, BackupResult};
use crate::db::DbError;
use crate::model::entry::epoch_ms_now;
use crate::store::{StoreCoordinator, StoreIndex, StoreSlot};
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Instant;
use time::OffsetDateTime;

/// Builds backup artifacts from live coordinator slots.
pub struct SnapshotBuilder<'a> {
    coordinator: &'a StoreCoordinator,
    backup_dir: PathBuf,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(coordinator: &'a StoreCoordinator, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            coordinator,
            backup_dir: backup_dir.into(),
        }
    }

    /// Produces one backup artifact from the store at `store`.
    ///
    /// # Errors
    /// - `InvalidSource` when `store` does not identify an attached slot;
    ///   raised before any file I/O.
    /// - `InvalidDestination` when the slot has no on-disk file (in-memory).
    /// - `Busy` when a backup or restore already runs against the slot.
    /// - `CopyStore` on engine or filesystem failure during migration; the
    ///   live store is left completely untouched.
    pub fn snapshot(
        &self,
        store: StoreIndex,
        registry_store: &dyn RegistryStore,
    ) -> BackupResult<BackupArtifact> {
        let slot = self.coordinator.slot(store).ok_or_else(|| {
            BackupError::InvalidSource(format!("store index {store} is out of range"))
        })?;
        let source_path = slot.path.as_deref().ok_or_else(|| {
            BackupError::InvalidDestination(format!(
                "store `{}` has no on-disk file to back up",
                slot.name
            ))
        })?;
        let _admin = slot.try_admin().ok_or_else(|| BackupError::Busy {
            store: slot.name.clone(),
        })?;

        let started_at = Instant::now();
        info!(
            "event=backup module=backup status=start store={}",
            slot.name
        );

        match self.migrate_and_register(slot, source_path, registry_store) {
            Ok(artifact) => {
                info!(
                    "event=backup module=backup status=ok store={} file={} duration_ms={}",
                    slot.name,
                    artifact.file_name,
                    started_at.elapsed().as_millis()
                );
                Ok(artifact)
            }
            Err(err) => {
                error!(
                    "event=backup module=backup status=error store={} duration_ms={} error={err}",
                    slot.name,
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    fn migrate_and_register(
        &self,
        slot: &StoreSlot,
        source_path: &Path,
        registry_store: &dyn RegistryStore,
    ) -> BackupResult<BackupArtifact> {
        let file_name = artifact_file_name(source_path, OffsetDateTime::now_utc());
        let final_path = self.backup_dir.join(&file_name);
        let partial_path = self.backup_dir.join(format!("{file_name}.partial"));

        migrate_via_readonly_attachment(source_path, &partial_path, &final_path)?;

        let created_at_ms = epoch_ms_now();
        let mut registry = registry_store.load()?;
        registry.record(BackupDescriptor {
            slot: slot.name.clone(),
            file_name: file_name.clone(),
            created_at_ms,
        });
        registry_store.save(&registry)?;

        Ok(BackupArtifact {
            store: slot.name.clone(),
            file_name,
            path: final_path,
            created_at_ms,
        })
    }
}

/// Copies the store file through a separate read-only connection.
///
/// The copy lands at a `.partial` path first and is renamed into place only
/// on success, so a failed migration never leaves a half-written artifact
/// at the destination name.
fn migrate_via_readonly_attachment(
    source: &Path,
    partial: &Path,
    destination: &Path,
) -> BackupResult<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|err| BackupError::CopyStore {
            context: "preparing backup directory",
            source: DbError::Io(err),
        })?;
    }

    if partial.exists() {
        std::fs::remove_file(partial).map_err(|source| BackupError::DestinationNotRemoved {
            path: partial.to_path_buf(),
            source,
        })?;
    }

    let partial_str = partial.to_str().ok_or_else(|| {
        BackupError::InvalidDestination(format!(
            "backup path `{}` is not valid UTF-8",
            partial.display()
        ))
    })?;

    // Throwaway attachment; dropped as soon as the copy finishes. Read-only
    // open takes no lock that would contend with the live session, and the
    // vacuum output uses plain delete-journal mode, so the artifact has no
    // -wal/-shm companions.
    let copy_result = Connection::open_with_flags(
        source,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .and_then(|reader| reader.execute("VACUUM INTO ?1", [partial_str]).map(|_| ()));

    if let Err(err) = copy_result {
        let _ = std::fs::remove_file(partial);
        return Err(BackupError::CopyStore {
            context: "migrating snapshot",
            source: DbError::Sqlite(err),
        });
    }

    if let Err(err) = std::fs::rename(partial, destination) {
        let _ = std::fs::remove_file(partial);
        return Err(BackupError::CopyStore {
            context: "finalizing snapshot",
            source: DbError::Io(err),
        });
    }

    Ok(())
}

fn artifact_file_name(source_path: &Path, now: OffsetDateTime) -> String {
    let stem = source_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("store");
    let extension = source_path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("sqlite3");
    format!("{stem}-{}.{extension}", compact_utc_timestamp(now))
}

/// ISO-8601 compact form, second granularity, no punctuation.
fn compact_utc_timestamp(now: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

#[cfg(test)]
mod tests {
    use super::{
        artifact_file_name, compact_utc_timestamp, migrate_via_readonly_attachment,
        SnapshotBuilder,
    };
    use crate::backup::registry::JsonFileRegistryStore;
    use crate::backup::BackupError;
    use crate::store::StoreCoordinator;
    use std::path::Path;
    use time::OffsetDateTime;

    #[test]
    fn timestamp_is_compact_iso8601_utc() {
        // 2021-01-02T03:04:05Z
        let at = OffsetDateTime::from_unix_timestamp(1_609_556_645).expect("valid timestamp");
        assert_eq!(compact_utc_timestamp(at), "20210102T030405");
    }

    #[test]
    fn artifact_name_derives_from_source_basename() {
        let at = OffsetDateTime::from_unix_timestamp(1_609_556_645).expect("valid timestamp");
        let name = artifact_file_name(Path::new("/data/draftpad.sqlite3"), at);
        assert_eq!(name, "draftpad-20210102T030405.sqlite3");
    }

    #[test]
    fn unremovable_stale_partial_fails_destination_not_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let partial = dir.path().join("draftpad-stale.sqlite3.partial");
        // A directory at the partial path cannot be removed with remove_file,
        // regardless of process privileges.
        std::fs::create_dir(&partial).expect("stale occupant");

        let err = migrate_via_readonly_attachment(
            Path::new("/nonexistent/source.sqlite3"),
            &partial,
            &dir.path().join("draftpad-stale.sqlite3"),
        )
        .expect_err("occupied partial path must fail");

        match err {
            BackupError::DestinationNotRemoved { path, .. } => assert_eq!(path, partial),
            other => panic!("expected DestinationNotRemoved, got {other}"),
        }
        assert!(partial.exists(), "the occupant is left for the operator");
    }

    #[test]
    fn migration_failure_surfaces_copy_store_and_removes_partial() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("corrupt.sqlite3");
        std::fs::write(&source, b"this is not a sqlite database").expect("write source");

        let partial = dir.path().join("corrupt-snapshot.sqlite3.partial");
        let destination = dir.path().join("corrupt-snapshot.sqlite3");

        let err = migrate_via_readonly_attachment(&source, &partial, &destination)
            .expect_err("vacuuming a non-database source must fail");

        assert!(matches!(err, BackupError::CopyStore { .. }), "{err}");
        assert!(!partial.exists(), "failed runs leave no partial file");
        assert!(!destination.exists(), "failed runs never reach the final path");
    }

    #[test]
    fn snapshot_fails_busy_while_admin_lock_is_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut coordinator = StoreCoordinator::new();
        let index = coordinator
            .open(dir.path(), "draftpad", false)
            .expect("store should open");

        let slot = coordinator.slot(index).expect("slot exists");
        let _held = slot.try_admin().expect("admin lock should be free");

        let builder = SnapshotBuilder::new(&coordinator, dir.path().join("backups"));
        let registry = JsonFileRegistryStore::new(dir.path().join("registry.json"));
        let err = builder
            .snapshot(index, &registry)
            .expect_err("held admin lock must surface as Busy");
        assert!(matches!(err, BackupError::Busy { .. }));
    }
}
