//! Store coordinator façade owning the live store handles.
//!
//! # Responsibility
//! - Open and own the live store connection for each logical store slot.
//! - Expose the substrate the snapshot builder and restore orchestrator
//!   operate on: slot metadata, the lockable live connection, the per-slot
//!   admin lock, and the application signal surface.
//!
//! # Invariants
//! - Exactly one live connection per slot; it is absent only inside the
//!   detach/reattach window of a restore, while the connection lock is held.
//! - Changes committed through the shared handle by any caller are visible to
//!   the next read with no explicit refresh (single handle + WAL journal).
//! - The admin lock serializes backup and restore per store identity;
//!   contention surfaces as a typed `Busy` error, never silent queuing.

use crate::db::{open_db, open_db_in_memory, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

/// Index addressing one logical store slot on the coordinator.
///
/// The primary application store is slot 0; further slots are an additive
/// extension, not an assumption baked into any operation.
pub type StoreIndex = usize;

/// Conventional name (and registry slot key) of the primary application store.
pub const DEFAULT_STORE_NAME: &str = "draftpad";

const STORE_FILE_EXTENSION: &str = "sqlite3";

/// Signals the presentation layer observes across a restore.
///
/// The generation token is opaque: the only contract is that its value
/// changes when previously fetched data objects must be discarded.
#[derive(Debug)]
pub struct StoreSignals {
    generation: AtomicU64,
    restore_in_progress: AtomicBool,
}

impl StoreSignals {
    fn new() -> Self {
        Self {
            generation: AtomicU64::new(1),
            restore_in_progress: AtomicBool::new(false),
        }
    }

    /// Current generation token value.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// True while a restore holds the store between detach and reattach.
    pub fn restore_in_progress(&self) -> bool {
        self.restore_in_progress.load(Ordering::SeqCst)
    }

    pub(crate) fn set_restore_in_progress(&self, value: bool) {
        self.restore_in_progress.store(value, Ordering::SeqCst);
    }

    pub(crate) fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// One live store slot owned by the coordinator.
pub(crate) struct StoreSlot {
    pub(crate) name: String,
    /// None for in-memory stores; such stores are never backed up.
    pub(crate) path: Option<PathBuf>,
    conn: Mutex<Option<Connection>>,
    admin: Mutex<()>,
    pub(crate) signals: Arc<StoreSignals>,
}

impl StoreSlot {
    /// Tries to take the per-store admin lock without blocking.
    ///
    /// Returns `None` when another backup or restore already holds it.
    pub(crate) fn try_admin(&self) -> Option<MutexGuard<'_, ()>> {
        match self.admin.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Locks the live connection cell, blocking application access while held.
    pub(crate) fn lock_conn(&self) -> MutexGuard<'_, Option<Connection>> {
        lock_unpoisoned(&self.conn)
    }
}

/// Typed access errors for coordinator slots.
#[derive(Debug)]
pub enum StoreError {
    UnknownStore(StoreIndex),
    Detached { store: String },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownStore(index) => write!(f, "no store attached at index {index}"),
            Self::Detached { store } => write!(f, "store `{store}` is currently detached"),
        }
    }
}

impl Error for StoreError {}

/// Façade owning every live store handle for the process.
#[derive(Default)]
pub struct StoreCoordinator {
    slots: Vec<StoreSlot>,
}

impl StoreCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (creating if absent) the store file `<data_dir>/<name>.sqlite3`
    /// and attaches it as a new slot, or attaches an in-memory throwaway
    /// store when `in_memory` is set (tests only; never backed up).
    ///
    /// # Side effects
    /// - Creates `data_dir` when missing.
    /// - Emits `store_open` logging events.
    pub fn open(
        &mut self,
        data_dir: &Path,
        store_name: &str,
        in_memory: bool,
    ) -> DbResult<StoreIndex> {
        let (conn, path) = if in_memory {
            (open_db_in_memory()?, None)
        } else {
            std::fs::create_dir_all(data_dir)?;
            let path = data_dir.join(format!("{store_name}.{STORE_FILE_EXTENSION}"));
            (open_db(&path)?, Some(path))
        };

        self.slots.push(StoreSlot {
            name: store_name.to_string(),
            path,
            conn: Mutex::new(Some(conn)),
            admin: Mutex::new(()),
            signals: Arc::new(StoreSignals::new()),
        });

        let index = self.slots.len() - 1;
        info!(
            "event=store_open module=store status=ok store={store_name} index={index} mode={}",
            if in_memory { "memory" } else { "file" }
        );
        Ok(index)
    }

    /// Opens the live file-backed store, terminating the process on failure.
    ///
    /// A store the application cannot open at startup is an unrecoverable
    /// precondition failure, not a degraded mode.
    pub fn open_or_abort(&mut self, data_dir: &Path, store_name: &str) -> StoreIndex {
        match self.open(data_dir, store_name, false) {
            Ok(index) => index,
            Err(err) => {
                error!(
                    "event=store_open module=store status=fatal store={store_name} error={err}"
                );
                std::process::exit(1);
            }
        }
    }

    /// Number of attached store slots.
    pub fn store_count(&self) -> usize {
        self.slots.len()
    }

    /// Name of the store at `index`.
    pub fn store_name(&self, index: StoreIndex) -> Result<&str, StoreError> {
        Ok(self.require_slot(index)?.name.as_str())
    }

    /// File path of the store at `index`; `None` for in-memory stores.
    pub fn store_path(&self, index: StoreIndex) -> Result<Option<&Path>, StoreError> {
        Ok(self.require_slot(index)?.path.as_deref())
    }

    /// Shared signal surface for the store at `index`.
    pub fn signals(&self, index: StoreIndex) -> Result<Arc<StoreSignals>, StoreError> {
        Ok(Arc::clone(&self.require_slot(index)?.signals))
    }

    /// Runs `f` against the live connection of the store at `index`.
    ///
    /// Blocks while a restore holds the connection lock; callers observe the
    /// store either before detach or after reattach, never in between.
    pub fn with_conn<T>(
        &self,
        index: StoreIndex,
        f: impl FnOnce(&Connection) -> T,
    ) -> Result<T, StoreError> {
        let slot = self.require_slot(index)?;
        let guard = slot.lock_conn();
        match guard.as_ref() {
            Some(conn) => Ok(f(conn)),
            None => Err(StoreError::Detached {
                store: slot.name.clone(),
            }),
        }
    }

    pub(crate) fn slot(&self, index: StoreIndex) -> Option<&StoreSlot> {
        self.slots.get(index)
    }

    fn require_slot(&self, index: StoreIndex) -> Result<&StoreSlot, StoreError> {
        self.slot(index).ok_or(StoreError::UnknownStore(index))
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
