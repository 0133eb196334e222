//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Own the process-wide live store coordinator and backup collaborators.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - The live store is opened exactly once per process; an unrecoverable
//!   open error at startup terminates the process by design.
//! - No UI code may dereference store-derived objects while
//!   `restore_status().restore_in_progress` is raised; the generation token
//!   changing is the signal to rebuild all derived state.

use draftpad_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    Entry, EntryRepository, JsonFileRegistryStore, RegistryStore, RestoreOrchestrator,
    SnapshotBuilder, SqliteEntryRepository, StoreCoordinator, StoreIndex, DEFAULT_STORE_NAME,
};
use log::info;
use std::path::PathBuf;
use std::sync::OnceLock;

const REGISTRY_FILE_NAME: &str = "backup_registry.json";
const BACKUP_DIR_NAME: &str = "backups";

static APP: OnceLock<AppState> = OnceLock::new();

struct AppState {
    coordinator: StoreCoordinator,
    store: StoreIndex,
    backup_dir: PathBuf,
    registry: JsonFileRegistryStore,
}

impl AppState {
    fn bootstrap() -> Self {
        let data_dir = resolve_data_dir();
        let mut coordinator = StoreCoordinator::new();
        // Startup invariant: the application cannot run without its store.
        let store = coordinator.open_or_abort(&data_dir, DEFAULT_STORE_NAME);
        info!(
            "event=ffi_bootstrap module=ffi status=ok data_dir={}",
            data_dir.display()
        );
        Self {
            coordinator,
            store,
            backup_dir: data_dir.join(BACKUP_DIR_NAME),
            registry: JsonFileRegistryStore::new(data_dir.join(REGISTRY_FILE_NAME)),
        }
    }
}

fn app() -> &'static AppState {
    APP.get_or_init(AppState::bootstrap)
}

fn resolve_data_dir() -> PathBuf {
    if let Ok(raw) = std::env::var("DRAFTPAD_DATA_DIR") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::temp_dir().join("draftpad")
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Sync call; may perform small file-system setup work.
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Response envelope for the explicit store-open call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOpenResponse {
    pub ok: bool,
    /// Name of the primary store slot.
    pub store_name: String,
    /// Absolute live store file path.
    pub store_path: Option<String>,
    pub message: String,
}

/// Opens the primary live store, or reports the already-open store.
///
/// The store is opened at most once per process; repeated calls return the
/// same slot. An unrecoverable open error at startup terminates the process
/// instead of returning a degraded handle.
///
/// # FFI contract
/// - Sync call; first call performs file-system and migration work.
/// - Idempotent; never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn open_primary_store() -> StoreOpenResponse {
    let state = app();
    match state.coordinator.store_name(state.store) {
        Ok(name) => StoreOpenResponse {
            ok: true,
            store_name: name.to_string(),
            store_path: state
                .coordinator
                .store_path(state.store)
                .ok()
                .flatten()
                .map(|path| path.display().to_string()),
            message: "Store open.".to_string(),
        },
        Err(err) => StoreOpenResponse {
            ok: false,
            store_name: String::new(),
            store_path: None,
            message: format!("open_primary_store failed: {err}"),
        },
    }
}

/// Generic action response envelope for entry command flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryActionResponse {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Optional created entry ID.
    pub entry_id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

/// One entry row projected for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryItem {
    pub entry_id: String,
    pub body: String,
    pub created_at_ms: i64,
}

/// Response envelope for entry listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryListResponse {
    pub items: Vec<EntryItem>,
    pub message: String,
}

/// Creates a journal entry in the live store.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn entry_add(body: String) -> EntryActionResponse {
    let state = app();
    let result = state.coordinator.with_conn(state.store, |conn| {
        SqliteEntryRepository::new(conn).create_entry(&Entry::new(body.trim().to_string()))
    });
    match result {
        Ok(Ok(entry_id)) => EntryActionResponse {
            ok: true,
            entry_id: Some(entry_id.to_string()),
            message: "Entry created.".to_string(),
        },
        Ok(Err(err)) => EntryActionResponse {
            ok: false,
            entry_id: None,
            message: format!("entry_add failed: {err}"),
        },
        Err(err) => EntryActionResponse {
            ok: false,
            entry_id: None,
            message: format!("entry_add failed: {err}"),
        },
    }
}

/// Lists journal entries in creation order.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn entry_list() -> EntryListResponse {
    let state = app();
    let result = state
        .coordinator
        .with_conn(state.store, |conn| {
            SqliteEntryRepository::new(conn).list_entries()
        });
    match result {
        Ok(Ok(entries)) => EntryListResponse {
            message: format!("Found {} entr(y/ies).", entries.len()),
            items: entries
                .into_iter()
                .map(|entry| EntryItem {
                    entry_id: entry.uuid.to_string(),
                    body: entry.body,
                    created_at_ms: entry.created_at_ms,
                })
                .collect(),
        },
        Ok(Err(err)) => EntryListResponse {
            items: Vec::new(),
            message: format!("entry_list failed: {err}"),
        },
        Err(err) => EntryListResponse {
            items: Vec::new(),
            message: format!("entry_list failed: {err}"),
        },
    }
}

/// Response envelope for the backup command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupActionResponse {
    pub ok: bool,
    /// Created artifact filename on success.
    pub file_name: Option<String>,
    pub message: String,
}

/// Response envelope for the restore command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreActionResponse {
    pub ok: bool,
    /// New generation token value on success.
    pub generation: Option<u64>,
    pub message: String,
}

/// One known backup projected for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupItem {
    pub slot: String,
    pub file_name: String,
    pub created_at_ms: i64,
}

/// Response envelope for backup listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupListResponse {
    pub items: Vec<BackupItem>,
    pub message: String,
}

/// Signals the presentation layer polls around a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreStatusResponse {
    pub restore_in_progress: bool,
    pub generation: u64,
}

/// Takes a hot backup of the live store.
///
/// The live store keeps serving reads and writes while the backup runs.
///
/// # FFI contract
/// - Sync call; performs file I/O proportional to store size.
/// - Never panics; failures leave the live store completely untouched.
#[flutter_rust_bridge::frb(sync)]
pub fn backup_now() -> BackupActionResponse {
    let state = app();
    let builder = SnapshotBuilder::new(&state.coordinator, &state.backup_dir);
    match builder.snapshot(state.store, &state.registry) {
        Ok(artifact) => BackupActionResponse {
            ok: true,
            file_name: Some(artifact.file_name),
            message: "Backup created.".to_string(),
        },
        Err(err) => BackupActionResponse {
            ok: false,
            file_name: None,
            message: format!("backup_now failed: {err}"),
        },
    }
}

/// Restores the live store from its most recent registered backup.
///
/// The UI must treat every previously fetched object as invalid once the
/// returned generation is observed. When the failure happened after the
/// replace phase began, the message instructs the user to restart the
/// application; validation and contention failures do not.
///
/// # FFI contract
/// - Sync call; blocks application store access for the swap window.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn restore_latest() -> RestoreActionResponse {
    let state = app();
    let orchestrator = RestoreOrchestrator::new(&state.coordinator, &state.backup_dir);
    match orchestrator.restore_latest(state.store, &state.registry) {
        Ok(outcome) => RestoreActionResponse {
            ok: true,
            generation: Some(outcome.generation),
            message: "Restore complete. Reload all views.".to_string(),
        },
        Err(err) => RestoreActionResponse {
            ok: false,
            generation: None,
            message: restore_failure_message(&err),
        },
    }
}

/// Failure message for the restore command.
///
/// The restart instruction applies only once the replace phase has started;
/// validation and contention failures leave the live store untouched and must
/// not scare the user into restarting.
fn restore_failure_message(err: &draftpad_core::BackupError) -> String {
    match err {
        draftpad_core::BackupError::CopyStore { .. } => {
            format!("restore_latest failed: {err}; please restart the application")
        }
        _ => format!("restore_latest failed: {err}"),
    }
}

/// Lists known backups for display.
///
/// # FFI contract
/// - Sync call; reads the persisted backup registry.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn list_backups() -> BackupListResponse {
    let state = app();
    match state.registry.load() {
        Ok(registry) => BackupListResponse {
            message: format!("{} known backup(s).", registry.known().len()),
            items: registry
                .known()
                .iter()
                .map(|descriptor| BackupItem {
                    slot: descriptor.slot.clone(),
                    file_name: descriptor.file_name.clone(),
                    created_at_ms: descriptor.created_at_ms,
                })
                .collect(),
        },
        Err(err) => BackupListResponse {
            items: Vec::new(),
            message: format!("list_backups failed: {err}"),
        },
    }
}

/// Returns the restore-in-progress flag and current generation token.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn restore_status() -> RestoreStatusResponse {
    let state = app();
    match state.coordinator.signals(state.store) {
        Ok(signals) => RestoreStatusResponse {
            restore_in_progress: signals.restore_in_progress(),
            generation: signals.generation(),
        },
        Err(_) => RestoreStatusResponse {
            restore_in_progress: false,
            generation: 0,
        },
    }
}
