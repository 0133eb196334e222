//! Backup registry value object and persistence collaborators.
//!
//! # Responsibility
//! - Track the latest artifact filename per store slot (last write wins).
//! - Keep the known-backup descriptor list used for display.
//! - Persist registry state through a narrow load/save collaborator.
//!
//! # Invariants
//! - At most one latest entry per slot; entries are overwritten, never merged.
//! - A missing persistence file loads as the empty registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

/// Descriptor for one known backup, kept for display purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDescriptor {
    /// Source store slot name.
    pub slot: String,
    /// Artifact filename within the backup directory.
    pub file_name: String,
    /// Unix epoch milliseconds at creation time.
    pub created_at_ms: i64,
}

/// Registry mapping store slots to their most recent backup artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRegistry {
    latest: BTreeMap<String, String>,
    known: Vec<BackupDescriptor>,
}

impl BackupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest artifact filename recorded for `slot`.
    pub fn latest_for(&self, slot: &str) -> Option<&str> {
        self.latest.get(slot).map(String::as_str)
    }

    /// Records a backup, overwriting the slot's previous latest entry.
    ///
    /// Same-second backups collide on filename by design; the descriptor
    /// list is deduplicated on (slot, file_name) so it never grows stale
    /// duplicates.
    pub fn record(&mut self, descriptor: BackupDescriptor) {
        self.latest
            .insert(descriptor.slot.clone(), descriptor.file_name.clone());
        self.known
            .retain(|known| !(known.slot == descriptor.slot && known.file_name == descriptor.file_name));
        self.known.push(descriptor);
    }

    /// Known backups in recording order.
    pub fn known(&self) -> &[BackupDescriptor] {
        &self.known
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty() && self.known.is_empty()
    }
}

/// Registry persistence errors.
#[derive(Debug)]
pub enum RegistryError {
    Io(io::Error),
    Serde(serde_json::Error),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Serde(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Serde(err) => Some(err),
        }
    }
}

impl From<io::Error> for RegistryError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Narrow persistence seam the core depends on.
pub trait RegistryStore {
    fn load(&self) -> Result<BackupRegistry, RegistryError>;
    fn save(&self, registry: &BackupRegistry) -> Result<(), RegistryError>;
}

/// Registry persisted as one well-known JSON file.
pub struct JsonFileRegistryStore {
    path: PathBuf,
}

impl JsonFileRegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RegistryStore for JsonFileRegistryStore {
    fn load(&self) -> Result<BackupRegistry, RegistryError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BackupRegistry::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, registry: &BackupRegistry) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(registry)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
