//! Entry domain model.
//!
//! # Responsibility
//! - Define the canonical journal record persisted in the live store.
//! - Provide validation invoked by every write path.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another entry.
//! - `body` is never empty after trimming.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;
use uuid::Uuid;

/// Stable identifier for every entry.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type EntryId = Uuid;

/// Canonical journal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable global ID used for linking and auditing.
    pub uuid: EntryId,
    /// Free-form entry text.
    pub body: String,
    /// Unix epoch milliseconds at creation time.
    pub created_at_ms: i64,
}

impl Entry {
    /// Creates a new entry with a generated stable ID.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            body: body.into(),
            created_at_ms: epoch_ms_now(),
        }
    }

    /// Validates domain invariants before persistence.
    pub fn validate(&self) -> Result<(), EntryValidationError> {
        if self.body.trim().is_empty() {
            return Err(EntryValidationError::EmptyBody);
        }
        Ok(())
    }
}

/// Validation failures for [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryValidationError {
    EmptyBody,
}

impl Display for EntryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBody => write!(f, "entry body cannot be empty"),
        }
    }
}

impl Error for EntryValidationError {}

/// Current wall-clock time as Unix epoch milliseconds.
pub(crate) fn epoch_ms_now() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::{Entry, EntryValidationError};

    #[test]
    fn new_entry_passes_validation() {
        let entry = Entry::new("hello");
        entry.validate().expect("non-empty body should validate");
        assert!(entry.created_at_ms > 0);
    }

    #[test]
    fn blank_body_is_rejected() {
        let entry = Entry::new("   ");
        assert_eq!(entry.validate(), Err(EntryValidationError::EmptyBody));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(Entry::new("a").uuid, Entry::new("b").uuid);
    }
}
