//! Persistence repositories over the live store.

pub mod entry_repo;
