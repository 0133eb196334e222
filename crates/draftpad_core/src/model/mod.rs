//! Domain models shared across core layers.

pub mod entry;
