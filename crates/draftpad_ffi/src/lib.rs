//! FFI crate exposing DraftPad core use-cases to the UI runtime.

mod api;

pub use api::*;
