//! Idempotency module
//!
//! Suppresses double submission of identical mutating requests inside a
//! short window. Process-local: a restart forgets every key.

mod guard;

pub use guard::{DuplicateGuard, RequestKey, DEFAULT_WINDOW_MS};
