//! Backend implementations for PostStore
//!
//! - `memory`: in-process store, used by tests and dry runs
//! - `sqlite`: SQLite-based backend (default, requires `sqlite` feature)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;
