//! Adapters that live inside the core crate for convenience.
//!
//! Real storage adapters (SQLite, ...) live in separate crates.

pub mod memory;
