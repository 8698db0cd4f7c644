// ABOUTME: Library root for edgefn - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod api;
pub mod bundle;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod fs;
pub mod import_map;
pub mod output;
pub mod queue;
pub mod retry;
pub mod types;
