//! Configuration management module
//!
//! Per-binary TOML settings, following the teacher's `config.rs` pattern of
//! nested structs with `#[serde(default = "...")]` per field.

mod config;

pub use config::*;
