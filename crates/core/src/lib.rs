//! Droidcase core - project configuration and shared types
//!
//! This crate provides the typed view of a droidcase project: the
//! droidcase.toml manifest, its validation rules, and the error types
//! shared by the command-line front end.

pub mod config;
pub mod error;

pub use config::{find_config, AndroidSettings, AppSpec, ProjectConfig, RunSettings, CONFIG_FILE_NAME};
pub use error::{ConfigError, Result};
