//! Project discovery for Droidcase
//!
//! Finds and loads the droidcase.toml manifest that anchors every command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use droidcase_core::{find_config, ProjectConfig};
use tracing::debug;

/// A located and parsed Droidcase project
pub struct Project {
    /// Directory containing droidcase.toml
    pub root: PathBuf,
    /// The parsed manifest
    pub config: ProjectConfig,
}

impl Project {
    /// Load the project from an explicit directory, or walk up from the
    /// working directory until a manifest is found.
    pub async fn locate(explicit: Option<&Path>) -> Result<Self> {
        let start = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::current_dir().context("cannot determine the working directory")?,
        };

        let manifest = find_config(&start)?;
        debug!("Loading project manifest {}", manifest.display());
        let config = ProjectConfig::load(&manifest).await?;

        let root = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(start);
        Ok(Self { root, config })
    }

    /// The Android application ID of the project's app.
    pub fn application_id(&self) -> String {
        self.config.app.application_id()
    }
}
