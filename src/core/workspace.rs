//! Workspace discovery and layout

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::ledger::LedgerStore;

const STATE_DIR: &str = ".placeload";
const STORE_FILE: &str = "places.db";
const LEDGER_DIR: &str = "ledgers";

/// A placeload workspace: any directory containing `.placeload/`
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Directory holding `.placeload/`
    root: PathBuf,
}

impl Workspace {
    /// Find the workspace by walking up from the current directory
    pub fn discover() -> Result<Self, WorkspaceError> {
        let current = std::env::current_dir()
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find the workspace by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, WorkspaceError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        loop {
            if current.join(STATE_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(WorkspaceError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new workspace at the given path
    pub fn init(path: &Path, force: bool) -> Result<Self, WorkspaceError> {
        let root = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        let state_dir = root.join(STATE_DIR);
        if state_dir.exists() && !force {
            return Err(WorkspaceError::AlreadyExists(root));
        }

        std::fs::create_dir_all(state_dir.join(LEDGER_DIR))
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        let config_path = state_dir.join("config.yaml");
        if force || !config_path.exists() {
            std::fs::write(&config_path, Self::default_config())
                .map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        }

        Ok(Self { root })
    }

    fn default_config() -> &'static str {
        r#"# placeload workspace configuration

# Entries committed per batch; entries inside a batch run concurrently
# batch_size: 25

# Pause between batches, in milliseconds
# batch_delay_ms: 250

# Parallel enrichment lookups per wave, and the pause between waves
# enrich_concurrency: 4
# enrich_delay_ms: 200

# Default text encoding for CSV sources (utf-8, windows-1251, iso-8859-1)
# encoding: utf-8

# Editor used by `placeload edit` (default: $EDITOR)
# editor: ""
"#
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.placeload/` state directory
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join("config.yaml")
    }

    pub fn store_path(&self) -> PathBuf {
        self.state_dir().join(STORE_FILE)
    }

    pub fn ledgers(&self) -> LedgerStore {
        LedgerStore::new(self.state_dir().join(LEDGER_DIR))
    }
}

/// Errors that can occur during workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("not a placeload workspace (searched from {searched_from:?}). Run 'placeload init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("placeload workspace already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}
