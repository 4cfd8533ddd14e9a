//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::Workspace;

pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 250;
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 4;
pub const DEFAULT_ENRICH_DELAY_MS: u64 = 200;

/// placeload configuration with layered hierarchy
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Entries committed per batch
    pub batch_size: Option<usize>,

    /// Pause between batches in milliseconds
    pub batch_delay_ms: Option<u64>,

    /// Parallel enrichment lookups per wave
    pub enrich_concurrency: Option<usize>,

    /// Pause between enrichment waves in milliseconds
    pub enrich_delay_ms: Option<u64>,

    /// Default CSV text encoding
    pub encoding: Option<String>,

    /// Editor command for `placeload edit`
    pub editor: Option<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(workspace: Option<&Workspace>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (accessor fallbacks)

        // 2. Global user config (~/.config/placeload/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // 3. Workspace config (.placeload/config.yaml)
        if let Some(ws) = workspace {
            if let Some(local) = Self::read_file(&ws.config_path()) {
                config.merge(local);
            }
        }

        // 4. Environment variables
        if let Some(size) = env_parse("PLACELOAD_BATCH_SIZE") {
            config.batch_size = Some(size);
        }
        if let Some(delay) = env_parse("PLACELOAD_BATCH_DELAY_MS") {
            config.batch_delay_ms = Some(delay);
        }
        if let Ok(editor) = std::env::var("PLACELOAD_EDITOR") {
            config.editor = Some(editor);
        }

        config
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "placeload")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.batch_size.is_some() {
            self.batch_size = other.batch_size;
        }
        if other.batch_delay_ms.is_some() {
            self.batch_delay_ms = other.batch_delay_ms;
        }
        if other.enrich_concurrency.is_some() {
            self.enrich_concurrency = other.enrich_concurrency;
        }
        if other.enrich_delay_ms.is_some() {
            self.enrich_delay_ms = other.enrich_delay_ms;
        }
        if other.encoding.is_some() {
            self.encoding = other.encoding;
        }
        if other.editor.is_some() {
            self.editor = other.editor;
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.filter(|&n| n > 0).unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms.unwrap_or(DEFAULT_BATCH_DELAY_MS))
    }

    pub fn enrich_concurrency(&self) -> usize {
        self.enrich_concurrency
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_ENRICH_CONCURRENCY)
    }

    pub fn enrich_delay(&self) -> Duration {
        Duration::from_millis(self.enrich_delay_ms.unwrap_or(DEFAULT_ENRICH_DELAY_MS))
    }

    /// Get the editor command
    pub fn editor(&self) -> String {
        self.editor
            .clone()
            .or_else(|| std::env::var("EDITOR").ok())
            .or_else(|| std::env::var("VISUAL").ok())
            .unwrap_or_else(|| "vi".to_string())
    }

    /// Run the editor on a file, properly handling commands with arguments
    /// (e.g., "emacsclient -nw" or "code --wait")
    pub fn run_editor(&self, file_path: &Path) -> std::io::Result<std::process::ExitStatus> {
        let editor = self.editor();
        let parts: Vec<&str> = editor.split_whitespace().collect();

        let Some((cmd, args)) = parts.split_first() else {
            return std::process::Command::new("vi").arg(file_path).status();
        };

        std::process::Command::new(cmd)
            .args(args)
            .arg(file_path)
            .status()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
