//! Configuration file support.
//!
//! Read from `<config dir>/gtp-sync/config.toml` unless a path is given.
//! A missing file yields the defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub sync: SyncOptions,
}

/// How to launch the engine subprocess.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Per-command response timeout; `None` waits forever.
    pub timeout_secs: Option<u64>,
}

impl EngineConfig {
    /// Split a shell-like command line (`gnugo --mode gtp`) on whitespace.
    pub fn from_command_line(line: &str) -> Self {
        let mut parts = line.split_whitespace().map(str::to_string);
        Self {
            command: parts.next().unwrap_or_default(),
            args: parts.collect(),
            ..Default::default()
        }
    }

    /// Replace the program and its arguments, keeping `working_dir` and
    /// `timeout_secs`.
    pub fn set_command_line(&mut self, line: &str) {
        let parsed = Self::from_command_line(line);
        self.command = parsed.command;
        self.args = parsed.args;
    }
}

/// Toggles for the batch command paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Use `gg-undo N` when the engine has it.
    pub batch_undo: bool,
    /// Use `gogui-play_sequence`/`play_sequence` when the engine has it.
    pub batch_play: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_undo: true,
            batch_play: true,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gtp-sync").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from `path`, or from the default location when `None`.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }
}
