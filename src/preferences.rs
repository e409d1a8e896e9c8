//! User preferences persisted next to the dashboard's other local state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Preferences {
    pub dark_mode: bool,
}

impl Preferences {
    /// Read preferences from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, PreferencesError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(PreferencesError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| PreferencesError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), PreferencesError> {
        let io_err = |source: io::Error| PreferencesError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = serde_json::to_string_pretty(self).map_err(|source| PreferencesError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, body).map_err(io_err)
    }

    /// Flip dark mode and persist the result.
    pub fn toggle_dark_mode(&mut self, path: &Path) -> Result<bool, PreferencesError> {
        self.dark_mode = !self.dark_mode;
        self.save(path)?;
        tracing::debug!("dark mode set to {}", self.dark_mode);
        Ok(self.dark_mode)
    }
}
