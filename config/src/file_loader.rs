//! Reads a [`Config`] from a TOML or YAML document on disk.
//!
//! The format follows the extension: `.toml`, `.yaml` or `.yml`, matched
//! case-insensitively. Sections left out of the file keep their defaults.

use crate::config::Config;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("config file {path} does not exist")]
    FileNotFound { path: PathBuf },

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("{format} config {path} is invalid: {reason}")]
    Parse {
        format: FileFormat,
        path: PathBuf,
        reason: String,
    },

    #[error("config file {path} has no extension")]
    NoExtension { path: PathBuf },

    #[error("unsupported config file extension .{0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FileFormat {
    #[strum(serialize = "TOML")]
    Toml,
    #[strum(serialize = "YAML")]
    Yaml,
}

impl FileFormat {
    /// The format a path's extension names.
    pub fn detect(path: &Path) -> Result<Self, ConfigFileError> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigFileError::NoExtension {
                path: path.to_path_buf(),
            })?;
        match extension.to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(ConfigFileError::UnsupportedFormat(other.to_string())),
        }
    }

    fn parse(self, path: &Path, contents: &str) -> Result<Config, ConfigFileError> {
        let parsed = match self {
            Self::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
        };
        parsed.map_err(|reason| ConfigFileError::Parse {
            format: self,
            path: path.to_path_buf(),
            reason,
        })
    }
}

pub fn load_from_toml(path: &Path) -> Result<Config, ConfigFileError> {
    FileFormat::Toml.parse(path, &read(path)?)
}

pub fn load_from_yaml(path: &Path) -> Result<Config, ConfigFileError> {
    FileFormat::Yaml.parse(path, &read(path)?)
}

/// Detects the format from the extension and parses the file.
///
/// ```rust,no_run
/// let config = config::load_from_file(std::path::Path::new("review.toml"))?;
/// assert!(!config.workspace.team.is_empty());
/// # Ok::<(), config::ConfigFileError>(())
/// ```
pub fn load_from_file(path: &Path) -> Result<Config, ConfigFileError> {
    let format = FileFormat::detect(path)?;
    format.parse(path, &read(path)?)
}

fn read(path: &Path) -> Result<String, ConfigFileError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfigFileError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}
