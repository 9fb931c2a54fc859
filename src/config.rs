//! Compiler configuration, loaded from a JSON file.

use crate::value::DateFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    Missing(String),
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Invalid {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads and deserializes a JSON file, reporting the path on failure.
pub(crate) fn read_json<T, P>(path: P) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path_ref = path.as_ref();
    let display = path_ref.display().to_string();

    if !path_ref.exists() {
        return Err(ConfigError::Missing(display));
    }
    let content = fs::read_to_string(path_ref)
        .map_err(|source| ConfigError::Read { path: display.clone(), source })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Invalid { path: display, source })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Query field whose values name entity types.
    pub type_field: String,
    /// Field name of the membership rule produced for type constraints.
    pub types_rule_field: String,
    /// Field used for values written without a `field:` prefix.
    pub default_field: String,
    /// Pattern used to recognise dates in range bounds and typed properties.
    pub date_format: DateFormat,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            type_field: "type".to_string(),
            types_rule_field: "types".to_string(),
            default_field: "text".to_string(),
            date_format: DateFormat::default(),
        }
    }
}

impl CompilerConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_json(path)
    }
}
