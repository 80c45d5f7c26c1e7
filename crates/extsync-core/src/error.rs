//! Error types for extsync-core

use thiserror::Error;

/// Result type alias using extsync-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for extsync
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Extension identifier not in `publisher.name` form
    #[error("Invalid extension id: {id} (expected publisher.name)")]
    InvalidExtensionId { id: String },

    /// Unknown editor name
    #[error("Unknown editor: {editor}. Valid editors: vscode, vscode-insiders, cursor, windsurf, vscodium")]
    InvalidEditor { editor: String },

    /// Home directory could not be determined
    #[error("Could not determine home directory")]
    NoHomeDir,
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid extension id error
    pub fn invalid_extension_id(id: impl Into<String>) -> Self {
        Self::InvalidExtensionId { id: id.into() }
    }

    /// Create an invalid editor error
    pub fn invalid_editor(editor: impl Into<String>) -> Self {
        Self::InvalidEditor {
            editor: editor.into(),
        }
    }
}
