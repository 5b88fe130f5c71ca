//! Error types for imesync-core

use camino::Utf8PathBuf;
use thiserror::Error;

/// Result type alias using imesync-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every imesync crate
#[derive(Error, Debug)]
pub enum Error {
    /// Structurally invalid configuration or patch document
    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    /// Expected file is absent
    #[error("File not found: {path}")]
    NotFound { path: Utf8PathBuf },

    /// Saving a document failed; the previous file is untouched
    #[error("Failed to write {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure during a copy or directory operation
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Sync source missing or unreadable
    #[error("Source directory is not readable: {path}")]
    SourceNotReadable { path: Utf8PathBuf },

    /// Sync destination cannot be written
    #[error("No write permission at {path}")]
    DestinationNotWritable { path: Utf8PathBuf },

    /// Deselecting would empty the schema selection
    #[error("Cannot deselect {schema}: at least one input schema must stay selected")]
    LastSchema { schema: String },

    /// A schema selection was built without any schema
    #[error("Schema selection cannot be empty")]
    EmptySchemaSelection,

    /// Cloud mirror path is not writable
    #[error("Cloud mirror is not writable: {path}")]
    CloudUnwritable { path: Utf8PathBuf },

    /// Cloud mirror requested but no cloud root is configured
    #[error("Cloud storage is not configured")]
    CloudNotConfigured,

    /// Another deploy/sync/reset/backup/restore holds the operation lock
    #[error("Another operation is in progress: {operation}")]
    OperationInProgress { operation: String },

    /// Staging or archiving a backup failed
    #[error("Backup failed: {message}")]
    Backup { message: String },

    /// Archive malformed or restore failed
    #[error("Restore failed: {message}")]
    Restore { message: String },

    /// A filter pattern is not a valid regular expression
    #[error("Invalid filter pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A destructive replace failed after the destination was touched
    #[error("Replacing {path} did not complete, deployment may be incomplete, please retry: {source}")]
    IncompleteReplace {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external input engine reported failure
    #[error("Input engine {operation} failed: {message}")]
    Engine { operation: String, message: String },

    /// The operation exceeded its time budget
    #[error("{operation} timed out after {seconds}s")]
    TimedOut { operation: String, seconds: u64 },

    /// Runtime settings could not be loaded
    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    /// Role has no location in the given storage domain
    #[error("Directory role {role} is not available in the {domain} domain")]
    RoleNotInDomain { role: String, domain: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a decode error
    pub fn decode(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a not found error
    pub fn not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a write error
    pub fn write(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Create a filesystem error
    pub fn filesystem(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Create a backup error
    pub fn backup(message: impl Into<String>) -> Self {
        Self::Backup {
            message: message.into(),
        }
    }

    /// Create a restore error
    pub fn restore(message: impl Into<String>) -> Self {
        Self::Restore {
            message: message.into(),
        }
    }

    /// Create an engine error
    pub fn engine(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an invalid settings error
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: message.into(),
        }
    }

    /// Create an operation in progress error
    pub fn operation_in_progress(operation: impl Into<String>) -> Self {
        Self::OperationInProgress {
            operation: operation.into(),
        }
    }

    /// True for failures that may have left a directory root empty or partially populated
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::IncompleteReplace { .. })
    }

    /// True when the expected file simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Human-readable failure dialog text
    pub fn user_message(&self) -> String {
        match self {
            Self::DestinationNotWritable { path } => format!("No write permission at {}", path),
            Self::IncompleteReplace { path, .. } => format!(
                "Deployment may be incomplete ({} was only partially updated), please retry",
                path
            ),
            Self::OperationInProgress { operation } => {
                format!("Please wait, {} is still running", operation)
            }
            Self::TimedOut { operation, .. } => {
                format!("{} took too long and was stopped, please retry", operation)
            }
            other => other.to_string(),
        }
    }
}
