//! Error types for fwforge
//!
//! All modules use `ForgeResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fwforge operations
pub type ForgeResult<T> = Result<T, ForgeError>;

/// All errors that can occur in fwforge
#[derive(Error, Debug)]
pub enum ForgeError {
    // Request errors
    #[error("Invalid build request: {0}")]
    InvalidRequest(String),

    #[error("Module {id} could not be resolved")]
    ModuleResolution { id: i64 },

    #[error("Module registry {path} is invalid: {reason}")]
    RegistryInvalid { path: PathBuf, reason: String },

    #[error("Module registry not found: {0}")]
    RegistryNotFound(PathBuf),

    // Workspace errors
    #[error("Failed to create workspace directory {path}: {source}")]
    WorkspaceCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WorkspaceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid session transition from {from} to {to}")]
    SessionTransition { from: String, to: String },

    // Toolchain errors
    #[error("Failed to start toolchain: {command}")]
    ToolchainSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Cache errors
    #[error("Invalid cache key component {component:?}: {reason}")]
    InvalidCacheKey { component: String, reason: String },

    #[error("Failed to publish {board}/{module} to cache: {reason}")]
    CachePublish {
        board: String,
        module: String,
        reason: String,
    },

    // Packaging errors
    #[error("Packaging failed: {0}")]
    Packaging(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Build failed for board {0}")]
    BuildFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a workspace write error
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WorkspaceWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a cache publish error
    pub fn publish(
        board: impl Into<String>,
        module: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::CachePublish {
            board: board.into(),
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error happened before the toolchain could run
    pub fn is_preparation(&self) -> bool {
        matches!(
            self,
            Self::ModuleResolution { .. }
                | Self::WorkspaceCreate { .. }
                | Self::WorkspaceWrite { .. }
                | Self::InvalidRequest(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RegistryNotFound(_) => {
                Some("Set registry.path in the config or pass --registry")
            }
            Self::ModuleResolution { .. } => Some("Check the module ids in the registry file"),
            Self::ToolchainSpawn { .. } => Some("Check toolchain.program in the config"),
            Self::WorkspaceCreate { .. } => Some("Check workspace.project_root in the config"),
            _ => None,
        }
    }
}
