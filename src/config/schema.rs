//! Configuration schema for fwforge
//!
//! Configuration is stored at `~/.config/fwforge/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Where build workspaces are allocated
    pub workspace: WorkspaceConfig,

    /// External build toolchain
    pub toolchain: ToolchainConfig,

    /// Module artifact cache
    pub cache: CacheConfig,

    /// Module id to name registry
    pub registry: RegistryConfig,

    /// Output archive settings
    pub package: PackageConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Workspace layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root of the firmware source tree (RIOTBASE)
    pub project_root: PathBuf,

    /// Directory, relative to `project_root`, holding generated applications
    pub apps_dir: PathBuf,

    /// Parent of per-session temp directories (system temp dir when unset)
    pub temp_root: Option<PathBuf>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("RIOT"),
            apps_dir: PathBuf::from("generated_by_fwforge"),
            temp_root: None,
        }
    }
}

/// Toolchain invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Program to run inside the application directory
    pub program: String,

    /// Extra arguments appended after `BOARD=<board>`
    pub args: Vec<String>,

    /// Kill the toolchain after this many seconds (unset = no limit)
    pub timeout_secs: Option<u64>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: "make".to_string(),
            args: vec![],
            timeout_secs: None,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Allow requests to use the module cache (default: true)
    pub enabled: bool,

    /// Cache root directory (data dir when unset)
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

/// Module registry location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// TOML file mapping module ids to names (config dir when unset)
    pub path: Option<PathBuf>,
}

/// Output archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// Gzip the archive (`tar.gz` instead of `tar`)
    pub compress: bool,

    /// Project-relative paths shipped next to the application.
    /// `{board}` expands to the requested board.
    pub include: Vec<String>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            compress: false,
            include: vec![
                "Makefile.include".to_string(),
                "Makefile.base".to_string(),
                "Makefile.dep".to_string(),
                "makefiles".to_string(),
                "dist/tools".to_string(),
                "boards/{board}".to_string(),
            ],
        }
    }
}
