//! Per-request workspace allocation and guaranteed cleanup

use crate::config::schema::WorkspaceConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::fsutil::remove_tree;
use crate::manifest::relative_base;
use crate::package::bin_dir;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Where workspaces are allocated
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    /// Root of the firmware source tree
    pub project_root: PathBuf,
    /// Applications directory, relative to `project_root`
    pub apps_dir: PathBuf,
    /// Parent of per-session temp directories
    pub temp_root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(
        project_root: impl Into<PathBuf>,
        apps_dir: impl Into<PathBuf>,
        temp_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            apps_dir: apps_dir.into(),
            temp_root: temp_root.into(),
        }
    }

    pub fn from_config(config: &WorkspaceConfig) -> Self {
        let temp_root = config
            .temp_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("fwforge"));
        Self::new(config.project_root.clone(), config.apps_dir.clone(), temp_root)
    }

    /// Directory that holds every generated application
    pub fn apps_parent(&self) -> PathBuf {
        self.project_root.join(&self.apps_dir)
    }

    /// `RIOTBASE` as seen from an application directory
    pub fn relative_base(&self) -> String {
        relative_base(&self.apps_dir)
    }
}

/// Directories owned by one build session.
///
/// Removed by `release`, or on drop if the session is abandoned.
#[derive(Debug)]
pub struct Workspace {
    token: Uuid,
    application: String,
    app_dir: PathBuf,
    temp_dir: PathBuf,
    released: bool,
}

impl Workspace {
    /// Allocate a fresh workspace under `layout`
    pub async fn create(layout: &WorkspaceLayout) -> ForgeResult<Self> {
        let token = Uuid::new_v4();
        let application = format!("application{}", token.simple());

        let parent = layout.apps_parent();
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| ForgeError::WorkspaceCreate {
                path: parent.clone(),
                source: e,
            })?;

        // create_dir, not create_dir_all: an existing directory is a collision
        let app_dir = parent.join(&application);
        fs::create_dir(&app_dir)
            .await
            .map_err(|e| ForgeError::WorkspaceCreate {
                path: app_dir.clone(),
                source: e,
            })?;

        let workspace = Self {
            token,
            application,
            app_dir,
            temp_dir: layout.temp_root.join(token.simple().to_string()),
            released: false,
        };

        fs::create_dir_all(&workspace.temp_dir)
            .await
            .map_err(|e| ForgeError::WorkspaceCreate {
                path: workspace.temp_dir.clone(),
                source: e,
            })?;

        debug!(
            "Allocated workspace {} at {}",
            workspace.token,
            workspace.app_dir.display()
        );
        Ok(workspace)
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Logical application name, derived from the token
    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Build output directory for `board`
    pub fn bin_dir(&self, board: &str) -> PathBuf {
        bin_dir(&self.app_dir, board)
    }

    /// Remove the workspace directories. Failures are logged only.
    pub fn release(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        for dir in [&self.app_dir, &self.temp_dir] {
            if let Err(e) = remove_tree(dir) {
                warn!("Failed to remove {}: {}", dir.display(), e);
            }
        }
        debug!("Released workspace {}", self.token);
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            debug!("Workspace {} dropped without release", self.token);
            self.cleanup();
        }
    }
}
