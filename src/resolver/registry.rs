//! TOML-file module registry
//!
//! ```toml
//! [[module]]
//! id = 1
//! name = "shell"
//!
//! [[module]]
//! id = 2
//! name = "ps"
//! ```

use super::{ModuleId, ModuleResolver};
use crate::error::{ForgeError, ForgeResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "module")]
    modules: Vec<RegistryRow>,
}

#[derive(Debug, Deserialize)]
struct RegistryRow {
    id: ModuleId,
    name: String,
}

/// Module registry loaded once from a TOML file and held for the builder's lifetime
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    path: PathBuf,
    names: HashMap<ModuleId, String>,
}

impl ModuleRegistry {
    /// Load the registry at `path`
    pub async fn load(path: &Path) -> ForgeResult<Self> {
        if !path.exists() {
            return Err(ForgeError::RegistryNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ForgeError::io(format!("reading registry {}", path.display()), e))?;

        let registry = Self::parse(path, &content)?;
        debug!(
            "Loaded {} modules from {}",
            registry.names.len(),
            path.display()
        );
        Ok(registry)
    }

    fn parse(path: &Path, content: &str) -> ForgeResult<Self> {
        let invalid = |reason: String| ForgeError::RegistryInvalid {
            path: path.to_path_buf(),
            reason,
        };

        let file: RegistryFile = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;

        let mut names = HashMap::with_capacity(file.modules.len());
        for row in file.modules {
            if row.name.trim().is_empty() {
                return Err(invalid(format!("module {} has an empty name", row.id)));
            }
            if names.insert(row.id, row.name).is_some() {
                return Err(invalid(format!("module id {} listed twice", row.id)));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            names,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[async_trait]
impl ModuleResolver for ModuleRegistry {
    async fn resolve(&self, id: ModuleId) -> ForgeResult<Option<String>> {
        Ok(self.names.get(&id).cloned())
    }
}
