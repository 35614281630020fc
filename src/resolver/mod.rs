//! Module identifier resolution
//!
//! Build requests name modules by opaque numeric id; the toolchain needs
//! their canonical names. Resolution goes through the `ModuleResolver`
//! trait so the backing store can be swapped.

mod registry;

pub use registry::ModuleRegistry;

use crate::error::ForgeResult;
use async_trait::async_trait;
use std::collections::HashMap;

/// Opaque module identifier as sent by clients
pub type ModuleId = i64;

/// A module id paired with its resolved name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    pub id: ModuleId,
    pub name: String,
}

/// Lookup service from module id to canonical name
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// Resolve `id`, returning `None` when the store has no such module
    async fn resolve(&self, id: ModuleId) -> ForgeResult<Option<String>>;
}

/// Resolver over a fixed in-memory map
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    names: HashMap<ModuleId, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a mapping
    pub fn with(mut self, id: ModuleId, name: impl Into<String>) -> Self {
        self.names.insert(id, name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(ModuleId, String)> for StaticResolver {
    fn from_iter<I: IntoIterator<Item = (ModuleId, String)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ModuleResolver for StaticResolver {
    async fn resolve(&self, id: ModuleId) -> ForgeResult<Option<String>> {
        Ok(self.names.get(&id).cloned())
    }
}
