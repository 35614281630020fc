//! Cache keys and entry states

use crate::error::{ForgeError, ForgeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifies one cache slot: the build output of `module` for `board`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    board: String,
    module: String,
}

impl CacheKey {
    /// Build a key, rejecting components that are not a single path segment
    pub fn new(board: impl Into<String>, module: impl Into<String>) -> ForgeResult<Self> {
        let board = board.into();
        let module = module.into();
        validate_component(&board)?;
        validate_component(&module)?;
        Ok(Self { board, module })
    }

    pub fn board(&self) -> &str {
        &self.board
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Location of this key below the cache root
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.board).join(&self.module)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.board, self.module)
    }
}

/// Why `component` cannot be used as a single path segment, if it cannot
pub(crate) fn segment_problem(component: &str) -> Option<&'static str> {
    if component.is_empty() {
        Some("empty")
    } else if component == "." || component == ".." {
        Some("relative path segment")
    } else if component.starts_with('.') {
        Some("reserved name")
    } else if component.contains(['/', '\\']) {
        Some("contains a path separator")
    } else if component.chars().any(char::is_control) {
        Some("contains a control character")
    } else {
        None
    }
}

fn validate_component(component: &str) -> ForgeResult<()> {
    match segment_problem(component) {
        Some(reason) => Err(ForgeError::InvalidCacheKey {
            component: component.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// State of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Nothing stored for the key
    Miss,
    /// Directory exists without readiness marker (interrupted or foreign write)
    Building,
    /// Marker present, content complete and immutable
    Complete,
}

impl CacheState {
    /// Whether the entry may be read
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Miss => write!(f, "miss"),
            Self::Building => write!(f, "building"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Result of a publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// This call created the ready entry
    Published,
    /// A ready entry already existed (or a concurrent publisher won)
    AlreadyCached,
}

/// Listing row for `fwforge cache list`
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub board: String,
    pub module: String,
    pub state: CacheState,
    pub path: PathBuf,
}
