//! Filesystem-backed module artifact cache
//!
//! Entries live at `<root>/<board>/<module>/` and become visible only
//! through a rename of a fully staged directory that already carries the
//! readiness marker. A directory at the key path without the marker is
//! never read.

use crate::cache::entry::{CacheEntryInfo, CacheKey, CacheState, PublishOutcome};
use crate::error::{ForgeError, ForgeResult};
use crate::fsutil::{copy_tree, remove_tree};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Zero-byte file marking an entry as complete
pub const READY_MARKER: &str = ".ready_to_use";

/// Private area for in-flight publishes, on the same filesystem as the entries
const STAGING_DIR: &str = ".staging";

/// Append-only store of per-(board, module) build outputs
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Open a cache rooted at `root`. Nothing is created until the first publish.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Path of the ready entry for `(board, module)`, if any
    pub fn get(&self, board: &str, module: &str) -> ForgeResult<Option<PathBuf>> {
        let key = CacheKey::new(board, module)?;
        Ok(self.get_key(&key))
    }

    fn get_key(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.entry_path(key);
        if path.join(READY_MARKER).is_file() {
            Some(path)
        } else {
            None
        }
    }

    /// Current state of the slot for `(board, module)`
    pub fn state(&self, board: &str, module: &str) -> ForgeResult<CacheState> {
        let key = CacheKey::new(board, module)?;
        Ok(state_of(&self.entry_path(&key)))
    }

    /// Publish the contents of `source` as the entry for `(board, module)`.
    ///
    /// First writer wins: once an entry is ready it is never replaced.
    pub fn put(&self, source: &Path, board: &str, module: &str) -> ForgeResult<PublishOutcome> {
        let key = CacheKey::new(board, module)?;

        if self.get_key(&key).is_some() {
            debug!("Cache entry {} already ready, skipping publish", key);
            return Ok(PublishOutcome::AlreadyCached);
        }

        if !source.is_dir() {
            return Err(ForgeError::publish(
                board,
                module,
                format!("{} is not a directory", source.display()),
            ));
        }

        let staging = self
            .root
            .join(STAGING_DIR)
            .join(Uuid::new_v4().simple().to_string());

        let result = self.stage_and_commit(&key, source, &staging);

        // After a successful commit the staging dir is gone already
        if let Err(e) = remove_tree(&staging) {
            warn!("Failed to remove cache staging dir {}: {}", staging.display(), e);
        }

        if let Ok(PublishOutcome::Published) = result {
            info!("Cached module {}", key);
        }
        result
    }

    fn stage_and_commit(
        &self,
        key: &CacheKey,
        source: &Path,
        staging: &Path,
    ) -> ForgeResult<PublishOutcome> {
        let fail = |e: io::Error| ForgeError::publish(key.board(), key.module(), e);

        copy_tree(source, staging, &[READY_MARKER]).map_err(fail)?;
        fs::File::create(staging.join(READY_MARKER)).map_err(fail)?;

        let dest = self.entry_path(key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(fail)?;
        }

        match fs::rename(staging, &dest) {
            Ok(()) => return Ok(PublishOutcome::Published),
            Err(e) if !dest.exists() => return Err(fail(e)),
            Err(_) => {}
        }

        // Something occupies the key path: a concurrent winner or a stale
        // unready directory.
        if self.get_key(key).is_some() {
            debug!("Lost publish race for {}, discarding staged copy", key);
            return Ok(PublishOutcome::AlreadyCached);
        }

        self.discard_stale(key, &dest)?;

        match fs::rename(staging, &dest) {
            Ok(()) => Ok(PublishOutcome::Published),
            Err(_) if self.get_key(key).is_some() => Ok(PublishOutcome::AlreadyCached),
            Err(e) => Err(fail(e)),
        }
    }

    /// Move an unready directory out of the key path and delete it.
    ///
    /// If the moved directory turns out to carry the marker, a concurrent
    /// publisher completed in between; it is put back untouched.
    fn discard_stale(&self, key: &CacheKey, dest: &Path) -> ForgeResult<()> {
        let fail = |e: io::Error| ForgeError::publish(key.board(), key.module(), e);

        let aside = self
            .root
            .join(STAGING_DIR)
            .join(format!("{}.stale", Uuid::new_v4().simple()));

        match fs::rename(dest, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(fail(e)),
        }

        if aside.join(READY_MARKER).is_file() {
            // Best effort: if the slot was refilled meanwhile the displaced
            // copy is simply dropped.
            if fs::rename(&aside, dest).is_err() {
                let _ = remove_tree(&aside);
            }
            return Ok(());
        }

        warn!("Discarding unready cache directory for {}", key);
        remove_tree(&aside).map_err(fail)
    }

    /// Enumerate every slot that has a directory, with its state
    pub fn entries(&self) -> ForgeResult<Vec<CacheEntryInfo>> {
        let mut entries = Vec::new();

        for board_dir in read_subdirs(&self.root)? {
            let Some(board) = visible_name(&board_dir) else {
                continue;
            };

            for module_dir in read_subdirs(&board_dir)? {
                let Some(module) = visible_name(&module_dir) else {
                    continue;
                };
                entries.push(CacheEntryInfo {
                    board: board.clone(),
                    module,
                    state: state_of(&module_dir),
                    path: module_dir,
                });
            }
        }

        entries.sort_by(|a, b| (&a.board, &a.module).cmp(&(&b.board, &b.module)));
        Ok(entries)
    }
}

fn state_of(path: &Path) -> CacheState {
    if path.join(READY_MARKER).is_file() {
        CacheState::Complete
    } else if path.is_dir() {
        CacheState::Building
    } else {
        CacheState::Miss
    }
}

fn read_subdirs(dir: &Path) -> ForgeResult<Vec<PathBuf>> {
    let reader = match fs::read_dir(dir) {
        Ok(reader) => reader,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(ForgeError::io(format!("reading {}", dir.display()), e)),
    };

    let mut dirs = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|e| ForgeError::io(format!("reading {}", dir.display()), e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn visible_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        None
    } else {
        Some(name.to_string())
    }
}
