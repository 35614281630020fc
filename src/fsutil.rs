//! Directory tree helpers shared by the cache, session and packager

use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Recursively copy `src` into `dest`, creating `dest` and its parents.
///
/// Entries whose file name is listed in `skip` are left out at every depth.
/// Symlinks are recreated as links on unix and copied as files elsewhere.
pub fn copy_tree(src: &Path, dest: &Path, skip: &[&str]) -> io::Result<()> {
    fs::create_dir_all(dest)?;

    let walker = WalkDir::new(src).min_depth(1).into_iter().filter_entry(|e| {
        e.file_name()
            .to_str()
            .map_or(true, |name| !skip.contains(&name))
    });

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(src, dest).map(|_| ())
}

/// Remove a directory tree, treating an already-missing tree as success
pub fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
