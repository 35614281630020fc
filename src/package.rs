//! Output packaging
//!
//! Copies the parts of the project tree that belong to a finished build
//! into a staging tree and archives it into a single tar file.

use crate::config::schema::PackageConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::fsutil::{copy_tree, remove_tree};
use crate::manifest::{MAIN_SOURCE_NAME, MAKEFILE_NAME};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory holding per-board build output inside an application
pub const BIN_DIR: &str = "bin";

const STRIPPED_NAME: &str = "stripped";

/// Build output directory of `board` inside `app_dir`
pub fn bin_dir(app_dir: &Path, board: &str) -> PathBuf {
    app_dir.join(BIN_DIR).join(board)
}

/// An archive written by the packager
#[derive(Debug, Clone)]
pub struct PackagedArchive {
    pub path: PathBuf,
    pub extension: &'static str,
}

/// Strips a project tree down to one application and archives it
#[derive(Debug, Clone)]
pub struct Packager {
    include: Vec<String>,
    compress: bool,
}

impl Packager {
    pub fn new(include: Vec<String>, compress: bool) -> Self {
        Self { include, compress }
    }

    pub fn from_config(config: &PackageConfig) -> Self {
        Self::new(config.include.clone(), config.compress)
    }

    pub fn extension(&self) -> &'static str {
        if self.compress {
            "tar.gz"
        } else {
            "tar"
        }
    }

    /// Stage the application and support paths under `temp_dir` and archive them
    pub fn strip_and_archive(
        &self,
        app_dir: &Path,
        project_root: &Path,
        temp_dir: &Path,
        board: &str,
        application: &str,
    ) -> ForgeResult<PackagedArchive> {
        if app_dir.file_name().and_then(|n| n.to_str()) != Some(application) {
            return Err(ForgeError::Packaging(format!(
                "{} is not the directory of application {}",
                app_dir.display(),
                application
            )));
        }

        let output = bin_dir(app_dir, board);
        if !output.is_dir() {
            return Err(ForgeError::Packaging(format!(
                "no build output at {}",
                output.display()
            )));
        }

        let rel_app = app_dir.strip_prefix(project_root).map_err(|_| {
            ForgeError::Packaging(format!(
                "{} is outside project root {}",
                app_dir.display(),
                project_root.display()
            ))
        })?;

        let staging = temp_dir.join(STRIPPED_NAME);
        remove_tree(&staging).map_err(|e| packaging("clearing staging tree", e))?;

        let staged_app = staging.join(rel_app);
        fs::create_dir_all(&staged_app).map_err(|e| packaging("creating staging tree", e))?;

        for name in [MAKEFILE_NAME, MAIN_SOURCE_NAME] {
            let src = app_dir.join(name);
            if src.is_file() {
                fs::copy(&src, staged_app.join(name))
                    .map_err(|e| packaging(format!("copying {}", src.display()), e))?;
            }
        }

        copy_tree(&output, &bin_dir(&staged_app, board), &[])
            .map_err(|e| packaging(format!("copying {}", output.display()), e))?;

        for rel in self.support_paths(board) {
            let src = project_root.join(&rel);
            let dest = staging.join(&rel);

            if src.is_dir() {
                copy_tree(&src, &dest, &[])
                    .map_err(|e| packaging(format!("copying {}", src.display()), e))?;
            } else if src.is_file() {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| packaging("creating staging tree", e))?;
                }
                fs::copy(&src, &dest)
                    .map_err(|e| packaging(format!("copying {}", src.display()), e))?;
            } else {
                debug!("Support path {} not present, skipping", src.display());
            }
        }

        let archive = temp_dir.join(format!("{}.{}", STRIPPED_NAME, self.extension()));
        self.write_archive(&staging, &archive)?;

        info!("Packaged {} into {}", application, archive.display());
        Ok(PackagedArchive {
            path: archive,
            extension: self.extension(),
        })
    }

    /// Configured support paths with `{board}` expanded; unsafe entries dropped
    fn support_paths(&self, board: &str) -> Vec<PathBuf> {
        self.include
            .iter()
            .map(|p| PathBuf::from(p.replace("{board}", board)))
            .filter(|p| {
                let safe = !p.as_os_str().is_empty()
                    && p.components().all(|c| matches!(c, Component::Normal(_)));
                if !safe {
                    warn!("Ignoring package include {}", p.display());
                }
                safe
            })
            .collect()
    }

    fn write_archive(&self, staging: &Path, archive: &Path) -> ForgeResult<()> {
        let file = File::create(archive)
            .map_err(|e| packaging(format!("creating {}", archive.display()), e))?;

        if self.compress {
            let encoder = GzEncoder::new(file, Compression::default());
            let encoder = append_tree(encoder, staging)?;
            encoder
                .finish()
                .and_then(|mut f| f.flush())
                .map_err(|e| packaging("finishing gzip stream", e))?;
        } else {
            let mut file = append_tree(file, staging)?;
            file.flush().map_err(|e| packaging("flushing archive", e))?;
        }

        Ok(())
    }
}

fn append_tree<W: Write>(writer: W, staging: &Path) -> ForgeResult<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(STRIPPED_NAME, staging)
        .map_err(|e| packaging("adding files to archive", e))?;
    builder
        .into_inner()
        .map_err(|e| packaging("finalizing archive", e))
}

fn packaging(context: impl std::fmt::Display, e: std::io::Error) -> ForgeError {
    ForgeError::Packaging(format!("{}: {}", context, e))
}
