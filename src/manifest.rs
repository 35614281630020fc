//! Build description (Makefile) generation
//!
//! Renders the application Makefile the toolchain consumes and writes the
//! user's `main.c` next to it.

use crate::error::{ForgeError, ForgeResult};
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub const MAKEFILE_NAME: &str = "Makefile";
pub const MAIN_SOURCE_NAME: &str = "main.c";

/// Toolchain-facing description of one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildManifest {
    pub application: String,
    pub board: String,
    /// Value of `RIOTBASE`, usually relative to `$(CURDIR)`
    pub base: String,
    /// Module names in request order; duplicates are kept
    pub modules: Vec<String>,
}

impl BuildManifest {
    pub fn new(
        application: impl Into<String>,
        board: impl Into<String>,
        base: impl Into<String>,
        modules: Vec<String>,
    ) -> Self {
        Self {
            application: application.into(),
            board: board.into(),
            base: base.into(),
            modules,
        }
    }

    /// Full Makefile text
    pub fn render(&self) -> String {
        let mut out = self.render_partial();
        out.push('\n');
        out.push_str("include $(RIOTBASE)/Makefile.include");
        out
    }

    /// Header and module lines only, without the shared-rules include.
    /// Written when resolution stops part way.
    pub fn render_partial(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "APPLICATION = {}\n\n", self.application);
        let _ = write!(out, "BOARD ?= {}\n\n", self.board);
        let _ = write!(out, "RIOTBASE ?= {}\n\n", self.base);
        for module in &self.modules {
            let _ = writeln!(out, "USEMODULE += {}", module);
        }
        out
    }

    /// Write the complete Makefile into `dir`
    pub async fn write(&self, dir: &Path) -> ForgeResult<PathBuf> {
        write_file(dir.join(MAKEFILE_NAME), self.render()).await
    }

    /// Write the truncated Makefile into `dir`
    pub async fn write_partial(&self, dir: &Path) -> ForgeResult<PathBuf> {
        write_file(dir.join(MAKEFILE_NAME), self.render_partial()).await
    }
}

/// Write the main source verbatim into `dir`
pub async fn write_main(content: &str, dir: &Path) -> ForgeResult<PathBuf> {
    write_file(dir.join(MAIN_SOURCE_NAME), content.to_string()).await
}

async fn write_file(path: PathBuf, content: String) -> ForgeResult<PathBuf> {
    fs::write(&path, content)
        .await
        .map_err(|e| ForgeError::write(&path, e))?;
    debug!("Wrote {}", path.display());
    Ok(path)
}

/// `RIOTBASE` for an application living at `apps_dir/<app>` below the project root.
///
/// `generated/app` yields `$(CURDIR)/../..`.
pub fn relative_base(apps_dir: &Path) -> String {
    let depth = apps_dir
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
        + 1;

    let mut base = String::from("$(CURDIR)");
    for _ in 0..depth {
        base.push_str("/..");
    }
    base
}
