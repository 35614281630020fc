//! Build session orchestration
//!
//! A `Builder` holds the collaborators shared by every request (resolver,
//! toolchain, cache, packager). Each request gets its own `BuildSession`,
//! which owns an isolated `Workspace` and the `BuildResult` being
//! accumulated.
//!
//! ```text
//! begin -> prepare -> [warm_from_cache] -> invoke_build -> [publish_and_package] -> end
//! ```
//!
//! `end` always runs; if a session is dropped early its workspace is still
//! removed by the `Workspace` drop guard.

use crate::audit::AuditLog;
use crate::cache::{ArtifactCache, PublishOutcome, READY_MARKER};
use crate::config::{Config, ConfigManager};
use crate::error::{ForgeError, ForgeResult};
use crate::fsutil::{copy_tree, remove_tree};
use crate::manifest::{self, BuildManifest};
use crate::package::Packager;
use crate::resolver::{ModuleRef, ModuleRegistry, ModuleResolver};
use crate::session::state::{BuildRequest, BuildResult, SessionState};
use crate::session::workspace::{Workspace, WorkspaceLayout};
use crate::toolchain::{MakeToolchain, Toolchain, ToolchainStatus};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const RESOLUTION_FAILED: &str = "error while reading modules from registry";
const SERVER_SIDE_FAILURE: &str = "something went wrong on server side";

/// One in-flight build request
#[derive(Debug)]
pub struct BuildSession {
    workspace: Workspace,
    state: SessionState,
    board: String,
    caching: bool,
    modules: Vec<ModuleRef>,
    result: BuildResult,
}

impl BuildSession {
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Modules resolved by `prepare`, in request order
    pub fn modules(&self) -> &[ModuleRef] {
        &self.modules
    }

    pub fn result(&self) -> &BuildResult {
        &self.result
    }

    /// Whether this session reads from and publishes to the cache
    pub fn caching(&self) -> bool {
        self.caching
    }

    /// Resolved module names with duplicates removed, first occurrence kept
    fn unique_module_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.modules
            .iter()
            .filter(|m| seen.insert(m.name.as_str()))
            .map(|m| m.name.clone())
            .collect()
    }
}

/// Shared build machinery; cheap to clone
#[derive(Clone)]
pub struct Builder {
    layout: WorkspaceLayout,
    resolver: Arc<dyn ModuleResolver>,
    toolchain: Arc<dyn Toolchain>,
    cache: ArtifactCache,
    packager: Packager,
    caching_allowed: bool,
    audit: AuditLog,
}

impl Builder {
    pub fn new(
        layout: WorkspaceLayout,
        resolver: Arc<dyn ModuleResolver>,
        toolchain: Arc<dyn Toolchain>,
        cache: ArtifactCache,
        packager: Packager,
    ) -> Self {
        Self {
            layout,
            resolver,
            toolchain,
            cache,
            packager,
            caching_allowed: true,
            audit: AuditLog::disabled(),
        }
    }

    /// Assemble a builder from configuration, loading the module registry
    pub async fn from_config(config: &Config) -> ForgeResult<Self> {
        let registry = ModuleRegistry::load(&ConfigManager::registry_path(config)).await?;

        Ok(Self::new(
            WorkspaceLayout::from_config(&config.workspace),
            Arc::new(registry),
            Arc::new(MakeToolchain::from_config(&config.toolchain)),
            ArtifactCache::new(ConfigManager::cache_dir(config)),
            Packager::from_config(&config.package),
        )
        .with_caching_allowed(config.cache.enabled)
        .with_audit(AuditLog::new(config)))
    }

    /// Globally allow or forbid cache use, regardless of what requests ask for
    pub fn with_caching_allowed(mut self, allowed: bool) -> Self {
        self.caching_allowed = allowed;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Run a request end to end. Never fails; every failure is reflected
    /// in the returned result and the logs.
    pub async fn build(&self, request: &BuildRequest) -> BuildResult {
        let mut session = match self.begin(request).await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to allocate workspace: {}", e);
                let mut result = BuildResult::new(request.board());
                result.annotate(SERVER_SIDE_FAILURE);
                return result;
            }
        };

        self.audit
            .log(
                "build.started",
                &serde_json::json!({
                    "session": session.workspace.token().to_string(),
                    "board": request.board(),
                    "modules": request.modules(),
                    "caching": session.caching,
                }),
            )
            .await;

        if let Err(e) = self.run_session(&mut session, request).await {
            if e.is_preparation() {
                warn!("Build {} aborted: {}", session.workspace.token(), e);
            } else {
                error!("Build {} aborted: {}", session.workspace.token(), e);
            }
        }

        let token = session.workspace.token();
        let result = self.end(session);

        self.audit
            .log(
                "build.finished",
                &serde_json::json!({
                    "session": token.to_string(),
                    "board": result.board,
                    "success": result.success,
                }),
            )
            .await;

        result
    }

    async fn run_session(
        &self,
        session: &mut BuildSession,
        request: &BuildRequest,
    ) -> ForgeResult<()> {
        self.prepare(session, request).await?;

        if session.caching {
            self.warm_from_cache(session).await?;
        }

        if self.invoke_build(session).await?.is_success() {
            self.publish_and_package(session).await?;
        }

        Ok(())
    }

    /// Allocate the workspace for `request`
    pub async fn begin(&self, request: &BuildRequest) -> ForgeResult<BuildSession> {
        let workspace = Workspace::create(&self.layout).await?;

        let mut result = BuildResult::new(request.board());
        result.application_name = workspace.application().to_string();

        info!(
            "Session {} started for board {}",
            workspace.token(),
            request.board()
        );

        Ok(BuildSession {
            workspace,
            state: SessionState::Created,
            board: request.board().to_string(),
            caching: request.caching() && self.caching_allowed,
            modules: Vec::new(),
            result,
        })
    }

    /// Resolve modules and write the Makefile and main source.
    ///
    /// Resolution stops at the first unknown id; the Makefile written so far
    /// is left in the workspace.
    pub async fn prepare(
        &self,
        session: &mut BuildSession,
        request: &BuildRequest,
    ) -> ForgeResult<()> {
        let mut manifest = BuildManifest::new(
            session.workspace.application(),
            request.board(),
            self.layout.relative_base(),
            Vec::with_capacity(request.modules().len()),
        );
        let app_dir = session.workspace.app_dir().to_path_buf();

        for &id in request.modules() {
            let resolved = match self.resolver.resolve(id).await {
                Ok(Some(name)) => Ok(name),
                Ok(None) => Err(ForgeError::ModuleResolution { id }),
                Err(e) => {
                    warn!("Resolver failed for module {}: {}", id, e);
                    Err(ForgeError::ModuleResolution { id })
                }
            };

            match resolved {
                Ok(name) => {
                    manifest.modules.push(name.clone());
                    session.modules.push(ModuleRef { id, name });
                }
                Err(e) => {
                    session.result.annotate(RESOLUTION_FAILED);
                    if let Err(write_err) = manifest.write_partial(&app_dir).await {
                        debug!("Could not write partial Makefile: {}", write_err);
                    }
                    return Err(e);
                }
            }
        }

        if let Err(e) = manifest.write(&app_dir).await {
            session.result.annotate(SERVER_SIDE_FAILURE);
            return Err(e);
        }
        if let Err(e) = manifest::write_main(request.main_source(), &app_dir).await {
            session.result.annotate(SERVER_SIDE_FAILURE);
            return Err(e);
        }

        debug!(
            "Prepared {} with modules {:?}",
            session.workspace.application(),
            manifest.modules
        );
        session.state.advance(SessionState::Prepared)
    }

    /// Copy ready cache entries into the workspace output area.
    ///
    /// Returns how many modules were warmed. A failed copy is dropped and
    /// left for the toolchain to rebuild.
    pub async fn warm_from_cache(&self, session: &mut BuildSession) -> ForgeResult<usize> {
        let cache = self.cache.clone();
        let board = session.board.clone();
        let bin_dir = session.workspace.bin_dir(&board);
        let names = session.unique_module_names();

        let warmed = tokio::task::spawn_blocking(move || {
            let mut warmed = 0;
            for name in names {
                let cached = match cache.get(&board, &name) {
                    Ok(Some(path)) => path,
                    Ok(None) => {
                        debug!("Cache miss for {}/{}", board, name);
                        continue;
                    }
                    Err(e) => {
                        warn!("Skipping cache lookup for {}: {}", name, e);
                        continue;
                    }
                };

                let dest = bin_dir.join(&name);
                let copied = remove_tree(&dest).and_then(|_| copy_tree(&cached, &dest, &[READY_MARKER]));
                match copied {
                    Ok(()) => {
                        debug!("Warmed {} from {}", dest.display(), cached.display());
                        warmed += 1;
                    }
                    Err(e) => {
                        warn!("Failed to restore {}/{} from cache: {}", board, name, e);
                        let _ = remove_tree(&dest);
                    }
                }
            }
            warmed
        })
        .await
        .map_err(|e| ForgeError::Internal(format!("cache warm task failed: {}", e)))?;

        info!("Restored {} module(s) from cache", warmed);
        session.state.advance(SessionState::CacheWarmed)?;
        Ok(warmed)
    }

    /// Run the toolchain and capture its output. Failure is a normal outcome.
    pub async fn invoke_build(&self, session: &mut BuildSession) -> ForgeResult<ToolchainStatus> {
        let status = match self
            .toolchain
            .run(session.workspace.app_dir(), &session.board)
            .await
        {
            Ok(out) => {
                session.result.append(&out.output);
                if out.status == ToolchainStatus::TimedOut {
                    session.result.annotate("build timed out");
                }
                out.status
            }
            Err(e) => {
                warn!("{} could not run: {}", self.toolchain.name(), e);
                session.result.annotate(e.to_string());
                ToolchainStatus::Failed(None)
            }
        };

        debug!("Toolchain finished with {:?}", status);
        session.state.advance(SessionState::Built)?;
        Ok(status)
    }

    /// Publish module outputs to the cache and package the application.
    ///
    /// Cache failures are annotated but do not affect success; packaging
    /// failures leave the result unsuccessful.
    pub async fn publish_and_package(&self, session: &mut BuildSession) -> ForgeResult<()> {
        if session.caching {
            self.publish_modules(session).await;
        }

        let packager = self.packager.clone();
        let app_dir = session.workspace.app_dir().to_path_buf();
        let project_root = self.layout.project_root.clone();
        let temp_dir = session.workspace.temp_dir().to_path_buf();
        let board = session.board.clone();
        let application = session.workspace.application().to_string();

        let packaged = tokio::task::spawn_blocking(move || -> ForgeResult<(Vec<u8>, &'static str)> {
            let archive = packager.strip_and_archive(
                &app_dir,
                &project_root,
                &temp_dir,
                &board,
                &application,
            )?;
            let bytes = std::fs::read(&archive.path).map_err(|e| {
                ForgeError::Packaging(format!("reading {}: {}", archive.path.display(), e))
            })?;
            Ok((bytes, archive.extension))
        })
        .await
        .map_err(|e| ForgeError::Internal(format!("packaging task failed: {}", e)))
        .and_then(|r| r);

        match packaged {
            Ok((bytes, extension)) => {
                session.result.succeed(bytes, extension);
                session.state.advance(SessionState::Published)
            }
            Err(e) => {
                error!("Packaging failed: {}", e);
                session.result.annotate(SERVER_SIDE_FAILURE);
                Err(e)
            }
        }
    }

    async fn publish_modules(&self, session: &mut BuildSession) {
        let cache = self.cache.clone();
        let board = session.board.clone();
        let bin_dir = session.workspace.bin_dir(&board);
        let names = session.unique_module_names();

        let task = tokio::task::spawn_blocking(move || {
            names
                .into_iter()
                .filter_map(|name| {
                    let src: PathBuf = bin_dir.join(&name);
                    if !src.is_dir() {
                        debug!("No output directory for module {}, not caching", name);
                        return None;
                    }
                    let outcome = cache.put(&src, &board, &name);
                    Some((name, outcome))
                })
                .collect::<Vec<_>>()
        })
        .await;

        let outcomes = match task {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!("Cache publish task failed: {}", e);
                session.result.annotate("caching failed");
                return;
            }
        };

        for (name, outcome) in outcomes {
            match outcome {
                Ok(PublishOutcome::Published) => {
                    self.audit
                        .log(
                            "cache.published",
                            &serde_json::json!({"board": session.board, "module": name}),
                        )
                        .await;
                }
                Ok(PublishOutcome::AlreadyCached) => {}
                Err(e) => {
                    warn!("{}", e);
                    session.result.annotate(format!("caching of module {} failed", name));
                }
            }
        }
    }

    /// Remove the workspace and hand back the finished result
    pub fn end(&self, mut session: BuildSession) -> BuildResult {
        // Ended is later than every other state
        let _ = session.state.advance(SessionState::Ended);
        let token = session.workspace.token();
        let BuildSession {
            workspace, result, ..
        } = session;
        workspace.release();

        info!(
            "Session {} ended ({})",
            token,
            if result.success { "success" } else { "failed" }
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticResolver;
    use crate::toolchain::ToolchainOutput;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Toolchain that writes one object per requested module into bin/<board>
    struct FakeToolchain {
        calls: AtomicUsize,
        succeed: bool,
    }

    #[async_trait]
    impl Toolchain for FakeToolchain {
        async fn run(&self, app_dir: &Path, board: &str) -> ForgeResult<ToolchainOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let makefile = std::fs::read_to_string(app_dir.join("Makefile")).unwrap();
            let bin = app_dir.join("bin").join(board);
            for module in makefile.lines().filter_map(|l| l.strip_prefix("USEMODULE += ")) {
                let dir = bin.join(module);
                std::fs::create_dir_all(&dir).unwrap();
                std::fs::write(dir.join(format!("{module}.o")), b"built").unwrap();
            }
            Ok(ToolchainOutput {
                output: "compiling\n".to_string(),
                status: if self.succeed {
                    ToolchainStatus::Success
                } else {
                    ToolchainStatus::Failed(Some(2))
                },
            })
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn builder(dir: &TempDir, succeed: bool) -> (Builder, Arc<FakeToolchain>) {
        let toolchain = Arc::new(FakeToolchain {
            calls: AtomicUsize::new(0),
            succeed,
        });
        let builder = Builder::new(
            WorkspaceLayout::new(dir.path().join("RIOT"), "generated", dir.path().join("tmp")),
            Arc::new(StaticResolver::new().with(1, "shell").with(2, "ps")),
            toolchain.clone(),
            ArtifactCache::new(dir.path().join("cache")),
            Packager::new(vec![], false),
        );
        (builder, toolchain)
    }

    #[tokio::test]
    async fn successful_build_produces_archive() {
        let dir = TempDir::new().unwrap();
        let (builder, toolchain) = builder(&dir, true);
        let request = BuildRequest::new("native", vec![1, 2], "int main(){return 0;}", false).unwrap();

        let result = builder.build(&request).await;

        assert!(result.success, "output: {}", result.cmd_output);
        assert!(result.output_archive.as_ref().is_some_and(|a| !a.is_empty()));
        assert_eq!(result.output_archive_extension.as_deref(), Some("tar"));
        assert!(result.cmd_output.contains("compiling"));
        assert_eq!(toolchain.calls.load(Ordering::SeqCst), 1);
        // caching disabled in request
        assert!(builder.cache().entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn states_advance_through_lifecycle() {
        let dir = TempDir::new().unwrap();
        let (builder, _) = builder(&dir, true);
        let request = BuildRequest::new("native", vec![1], "", true).unwrap();

        let mut session = builder.begin(&request).await.unwrap();
        assert_eq!(session.state(), SessionState::Created);
        builder.prepare(&mut session, &request).await.unwrap();
        assert_eq!(session.state(), SessionState::Prepared);
        assert_eq!(session.modules()[0].name, "shell");
        builder.warm_from_cache(&mut session).await.unwrap();
        assert_eq!(session.state(), SessionState::CacheWarmed);
        assert!(builder.invoke_build(&mut session).await.unwrap().is_success());
        builder.publish_and_package(&mut session).await.unwrap();
        assert_eq!(session.state(), SessionState::Published);

        let app_dir = session.workspace().app_dir().to_path_buf();
        let result = builder.end(session);
        assert!(result.success);
        assert!(!app_dir.exists());
    }

    #[tokio::test]
    async fn unresolved_module_leaves_partial_makefile() {
        let dir = TempDir::new().unwrap();
        let (builder, _) = builder(&dir, true);
        let request = BuildRequest::new("native", vec![1, 9, 2], "", false).unwrap();

        let mut session = builder.begin(&request).await.unwrap();
        let err = builder.prepare(&mut session, &request).await.unwrap_err();
        assert!(matches!(err, ForgeError::ModuleResolution { id: 9 }));

        let makefile =
            std::fs::read_to_string(session.workspace().app_dir().join("Makefile")).unwrap();
        assert!(makefile.contains("USEMODULE += shell"));
        assert!(!makefile.contains("USEMODULE += ps"));
        assert!(!makefile.contains("Makefile.include"));
        assert!(session.result().cmd_output.contains(RESOLUTION_FAILED));

        let result = builder.end(session);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn duplicate_modules_published_once() {
        let dir = TempDir::new().unwrap();
        let (builder, _) = builder(&dir, true);
        let request = BuildRequest::new("native", vec![1, 1, 2], "", true).unwrap();

        let result = builder.build(&request).await;
        assert!(result.success, "output: {}", result.cmd_output);
        assert!(!result.cmd_output.contains("caching of module"));

        let entries = builder.cache().entries().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn caching_forbidden_by_builder() {
        let dir = TempDir::new().unwrap();
        let (builder, _) = builder(&dir, true);
        let builder = builder.with_caching_allowed(false);
        let request = BuildRequest::new("native", vec![1], "", true).unwrap();

        let session = builder.begin(&request).await.unwrap();
        assert!(!session.caching());
        builder.end(session);
    }
}
