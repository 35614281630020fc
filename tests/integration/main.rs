//! Integration tests for fwforge

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn fwforge(config: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("fwforge");
        cmd.env("FWFORGE_CONFIG", config);
        cmd
    }

    fn write_config(dir: &TempDir, extra: &str) -> std::path::PathBuf {
        let path = dir.path().join("config.toml");
        let content = format!(
            "[general]\naudit_log = false\n\n[cache]\ndir = {:?}\n\n[registry]\npath = {:?}\n\n{}",
            dir.path().join("cache"),
            dir.path().join("modules.toml"),
            extra
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        fwforge(&dir.path().join("config.toml"))
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Firmware build service"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        fwforge(&dir.path().join("config.toml"))
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("fwforge"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        fwforge(&dir.path().join("config.toml"))
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        fwforge(&dir.path().join("config.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[toolchain]"));
    }

    #[test]
    fn config_init_and_set() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("nested").join("config.toml");

        fwforge(&config).args(["config", "init"]).assert().success();
        assert!(config.exists());

        fwforge(&config)
            .args(["config", "set", "toolchain.program", "gmake"])
            .assert()
            .success();
        assert!(std::fs::read_to_string(&config).unwrap().contains("gmake"));

        fwforge(&config)
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown configuration key"));
    }

    #[test]
    fn cache_path_uses_config() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "");
        fwforge(&config)
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache"));
    }

    #[test]
    fn cache_list_empty() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "");
        fwforge(&config)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries found"));
    }

    #[test]
    fn build_without_registry_fails() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "");
        fwforge(&config)
            .args(["build", "--board", "native", "--modules", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("registry not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn build_requires_modules() {
        let dir = TempDir::new().unwrap();
        fwforge(&dir.path().join("config.toml"))
            .args(["build", "--board", "native"])
            .assert()
            .failure();
    }

    /// Full CLI build against a shell script standing in for make
    #[cfg(unix)]
    #[test]
    fn build_with_scripted_toolchain() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fake-make");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             cd \"$2\" || exit 1\n\
             board=\"${3#BOARD=}\"\n\
             for m in $(sed -n 's/^USEMODULE += //p' Makefile); do\n\
               mkdir -p \"bin/$board/$m\" && echo obj > \"bin/$board/$m/$m.o\"\n\
             done\n\
             echo \"linked for $board\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        std::fs::write(
            dir.path().join("modules.toml"),
            "[[module]]\nid = 1\nname = \"shell\"\n\n[[module]]\nid = 2\nname = \"ps\"\n",
        )
        .unwrap();

        let config = write_config(
            &dir,
            &format!(
                "[workspace]\nproject_root = {:?}\ntemp_root = {:?}\n\n[toolchain]\nprogram = {:?}\n",
                dir.path().join("RIOT"),
                dir.path().join("tmp"),
                script
            ),
        );

        fwforge(&config)
            .args([
                "build", "--board", "native", "--modules", "1", "2", "--caching",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"success\": true"))
            .stdout(predicate::str::contains("linked for native"));

        fwforge(&config)
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("native/shell"))
            .stdout(predicate::str::contains("native/ps"));
    }
}

mod session_tests {
    use async_trait::async_trait;
    use fwforge::cache::{ArtifactCache, READY_MARKER};
    use fwforge::error::{ForgeError, ForgeResult};
    use fwforge::package::Packager;
    use fwforge::resolver::StaticResolver;
    use fwforge::session::{BuildRequest, Builder, WorkspaceLayout};
    use fwforge::toolchain::{Toolchain, ToolchainOutput, ToolchainStatus};
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records what it saw and fakes module outputs from the Makefile
    #[derive(Default)]
    struct ScriptedToolchain {
        calls: AtomicUsize,
        fail: bool,
        /// Report success without writing anything under bin/
        no_outputs: bool,
        makefiles: Mutex<Vec<String>>,
        sentinels_seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Toolchain for ScriptedToolchain {
        async fn run(&self, app_dir: &Path, board: &str) -> ForgeResult<ToolchainOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let makefile = std::fs::read_to_string(app_dir.join("Makefile")).unwrap();
            self.makefiles.lock().unwrap().push(makefile.clone());

            let bin = app_dir.join("bin").join(board);
            let modules = makefile
                .lines()
                .filter_map(|l| l.strip_prefix("USEMODULE += "))
                .filter(|_| !self.no_outputs);
            for module in modules {
                let dir = bin.join(module);
                if dir.join("sentinel").exists() {
                    self.sentinels_seen
                        .lock()
                        .unwrap()
                        .push(module.to_string());
                }
                std::fs::create_dir_all(&dir).unwrap();
                std::fs::write(dir.join(format!("{module}.o")), b"obj").unwrap();
            }

            Ok(ToolchainOutput {
                output: format!("building for {board}\n"),
                status: if self.fail {
                    ToolchainStatus::Failed(Some(2))
                } else {
                    ToolchainStatus::Success
                },
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    struct Env {
        dir: TempDir,
        toolchain: Arc<ScriptedToolchain>,
        builder: Builder,
    }

    impl Env {
        fn new(fail: bool) -> Self {
            Self::with(
                ScriptedToolchain {
                    fail,
                    ..Default::default()
                },
                |dir| dir.join("cache"),
            )
        }

        fn with(toolchain: ScriptedToolchain, cache_root: impl FnOnce(&Path) -> PathBuf) -> Self {
            let dir = TempDir::new().unwrap();
            let toolchain = Arc::new(toolchain);
            let root = dir.path().join("RIOT");
            std::fs::create_dir_all(root.join("boards/native")).unwrap();
            std::fs::write(root.join("Makefile.include"), "# rules").unwrap();

            let builder = Builder::new(
                WorkspaceLayout::new(&root, "generated_by_fwforge", dir.path().join("tmp")),
                Arc::new(
                    StaticResolver::new()
                        .with(1, "shell")
                        .with(2, "ps")
                        .with(3, "xtimer"),
                ),
                toolchain.clone(),
                ArtifactCache::new(cache_root(dir.path())),
                Packager::new(
                    vec!["Makefile.include".to_string(), "boards/{board}".to_string()],
                    false,
                ),
            );

            Self {
                dir,
                toolchain,
                builder,
            }
        }

        fn apps_parent(&self) -> PathBuf {
            self.builder.layout().apps_parent()
        }

        fn leftover_apps(&self) -> usize {
            std::fs::read_dir(self.apps_parent())
                .map(|rd| rd.count())
                .unwrap_or(0)
        }
    }

    #[tokio::test]
    async fn native_build_generates_makefile() {
        let env = Env::new(false);
        let request = BuildRequest::new("native", vec![1, 2], "int main(){return 0;}", false).unwrap();

        let result = env.builder.build(&request).await;

        assert!(result.success, "output: {}", result.cmd_output);
        assert!(result.application_name.starts_with("application"));
        assert_eq!(result.output_archive_extension.as_deref(), Some("tar"));

        let makefiles = env.toolchain.makefiles.lock().unwrap();
        let expected = format!(
            "APPLICATION = {}\n\nBOARD ?= native\n\nRIOTBASE ?= $(CURDIR)/../..\n\n\
             USEMODULE += shell\nUSEMODULE += ps\n\ninclude $(RIOTBASE)/Makefile.include",
            result.application_name
        );
        assert_eq!(makefiles[0], expected);
        assert_eq!(env.leftover_apps(), 0);
    }

    #[tokio::test]
    async fn cache_warms_next_build() {
        let env = Env::new(false);
        let request = BuildRequest::new("native", vec![1, 2], "", true).unwrap();

        let first = env.builder.build(&request).await;
        assert!(first.success, "output: {}", first.cmd_output);

        // Plant a sentinel in the cached entry; a warmed workspace must carry it
        let cached = env.builder.cache().get("native", "shell").unwrap().unwrap();
        std::fs::write(cached.join("sentinel"), b"from cache").unwrap();

        let second = env.builder.build(&request).await;
        assert!(second.success);
        assert_eq!(
            *env.toolchain.sentinels_seen.lock().unwrap(),
            vec!["shell".to_string()]
        );
    }

    #[tokio::test]
    async fn warmed_copy_excludes_ready_marker() {
        let env = Env::new(false);
        let request = BuildRequest::new("native", vec![1], "", true).unwrap();
        env.builder.build(&request).await;

        let mut session = env.builder.begin(&request).await.unwrap();
        env.builder.prepare(&mut session, &request).await.unwrap();
        let warmed = env.builder.warm_from_cache(&mut session).await.unwrap();
        assert_eq!(warmed, 1);

        let module_dir = session.workspace().bin_dir("native").join("shell");
        assert!(module_dir.join("shell.o").exists());
        assert!(!module_dir.join(READY_MARKER).exists());
        env.builder.end(session);
    }

    #[tokio::test]
    async fn failed_build_publishes_nothing() {
        let env = Env::new(true);
        let request = BuildRequest::new("native", vec![1, 2], "", true).unwrap();

        let result = env.builder.build(&request).await;

        assert!(!result.success);
        assert!(result.output_archive.is_none());
        assert!(result.cmd_output.contains("building for native"));
        assert!(env.builder.cache().entries().unwrap().is_empty());
        assert_eq!(env.leftover_apps(), 0);
    }

    #[tokio::test]
    async fn unresolved_module_skips_toolchain() {
        let env = Env::new(false);
        let request = BuildRequest::new("native", vec![1, 42], "", true).unwrap();

        let result = env.builder.build(&request).await;

        assert!(!result.success);
        assert!(result
            .cmd_output
            .contains("error while reading modules from registry"));
        assert_eq!(env.toolchain.calls.load(Ordering::SeqCst), 0);
        assert_eq!(env.leftover_apps(), 0);
    }

    #[tokio::test]
    async fn packaging_failure_reports_server_error() {
        let env = Env::with(
            ScriptedToolchain {
                no_outputs: true,
                ..Default::default()
            },
            |dir| dir.join("cache"),
        );
        let request = BuildRequest::new("native", vec![1], "", true).unwrap();

        let result = env.builder.build(&request).await;

        assert!(!result.success);
        assert!(result.output_archive.is_none());
        assert!(result.cmd_output.contains("building for native"));
        assert!(result
            .cmd_output
            .contains("something went wrong on server side"));
        assert_eq!(env.toolchain.calls.load(Ordering::SeqCst), 1);
        assert_eq!(env.leftover_apps(), 0);
    }

    #[tokio::test]
    async fn cache_publish_failure_keeps_success() {
        // A regular file where the cache root should be makes every publish fail
        let env = Env::with(ScriptedToolchain::default(), |dir| {
            let root = dir.join("cache-file");
            std::fs::write(&root, b"not a directory").unwrap();
            root
        });
        let request = BuildRequest::new("native", vec![1, 2], "", true).unwrap();

        let result = env.builder.build(&request).await;

        assert!(result.success, "output: {}", result.cmd_output);
        assert!(result.output_archive.is_some());
        assert!(result.cmd_output.contains("caching of module shell failed"));
        assert!(result.cmd_output.contains("caching of module ps failed"));
        assert_eq!(env.leftover_apps(), 0);
    }

    #[tokio::test]
    async fn traversing_board_cannot_reach_other_sessions() {
        let env = Env::new(false);
        let other = env.apps_parent().join("applicationother");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(other.join("main.c"), "int secret;").unwrap();

        for board in ["../..", "..", "native/../../applicationother"] {
            assert!(matches!(
                BuildRequest::new(board, vec![1], "", false),
                Err(ForgeError::InvalidRequest(_))
            ));
        }
        assert_eq!(env.toolchain.calls.load(Ordering::SeqCst), 0);
        assert!(other.join("main.c").exists());
    }

    #[tokio::test]
    async fn concurrent_sessions_get_unique_workspaces() {
        let env = Env::new(false);
        let request = BuildRequest::new("native", vec![1], "", false).unwrap();

        let mut handles = Vec::new();
        for _ in 0..128 {
            let builder = env.builder.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move {
                let session = builder.begin(&request).await.unwrap();
                let path = session.workspace().app_dir().to_path_buf();
                (session, path)
            }));
        }

        let mut sessions = Vec::new();
        let mut paths = HashSet::new();
        for handle in handles {
            let (session, path) = handle.await.unwrap();
            assert!(paths.insert(path));
            sessions.push(session);
        }
        assert_eq!(paths.len(), 128);

        for session in sessions {
            env.builder.end(session);
        }
        assert_eq!(env.leftover_apps(), 0);
    }

    #[tokio::test]
    async fn concurrent_builds_share_cache() {
        let env = Env::new(false);
        let request = BuildRequest::new("native", vec![1, 2, 3], "", true).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let builder = env.builder.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move { builder.build(&request).await }));
        }
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.success, "output: {}", result.cmd_output);
            assert!(!result.cmd_output.contains("caching of module"));
        }

        let entries = env.builder.cache().entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.state.is_usable()));
        assert!(!env.dir.path().join("cache/.staging").exists()
            || std::fs::read_dir(env.dir.path().join("cache/.staging"))
                .unwrap()
                .next()
                .is_none());
    }
}

mod cache_tests {
    use fwforge::cache::{ArtifactCache, PublishOutcome, READY_MARKER};
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    #[test]
    fn concurrent_put_leaves_one_ready_entry() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ArtifactCache::new(dir.path().join("cache")));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                let src = dir.path().join(format!("src{i}"));
                std::fs::create_dir_all(&src).unwrap();
                std::fs::write(src.join("shell.o"), format!("obj{i}")).unwrap();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.put(&src, "native", "shell").unwrap()
                })
            })
            .collect();

        let outcomes: Vec<PublishOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == PublishOutcome::Published)
                .count(),
            1
        );

        let entry = cache.get("native", "shell").unwrap().unwrap();
        assert!(entry.join(READY_MARKER).exists());
        let content = std::fs::read_to_string(entry.join("shell.o")).unwrap();
        assert!(content.starts_with("obj"));
        assert_eq!(cache.entries().unwrap().len(), 1);

        let staging = dir.path().join("cache").join(".staging");
        assert!(
            !staging.exists() || std::fs::read_dir(&staging).unwrap().next().is_none(),
            "staging leftovers in {}",
            staging.display()
        );
    }
}
